//! Blob store for generated images: a flat directory served at the site root.

use std::io;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use crate::ProviderFile;

const FILE_PREFIX: &str = "generated-";
const FILE_EXTENSION: &str = "png";

/// Writes generated images into the public directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory if it does not exist yet.
    pub async fn ensure_root(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    /// Write `file` as `generated-<epoch-ms>.png` and return its path
    /// relative to the site root, e.g. `/generated-1700000000000.png`.
    pub async fn persist(&self, file: &ProviderFile) -> io::Result<String> {
        self.persist_at(file, chrono::Utc::now().timestamp_millis())
            .await
    }

    async fn persist_at(&self, file: &ProviderFile, millis: i64) -> io::Result<String> {
        let mut attempt = 0u32;
        loop {
            let file_name = artifact_name(millis, attempt);
            let path = self.root.join(&file_name);

            // Never overwrite: a same-millisecond collision moves to the next suffix.
            let mut handle = match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(handle) => handle,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    attempt += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            handle.write_all(&file.bytes).await?;
            handle.flush().await?;

            tracing::debug!(path = %path.display(), bytes = file.bytes.len(), "Artifact written");
            return Ok(format!("/{file_name}"));
        }
    }
}

fn artifact_name(millis: i64, attempt: u32) -> String {
    if attempt == 0 {
        format!("{FILE_PREFIX}{millis}.{FILE_EXTENSION}")
    } else {
        format!("{FILE_PREFIX}{millis}-{attempt}.{FILE_EXTENSION}")
    }
}
