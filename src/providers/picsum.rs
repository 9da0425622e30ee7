//! Offline-friendly stand-in for the image model: downloads a random picture
//! and ignores the prompt.

use reqwest::{header::CONTENT_TYPE, Client};
use std::time::Duration;

use crate::provider::ImageProvider;
use crate::{Error, ImageRequest, ImageResponse, ProviderFile};

pub const DEFAULT_BASE_URL: &str = "https://picsum.photos";

const PROVIDER: &str = "Picsum";
const IMAGE_SIZE: u32 = 512;

pub struct PicsumProvider {
    client: Client,
    base_url: String,
}

impl PicsumProvider {
    pub fn new() -> Result<Self, Error> {
        Self::new_with_base_url(DEFAULT_BASE_URL.to_string())
    }

    /// Create a provider against a custom base URL (for testing).
    pub fn new_with_base_url(base_url: String) -> Result<Self, Error> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        // The query only defeats caching; any changing value works.
        let seed = chrono::Utc::now().timestamp_millis();
        format!(
            "{}/{IMAGE_SIZE}/{IMAGE_SIZE}?random={seed}",
            self.base_url
        )
    }
}

#[async_trait::async_trait]
impl ImageProvider for PicsumProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate_image(&self, _request: &ImageRequest) -> Result<ImageResponse, Error> {
        let endpoint = self.endpoint();
        tracing::debug!(%endpoint, "Downloading mock image");

        let response = self.client.get(&endpoint).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::provider(
                PROVIDER,
                format!("Failed to download image: {}", status.as_u16()),
            ));
        }

        let media_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or(value).trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "image/jpeg".to_string());
        let bytes = response.bytes().await?;

        Ok(ImageResponse {
            text: None,
            files: vec![ProviderFile::new(media_type, bytes)],
        })
    }
}
