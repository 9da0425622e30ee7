//! Image generation behind the request gate.
//!
//! A call is admitted by the [`RequestGate`], the provider is raced against a
//! timeout, failures are classified into [`GenerationError`] kinds, and the
//! first returned image is written to the [`ArtifactStore`]. The slot is
//! released on every exit path because the admission permit lives on the
//! stack of [`ImageGenerator::generate`].

use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;
use uuid::Uuid;

use crate::artifacts::ArtifactStore;
use crate::config::{DEFAULT_IMAGE_MODEL, DEFAULT_IMAGE_TIMEOUT};
use crate::error::GenerationError;
use crate::gate::{RequestGate, DEFAULT_MIN_INTERVAL};
use crate::provider::ImageProvider;
use crate::{Error, GenerationResult, ImageRequest};

const PROMPT_PREFIX: &str = "Generate an image of: ";

pub struct ImageGenerator {
    gate: RequestGate,
    provider: Arc<dyn ImageProvider>,
    store: ArtifactStore,
    model: String,
    timeout: Duration,
}

impl ImageGenerator {
    pub fn new(provider: Arc<dyn ImageProvider>, store: ArtifactStore) -> Self {
        Self {
            gate: RequestGate::new(DEFAULT_MIN_INTERVAL),
            provider,
            store,
            model: DEFAULT_IMAGE_MODEL.to_string(),
            timeout: DEFAULT_IMAGE_TIMEOUT,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace the gate with a fresh one using `min_interval` as cooldown.
    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.gate = RequestGate::new(min_interval);
        self
    }

    pub fn gate(&self) -> &RequestGate {
        &self.gate
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Generate one image for `prompt` and store it.
    pub async fn generate(&self, prompt: &str) -> Result<GenerationResult, GenerationError> {
        let span = tracing::info_span!(
            "generate_image",
            request_id = %Uuid::new_v4(),
            provider = self.provider.name(),
        );
        self.run(prompt).instrument(span).await
    }

    async fn run(&self, prompt: &str) -> Result<GenerationResult, GenerationError> {
        let permit = match self.gate.try_admit_with(|| {
            self.provider
                .ensure_configured()
                .map_err(configuration_error)
        }) {
            Ok(permit) => permit,
            Err(e) => {
                if e.is_admission_denial() {
                    tracing::info!(code = e.code(), "{e}");
                } else {
                    tracing::warn!(code = e.code(), "{e}");
                }
                return Err(e);
            }
        };

        tracing::info!(model = %self.model, prompt_chars = prompt.chars().count(), "Starting image generation");
        let request = ImageRequest::new(&self.model, format!("{PROMPT_PREFIX}{prompt}"));

        // Dropping the provider future on timeout aborts the HTTP request.
        let response =
            match tokio::time::timeout(self.timeout, self.provider.generate_image(&request)).await {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "Provider call failed");
                    return Err(GenerationError::from_provider(&e));
                }
                Err(_) => {
                    tracing::warn!(timeout_secs = self.timeout.as_secs(), "Provider call timed out");
                    return Err(GenerationError::Timeout(self.timeout));
                }
            };

        if let Some(text) = response.text.as_deref() {
            tracing::debug!(text, "Provider returned text alongside the image");
        }
        let image = response.first_image().ok_or_else(|| {
            tracing::warn!(files = response.files.len(), "Provider returned no image");
            GenerationError::NoImageReturned
        })?;

        let artifact_path = self
            .store
            .persist(image)
            .await
            .map_err(GenerationError::Storage)?;

        self.gate.release(permit);
        tracing::info!(%artifact_path, "Image saved");
        Ok(GenerationResult { artifact_path })
    }
}

fn configuration_error(error: Error) -> GenerationError {
    match error {
        Error::Config(message) => GenerationError::Configuration(message),
        other => GenerationError::Configuration(other.to_string()),
    }
}
