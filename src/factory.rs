use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::Config;
use crate::provider::{ChatProvider, ImageProvider};
use crate::providers::{GeminiProvider, PicsumProvider};
use crate::Error;

/// Where generated images come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageBackend {
    /// Gemini image model.
    Gemini,
    /// Random stock picture, prompt ignored. Needs no credential.
    Mock,
}

impl FromStr for ImageBackend {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "gemini" => Ok(ImageBackend::Gemini),
            "mock" => Ok(ImageBackend::Mock),
            _ => Err(Error::config(format!(
                "Invalid IMAGE_BACKEND '{value}'. Valid values are: gemini, mock"
            ))),
        }
    }
}

impl fmt::Display for ImageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageBackend::Gemini => f.write_str("gemini"),
            ImageBackend::Mock => f.write_str("mock"),
        }
    }
}

/// Factory for creating providers from configuration.
pub struct ProviderFactory;

impl ProviderFactory {
    fn gemini(config: &Config) -> Result<GeminiProvider, Error> {
        Ok(GeminiProvider::new_with_base_url(
            config.gemini_api_key.clone(),
            config.gemini_api_base.clone(),
        )?
        .with_max_retries(config.provider_max_retries))
    }

    /// Create the image provider selected by `IMAGE_BACKEND`.
    pub fn image_provider(config: &Config) -> Result<Arc<dyn ImageProvider>, Error> {
        match config.image_backend {
            ImageBackend::Gemini => Ok(Arc::new(Self::gemini(config)?)),
            ImageBackend::Mock => Ok(Arc::new(PicsumProvider::new()?)),
        }
    }

    /// Create the chat provider. Chat always goes to Gemini.
    pub fn chat_provider(config: &Config) -> Result<Arc<dyn ChatProvider>, Error> {
        Ok(Arc::new(Self::gemini(config)?))
    }
}
