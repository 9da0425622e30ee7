use std::time::Duration;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::gate::Denied;

/// Errors raised by provider clients and configuration loading.
#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Provider error: {provider} - {message}")]
    Provider { provider: String, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Streaming error: {0}")]
    Streaming(String),

    #[error("Invalid inline data: {0}")]
    Decode(#[from] base64::DecodeError),
}

impl Error {
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Error::Auth(message.into())
    }

    pub fn streaming(message: impl Into<String>) -> Self {
        Error::Streaming(message.into())
    }
}

/// Errors that reach the HTTP layer outside the image gate (chat).
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "Request failed");
        let body = json!({
            "error": self.to_string(),
            "success": false,
        });
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

/// Failure kinds of a single image generation call.
///
/// Every kind is terminal for the call. `AlreadyInProgress` and
/// `RateLimited` are admission denials and carry no provider detail, so a
/// caller can tell "wait and retry" apart from a genuine failure.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Another image generation is already in progress. Please wait.")]
    AlreadyInProgress,

    #[error("Please wait {retry_after_secs} seconds before generating another image.")]
    RateLimited { retry_after_secs: u64 },

    #[error("{0}")]
    Configuration(String),

    #[error("Request timeout after {} seconds", whole_seconds_ceil(.0))]
    Timeout(Duration),

    #[error("API quota exceeded. Please try again later or upgrade your plan.")]
    QuotaExceeded,

    #[error("No image files were generated")]
    NoImageReturned,

    #[error("Failed to save generated image: {0}")]
    Storage(#[source] std::io::Error),

    #[error("Image generation failed: {0}")]
    Provider(String),
}

impl GenerationError {
    /// Classify a provider failure. Quota exhaustion is recognised by the
    /// provider's message text only.
    pub fn from_provider(error: &Error) -> Self {
        let message = error.to_string();
        if message.contains("quota") || message.contains("RESOURCE_EXHAUSTED") {
            GenerationError::QuotaExceeded
        } else {
            GenerationError::Provider(message)
        }
    }

    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            GenerationError::AlreadyInProgress => "GENERATION_IN_PROGRESS",
            GenerationError::RateLimited { .. } => "RATE_LIMITED",
            GenerationError::Configuration(_) => "CONFIGURATION_ERROR",
            GenerationError::Timeout(_) => "TIMEOUT",
            GenerationError::QuotaExceeded => "QUOTA_EXCEEDED",
            GenerationError::NoImageReturned => "NO_IMAGE_RETURNED",
            GenerationError::Storage(_) => "STORAGE_ERROR",
            GenerationError::Provider(_) => "PROVIDER_ERROR",
        }
    }

    /// Whether the call was turned away before reaching the provider.
    pub fn is_admission_denial(&self) -> bool {
        matches!(
            self,
            GenerationError::AlreadyInProgress | GenerationError::RateLimited { .. }
        )
    }
}

impl From<Denied> for GenerationError {
    fn from(denied: Denied) -> Self {
        match denied {
            Denied::Busy => GenerationError::AlreadyInProgress,
            Denied::CoolingDown { retry_after } => GenerationError::RateLimited {
                retry_after_secs: whole_seconds_ceil(&retry_after),
            },
        }
    }
}

/// Round a wait up to whole seconds, so a caller never retries early.
pub(crate) fn whole_seconds_ceil(wait: &Duration) -> u64 {
    let millis = wait.as_millis();
    millis.div_ceil(1000) as u64
}

impl IntoResponse for GenerationError {
    fn into_response(self) -> Response {
        if !self.is_admission_denial() {
            tracing::error!(error = %self, code = self.code(), "Image generation failed");
        }

        let mut body = json!({
            "error": self.to_string(),
            "success": false,
            "code": self.code(),
        });

        let retry_after = match &self {
            GenerationError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        };
        if let Some(secs) = retry_after {
            body["retryAfter"] = json!(secs);
        }

        let mut response = (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
