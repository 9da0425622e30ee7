//! HTTP surface: image generation, chat streaming, health and static files.

pub mod handlers;

use std::path::Path;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::services::ServeDir;

use crate::artifacts::ArtifactStore;
use crate::config::Config;
use crate::factory::ProviderFactory;
use crate::generator::ImageGenerator;
use crate::provider::ChatProvider;
use crate::Error;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub generator: Arc<ImageGenerator>,
    pub chat: Arc<dyn ChatProvider>,
    pub chat_model: String,
}

impl AppState {
    pub fn new(
        generator: ImageGenerator,
        chat: Arc<dyn ChatProvider>,
        chat_model: impl Into<String>,
    ) -> Self {
        Self {
            generator: Arc::new(generator),
            chat,
            chat_model: chat_model.into(),
        }
    }

    /// Wire providers, the gate and the blob store from configuration.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let generator = ImageGenerator::new(
            ProviderFactory::image_provider(config)?,
            ArtifactStore::new(&config.public_dir),
        )
        .with_model(&config.image_model)
        .with_timeout(config.image_timeout)
        .with_min_interval(config.image_min_interval);

        Ok(Self::new(
            generator,
            ProviderFactory::chat_provider(config)?,
            &config.chat_model,
        ))
    }
}

/// Build the router. Anything not matched by an API route is served from
/// `public_dir`, which is also where generated images land.
pub fn create_app(state: AppState, public_dir: impl AsRef<Path>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/generate-image", post(handlers::generate_image))
        .route("/chat", post(handlers::chat))
        .fallback_service(ServeDir::new(public_dir.as_ref()))
        .with_state(state)
}
