use crate::{ChatRequest, ChatResponse, Error, ImageRequest, ImageResponse};

/// A provider that streams chat completions.
/// Use `response.stream()` to relay events or `response.text().await` to buffer.
#[async_trait::async_trait]
pub trait ChatProvider: Send + Sync + 'static {
    async fn stream_chat(&self, request: &ChatRequest) -> Result<ChatResponse, Error>;
}

/// A provider that turns a prompt into one or more image files.
#[async_trait::async_trait]
pub trait ImageProvider: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Fails when the provider cannot be called at all, e.g. a missing
    /// credential. Must not touch the network.
    fn ensure_configured(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn generate_image(&self, request: &ImageRequest) -> Result<ImageResponse, Error>;
}
