//! Gemini-backed chat streaming and gated image generation behind a small
//! HTTP service.
//!
//! Image generation goes through a single-slot [`RequestGate`]: one request at
//! a time, a cooldown between admissions, a timeout on the provider call, and
//! the resulting image stored as a static file.

pub mod artifacts;
pub mod config;
pub mod error;
pub mod factory;
pub mod gate;
pub mod generator;
pub mod provider;
pub mod providers;
pub mod response;
pub mod server;
pub mod sse_stream;
pub mod types;

// Re-export core types for easy usage
pub use artifacts::ArtifactStore;
pub use config::Config;
pub use error::{Error, GenerationError};
pub use factory::{ImageBackend, ProviderFactory};
pub use gate::{Denied, RequestGate, SlotPermit};
pub use generator::ImageGenerator;
pub use provider::{ChatProvider, ImageProvider};
pub use providers::*;
pub use response::*;
pub use sse_stream::SseEvent;
pub use types::*;
