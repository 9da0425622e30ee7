//! Core types shared by the providers, the generator and the HTTP layer.

pub mod image;
pub mod message;
pub mod request;
pub mod streaming;

// Re-export commonly used types
pub use image::*;
pub use message::*;
pub use request::*;
pub use streaming::*;
