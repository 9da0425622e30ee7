//! Provider implementations.

pub mod gemini;
pub mod picsum;

// Re-export commonly used provider types
pub use gemini::GeminiProvider;
pub use picsum::PicsumProvider;
