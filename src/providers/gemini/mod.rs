//! Google Gemini via the public `generativelanguage` REST API.

pub mod client;
pub mod types;

pub use client::{GeminiProvider, DEFAULT_BASE_URL};
