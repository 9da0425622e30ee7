//! Types for streaming chat responses.

use crate::types::{FinishReason, Usage};

/// Events that can be emitted while a chat response streams.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A chunk of text was received.
    TextDelta { delta: String },
    /// The stream has finished.
    Done {
        finish_reason: FinishReason,
        usage: Usage,
    },
    /// The provider reported an error mid-stream.
    Error { error: String },
}
