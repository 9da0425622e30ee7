//! Streamed chat responses.

use crate::{Error, FinishReason, StreamEvent, Usage};
use futures_util::stream::Stream;
use std::pin::Pin;

pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, Error>> + Send>>;

/// A chat response collected from the whole stream.
#[derive(Debug, Clone, PartialEq)]
pub struct CompleteResponse {
    pub content: String,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

/// Response from a chat generation that can be streamed or buffered.
pub struct ChatResponse {
    stream: EventStream,
}

impl ChatResponse {
    /// Create a new response from a stream of events.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<StreamEvent, Error>> + Send + 'static,
    {
        Self {
            stream: Box::pin(stream),
        }
    }

    /// Stream the response events.
    pub fn stream(self) -> EventStream {
        self.stream
    }

    /// Get just the text content.
    pub async fn text(self) -> Result<String, Error> {
        Ok(self.buffer().await?.content)
    }

    /// Buffer the entire response by consuming the stream.
    pub async fn buffer(self) -> Result<CompleteResponse, Error> {
        use futures_util::StreamExt;

        let mut stream = self.stream;
        let mut content = String::new();
        let mut finished = None;

        while let Some(event) = stream.next().await {
            match event? {
                StreamEvent::TextDelta { delta } => content.push_str(&delta),
                StreamEvent::Done {
                    finish_reason,
                    usage,
                } => {
                    finished = Some((finish_reason, usage));
                    break;
                }
                StreamEvent::Error { error } => return Err(Error::streaming(error)),
            }
        }

        // A stream that ends without a finish event still produced text.
        let (finish_reason, usage) = finished.unwrap_or((FinishReason::Stop, Usage::default()));
        Ok(CompleteResponse {
            content,
            finish_reason,
            usage,
        })
    }
}
