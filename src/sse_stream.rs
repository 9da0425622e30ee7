//! Server-Sent Events parsing over a byte stream.

use crate::Error;
use futures_util::{Stream, StreamExt};
use memchr::memmem;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

/// Upper bound for one buffered, not yet terminated event.
const MAX_BUFFERED_BYTES: usize = 1_000_000;

/// A Server-Sent Events (SSE) event.
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    /// Event type (optional).
    pub event_type: Option<String>,
    /// Event data, multiple `data:` lines joined with `\n`.
    pub data: String,
    /// Event ID (optional).
    pub id: Option<String>,
}

impl SseEvent {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            event_type: None,
            data: data.into(),
            id: None,
        }
    }

    /// `[DONE]` sentinel some providers send before closing the stream.
    pub fn is_done(&self) -> bool {
        self.data.trim() == "[DONE]"
    }

    /// Parse one event block (the text between two blank lines).
    fn parse(block: &str) -> Option<SseEvent> {
        let mut event_type = None;
        let mut data_lines = Vec::new();
        let mut id = None;

        for line in block.lines() {
            // Leading spaces inside a value are meaningful, trailing ones are not.
            let line = line.trim_end();
            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };

            match field.trim_start_matches('\u{feff}') {
                "event" => event_type = Some(value.to_string()),
                "data" => data_lines.push(value),
                "id" => id = Some(value.to_string()),
                _ => {}
            }
        }

        if data_lines.is_empty() {
            return None;
        }

        Some(SseEvent {
            event_type,
            data: data_lines.join("\n"),
            id,
        })
    }
}

/// Incremental SSE parser. Bytes go in through [`SseParser::push`], complete
/// events come out; a partial event stays buffered until its terminating
/// blank line arrives or [`SseParser::finish`] is called.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and collect every event it completes.
    pub fn push(&mut self, chunk: &[u8], out: &mut VecDeque<SseEvent>) -> Result<(), Error> {
        // CRLF framing is normalised to LF; JSON payloads never carry a raw CR.
        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let finder = memmem::Finder::new(b"\n\n");
        let mut start = 0;
        while let Some(pos) = finder.find(&self.buffer[start..]) {
            let end = start + pos;
            let block = std::str::from_utf8(&self.buffer[start..end])
                .map_err(|e| Error::streaming(format!("Invalid UTF-8 in SSE event: {e}")))?;
            if let Some(event) = SseEvent::parse(block) {
                out.push_back(event);
            }
            start = end + 2;
        }
        if start > 0 {
            self.buffer.drain(..start);
        }

        if self.buffer.len() > MAX_BUFFERED_BYTES {
            self.buffer.clear();
            return Err(Error::streaming("SSE buffer exceeded maximum size"));
        }
        Ok(())
    }

    /// Flush a trailing event that was not followed by a blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let buffer = std::mem::take(&mut self.buffer);
        let text = std::str::from_utf8(&buffer).ok()?;
        SseEvent::parse(text.trim())
    }
}

/// A stream adapter that parses SSE events from a byte stream.
pub struct SseStream<S> {
    inner: S,
    parser: SseParser,
    events: VecDeque<SseEvent>,
    finished: bool,
}

impl<S> SseStream<S> {
    pub fn new(stream: S) -> Self {
        Self {
            inner: stream,
            parser: SseParser::new(),
            events: VecDeque::new(),
            finished: false,
        }
    }
}

impl<S, E> Stream for SseStream<S>
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Unpin,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    type Item = Result<SseEvent, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(event) = self.events.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }
            if self.finished {
                return Poll::Ready(None);
            }

            match ready!(self.inner.poll_next_unpin(cx)) {
                Some(Ok(chunk)) => {
                    let this = &mut *self;
                    if let Err(e) = this.parser.push(&chunk, &mut this.events) {
                        // Framing is lost; later bytes would start mid-event.
                        this.finished = true;
                        return Poll::Ready(Some(Err(e)));
                    }
                }
                Some(Err(e)) => {
                    return Poll::Ready(Some(Err(Error::streaming(format!(
                        "Stream error: {}",
                        e.into()
                    )))));
                }
                None => {
                    self.finished = true;
                    if let Some(event) = self.parser.finish() {
                        return Poll::Ready(Some(Ok(event)));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn chunks(parts: Vec<Vec<u8>>) -> impl Stream<Item = Result<bytes::Bytes, std::io::Error>> + Unpin {
        stream::iter(parts.into_iter().map(|part| Ok(bytes::Bytes::from(part))))
    }

    #[tokio::test]
    async fn test_split_events() {
        let mut sse = SseStream::new(chunks(vec![
            b"data: Hel".to_vec(),
            b"lo World\n\ndata: ".to_vec(),
            b"Second\n\n".to_vec(),
        ]));

        assert_eq!(sse.next().await.unwrap().unwrap().data, "Hello World");
        assert_eq!(sse.next().await.unwrap().unwrap().data, "Second");
        assert!(sse.next().await.is_none());
    }

    #[tokio::test]
    async fn test_multiline_data_and_fields() {
        let mut sse =
            SseStream::new(chunks(vec![b"event: chunk\nid: 7\ndata: Line 1\ndata: Line 2\n\n".to_vec()]));

        let event = sse.next().await.unwrap().unwrap();
        assert_eq!(event.event_type.as_deref(), Some("chunk"));
        assert_eq!(event.id.as_deref(), Some("7"));
        assert_eq!(event.data, "Line 1\nLine 2");
    }

    #[tokio::test]
    async fn test_crlf_framing() {
        // Gemini separates events with CRLF pairs.
        let mut sse = SseStream::new(chunks(vec![
            b"data: {\"a\":1}\r\n\r".to_vec(),
            b"\ndata: {\"b\":2}\r\n\r\n".to_vec(),
        ]));

        assert_eq!(sse.next().await.unwrap().unwrap().data, "{\"a\":1}");
        assert_eq!(sse.next().await.unwrap().unwrap().data, "{\"b\":2}");
        assert!(sse.next().await.is_none());
    }

    #[tokio::test]
    async fn test_utf8_split_across_chunks() {
        let euro = "€".as_bytes();
        let first = [b"data: Price: ".as_slice(), &euro[..2]].concat();
        let second = [&euro[2..], b"100\n\n".as_slice()].concat();
        let mut sse = SseStream::new(chunks(vec![first, second]));

        assert_eq!(sse.next().await.unwrap().unwrap().data, "Price: €100");
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_an_error() {
        let mut sse = SseStream::new(chunks(vec![b"data: bad \xFF\xFE bytes\n\n".to_vec()]));
        assert!(sse.next().await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_trailing_event_without_blank_line() {
        let mut sse = SseStream::new(chunks(vec![b"data: First\n\n".to_vec(), b"data: [DONE]".to_vec()]));

        assert_eq!(sse.next().await.unwrap().unwrap().data, "First");
        let last = sse.next().await.unwrap().unwrap();
        assert!(last.is_done());
        assert!(sse.next().await.is_none());
    }

    #[tokio::test]
    async fn test_oversized_event_ends_stream() {
        let mut sse = SseStream::new(chunks(vec![
            vec![b'a'; MAX_BUFFERED_BYTES + 1],
            b"tail of the same event\n\ndata: after\n\n".to_vec(),
        ]));

        assert!(sse.next().await.unwrap().is_err());
        assert!(sse.next().await.is_none());
    }

    #[test]
    fn test_comments_and_empty_blocks_are_skipped() {
        let mut parser = SseParser::new();
        let mut out = VecDeque::new();
        parser
            .push(b": keep-alive\n\nevent: ping\n\ndata: real\n\n", &mut out)
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].data, "real");
        assert!(parser.finish().is_none());
    }
}
