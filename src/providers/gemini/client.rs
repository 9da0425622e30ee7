use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use std::time::Duration;

use super::types::*;
use crate::provider::{ChatProvider, ImageProvider};
use crate::sse_stream::SseStream;
use crate::types::{FinishReason, Role, Usage};
use crate::{
    ChatRequest, ChatResponse, Error, ImageRequest, ImageResponse, ProviderFile, StreamEvent,
};

/// Public Gemini API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const PROVIDER: &str = "Gemini";
const API_KEY_HEADER: &str = "x-goog-api-key";
const RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// Client for the Gemini REST API, authenticated with an API key.
///
/// The key is optional at construction time: a missing key is reported by
/// [`ImageProvider::ensure_configured`] and by every call, never at startup.
pub struct GeminiProvider {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    max_retries: u32,
}

impl GeminiProvider {
    /// Create a new Gemini provider against the public endpoint.
    pub fn new(api_key: Option<String>) -> Result<Self, Error> {
        Self::new_with_base_url(api_key, DEFAULT_BASE_URL.to_string())
    }

    /// Create a new Gemini provider with custom base URL (for testing).
    pub fn new_with_base_url(api_key: Option<String>, base_url: String) -> Result<Self, Error> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;

        Ok(Self {
            client,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries: 1,
        })
    }

    /// How many times a transient failure (transport error or 5xx) is retried.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn api_key(&self) -> Result<&str, Error> {
        self.api_key
            .as_deref()
            .ok_or_else(|| Error::config("GEMINI_API_KEY environment variable is not set"))
    }

    fn endpoint(&self, model: &str, stream: bool) -> String {
        let model = model.trim().trim_start_matches("models/");
        if stream {
            format!(
                "{}/models/{}:streamGenerateContent?alt=sse",
                self.base_url, model
            )
        } else {
            format!("{}/models/{}:generateContent", self.base_url, model)
        }
    }

    /// Convert a chat request to Gemini format.
    fn convert_chat_request(request: &ChatRequest) -> GeminiRequest {
        let mut contents = Vec::new();
        let mut system_text: Vec<&str> = Vec::new();

        for message in &request.messages {
            // Gemini rejects empty text parts.
            let Some(text) = message.content() else {
                continue;
            };
            match message.role {
                Role::System => system_text.push(text),
                Role::User => contents.push(GeminiContent::text("user", text)),
                Role::Assistant => contents.push(GeminiContent::text("model", text)),
            }
        }

        let system_instruction = if system_text.is_empty() {
            None
        } else {
            Some(GeminiContent {
                role: None,
                parts: vec![GeminiPart::Text {
                    text: system_text.join("\n\n"),
                }],
            })
        };

        GeminiRequest {
            contents,
            system_instruction,
            generation_config: None,
        }
    }

    fn convert_image_request(request: &ImageRequest) -> GeminiRequest {
        GeminiRequest {
            contents: vec![GeminiContent::text("user", request.prompt.as_str())],
            system_instruction: None,
            generation_config: Some(GeminiGenerationConfig {
                response_modalities: Some(vec!["IMAGE".to_string()]),
            }),
        }
    }

    /// POST a request, retrying transient failures, and map error statuses.
    async fn post(&self, endpoint: &str, body: &GeminiRequest) -> Result<reqwest::Response, Error> {
        let api_key = self.api_key()?;
        let mut attempt = 0;

        loop {
            let result = self
                .client
                .post(endpoint)
                .header(API_KEY_HEADER, api_key)
                .json(body)
                .send()
                .await;

            let transient = match &result {
                Ok(response) => response.status().is_server_error(),
                Err(e) => e.is_connect() || e.is_timeout(),
            };
            if transient && attempt < self.max_retries {
                attempt += 1;
                tracing::warn!(attempt, endpoint, "Transient Gemini failure, retrying");
                tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                continue;
            }

            let response = result?;
            if !response.status().is_success() {
                return Err(api_error(response).await);
            }
            return Ok(response);
        }
    }

    /// Collect text and inline files from a `generateContent` response.
    fn convert_image_response(response: GeminiResponse) -> Result<ImageResponse, Error> {
        if response.candidates.is_empty() {
            if let Some(reason) = response
                .prompt_feedback
                .and_then(|feedback| feedback.block_reason)
            {
                return Err(Error::provider(PROVIDER, format!("Prompt blocked: {reason}")));
            }
        }

        let mut text = String::new();
        let mut files = Vec::new();

        for candidate in response.candidates {
            if let Some(reason) = candidate.finish_reason.as_deref() {
                if FinishReason::from_gemini(reason) == FinishReason::ContentFilter {
                    tracing::warn!(finish_reason = reason, "Gemini filtered the image candidate");
                }
            }
            for part in candidate.content.parts {
                match part {
                    GeminiPart::Text { text: chunk } => text.push_str(&chunk),
                    GeminiPart::InlineData { inline_data } => {
                        let bytes = BASE64.decode(inline_data.data.as_bytes())?;
                        files.push(ProviderFile::new(inline_data.mime_type, bytes));
                    }
                    GeminiPart::Other(_) => {}
                }
            }
        }

        Ok(ImageResponse {
            text: (!text.is_empty()).then_some(text),
            files,
        })
    }

    /// Convert one streamed chunk into stream events. Only the first
    /// candidate `finishReason` yields `Done`; usage seen on earlier chunks
    /// is carried into it.
    fn convert_chunk(response: GeminiResponse, state: &mut GeminiStreamState) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if state.finished {
            return events;
        }
        if let Some(usage) = response.usage_metadata {
            state.usage = usage.into();
        }

        let Some(candidate) = response.candidates.into_iter().next() else {
            if let Some(reason) = response
                .prompt_feedback
                .and_then(|feedback| feedback.block_reason)
            {
                events.push(StreamEvent::Error {
                    error: format!("Prompt blocked: {reason}"),
                });
            }
            return events;
        };

        for part in candidate.content.parts {
            if let GeminiPart::Text { text } = part {
                if !text.is_empty() {
                    events.push(StreamEvent::TextDelta { delta: text });
                }
            }
        }

        if let Some(reason) = candidate.finish_reason.as_deref() {
            state.finished = true;
            events.push(StreamEvent::Done {
                finish_reason: FinishReason::from_gemini(reason),
                usage: state.usage.clone(),
            });
        }

        events
    }
}

/// Per-stream bookkeeping for chunk conversion.
#[derive(Debug, Default)]
struct GeminiStreamState {
    usage: Usage,
    finished: bool,
}

/// Turn a non-2xx response into an error that keeps the API status string
/// (e.g. `RESOURCE_EXHAUSTED`) in its message.
async fn api_error(response: reqwest::Response) -> Error {
    let status = response.status();
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => return Error::Http(e),
    };

    let message = match serde_json::from_str::<GeminiErrorResponse>(&body) {
        Ok(envelope) => {
            let label = envelope
                .error
                .status
                .unwrap_or_else(|| status.as_u16().to_string());
            format!("API error ({label}): {}", envelope.error.message)
        }
        Err(_) => format!("API error ({}): {}", status.as_u16(), body.trim()),
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::auth(message),
        _ => Error::provider(PROVIDER, message),
    }
}

#[async_trait::async_trait]
impl ChatProvider for GeminiProvider {
    async fn stream_chat(&self, request: &ChatRequest) -> Result<ChatResponse, Error> {
        let body = Self::convert_chat_request(request);
        let endpoint = self.endpoint(&request.model, true);

        tracing::debug!(model = %request.model, messages = request.messages.len(), "Streaming Gemini chat");
        let response = self.post(&endpoint, &body).await?;

        let mut state = GeminiStreamState::default();
        let event_stream = SseStream::new(response.bytes_stream())
            .map(move |sse_result| match sse_result {
                Ok(sse_event) => {
                    let data = sse_event.data.trim();
                    if data.is_empty() || sse_event.is_done() {
                        return vec![];
                    }
                    match serde_json::from_str::<GeminiResponse>(data) {
                        Ok(chunk) => Self::convert_chunk(chunk, &mut state)
                            .into_iter()
                            .map(Ok)
                            .collect(),
                        Err(e) => vec![Err(Error::provider(
                            PROVIDER,
                            format!("Failed to parse SSE event: {e}"),
                        ))],
                    }
                }
                Err(e) => vec![Err(e)],
            })
            .flat_map(futures_util::stream::iter);

        Ok(ChatResponse::from_stream(event_stream))
    }
}

#[async_trait::async_trait]
impl ImageProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn ensure_configured(&self) -> Result<(), Error> {
        self.api_key().map(|_| ())
    }

    async fn generate_image(&self, request: &ImageRequest) -> Result<ImageResponse, Error> {
        let body = Self::convert_image_request(request);
        let endpoint = self.endpoint(&request.model, false);

        tracing::debug!(model = %request.model, "Requesting Gemini image");
        let response = self.post(&endpoint, &body).await?;
        let response: GeminiResponse = response.json().await?;

        let image_response = Self::convert_image_response(response)?;
        tracing::debug!(
            files = image_response.files.len(),
            has_text = image_response.text.is_some(),
            "Gemini image response received"
        );
        Ok(image_response)
    }
}
