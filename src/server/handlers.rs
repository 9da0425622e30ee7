use std::convert::Infallible;

use axum::{
    body::Bytes,
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures_util::{stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::AppState;
use crate::error::GenerationError;
use crate::{ChatRequest, Error, Message, Role, StreamEvent};

#[derive(Debug, Default, Deserialize)]
struct GenerateImageBody {
    #[serde(default)]
    prompt: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateImageResponse {
    pub image_url: String,
    pub success: bool,
}

/// `POST /generate-image`
///
/// The body is read leniently: a missing or malformed body is an empty
/// prompt, which the mock backend does not care about anyway.
pub async fn generate_image(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<GenerateImageResponse>, GenerationError> {
    let prompt = serde_json::from_slice::<GenerateImageBody>(&body)
        .unwrap_or_default()
        .prompt
        .unwrap_or_default();

    let result = state.generator.generate(&prompt).await?;
    Ok(Json(GenerateImageResponse {
        image_url: result.artifact_path,
        success: true,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub messages: Vec<IncomingMessage>,
}

/// A chat message as the browser sends it: plain `content`, or a list of
/// typed parts of which only text is used.
#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    pub role: Role,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub parts: Vec<IncomingPart>,
}

#[derive(Debug, Deserialize)]
pub struct IncomingPart {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl From<IncomingMessage> for Message {
    fn from(message: IncomingMessage) -> Self {
        let content = match message.content {
            Some(content) => content,
            None => message
                .parts
                .into_iter()
                .filter(|part| part.kind == "text")
                .filter_map(|part| part.text)
                .collect::<Vec<_>>()
                .join(""),
        };
        Message::new(message.role, content)
    }
}

fn ui_event(event: Result<StreamEvent, Error>) -> serde_json::Value {
    match event {
        Ok(StreamEvent::TextDelta { delta }) => json!({"type": "text-delta", "delta": delta}),
        Ok(StreamEvent::Done { finish_reason, .. }) => {
            json!({"type": "finish", "finishReason": finish_reason})
        }
        Ok(StreamEvent::Error { error }) => json!({"type": "error", "errorText": error}),
        Err(e) => {
            tracing::warn!(error = %e, "Chat stream failed");
            json!({"type": "error", "errorText": e.to_string()})
        }
    }
}

/// `POST /chat`: relay the model's token stream as SSE.
///
/// An unparseable body is a JSON 500, like any other failure before the
/// stream starts.
pub async fn chat(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, Error> {
    let body: ChatBody = serde_json::from_slice(&body)?;
    let messages: Vec<Message> = body.messages.into_iter().map(Message::from).collect();
    tracing::info!(messages = messages.len(), model = %state.chat_model, "Chat request");

    let request = ChatRequest::new(&state.chat_model, messages);
    let response = state.chat.stream_chat(&request).await?;

    let events = response
        .stream()
        .map(|event| Ok::<_, Infallible>(Event::default().data(ui_event(event).to_string())))
        .chain(stream::once(async {
            Ok::<_, Infallible>(Event::default().data("[DONE]"))
        }));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "OK"
}
