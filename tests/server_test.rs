use std::sync::{Arc, Mutex};

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use promptpix::server::{create_app, AppState};
use promptpix::{
    ArtifactStore, ChatProvider, ChatRequest, ChatResponse, Error, FinishReason, GeminiProvider,
    ImageGenerator, ImageProvider, ImageRequest, ImageResponse, ProviderFile, StreamEvent, Usage,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

#[derive(Default)]
struct FakeImageProvider {
    prompts: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl ImageProvider for FakeImageProvider {
    fn name(&self) -> &str {
        "fake"
    }

    async fn generate_image(&self, request: &ImageRequest) -> Result<ImageResponse, Error> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        Ok(ImageResponse {
            text: None,
            files: vec![ProviderFile::new("image/png", b"PNGDATA".to_vec())],
        })
    }
}

struct FakeChatProvider;

#[async_trait::async_trait]
impl ChatProvider for FakeChatProvider {
    async fn stream_chat(&self, request: &ChatRequest) -> Result<ChatResponse, Error> {
        let last = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let events = vec![
            Ok(StreamEvent::TextDelta {
                delta: format!("echo: {last}"),
            }),
            Ok(StreamEvent::Done {
                finish_reason: FinishReason::Stop,
                usage: Usage::default(),
            }),
        ];
        Ok(ChatResponse::from_stream(futures_util::stream::iter(events)))
    }
}

fn app(image: Arc<dyn ImageProvider>, chat: Arc<dyn ChatProvider>, dir: &TempDir) -> Router {
    let generator = ImageGenerator::new(image, ArtifactStore::new(dir.path()));
    create_app(AppState::new(generator, chat, "gemini-2.5-flash"), dir.path())
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let dir = TempDir::new().unwrap();
    let app = app(Arc::new(FakeImageProvider::default()), Arc::new(FakeChatProvider), &dir);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"OK");
}

#[tokio::test]
async fn test_generate_image_then_serve_it() {
    let dir = TempDir::new().unwrap();
    let image = Arc::new(FakeImageProvider::default());
    let app = app(image.clone(), Arc::new(FakeChatProvider), &dir);

    let response = app
        .clone()
        .oneshot(post_json("/generate-image", json!({"prompt": "a cat"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["success"], json!(true));
    let image_url = body["imageUrl"].as_str().unwrap().to_string();
    assert!(image_url.starts_with("/generated-") && image_url.ends_with(".png"));
    assert_eq!(
        image.prompts.lock().unwrap().as_slice(),
        ["Generate an image of: a cat"]
    );

    let response = app
        .oneshot(Request::builder().uri(&image_url).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"PNGDATA");
}

#[tokio::test]
async fn test_second_request_is_rate_limited() {
    let dir = TempDir::new().unwrap();
    let app = app(Arc::new(FakeImageProvider::default()), Arc::new(FakeChatProvider), &dir);

    let first = app
        .clone()
        .oneshot(post_json("/generate-image", json!({"prompt": "one"})))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .oneshot(post_json("/generate-image", json!({"prompt": "two"})))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(second.headers().contains_key(header::RETRY_AFTER));

    let body = body_json(second).await;
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["code"], json!("RATE_LIMITED"));
    let retry_after = body["retryAfter"].as_u64().unwrap();
    assert!((1..=5).contains(&retry_after));
    assert_eq!(
        body["error"],
        json!(format!(
            "Please wait {retry_after} seconds before generating another image."
        ))
    );
}

#[tokio::test]
async fn test_missing_body_means_empty_prompt() {
    let dir = TempDir::new().unwrap();
    let image = Arc::new(FakeImageProvider::default());
    let app = app(image.clone(), Arc::new(FakeChatProvider), &dir);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/generate-image")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        image.prompts.lock().unwrap().as_slice(),
        ["Generate an image of: "]
    );
}

#[tokio::test]
async fn test_missing_key_is_a_configuration_error() {
    let dir = TempDir::new().unwrap();
    let gemini = Arc::new(GeminiProvider::new(None).unwrap());
    let app = app(gemini.clone(), gemini, &dir);

    let response = app
        .clone()
        .oneshot(post_json("/generate-image", json!({"prompt": "a cat"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["code"], json!("CONFIGURATION_ERROR"));
    assert_eq!(body["error"], json!("GEMINI_API_KEY environment variable is not set"));

    // Not admitted, so a second attempt is not throttled either.
    let response = app
        .clone()
        .oneshot(post_json("/generate-image", json!({"prompt": "a cat"})))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["code"], json!("CONFIGURATION_ERROR"));

    let response = app
        .oneshot(post_json(
            "/chat",
            json!({"messages": [{"role": "user", "content": "hi"}]}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["success"], json!(false));
    assert!(body["error"].as_str().unwrap().contains("GEMINI_API_KEY"));
}

#[tokio::test]
async fn test_chat_streams_sse() {
    let dir = TempDir::new().unwrap();
    let app = app(Arc::new(FakeImageProvider::default()), Arc::new(FakeChatProvider), &dir);

    let response = app
        .oneshot(post_json(
            "/chat",
            json!({"messages": [
                {"role": "user", "parts": [{"type": "text", "text": "hello"}]}
            ]}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );

    let body = String::from_utf8(body_bytes(response).await).unwrap();
    let payloads: Vec<&str> = body
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .collect();

    assert_eq!(payloads.len(), 3);
    assert_eq!(
        serde_json::from_str::<Value>(payloads[0]).unwrap(),
        json!({"type": "text-delta", "delta": "echo: hello"})
    );
    assert_eq!(
        serde_json::from_str::<Value>(payloads[1]).unwrap(),
        json!({"type": "finish", "finishReason": "stop"})
    );
    assert_eq!(payloads[2], "[DONE]");
}

#[tokio::test]
async fn test_malformed_chat_body_is_a_json_error() {
    let dir = TempDir::new().unwrap();
    let app = app(Arc::new(FakeImageProvider::default()), Arc::new(FakeChatProvider), &dir);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/chat")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{messages: oops"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["success"], json!(false));
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Serialization error:"));
}
