//! `ChatGenerator` against a local fake chat-completions endpoint.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use serde_json::{Value, json};

use hiro::errors::GenerationError;
use hiro::generator::{ArtifactGenerator, ChatGenerator, ChatSettings, GenerationRequest};

#[derive(Clone)]
struct Fake {
    status: StatusCode,
    reply: Value,
    seen: Arc<Mutex<Vec<(Option<String>, Value)>>>,
}

async fn completions(State(fake): State<Fake>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    fake.seen.lock().unwrap().push((auth, body));
    (fake.status, Json(fake.reply.clone())).into_response()
}

async fn start(status: StatusCode, reply: Value) -> (ChatGenerator, Arc<Mutex<Vec<(Option<String>, Value)>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let fake = Fake {
        status,
        reply,
        seen: seen.clone(),
    };
    let app = Router::new()
        .route("/openai/v1/chat/completions", post(completions))
        .with_state(fake);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let generator = ChatGenerator::new(ChatSettings {
        api_url: format!("http://{}/openai/v1", addr),
        api_key: Some("gsk_test".to_string()),
        timeout: Duration::from_secs(5),
        ..ChatSettings::default()
    })
    .unwrap();
    (generator, seen)
}

fn completion(content: &str) -> Value {
    json!({
        "choices": [
            { "index": 0, "message": { "role": "assistant", "content": content } }
        ]
    })
}

fn request() -> GenerationRequest<'static> {
    GenerationRequest {
        tree_summary: "├── main.py\n",
        context: "\n=== File: main.py ===\ndef add(a, b): return a + b",
        target_path: "main.py",
        target_content: "def add(a, b): return a + b",
        instruction: "Generate a test function for this file",
    }
}

#[tokio::test]
async fn test_generate_parses_json_reply() {
    let reply = r#"{"code": "def test_add():\n    assert add(1, 2) == 3", "metadata": "pytest", "packages": ["pytest"]}"#;
    let (generator, seen) = start(StatusCode::OK, completion(reply)).await;

    let draft = generator.generate(&request()).await.unwrap();
    assert!(draft.code.contains("def test_add"));
    assert_eq!(draft.packages, vec!["pytest"]);

    let seen = seen.lock().unwrap();
    let (auth, body) = &seen[0];
    assert_eq!(auth.as_deref(), Some("Bearer gsk_test"));
    assert_eq!(body["response_format"]["type"], "json_object");
    assert_eq!(body["messages"][0]["role"], "system");
    let system = body["messages"][0]["content"].as_str().unwrap();
    let user = body["messages"][1]["content"].as_str().unwrap();
    assert!(system.starts_with(hiro::generator::chat::DEFAULT_SYSTEM_PROMPT));
    assert!(system.contains("Repository Context:\n\n=== File: main.py ==="));
    assert!(system.contains("File Tree:\n├── main.py"));
    assert!(user.contains("Code to Test (main.py):"));
    assert!(user.contains("Generate a test function for this file"));
    // The configured prompt travels once, in the system message.
    assert!(!user.contains(hiro::generator::chat::DEFAULT_SYSTEM_PROMPT));
    assert!(!user.contains("Repository Context:"));
}

#[tokio::test]
async fn test_generate_accepts_reply_wrapped_in_prose() {
    let reply = "Sure! Here you go:\n{\"code\": \"it('works', () => {})\", \"metadata\": \"run jest\", \"packages\": []}\nEnjoy.";
    let (generator, _) = start(StatusCode::OK, completion(reply)).await;
    let draft = generator.generate(&request()).await.unwrap();
    assert_eq!(draft.code, "it('works', () => {})");
    assert!(draft.packages.is_empty());
}

#[tokio::test]
async fn test_generate_reports_api_error_message() {
    let (generator, _) = start(
        StatusCode::TOO_MANY_REQUESTS,
        json!({ "error": { "message": "Rate limit reached" } }),
    )
    .await;
    match generator.generate(&request()).await.unwrap_err() {
        GenerationError::Api { status, message } => {
            assert_eq!(status, 429);
            assert_eq!(message, "Rate limit reached");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_generate_without_choices_is_empty_response() {
    let (generator, _) = start(StatusCode::OK, json!({ "choices": [] })).await;
    let err = generator.generate(&request()).await.unwrap_err();
    assert!(matches!(err, GenerationError::EmptyResponse));
}

#[tokio::test]
async fn test_generate_rejects_reply_without_json() {
    let (generator, _) = start(StatusCode::OK, completion("I cannot help with that.")).await;
    let err = generator.generate(&request()).await.unwrap_err();
    assert!(matches!(err, GenerationError::InvalidResponse(_)));
}
