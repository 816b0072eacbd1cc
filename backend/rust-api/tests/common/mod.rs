#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use wordquiz_api::{
    config::Config, create_router, middlewares::rate_limit::RateLimiter, services::AppState,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Router over fresh in-memory storage with no Redis, so every test starts
/// from an empty word bank.
pub fn create_test_app() -> Router {
    init_tracing();
    let app_state = Arc::new(AppState::in_memory(Config::in_memory()));
    create_router(app_state)
}

/// Same as `create_test_app`, with `limiter` guarding answer submission.
pub fn create_test_app_with_limiter(limiter: Arc<dyn RateLimiter>) -> Router {
    init_tracing();
    let app_state =
        Arc::new(AppState::in_memory(Config::in_memory()).with_rate_limiter(limiter));
    create_router(app_state)
}

pub async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            panic!(
                "non-JSON body for {} {}: {}",
                method,
                uri,
                String::from_utf8_lossy(&bytes)
            )
        })
    };

    (status, json)
}

pub async fn create_word(app: &Router, text: &str, clues: &[&str]) -> Value {
    let (status, body) = send(
        app,
        "POST",
        "/api/v1/words",
        Some(json!({ "text": text, "clues": clues })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create word failed: {}", body);
    body
}

pub async fn create_session(app: &Router, total_words: u32) -> Value {
    let (status, body) = send(
        app,
        "POST",
        "/api/v1/quiz-sessions",
        Some(json!({ "name": "Friday round", "total_words": total_words })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create session failed: {}", body);
    body
}

pub async fn submit_answer(app: &Router, session_id: &str, answer: &str) -> (StatusCode, Value) {
    send(
        app,
        "POST",
        &format!("/api/v1/quiz-sessions/{}/answers", session_id),
        Some(json!({
            "contestant_name": "Alice",
            "answer": answer,
            "elapsed_seconds": 4.0,
        })),
    )
    .await
}

/// The correct answer for the session's current word, via the operator view.
pub async fn current_answer(app: &Router, session_id: &str) -> String {
    let (status, body) = send(
        app,
        "GET",
        &format!("/api/v1/quiz-sessions/{}/current-word/operator", session_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "operator view failed: {}", body);
    body["answer"].as_str().unwrap().to_string()
}
