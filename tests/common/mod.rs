//! Helpers shared by the router-level test suites.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use kb_gateway::config::Config;
use kb_gateway::server::{build_router, AppState};

pub const BOUNDARY: &str = "kb-gateway-test-boundary";

pub fn test_state(knowledge_dir: &Path) -> Arc<AppState> {
    test_state_with(knowledge_dir, |_| {})
}

/// State over `knowledge_dir`, with further config changes applied.
pub fn test_state_with(knowledge_dir: &Path, configure: impl FnOnce(&mut Config)) -> Arc<AppState> {
    let mut config = Config::default();
    config.storage.knowledge_dir = knowledge_dir.to_path_buf();
    config.upstream.request_timeout_secs = 10;
    // Shipped console, relative to the package root where tests run.
    config.server.console_dir = Some(Path::new(env!("CARGO_MANIFEST_DIR")).join("console"));
    configure(&mut config);
    Arc::new(AppState::new(config).unwrap())
}

pub fn router(state: &Arc<AppState>) -> Router {
    build_router(state.clone())
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

pub async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(app, request).await;
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, value)
}

pub fn json_request(method: Method, uri: &str, api_key: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(key) = api_key {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {key}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn empty_request(method: Method, uri: &str, api_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(key) = api_key {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {key}"));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn chat_body(content: &str, kb_id: Option<&str>, stream: bool) -> Value {
    let mut body = serde_json::json!({
        "model": "ignored",
        "messages": [{"role": "user", "content": content}],
        "stream": stream,
    });
    if let Some(kb_id) = kb_id {
        body["kb_id"] = Value::String(kb_id.to_string());
    }
    body
}

/// Multipart upload with text fields followed by a `file` part.
pub fn upload_request(file_name: &str, file: &[u8], fields: &[(&str, &str)]) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(file);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/api/knowledge")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

/// JSON payloads of every `data:` line in an SSE body.
pub fn sse_chunks(body: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(body)
        .lines()
        .filter_map(|line| line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")))
        .map(|data| serde_json::from_str(data.trim()).unwrap())
        .collect()
}

pub fn delta_content(chunk: &Value) -> &str {
    chunk["choices"][0]["delta"]["content"].as_str().unwrap_or_default()
}
