//! End-to-end tests against an in-process OpenAI-compatible upstream.
//!
//! The mock serves embeddings (letter-frequency vectors), chat completions
//! that echo the prompt back (JSON or SSE in small frames), an Azure-style
//! deployment route and Ollama's native chat route.

mod common;

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::{Path, Query};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use common::*;

const UPSTREAM_KEY: &str = "sk-upstream";

#[derive(Deserialize)]
struct EmbeddingsBody {
    input: Vec<String>,
}

#[derive(Deserialize)]
struct ChatBody {
    messages: Vec<Value>,
    #[serde(default)]
    stream: bool,
}

fn letter_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; 27];
    for c in text.to_lowercase().chars() {
        if c.is_ascii_lowercase() {
            v[(c as u8 - b'a') as usize] += 1.0;
        }
    }
    v[26] = 1.0;
    v
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {UPSTREAM_KEY}"))
        .unwrap_or(false)
}

async fn embeddings(headers: HeaderMap, Json(body): Json<EmbeddingsBody>) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    // Reverse order to check the client restores input order.
    let data: Vec<Value> = body
        .input
        .iter()
        .enumerate()
        .rev()
        .map(|(i, text)| json!({"object": "embedding", "index": i, "embedding": letter_vector(text)}))
        .collect();
    Json(json!({"object": "list", "data": data})).into_response()
}

fn last_content(body: &ChatBody) -> String {
    body.messages
        .last()
        .and_then(|m| m["content"].as_str())
        .unwrap_or_default()
        .to_string()
}

fn echo_response(body: ChatBody) -> Response {
    let answer = format!("echo: {}", last_content(&body));
    if !body.stream {
        return Json(json!({
            "id": "up-1",
            "object": "chat.completion",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": answer}, "finish_reason": "stop"}]
        }))
        .into_response();
    }

    let mut sse = String::new();
    sse.push_str("data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"}}]}\n\n");
    let chars: Vec<char> = answer.chars().collect();
    for piece in chars.chunks(5) {
        let piece: String = piece.iter().collect();
        let event = json!({"choices": [{"index": 0, "delta": {"content": piece}}]});
        sse.push_str(&format!("data: {event}\r\n\r\n"));
    }
    sse.push_str("data: [DONE]\n\n");

    // Deliberately awkward framing: events split across body frames.
    let frames: Vec<Result<Bytes, Infallible>> = sse
        .into_bytes()
        .chunks(7)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .body(Body::from_stream(futures::stream::iter(frames)))
        .unwrap()
}

async fn chat(headers: HeaderMap, Json(body): Json<ChatBody>) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    echo_response(body)
}

#[derive(Deserialize)]
struct AzureQuery {
    #[serde(rename = "api-version")]
    api_version: String,
}

async fn azure_chat(
    Path(deployment): Path<String>,
    Query(query): Query<AzureQuery>,
    headers: HeaderMap,
    Json(body): Json<ChatBody>,
) -> Response {
    let key_ok = headers.get("api-key").and_then(|v| v.to_str().ok()) == Some(UPSTREAM_KEY);
    if !key_ok || deployment != "gpt-dep" || query.api_version != "2024-02-01" {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    echo_response(body)
}

async fn ollama_chat(Json(body): Json<ChatBody>) -> Response {
    assert!(!body.stream);
    Json(json!({
        "model": "llama3",
        "message": {"role": "assistant", "content": format!("ollama: {}", last_content(&body))},
        "done": true
    }))
    .into_response()
}

/// Embeddings that take longer than any gateway test timeout.
async fn slow_embeddings(headers: HeaderMap, body: Json<EmbeddingsBody>) -> Response {
    tokio::time::sleep(Duration::from_secs(3)).await;
    embeddings(headers, body).await
}

/// Streams `p0 `..`p3 `, one delta every 400 ms.
async fn paced_chat() -> Response {
    let frames = futures::stream::iter(0..4).then(|i| async move {
        tokio::time::sleep(Duration::from_millis(400)).await;
        let event = json!({"choices": [{"index": 0, "delta": {"content": format!("p{i} ")}}]});
        Ok::<_, Infallible>(Bytes::from(format!("data: {event}\n\n")))
    });
    let done = futures::stream::once(async { Ok::<_, Infallible>(Bytes::from_static(b"data: [DONE]\n\n")) });
    Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .body(Body::from_stream(frames.chain(done)))
        .unwrap()
}

async fn spawn_upstream() -> SocketAddr {
    let app = Router::new()
        .route("/v1/embeddings", post(embeddings))
        .route("/slow/v1/embeddings", post(slow_embeddings))
        .route("/paced/v1/chat/completions", post(paced_chat))
        .route("/v1/chat/completions", post(chat))
        .route("/openai/deployments/{deployment}/chat/completions", post(azure_chat))
        .route("/api/chat", post(ollama_chat));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn register(app: &Router, spec: Value) -> String {
    let (status, body) = send_json(app, json_request(Method::POST, "/api/model", None, spec)).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["api_key"].as_str().unwrap().to_string()
}

async fn chat_json(app: &Router, api_key: &str, body: Value) -> (StatusCode, Value) {
    send_json(
        app,
        json_request(Method::POST, "/v1/chat/completions", Some(api_key), body),
    )
    .await
}

async fn chat_stream_text(app: &Router, api_key: &str, body: Value) -> String {
    let (status, raw) = send(
        app,
        json_request(Method::POST, "/v1/chat/completions", Some(api_key), body),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let chunks = sse_chunks(&raw);
    assert_eq!(delta_content(chunks.last().unwrap()), "[DONE]");
    chunks[..chunks.len() - 1].iter().map(delta_content).collect()
}

#[tokio::test]
async fn test_openai_direct_chat_blocking_and_streaming() {
    let upstream = spawn_upstream().await;
    let tmp = tempfile::TempDir::new().unwrap();
    let app = router(&test_state(tmp.path()));

    let api_key = register(
        &app,
        json!({
            "type": "openai",
            "base_url": format!("http://{upstream}/v1"),
            "api_key": UPSTREAM_KEY,
            "chat_model": "gpt-test"
        }),
    )
    .await;

    let (status, body) = chat_json(&app, &api_key, chat_body("ping pong", None, false)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["choices"][0]["message"]["content"], "echo: ping pong");

    let streamed = chat_stream_text(&app, &api_key, chat_body("ping pong", None, true)).await;
    assert_eq!(streamed, "echo: ping pong");
}

#[tokio::test]
async fn test_upstream_rejection_is_bad_gateway() {
    let upstream = spawn_upstream().await;
    let tmp = tempfile::TempDir::new().unwrap();
    let app = router(&test_state(tmp.path()));

    let api_key = register(
        &app,
        json!({
            "type": "openai",
            "base_url": format!("http://{upstream}/v1"),
            "api_key": "sk-wrong",
            "chat_model": "gpt-test"
        }),
    )
    .await;

    let (status, body) = chat_json(&app, &api_key, chat_body("hi", None, false)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "upstream_error");

    // Failure before the first increment: JSON error, not an event stream.
    let (status, body) = chat_json(&app, &api_key, chat_body("hi", None, true)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "upstream_error");
}

#[tokio::test]
async fn test_azure_deployment_chat() {
    let upstream = spawn_upstream().await;
    let tmp = tempfile::TempDir::new().unwrap();
    let app = router(&test_state(tmp.path()));

    let api_key = register(
        &app,
        json!({
            "type": "azure",
            "deployment_name": "gpt-dep",
            "api_version": "2024-02-01",
            "endpoint": format!("http://{upstream}/"),
            "api_key": UPSTREAM_KEY
        }),
    )
    .await;

    let (status, body) = chat_json(&app, &api_key, chat_body("from azure", None, false)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["choices"][0]["message"]["content"], "echo: from azure");

    let streamed = chat_stream_text(&app, &api_key, chat_body("from azure", None, true)).await;
    assert_eq!(streamed, "echo: from azure");
}

#[tokio::test]
async fn test_ollama_streams_single_increment() {
    let upstream = spawn_upstream().await;
    let tmp = tempfile::TempDir::new().unwrap();
    let app = router(&test_state(tmp.path()));

    let api_key = register(
        &app,
        json!({"type": "ollama", "base_url": format!("http://{upstream}"), "model_name": "llama3"}),
    )
    .await;

    let (status, body) = chat_json(&app, &api_key, chat_body("hello", None, false)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["choices"][0]["message"]["content"], "ollama: hello");

    let (status, raw) = send(
        &app,
        json_request(Method::POST, "/v1/chat/completions", Some(&api_key), chat_body("hello", None, true)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let chunks = sse_chunks(&raw);
    assert_eq!(chunks.len(), 2);
    assert_eq!(delta_content(&chunks[0]), "ollama: hello");
    assert_eq!(delta_content(&chunks[1]), "[DONE]");
}

#[tokio::test]
async fn test_csv_knowledge_base_lifecycle() {
    let upstream = spawn_upstream().await;
    let tmp = tempfile::TempDir::new().unwrap();
    let app = router(&test_state(tmp.path()));

    let api_key = register(
        &app,
        json!({
            "type": "openai",
            "base_url": format!("http://{upstream}/v1"),
            "api_key": UPSTREAM_KEY,
            "chat_model": "gpt-test"
        }),
    )
    .await;

    let csv = b"animal,sound\nzebra,zzz buzz\ncow,moo moo\n";
    let base_url = format!("http://{upstream}/v1");
    let (status, body) = send_json(
        &app,
        upload_request(
            "Animals.CSV",
            csv,
            &[
                ("embedding_model", "letters-27"),
                ("base_url", &base_url),
                ("api_key", UPSTREAM_KEY),
            ],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let kb_id = body["kb_id"].as_str().unwrap().to_string();
    assert_eq!(body["embedding_model"], "letters-27");
    assert_eq!(body["embedding_base_url"], base_url.as_str());
    assert!(tmp.path().join(&kb_id).join("Animals.CSV").exists());

    // The echoed prompt shows which rows were retrieved, best first.
    let (status, body) = chat_json(&app, &api_key, chat_body("zebra zzz?", Some(&kb_id), false)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model"], "knowledgebot");
    let answer = body["choices"][0]["message"]["content"].as_str().unwrap();
    assert!(answer.starts_with(
        "echo: Answer the question using the following information:\n\nanimal: zebra\nsound: zzz buzz"
    ));
    assert!(answer.ends_with("Question: zebra zzz?"));

    let streamed = chat_stream_text(&app, &api_key, chat_body("zebra zzz?", Some(&kb_id), true)).await;
    assert_eq!(streamed, answer);

    let uri = format!("/api/knowledge/{kb_id}");
    let (status, _) = send_json(&app, empty_request(Method::DELETE, &uri, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!tmp.path().join(&kb_id).exists());

    let (status, _) = chat_json(&app, &api_key, chat_body("zebra?", Some(&kb_id), false)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send_json(&app, empty_request(Method::DELETE, &uri, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_embedding_failure_leaves_no_artifacts() {
    let upstream = spawn_upstream().await;
    let tmp = tempfile::TempDir::new().unwrap();
    let state = test_state(tmp.path());
    let app = router(&state);

    let base_url = format!("http://{upstream}/v1");
    let (status, body) = send_json(
        &app,
        upload_request(
            "facts.csv",
            b"q,a\nx,y\n",
            &[
                ("embedding_model", "letters-27"),
                ("base_url", &base_url),
                ("api_key", "sk-wrong"),
            ],
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "upstream_error");
    assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    assert_eq!(state.registry.counts().await.knowledge_bases, 0);
}

#[tokio::test]
async fn test_request_timeout_during_ingestion_leaves_no_artifacts() {
    let upstream = spawn_upstream().await;
    let tmp = tempfile::TempDir::new().unwrap();
    let state = test_state_with(tmp.path(), |config| config.server.request_timeout_secs = 1);
    let app = router(&state);

    let base_url = format!("http://{upstream}/slow/v1");
    let (status, _) = send(
        &app,
        upload_request(
            "facts.csv",
            b"q,a\nx,y\n",
            &[
                ("embedding_model", "letters-27"),
                ("base_url", &base_url),
                ("api_key", UPSTREAM_KEY),
            ],
        ),
    )
    .await;

    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    assert_eq!(state.registry.counts().await.knowledge_bases, 0);
}

#[tokio::test]
async fn test_stream_outlives_request_timeout() {
    let upstream = spawn_upstream().await;
    let tmp = tempfile::TempDir::new().unwrap();
    let state = test_state_with(tmp.path(), |config| config.upstream.request_timeout_secs = 1);
    let app = router(&state);

    let api_key = register(
        &app,
        json!({
            "type": "openai",
            "base_url": format!("http://{upstream}/paced/v1"),
            "api_key": UPSTREAM_KEY,
            "chat_model": "gpt-test"
        }),
    )
    .await;

    // Four deltas 400 ms apart: longer in total than the 1 s request timeout.
    let streamed = chat_stream_text(&app, &api_key, chat_body("go", None, true)).await;
    assert_eq!(streamed, "p0 p1 p2 p3 ");
}
