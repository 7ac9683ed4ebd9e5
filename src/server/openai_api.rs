//! OpenAI-compatible HTTP API.
//!
//! - POST /v1/chat/completions (direct or retrieval-augmented, optionally streamed)
//! - GET /v1/models
//! - GET /health
//! - GET /metrics

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::chain::RetrievalChain;
use crate::error::GatewayError;
use crate::metrics::metrics_response;
use crate::model::ChatMessage;
use crate::server::auth::ApiKeyAuth;
use crate::server::streaming::{sse_response, ChunkMeta};
use crate::server::AppState;

// ─── Request/Response Types ────────────────────────────────────────────────

/// Chat completion request (OpenAI-compatible, plus `kb_id`).
#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    /// Accepted for client compatibility; the API key selects the model.
    #[serde(default)]
    pub model: Option<String>,
    pub messages: Vec<RequestMessage>,
    /// Answer from this knowledge base instead of chatting directly.
    #[serde(default)]
    pub kb_id: Option<String>,
    #[serde(default)]
    pub stream: bool,
}

/// An inbound message. Clients may send `content` as a string, as an array
/// of typed parts, or as `null` (assistant turns that only carry tool calls).
#[derive(Debug, Deserialize)]
pub struct RequestMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: Option<MessageContent>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl RequestMessage {
    /// Plain text of the message; non-text parts are skipped.
    pub fn text(&self) -> String {
        match &self.content {
            None => String::new(),
            Some(MessageContent::Text(text)) => text.clone(),
            Some(MessageContent::Parts(parts)) => parts
                .iter()
                .filter(|p| p.kind == "text")
                .filter_map(|p| p.text.as_deref())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Chat completion response (non-streaming).
#[derive(Debug, Serialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub usage: Usage,
}

#[derive(Debug, Serialize)]
pub struct ChatChoice {
    pub index: usize,
    pub message: ChatMessage,
    pub finish_reason: String,
}

#[derive(Debug, Serialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

impl Usage {
    /// Rough count at ~4 characters per token; no tokenizer is involved.
    fn estimate(prompt: &str, completion: &str) -> Self {
        let approx = |text: &str| text.chars().count().div_ceil(4);
        let prompt_tokens = approx(prompt);
        let completion_tokens = approx(completion);
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Model listing response.
#[derive(Debug, Serialize)]
pub struct ModelList {
    pub object: String,
    pub data: Vec<ModelInfo>,
}

#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub owned_by: String,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub models: usize,
    pub knowledge_bases: usize,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

fn completion_response(model: String, query: &str, answer: String) -> ChatCompletionResponse {
    ChatCompletionResponse {
        id: format!("chatcmpl-{}", Uuid::new_v4()),
        object: "chat.completion".to_string(),
        created: unix_now(),
        usage: Usage::estimate(query, &answer),
        model,
        choices: vec![ChatChoice {
            index: 0,
            message: ChatMessage::assistant(answer),
            finish_reason: "stop".to_string(),
        }],
    }
}

// ─── Route Handlers ────────────────────────────────────────────────────────

pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    auth: ApiKeyAuth,
    payload: Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> Result<Response, GatewayError> {
    let Json(req) = payload.map_err(|e| GatewayError::invalid(e.body_text()))?;

    let query = req
        .messages
        .last()
        .map(RequestMessage::text)
        .ok_or_else(|| GatewayError::invalid("messages must not be empty"))?;

    // The key was bound a moment ago; a concurrent delete makes it stale.
    let entry = state
        .registry
        .model(&auth.model_id)
        .await
        .ok_or(GatewayError::Unauthorized)?;

    let kb_id = req.kb_id.filter(|id| !id.trim().is_empty());

    info!(
        model_id = %entry.id,
        backend = %entry.kind,
        kb_id = kb_id.as_deref().unwrap_or("-"),
        messages = req.messages.len(),
        stream = req.stream,
        "Chat completion request"
    );

    match kb_id {
        Some(kb_id) => {
            let retriever = state
                .registry
                .retriever(&kb_id, state.config.retrieval.top_k)
                .await
                .ok_or(GatewayError::KnowledgeBaseNotFound)?;
            let chain = RetrievalChain::new(retriever, entry.backend.clone(), state.prompt.clone());
            let model = state.config.retrieval.model_name.clone();

            if req.stream {
                let increments = chain.answer_stream(&query).await?;
                sse_response(increments, chunk_meta(model), state.metrics.active_streams()).await
            } else {
                let output = chain.answer(&query).await?;
                Ok(Json(completion_response(model, &query, output.answer)).into_response())
            }
        }
        None => {
            let messages = [ChatMessage::user(query.clone())];

            if req.stream {
                let increments = entry.backend.stream(&messages).await?;
                sse_response(increments, chunk_meta(entry.id.clone()), state.metrics.active_streams())
                    .await
            } else {
                let answer = entry.backend.complete(&messages).await?;
                Ok(Json(completion_response(entry.id.clone(), &query, answer)).into_response())
            }
        }
    }
}

fn chunk_meta(model: String) -> ChunkMeta {
    ChunkMeta {
        id: format!("chatcmpl-{}", Uuid::new_v4()),
        created: unix_now(),
        model,
    }
}

/// Lists the model bound to the caller's key.
pub async fn list_models(
    State(state): State<Arc<AppState>>,
    auth: ApiKeyAuth,
) -> Result<Json<ModelList>, GatewayError> {
    let entry = state
        .registry
        .model(&auth.model_id)
        .await
        .ok_or(GatewayError::Unauthorized)?;

    Ok(Json(ModelList {
        object: "list".to_string(),
        data: vec![ModelInfo {
            id: entry.id,
            object: "model".to_string(),
            created: entry.created,
            owned_by: "user".to_string(),
        }],
    }))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let counts = state.registry.counts().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        models: counts.models,
        knowledge_bases: counts.knowledge_bases,
    })
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    state.metrics.set_registry_counts(state.registry.counts().await);
    metrics_response(&state.metrics)
}
