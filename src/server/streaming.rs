//! SSE streaming of chat completions.
//!
//! Converts a stream of text increments into OpenAI-style
//! `chat.completion.chunk` events. The stream always ends with a single chunk
//! whose delta content is `[DONE]` and whose finish reason is `stop`.

use std::convert::Infallible;

use async_stream::stream;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::stream::{self as fstream, Stream};
use futures::StreamExt;
use prometheus::IntGauge;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::GatewayError;
use crate::model::TextStream;

/// Delta content of the closing chunk.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Streaming chat completion chunk (OpenAI-compatible).
#[derive(Debug, Serialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Serialize)]
pub struct ChunkChoice {
    pub index: usize,
    pub delta: ChunkDelta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Fields shared by every chunk of one response.
#[derive(Debug, Clone)]
pub struct ChunkMeta {
    pub id: String,
    pub created: u64,
    pub model: String,
}

impl ChunkMeta {
    fn event(&self, role: Option<&str>, content: String, finish_reason: Option<&str>) -> Event {
        let chunk = ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta {
                    role: role.map(str::to_string),
                    content: Some(content),
                },
                finish_reason: finish_reason.map(str::to_string),
            }],
        };
        let data = serde_json::to_string(&chunk).unwrap_or_default();
        Event::default().data(data)
    }
}

/// Keeps `kb_gateway_active_streams` accurate for as long as the response
/// body is alive, including when the client disconnects early.
pub struct StreamGuard {
    gauge: IntGauge,
}

impl StreamGuard {
    pub fn new(gauge: IntGauge) -> Self {
        gauge.inc();
        Self { gauge }
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}

/// Convert text increments into completion-chunk events.
pub fn completion_events(
    mut increments: TextStream,
    meta: ChunkMeta,
    guard: StreamGuard,
) -> impl Stream<Item = Result<Event, Infallible>> + Send {
    let events = stream! {
        let _guard = guard;
        // The first chunk emitted carries the role.
        let mut role = Some("assistant");
        let mut pieces = 0usize;

        while let Some(item) = increments.next().await {
            match item {
                Ok(text) => {
                    pieces += 1;
                    yield meta.event(role.take(), text, None);
                }
                Err(e) => {
                    warn!(id = %meta.id, error = %e, "Upstream failed mid-stream");
                    yield meta.event(role.take(), format!("[Error: {e}]"), Some("error"));
                    break;
                }
            }
        }

        debug!(id = %meta.id, pieces, "Stream finished");
        yield meta.event(role.take(), DONE_SENTINEL.to_string(), Some("stop"));
    };
    events.map(Ok)
}

/// Build the SSE response.
///
/// The first increment is awaited before any header is sent, so a backend
/// that fails immediately produces an ordinary JSON error instead of a
/// stream.
pub async fn sse_response(
    mut increments: TextStream,
    meta: ChunkMeta,
    gauge: IntGauge,
) -> Result<Response, GatewayError> {
    let first = match increments.next().await {
        Some(Err(e)) => return Err(e.into()),
        other => other,
    };
    let increments: TextStream = Box::pin(fstream::iter(first).chain(increments));

    let events = completion_events(increments, meta, StreamGuard::new(gauge));
    Ok(Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response())
}
