//! OpenAI-compatible chat completions.
//!
//! One implementation serves both the OpenAI-style API (`{base_url}/chat/completions`
//! with a bearer token) and Azure deployments (`{endpoint}/openai/deployments/{name}`
//! with an `api-key` header and an `api-version` query parameter).

use std::time::Duration;

use async_stream::try_stream;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::UpstreamError;
use crate::model::http::HttpClient;
use crate::model::sse::SseParser;
use crate::model::{BackendKind, ChatBackend, ChatMessage, TextStream};

const CHAT_PATH: &str = "/chat/completions";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ResponseChoice>,
}

#[derive(Debug, Deserialize)]
struct ResponseChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Chat backend for OpenAI-compatible and Azure OpenAI endpoints.
#[derive(Debug)]
pub struct OpenAiBackend {
    http: HttpClient,
    kind: BackendKind,
    /// Sent as `model`; Azure selects the model by deployment instead.
    model: Option<String>,
}

impl OpenAiBackend {
    pub fn openai(http: HttpClient, chat_model: String) -> Self {
        Self {
            http,
            kind: BackendKind::OpenAi,
            model: Some(chat_model),
        }
    }

    pub fn azure(http: HttpClient, api_version: &str) -> Self {
        Self {
            http: http.with_query("api-version", api_version),
            kind: BackendKind::Azure,
            model: None,
        }
    }

    fn request<'a>(&'a self, messages: &'a [ChatMessage], stream: bool) -> ChatRequest<'a> {
        ChatRequest {
            model: self.model.as_deref(),
            messages,
            stream,
        }
    }
}

/// Extract the text increment carried by one upstream SSE data payload.
///
/// Returns `Ok(None)` for events without content (role-only deltas, usage frames).
fn delta_content(data: &str) -> Result<Option<String>, UpstreamError> {
    let chunk: StreamChunk = serde_json::from_str(data)
        .map_err(|e| UpstreamError::Decode(format!("{e}; event: {data}")))?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|text| !text.is_empty()))
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, UpstreamError> {
        let response: ChatResponse = self
            .http
            .post_json(CHAT_PATH, &self.request(messages, false))
            .await?;

        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default())
            .ok_or_else(|| UpstreamError::Decode("response contained no choices".to_string()))
    }

    async fn stream(&self, messages: &[ChatMessage]) -> Result<TextStream, UpstreamError> {
        let response = self
            .http
            .post_stream(CHAT_PATH, &self.request(messages, true))
            .await?;

        Ok(Box::pin(text_increments(
            response.bytes_stream(),
            self.kind,
            self.http.timeouts().stream_idle,
        )))
    }
}

/// Turn an upstream SSE byte stream into text increments, stopping at `[DONE]`.
///
/// Each read must arrive within `idle`; the stream as a whole is unbounded.
fn text_increments<S>(
    bytes: S,
    kind: BackendKind,
    idle: Duration,
) -> impl Stream<Item = Result<String, UpstreamError>> + Send
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
{
    try_stream! {
        let mut parser = SseParser::new();
        let mut bytes = Box::pin(bytes);

        'read: loop {
            let next = tokio::time::timeout(idle, bytes.next())
                .await
                .map_err(|_| UpstreamError::Timeout(idle))?;
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk?;
            for event in parser.feed(&chunk) {
                if event.data == "[DONE]" {
                    break 'read;
                }
                if let Some(text) = delta_content(&event.data)? {
                    yield text;
                }
            }
        }

        debug!(backend = %kind, "Upstream stream finished");
    }
}
