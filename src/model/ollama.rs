//! Local Ollama daemon backend.
//!
//! Uses the native `/api/chat` endpoint with `stream: false`. No incremental
//! interface is wired for this kind; streaming requests fall back to the
//! single-increment default of [`ChatBackend::stream`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::UpstreamError;
use crate::model::http::HttpClient;
use crate::model::{BackendKind, ChatBackend, ChatMessage};

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug)]
pub struct OllamaBackend {
    http: HttpClient,
    model: String,
}

impl OllamaBackend {
    pub fn new(http: HttpClient, model: String) -> Self {
        Self { http, model }
    }
}

#[async_trait]
impl ChatBackend for OllamaBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Ollama
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, UpstreamError> {
        let request = OllamaChatRequest {
            model: &self.model,
            messages,
            stream: false,
        };
        let response: OllamaChatResponse = self.http.post_json("/api/chat", &request).await?;
        Ok(response.message.content)
    }
}
