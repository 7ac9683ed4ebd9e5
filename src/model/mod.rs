//! Chat-model backends behind a uniform capability.
//!
//! - [`spec`]: Registration parameters, one variant per backend kind
//! - [`http`]: Shared reqwest client and authenticated JSON/stream calls
//! - [`sse`]: Incremental parser for upstream event streams
//! - [`openai`]: OpenAI- and Azure-compatible chat completions
//! - [`ollama`]: Local Ollama daemon (direct chat only)

pub mod http;
pub mod ollama;
pub mod openai;
pub mod spec;
pub mod sse;

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};

use crate::config::UpstreamConfig;
use crate::error::UpstreamError;
use crate::model::http::{HttpClient, Timeouts};
use crate::model::ollama::OllamaBackend;
use crate::model::openai::OpenAiBackend;
use crate::model::spec::ModelSpec;

/// Lazy, finite sequence of text increments. Not restartable.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, UpstreamError>> + Send>>;

/// A single chat message in OpenAI wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Which family of API a registered model speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    OpenAi,
    Azure,
    Ollama,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::OpenAi => write!(f, "openai"),
            BackendKind::Azure => write!(f, "azure"),
            BackendKind::Ollama => write!(f, "ollama"),
        }
    }
}

/// Uniform "send messages, get text or a text stream" capability.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Whether [`ChatBackend::stream`] yields true incremental output.
    fn supports_streaming(&self) -> bool {
        false
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, UpstreamError>;

    /// Stream the answer. Backends without an incremental interface yield the
    /// whole completion as a single increment.
    async fn stream(&self, messages: &[ChatMessage]) -> Result<TextStream, UpstreamError> {
        let text = self.complete(messages).await?;
        Ok(Box::pin(stream::once(async move { Ok(text) })))
    }
}

/// Builds backends from registration parameters, sharing one HTTP client.
#[derive(Debug, Clone)]
pub struct BackendFactory {
    client: reqwest::Client,
    timeouts: Timeouts,
}

impl BackendFactory {
    pub fn new(config: &UpstreamConfig) -> Self {
        Self {
            client: http::build_client(config),
            timeouts: Timeouts::from_config(config),
        }
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// The shared client, also used for embedding calls.
    pub fn client(&self) -> reqwest::Client {
        self.client.clone()
    }

    pub fn connect(&self, spec: &ModelSpec) -> Arc<dyn ChatBackend> {
        match spec {
            ModelSpec::OpenAi(params) => Arc::new(OpenAiBackend::openai(
                HttpClient::bearer(self.client(), &params.base_url, &params.api_key)
                    .with_timeouts(self.timeouts),
                params.chat_model.clone(),
            )),
            ModelSpec::Azure(params) => Arc::new(OpenAiBackend::azure(
                HttpClient::api_key(
                    self.client(),
                    &params.deployment_url(),
                    "api-key",
                    &params.api_key,
                )
                .with_timeouts(self.timeouts),
                &params.api_version,
            )),
            ModelSpec::Ollama(params) => Arc::new(OllamaBackend::new(
                HttpClient::anonymous(self.client(), &params.base_url).with_timeouts(self.timeouts),
                params.model_name.clone(),
            )),
        }
    }
}
