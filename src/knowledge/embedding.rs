//! Embedding functions: text → fixed-length vector.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GatewayError, UpstreamError};
use crate::model::http::{HttpClient, Timeouts};

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model name, as reported to clients.
    fn model(&self) -> &str;

    /// Embed many texts; the result is in input order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, UpstreamError>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, UpstreamError> {
        self.embed_documents(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| UpstreamError::Decode("no embedding returned for query".to_string()))
    }
}

/// Parameters of an OpenAI-compatible embedding service, as uploaded with a
/// knowledge base.
#[derive(Clone)]
pub struct EmbeddingParams {
    pub model: String,
    pub base_url: String,
    pub api_key: String,
}

impl fmt::Debug for EmbeddingParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingParams")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl EmbeddingParams {
    /// Reject absent or blank fields.
    pub fn new(
        model: Option<String>,
        base_url: Option<String>,
        api_key: Option<String>,
    ) -> Result<Self, GatewayError> {
        fn required(name: &str, value: Option<String>) -> Result<String, GatewayError> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| GatewayError::invalid(format!("Missing required field: {name}")))
        }

        Ok(Self {
            model: required("embedding_model", model)?,
            base_url: required("base_url", base_url)?,
            api_key: required("api_key", api_key)?,
        })
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// `POST {base_url}/embeddings`, batched.
#[derive(Debug)]
pub struct OpenAiEmbeddings {
    http: HttpClient,
    model: String,
    batch_size: usize,
}

impl OpenAiEmbeddings {
    pub fn new(client: reqwest::Client, params: &EmbeddingParams, batch_size: usize) -> Self {
        Self {
            http: HttpClient::bearer(client, &params.base_url, &params.api_key),
            model: params.model.clone(),
            batch_size: batch_size.max(1),
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.http = self.http.with_timeouts(timeouts);
        self
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, UpstreamError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: batch,
        };
        let response: EmbeddingResponse = self.http.post_json("/embeddings", &request).await?;
        order_by_index(response.data, batch.len())
    }
}

/// Responses may list embeddings out of order; restore input order.
fn order_by_index(mut data: Vec<EmbeddingData>, expected: usize) -> Result<Vec<Vec<f32>>, UpstreamError> {
    if data.len() != expected {
        return Err(UpstreamError::Decode(format!(
            "expected {expected} embeddings, got {}",
            data.len()
        )));
    }
    data.sort_by_key(|d| d.index);
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

#[async_trait]
impl Embedder for OpenAiEmbeddings {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, UpstreamError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.embed_batch(batch).await?);
        }
        debug!(model = %self.model, texts = texts.len(), "Embedded texts");
        Ok(vectors)
    }
}
