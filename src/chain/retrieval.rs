//! Retrieve relevant chunks, then ask a chat backend to answer from them.

use std::sync::Arc;

use async_stream::try_stream;
use futures::StreamExt;
use tracing::debug;

use crate::chain::memory::ChatMemory;
use crate::chain::prompt::PromptTemplate;
use crate::error::{GatewayError, UpstreamError};
use crate::knowledge::embedding::Embedder;
use crate::knowledge::index::ScoredDocument;
use crate::knowledge::KnowledgeBase;
use crate::model::{ChatBackend, ChatMessage, TextStream};

/// Similarity search over one knowledge base, using that knowledge base's
/// own embedding function for queries.
#[derive(Clone)]
pub struct Retriever {
    knowledge_base: Arc<KnowledgeBase>,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
}

impl Retriever {
    pub fn new(knowledge_base: Arc<KnowledgeBase>, embedder: Arc<dyn Embedder>, top_k: usize) -> Self {
        Self {
            knowledge_base,
            embedder,
            top_k,
        }
    }

    pub async fn retrieve(&self, query: &str) -> Result<Vec<ScoredDocument>, GatewayError> {
        let vector = self.embedder.embed_query(query).await?;
        let hits = self
            .knowledge_base
            .index
            .search(&vector, self.top_k)
            .map_err(|e| UpstreamError::Decode(format!("query embedding: {e}")))?;

        debug!(
            kb_id = %self.knowledge_base.id,
            hits = hits.len(),
            best = hits.first().map(|h| h.score).unwrap_or_default(),
            "Retrieved chunks"
        );
        Ok(hits)
    }

    /// Retrieved chunk texts joined by blank lines.
    pub async fn context(&self, query: &str) -> Result<String, GatewayError> {
        let hits = self.retrieve(query).await?;
        Ok(hits
            .iter()
            .map(|hit| hit.document.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

/// Answer plus the memory recorded during the call.
#[derive(Debug)]
pub struct ChainOutput {
    pub answer: String,
    pub memory: ChatMemory,
}

pub struct RetrievalChain {
    retriever: Retriever,
    backend: Arc<dyn ChatBackend>,
    template: PromptTemplate,
    memory: ChatMemory,
}

impl RetrievalChain {
    pub fn new(retriever: Retriever, backend: Arc<dyn ChatBackend>, template: PromptTemplate) -> Self {
        Self {
            retriever,
            backend,
            template,
            memory: ChatMemory::new(),
        }
    }

    /// Retrieve context and build the messages sent to the backend.
    pub async fn prepare(&self, query: &str) -> Result<Vec<ChatMessage>, GatewayError> {
        let context = self.retriever.context(query).await?;
        let prompt = self.template.render(&context, query);

        let mut messages = self.memory.messages().to_vec();
        messages.push(ChatMessage::user(prompt));
        Ok(messages)
    }

    pub async fn answer(mut self, query: &str) -> Result<ChainOutput, GatewayError> {
        let messages = self.prepare(query).await?;
        let answer = self.backend.complete(&messages).await?;
        self.memory.record(query, &answer);

        Ok(ChainOutput {
            answer,
            memory: self.memory,
        })
    }

    /// Stream the answer. The full answer is recorded into memory once the
    /// upstream stream ends.
    pub async fn answer_stream(self, query: &str) -> Result<TextStream, GatewayError> {
        let messages = self.prepare(query).await?;
        let upstream = self.backend.stream(&messages).await?;
        Ok(Box::pin(record_on_completion(upstream, self.memory, query.to_string())))
    }
}

fn record_on_completion(
    mut upstream: TextStream,
    mut memory: ChatMemory,
    question: String,
) -> impl futures::Stream<Item = Result<String, UpstreamError>> + Send {
    try_stream! {
        let mut answer = String::new();
        while let Some(piece) = upstream.next().await {
            let piece = piece?;
            answer.push_str(&piece);
            yield piece;
        }
        memory.record(&question, &answer);
        debug!(turns = memory.len(), answer_len = answer.len(), "Streamed retrieval answer");
    }
}
