//! Upload → persisted file → documents → chunks → vectors → index.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{GatewayError, UpstreamError};
use crate::knowledge::embedding::{Embedder, EmbeddingParams, OpenAiEmbeddings};
use crate::knowledge::index::VectorIndex;
use crate::knowledge::loader::{self, DocumentKind};
use crate::knowledge::splitter::TextSplitter;
use crate::knowledge::KnowledgeBase;
use crate::model::http::Timeouts;

/// A validated upload: the file name is a bare basename with a supported
/// extension. Constructing one never touches the filesystem.
#[derive(Debug, Clone)]
pub struct Upload {
    file_name: String,
    kind: DocumentKind,
    bytes: Bytes,
}

impl Upload {
    pub fn new(file_name: &str, bytes: Bytes) -> Result<Self, GatewayError> {
        let file_name = Path::new(file_name)
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| GatewayError::invalid("Uploaded file has no usable name"))?
            .to_string();
        let kind = DocumentKind::from_file_name(&file_name)?;

        Ok(Self {
            file_name,
            kind,
            bytes,
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }
}

/// Result of a successful ingestion: the knowledge base plus the embedding
/// function to use for its queries.
pub struct Ingested {
    pub knowledge_base: KnowledgeBase,
    pub embedder: Arc<dyn Embedder>,
}

/// Runs ingestion and owns the on-disk layout `<root>/<kb_id>/<file>`.
#[derive(Debug, Clone)]
pub struct Ingestor {
    root: PathBuf,
    splitter: TextSplitter,
    client: reqwest::Client,
    timeouts: Timeouts,
    batch_size: usize,
}

/// Removes a knowledge-base directory when dropped, unless disarmed.
///
/// Covers every way ingestion can end early: an error, or the request
/// future being dropped by a timeout or a client disconnect.
struct ArtifactGuard<'a> {
    kb_id: &'a str,
    dir: &'a Path,
    armed: bool,
}

impl<'a> ArtifactGuard<'a> {
    fn new(kb_id: &'a str, dir: &'a Path) -> Self {
        Self {
            kb_id,
            dir,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ArtifactGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        // Drop cannot await.
        match std::fs::remove_dir_all(self.dir) {
            Ok(()) => warn!(kb_id = self.kb_id, "Ingestion did not complete, artifacts removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(kb_id = self.kb_id, error = %e, "Failed to remove knowledge base directory"),
        }
    }
}

impl Ingestor {
    pub fn new(config: &Config, client: reqwest::Client) -> Self {
        Self {
            root: config.storage.knowledge_dir.clone(),
            splitter: TextSplitter::from_config(&config.ingest),
            client,
            timeouts: Timeouts::from_config(&config.upstream),
            batch_size: config.ingest.embedding_batch_size,
        }
    }

    pub fn kb_dir(&self, kb_id: &str) -> PathBuf {
        self.root.join(kb_id)
    }

    /// Build the OpenAI-compatible embedding function for uploaded parameters.
    pub fn embedder(&self, params: &EmbeddingParams) -> Arc<dyn Embedder> {
        Arc::new(
            OpenAiEmbeddings::new(self.client.clone(), params, self.batch_size)
                .with_timeouts(self.timeouts),
        )
    }

    /// Ingest one upload. Unless it succeeds, the knowledge-base directory is
    /// removed, including when the returned future is dropped midway.
    pub async fn ingest(
        &self,
        kb_id: &str,
        upload: Upload,
        params: &EmbeddingParams,
    ) -> Result<Ingested, GatewayError> {
        self.ingest_with(kb_id, upload, params, self.embedder(params)).await
    }

    /// As [`Ingestor::ingest`], with a caller-provided embedding function.
    pub async fn ingest_with(
        &self,
        kb_id: &str,
        upload: Upload,
        params: &EmbeddingParams,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Ingested, GatewayError> {
        let dir = self.kb_dir(kb_id);
        let started = Instant::now();
        let guard = ArtifactGuard::new(kb_id, &dir);

        match self.build(kb_id, &dir, upload, params, embedder.as_ref()).await {
            Ok(knowledge_base) => {
                guard.disarm();
                info!(
                    kb_id,
                    file = %knowledge_base.file_name,
                    chunks = knowledge_base.index.len(),
                    dimensions = knowledge_base.index.dimensions().unwrap_or_default(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Knowledge base ingested"
                );
                Ok(Ingested {
                    knowledge_base,
                    embedder,
                })
            }
            Err(e) => {
                warn!(kb_id, error = %e, "Ingestion failed");
                drop(guard);
                Err(e)
            }
        }
    }

    async fn build(
        &self,
        kb_id: &str,
        dir: &Path,
        upload: Upload,
        params: &EmbeddingParams,
        embedder: &dyn Embedder,
    ) -> Result<KnowledgeBase, GatewayError> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(&upload.file_name);
        tokio::fs::write(&path, &upload.bytes).await?;

        let documents = loader::load(upload.kind, &path, &upload.file_name).await?;
        let chunks = self.splitter.split_documents(&documents);
        if chunks.is_empty() {
            return Err(GatewayError::Document(format!(
                "no text could be extracted from {}",
                upload.file_name
            )));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = embedder.embed_documents(&texts).await?;
        let index = VectorIndex::from_documents(chunks, vectors)
            .map_err(|e| UpstreamError::Decode(format!("embedding service returned {e}")))?;

        Ok(KnowledgeBase {
            id: kb_id.to_string(),
            dir: dir.to_path_buf(),
            file_name: upload.file_name,
            embedding_model: params.model.clone(),
            embedding_base_url: params.base_url.clone(),
            index,
        })
    }

    /// Delete everything stored for `kb_id`.
    pub async fn remove_artifacts(&self, kb_id: &str) -> std::io::Result<()> {
        remove_dir_if_exists(&self.kb_dir(kb_id)).await
    }
}

async fn remove_dir_if_exists(dir: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
