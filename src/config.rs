//! Runtime configuration for kb-gateway.
//!
//! Configuration is loaded from a JSON file or constructed programmatically.
//! Every section falls back to its defaults, so a partial file is valid.

use std::path::PathBuf;

use anyhow::bail;
use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::chain::prompt::PromptTemplate;

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "kb-gateway", about = "OpenAI-compatible LLM and knowledge-base gateway")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// HTTP listen address (overrides the config file).
    #[arg(long)]
    pub listen: Option<String>,

    /// Directory holding uploaded knowledge files (overrides the config file).
    #[arg(long)]
    pub knowledge_dir: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub log_json: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,

    /// On-disk storage for knowledge files.
    pub storage: StorageConfig,

    /// Document ingestion settings.
    pub ingest: IngestConfig,

    /// Retrieval chain settings.
    pub retrieval: RetrievalConfig,

    /// Timeouts for model and embedding backends.
    pub upstream: UpstreamConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g. "0.0.0.0:8080").
    pub listen: String,

    /// Request timeout in seconds, measured until response headers are sent.
    pub request_timeout_secs: u64,

    /// Maximum accepted request body (knowledge uploads) in bytes.
    pub max_upload_bytes: usize,

    /// Directory of the browser console served at `/`; `null` disables it.
    pub console_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 300,
            max_upload_bytes: 50 * 1024 * 1024,
            console_dir: Some(PathBuf::from("console")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory; each knowledge base gets `<knowledge_dir>/<kb_id>/`.
    pub knowledge_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            knowledge_dir: PathBuf::from("knowledge_bases"),
        }
    }
}

/// Text splitting and embedding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,

    /// Characters carried over from the end of one chunk into the next.
    pub chunk_overlap: usize,

    /// Separator the text is split on before pieces are merged into chunks.
    pub separator: String,

    /// Texts sent per embedding request.
    pub embedding_batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 100,
            separator: "\n\n".to_string(),
            embedding_batch_size: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of chunks retrieved per query.
    pub top_k: usize,

    /// Prompt with `{context}` and `{question}` slots.
    pub prompt_template: String,

    /// Model name reported in retrieval-augmented completions.
    pub model_name: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            prompt_template: PromptTemplate::DEFAULT.to_string(),
            model_name: "knowledgebot".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Total time allowed for one blocking upstream call (chat or embeddings),
    /// and for a streaming call to return its response headers.
    pub request_timeout_secs: u64,

    /// Longest silence tolerated between two reads of a streamed response.
    pub stream_idle_timeout_secs: u64,

    /// Connection establishment timeout.
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 120,
            stream_idle_timeout_secs: 60,
            connect_timeout_secs: 10,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let config = if path.exists() {
            let data = std::fs::read_to_string(path)?;
            serde_json::from_str::<Config>(&data)?
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Config::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Apply command-line overrides.
    pub fn with_cli_overrides(mut self, cli: &Cli) -> Self {
        if let Some(listen) = &cli.listen {
            self.server.listen = listen.clone();
        }
        if let Some(dir) = &cli.knowledge_dir {
            self.storage.knowledge_dir = dir.clone();
        }
        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ingest.chunk_size == 0 {
            bail!("ingest.chunk_size must be greater than zero");
        }
        if self.ingest.chunk_overlap >= self.ingest.chunk_size {
            bail!(
                "ingest.chunk_overlap ({}) must be smaller than ingest.chunk_size ({})",
                self.ingest.chunk_overlap,
                self.ingest.chunk_size
            );
        }
        if self.ingest.embedding_batch_size == 0 {
            bail!("ingest.embedding_batch_size must be greater than zero");
        }
        if self.upstream.request_timeout_secs == 0 || self.upstream.stream_idle_timeout_secs == 0 {
            bail!("upstream timeouts must be greater than zero");
        }
        if self.retrieval.top_k == 0 {
            bail!("retrieval.top_k must be greater than zero");
        }
        PromptTemplate::new(&self.retrieval.prompt_template)?;
        Ok(())
    }
}
