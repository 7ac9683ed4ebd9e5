//! Knowledge bases: uploaded documents turned into a searchable vector index.
//!
//! - [`loader`]: File-type detection and PDF/CSV loading
//! - [`splitter`]: Fixed-size overlapping chunking
//! - [`embedding`]: Embedding function (text → vector) over an OpenAI-compatible API
//! - [`index`]: In-memory cosine-similarity index
//! - [`ingest`]: Sequencing of the steps above plus on-disk artifacts

pub mod embedding;
pub mod index;
pub mod ingest;
pub mod loader;
pub mod splitter;

use std::path::PathBuf;

use serde::Serialize;

use crate::knowledge::index::VectorIndex;

/// A unit of loaded text with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub content: String,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DocumentMetadata {
    /// File name the text came from.
    pub source: String,
    /// Zero-based row for tabular sources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
}

impl Document {
    pub fn new(content: impl Into<String>, metadata: DocumentMetadata) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }
}

/// A fully ingested knowledge base.
///
/// The embedding function used to build [`KnowledgeBase::index`] is kept
/// separately in the registry; queries must be embedded with the same one.
#[derive(Debug)]
pub struct KnowledgeBase {
    pub id: String,
    /// Directory holding the uploaded file.
    pub dir: PathBuf,
    pub file_name: String,
    pub embedding_model: String,
    pub embedding_base_url: String,
    pub index: VectorIndex,
}
