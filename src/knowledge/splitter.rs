//! Separator-based text splitter with a trailing overlap window.
//!
//! Text is cut on the separator, then the pieces are greedily merged back
//! into chunks of at most `chunk_size` characters. When a chunk is emitted,
//! pieces are dropped from its front until at most `chunk_overlap`
//! characters remain; those carry over into the next chunk.

use std::collections::VecDeque;

use tracing::warn;

use crate::config::IngestConfig;
use crate::knowledge::Document;

#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separator: String,
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize, separator: impl Into<String>) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            separator: separator.into(),
        }
    }

    pub fn from_config(config: &IngestConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap, config.separator.clone())
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        let pieces: Vec<&str> = if self.separator.is_empty() {
            text.char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect()
        } else {
            text.split(self.separator.as_str())
                .filter(|piece| !piece.is_empty())
                .collect()
        };
        self.merge(&pieces)
    }

    /// Split every document, copying its metadata onto each chunk.
    pub fn split_documents(&self, documents: &[Document]) -> Vec<Document> {
        documents
            .iter()
            .flat_map(|doc| {
                self.split_text(&doc.content)
                    .into_iter()
                    .map(|chunk| Document::new(chunk, doc.metadata.clone()))
            })
            .collect()
    }

    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let sep_len = char_len(&self.separator);
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            let joiner = if window.is_empty() { 0 } else { sep_len };

            if total + len + joiner > self.chunk_size {
                if total > self.chunk_size {
                    warn!(
                        chunk_len = total,
                        chunk_size = self.chunk_size,
                        "Created a chunk longer than the configured size"
                    );
                }
                if !window.is_empty() {
                    if let Some(chunk) = self.join(&window) {
                        chunks.push(chunk);
                    }
                    // Shrink to the overlap, and further if the next piece still would not fit.
                    loop {
                        let joiner = if window.is_empty() { 0 } else { sep_len };
                        let fits = total + len + joiner <= self.chunk_size;
                        if total <= self.chunk_overlap && (total == 0 || fits) {
                            break;
                        }
                        let had_more = window.len() > 1;
                        let Some(first) = window.pop_front() else {
                            break;
                        };
                        total -= char_len(first) + if had_more { sep_len } else { 0 };
                    }
                }
            }

            window.push_back(piece);
            total += len + if window.len() > 1 { sep_len } else { 0 };
        }

        if total > self.chunk_size {
            warn!(
                chunk_len = total,
                chunk_size = self.chunk_size,
                "Created a chunk longer than the configured size"
            );
        }
        if let Some(chunk) = self.join(&window) {
            chunks.push(chunk);
        }
        chunks
    }

    fn join(&self, window: &VecDeque<&str>) -> Option<String> {
        let joined = window.iter().copied().collect::<Vec<_>>().join(&self.separator);
        let trimmed = joined.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}
