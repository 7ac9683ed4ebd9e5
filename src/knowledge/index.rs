//! Brute-force cosine-similarity index.
//!
//! Knowledge bases are built from a single upload, so a linear scan over
//! pre-normalized vectors is fast enough.

use thiserror::Error;

use crate::knowledge::Document;

#[derive(Error, Debug, PartialEq)]
pub enum IndexError {
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("{documents} documents but {vectors} vectors")]
    LengthMismatch { documents: usize, vectors: usize },

    #[error("Empty vector")]
    EmptyVector,
}

#[derive(Debug)]
struct Entry {
    document: Document,
    vector: Vec<f32>,
    norm: f32,
}

/// A search hit.
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f32,
}

#[derive(Debug, Default)]
pub struct VectorIndex {
    dimensions: Option<usize>,
    entries: Vec<Entry>,
}

fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_documents(
        documents: Vec<Document>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self, IndexError> {
        let mut index = Self::new();
        index.add(documents, vectors)?;
        Ok(index)
    }

    /// Add documents with their vectors. Nothing is added on error.
    pub fn add(&mut self, documents: Vec<Document>, vectors: Vec<Vec<f32>>) -> Result<(), IndexError> {
        if documents.len() != vectors.len() {
            return Err(IndexError::LengthMismatch {
                documents: documents.len(),
                vectors: vectors.len(),
            });
        }

        let mut dimensions = self.dimensions;
        for vector in &vectors {
            if vector.is_empty() {
                return Err(IndexError::EmptyVector);
            }
            match dimensions {
                Some(expected) if expected != vector.len() => {
                    return Err(IndexError::DimensionMismatch {
                        expected,
                        actual: vector.len(),
                    });
                }
                _ => dimensions = Some(vector.len()),
            }
        }

        self.dimensions = dimensions;
        self.entries.extend(documents.into_iter().zip(vectors).map(|(document, vector)| Entry {
            norm: norm(&vector),
            document,
            vector,
        }));
        Ok(())
    }

    /// The `k` entries most similar to `query`, best first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredDocument>, IndexError> {
        let Some(expected) = self.dimensions else {
            return Ok(Vec::new());
        };
        if query.len() != expected {
            return Err(IndexError::DimensionMismatch {
                expected,
                actual: query.len(),
            });
        }

        let query_norm = norm(query);
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let denom = query_norm * entry.norm;
                let score = if denom == 0.0 {
                    0.0
                } else {
                    entry.vector.iter().zip(query).map(|(a, b)| a * b).sum::<f32>() / denom
                };
                (i, score)
            })
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        Ok(scored
            .into_iter()
            .take(k)
            .map(|(i, score)| ScoredDocument {
                document: self.entries[i].document.clone(),
                score,
            })
            .collect())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::DocumentMetadata;

    fn doc(text: &str) -> Document {
        Document::new(text, DocumentMetadata::default())
    }

    #[test]
    fn test_most_similar_first() {
        let index = VectorIndex::from_documents(
            vec![doc("east"), doc("north"), doc("northeast")],
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]],
        )
        .unwrap();

        let hits = index.search(&[0.1, 1.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document.content, "north");
        assert_eq!(hits[1].document.content, "northeast");
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn test_k_larger_than_index() {
        let index = VectorIndex::from_documents(vec![doc("only")], vec![vec![1.0, 2.0]]).unwrap();
        assert_eq!(index.search(&[1.0, 2.0], 4).unwrap().len(), 1);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let err = VectorIndex::from_documents(
            vec![doc("a"), doc("b")],
            vec![vec![1.0, 0.0], vec![1.0]],
        )
        .unwrap_err();
        assert_eq!(err, IndexError::DimensionMismatch { expected: 2, actual: 1 });

        let index = VectorIndex::from_documents(vec![doc("a")], vec![vec![1.0, 0.0]]).unwrap();
        assert!(index.search(&[1.0, 0.0, 0.0], 1).is_err());
    }

    #[test]
    fn test_failed_add_leaves_index_unchanged() {
        let mut index = VectorIndex::from_documents(vec![doc("a")], vec![vec![1.0, 0.0]]).unwrap();
        assert!(index.add(vec![doc("b")], vec![]).is_err());
        assert!(index.add(vec![doc("c")], vec![vec![1.0]]).is_err());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_zero_vector_scores_zero() {
        let index = VectorIndex::from_documents(vec![doc("z")], vec![vec![0.0, 0.0]]).unwrap();
        let hits = index.search(&[1.0, 0.0], 1).unwrap();
        assert_eq!(hits[0].score, 0.0);
    }

    #[test]
    fn test_empty_index_search() {
        assert!(VectorIndex::new().search(&[1.0], 3).unwrap().is_empty());
    }
}
