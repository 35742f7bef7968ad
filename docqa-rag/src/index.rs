//! The per-document similarity index.
//!
//! A [`SimilarityIndex`] is built once from embedded chunks and never
//! modified afterwards; searching takes `&self`.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::{Chunk, DocumentId, SearchResult};
use crate::error::{DocQaError, Result};

/// A chunk stored in an index together with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexedChunk {
    /// The chunk content and provenance.
    pub chunk: Chunk,
    /// The vector embedding of the chunk text.
    pub embedding: Vec<f32>,
}

/// An immutable nearest-neighbour index over one document's chunks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilarityIndex {
    document_id: DocumentId,
    dimensions: usize,
    built_at: DateTime<Utc>,
    entries: Vec<IndexedChunk>,
}

impl SimilarityIndex {
    /// Build an index from chunks and their embeddings, paired by position.
    ///
    /// # Errors
    ///
    /// Returns [`DocQaError::IndexBuildFailed`] if there are no chunks, the
    /// number of embeddings differs from the number of chunks, or the
    /// embeddings do not all share one non-zero dimensionality.
    pub fn build(
        document_id: DocumentId,
        chunks: Vec<Chunk>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Self> {
        if chunks.is_empty() {
            return Err(DocQaError::build_failed(&document_id, "document produced no chunks"));
        }
        if chunks.len() != embeddings.len() {
            return Err(DocQaError::build_failed(
                &document_id,
                format!("{} chunks but {} embeddings", chunks.len(), embeddings.len()),
            ));
        }

        let dimensions = embeddings[0].len();
        if dimensions == 0 {
            return Err(DocQaError::build_failed(&document_id, "embeddings are empty"));
        }
        if let Some(bad) = embeddings.iter().position(|e| e.len() != dimensions) {
            return Err(DocQaError::build_failed(
                &document_id,
                format!(
                    "embedding {bad} has {} dimensions, expected {dimensions}",
                    embeddings[bad].len()
                ),
            ));
        }

        if embeddings.iter().any(|e| e.iter().any(|x| !x.is_finite())) {
            return Err(DocQaError::build_failed(
                &document_id,
                "embeddings contain non-finite values",
            ));
        }

        let entries = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexedChunk { chunk, embedding })
            .collect();

        Ok(Self { document_id, dimensions, built_at: Utc::now(), entries })
    }

    /// The document this index belongs to.
    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    /// Dimensionality shared by every stored vector.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// When the index was built.
    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The indexed chunks in document order.
    pub fn entries(&self) -> &[IndexedChunk] {
        &self.entries
    }

    /// Return the `top_k` chunks most similar to `query`.
    ///
    /// Results are ordered by descending cosine similarity; equal scores keep
    /// document order and NaN scores sort last.
    pub fn search(&self, query: &[f32], top_k: usize) -> Vec<SearchResult> {
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (position, cosine_similarity(&entry.embedding, query)))
            .collect();

        // `sort_by` is stable, so ties keep their document order.
        scored.sort_by(|a, b| compare_scores(b.1, a.1));
        scored.truncate(top_k);

        scored
            .into_iter()
            .map(|(position, score)| SearchResult {
                chunk: self.entries[position].chunk.clone(),
                score,
            })
            .collect()
    }
}

/// Total order on scores with NaN below every number.
fn compare_scores(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn chunk(ordinal: usize, text: &str) -> Chunk {
        Chunk {
            id: format!("doc.txt_{ordinal}"),
            document_id: DocumentId::new("doc.txt").unwrap(),
            ordinal,
            unit: 0,
            start: 0,
            end: text.chars().count(),
            text: text.to_string(),
            metadata: HashMap::new(),
        }
    }

    fn index(vectors: Vec<Vec<f32>>) -> SimilarityIndex {
        let chunks = (0..vectors.len()).map(|i| chunk(i, &format!("chunk {i}"))).collect();
        SimilarityIndex::build(DocumentId::new("doc.txt").unwrap(), chunks, vectors).unwrap()
    }

    #[test]
    fn cosine_of_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn search_orders_by_descending_similarity() {
        let index = index(vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![0.7, 0.7]]);
        let results = index.search(&[1.0, 0.0], 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.ordinal, 1);
        assert_eq!(results[1].chunk.ordinal, 2);
    }

    #[test]
    fn ties_keep_document_order() {
        let index = index(vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 0.0]]);
        let ordinals: Vec<usize> =
            index.search(&[1.0, 0.0], 10).iter().map(|r| r.chunk.ordinal).collect();
        assert_eq!(ordinals, vec![0, 2, 3, 1]);
    }

    #[test]
    fn nan_query_scores_sort_last() {
        let index = index(vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        let results = index.search(&[f32::NAN, 1.0], 2);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.score.is_nan()));
        assert_eq!(results[0].chunk.ordinal, 0);
        assert_eq!(compare_scores(f32::NAN, -1.0), Ordering::Less);
    }

    #[test]
    fn build_rejects_non_finite_embeddings() {
        let id = DocumentId::new("doc.txt").unwrap();
        let err = SimilarityIndex::build(id, vec![chunk(0, "a")], vec![vec![f32::NAN]]);
        assert!(err.is_err());
    }

    #[test]
    fn build_rejects_inconsistent_input() {
        let id = DocumentId::new("doc.txt").unwrap();
        let err = SimilarityIndex::build(id.clone(), vec![], vec![]).unwrap_err();
        assert!(err.to_string().contains("no chunks"));

        let err =
            SimilarityIndex::build(id.clone(), vec![chunk(0, "a")], vec![vec![1.0], vec![2.0]])
                .unwrap_err();
        assert!(err.to_string().contains("1 chunks but 2 embeddings"));

        let err = SimilarityIndex::build(
            id,
            vec![chunk(0, "a"), chunk(1, "b")],
            vec![vec![1.0, 0.0], vec![1.0]],
        )
        .unwrap_err();
        assert!(err.to_string().contains("expected 2"));
    }

    #[test]
    fn serde_round_trip_preserves_content() {
        let index = index(vec![vec![0.5, 0.5], vec![1.0, 0.0]]);
        let json = serde_json::to_string(&index).unwrap();
        let back: SimilarityIndex = serde_json::from_str(&json).unwrap();
        assert_eq!(back, index);
    }
}
