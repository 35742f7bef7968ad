//! Query-time retrieval over a similarity index.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error};

use crate::document::SearchResult;
use crate::embedding::EmbeddingProvider;
use crate::error::{DocQaError, Result};
use crate::index::SimilarityIndex;

/// Embeds questions and ranks an index's chunks against them.
pub struct Retriever {
    embedding_provider: Arc<dyn EmbeddingProvider>,
    top_k: usize,
    similarity_threshold: Option<f32>,
    embedding_timeout: Duration,
}

impl Retriever {
    /// Create a retriever returning up to `top_k` chunks per question.
    pub fn new(
        embedding_provider: Arc<dyn EmbeddingProvider>,
        top_k: usize,
        embedding_timeout: Duration,
    ) -> Self {
        Self { embedding_provider, top_k, similarity_threshold: None, embedding_timeout }
    }

    /// Drop results scoring below `threshold`.
    pub fn with_similarity_threshold(mut self, threshold: Option<f32>) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// The default number of chunks returned.
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Retrieve the default number of chunks for `query`.
    pub async fn retrieve(
        &self,
        index: &SimilarityIndex,
        query: &str,
    ) -> Result<Vec<SearchResult>> {
        self.retrieve_k(index, query, self.top_k).await
    }

    /// Retrieve up to `k` chunks ranked by descending similarity to `query`.
    ///
    /// Equal scores keep document order. The index is only read.
    ///
    /// # Errors
    ///
    /// Returns [`DocQaError::RetrievalFailed`] if the question cannot be
    /// embedded in time or its embedding does not match the index.
    pub async fn retrieve_k(
        &self,
        index: &SimilarityIndex,
        query: &str,
        k: usize,
    ) -> Result<Vec<SearchResult>> {
        let embedding =
            match tokio::time::timeout(self.embedding_timeout, self.embedding_provider.embed(query))
                .await
            {
                Ok(Ok(embedding)) => embedding,
                Ok(Err(e)) => {
                    error!(error = %e, "query embedding failed");
                    return Err(DocQaError::RetrievalFailed(format!("query embedding failed: {e}")));
                }
                Err(_) => {
                    let secs = self.embedding_timeout.as_secs();
                    error!(timeout_secs = secs, "query embedding timed out");
                    return Err(DocQaError::RetrievalFailed(format!(
                        "query embedding timed out after {secs}s"
                    )));
                }
            };

        if embedding.len() != index.dimensions() {
            error!(
                dimensions = embedding.len(),
                expected = index.dimensions(),
                "query embedding does not match index"
            );
            return Err(DocQaError::RetrievalFailed(format!(
                "query embedding has {} dimensions, index '{}' has {}",
                embedding.len(),
                index.document_id(),
                index.dimensions()
            )));
        }

        let mut results = index.search(&embedding, k);
        if let Some(threshold) = self.similarity_threshold {
            results.retain(|r| r.score >= threshold);
        }

        debug!(
            document.id = %index.document_id(),
            result_count = results.len(),
            "retrieved chunks"
        );
        Ok(results)
    }
}
