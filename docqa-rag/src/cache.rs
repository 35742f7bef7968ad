//! Build-once cache of per-document similarity indices.
//!
//! The [`IndexCache`] sits in front of an [`IndexStore`]. A persisted index is
//! returned as-is; otherwise the document's chunks are embedded, indexed and
//! persisted. Construction for one document is serialized by an async mutex
//! held from the store check until the index is persisted, so concurrent
//! callers see exactly one build. Different documents never share a lock.
//!
//! A persisted index is reused even if its source document has changed since
//! it was built; callers that replace a document must [`invalidate`] it.
//!
//! [`invalidate`]: IndexCache::invalidate

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::document::{Chunk, DocumentId};
use crate::embedding::EmbeddingProvider;
use crate::error::{DocQaError, Result};
use crate::index::SimilarityIndex;
use crate::store::IndexStore;

/// Where an index returned by the cache came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexSource {
    /// Loaded from the store; no chunks were read or embedded.
    Cached,
    /// Built from chunks during this call and persisted.
    Built,
}

/// Per-document index cache over an [`IndexStore`].
pub struct IndexCache {
    store: Arc<dyn IndexStore>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    embedding_timeout: Duration,
    build_locks: Mutex<HashMap<DocumentId, Arc<Mutex<()>>>>,
}

impl IndexCache {
    /// Create a cache persisting to `store` and embedding with `embedding_provider`.
    pub fn new(
        store: Arc<dyn IndexStore>,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        embedding_timeout: Duration,
    ) -> Self {
        Self { store, embedding_provider, embedding_timeout, build_locks: Mutex::default() }
    }

    /// Return a reference to the underlying store.
    pub fn store(&self) -> &Arc<dyn IndexStore> {
        &self.store
    }

    /// Return the persisted index for `document`, building it from `chunks` if absent.
    ///
    /// When an index is already persisted, `chunks` is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`DocQaError::IndexBuildFailed`] if embedding or persisting fails,
    /// and propagates store read errors.
    pub async fn get_or_build(
        &self,
        document: &DocumentId,
        chunks: Vec<Chunk>,
    ) -> Result<(Arc<SimilarityIndex>, IndexSource)> {
        self.get_or_build_with(document, move || async move { Ok(chunks) }).await
    }

    /// Return the persisted index for `document`, building it if absent.
    ///
    /// `produce_chunks` runs only when no index is persisted, and only while
    /// this document's build lock is held, so a cached document is never
    /// re-read or re-chunked. Errors it returns are propagated unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`DocQaError::IndexBuildFailed`] if embedding or persisting
    /// fails, plus whatever `produce_chunks` or the store report.
    pub async fn get_or_build_with<F, Fut>(
        &self,
        document: &DocumentId,
        produce_chunks: F,
    ) -> Result<(Arc<SimilarityIndex>, IndexSource)>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Vec<Chunk>>> + Send,
    {
        if let Some(index) = self.store.load(document).await? {
            debug!(document.id = %document, "index cache hit");
            return Ok((index, IndexSource::Cached));
        }

        let lock = self.build_lock(document).await;
        let built = {
            let _guard = lock.lock().await;
            self.build_locked(document, produce_chunks).await
        };
        self.release_build_lock(document, lock).await;
        built
    }

    /// Remove the persisted index for `document`. No-op if none exists.
    pub async fn invalidate(&self, document: &DocumentId) -> Result<()> {
        let lock = self.build_lock(document).await;
        let deleted = {
            let _guard = lock.lock().await;
            self.store.delete(document).await
        };
        self.release_build_lock(document, lock).await;

        deleted?;
        info!(document.id = %document, "invalidated index");
        Ok(())
    }

    /// Whether an index is persisted for `document`.
    pub async fn contains(&self, document: &DocumentId) -> Result<bool> {
        self.store.contains(document).await
    }

    /// Number of documents with a build lock currently held or awaited.
    pub async fn pending_builds(&self) -> usize {
        self.build_locks.lock().await.len()
    }

    async fn build_locked<F, Fut>(
        &self,
        document: &DocumentId,
        produce_chunks: F,
    ) -> Result<(Arc<SimilarityIndex>, IndexSource)>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Vec<Chunk>>> + Send,
    {
        // Another caller may have finished building while we waited.
        if let Some(index) = self.store.load(document).await? {
            debug!(document.id = %document, "index built by concurrent caller");
            return Ok((index, IndexSource::Cached));
        }

        let chunks = produce_chunks().await?;
        let index = self.build(document, chunks).await?;

        self.store.save(document, &index).await.map_err(|e| {
            error!(document.id = %document, error = %e, "failed to persist index");
            DocQaError::build_failed(document, format!("failed to persist index: {e}"))
        })?;

        info!(document.id = %document, chunk_count = index.len(), "built index");
        Ok((Arc::new(index), IndexSource::Built))
    }

    async fn build_lock(&self, document: &DocumentId) -> Arc<Mutex<()>> {
        let mut locks = self.build_locks.lock().await;
        locks.entry(document.clone()).or_default().clone()
    }

    /// Drop the map's entry for `document` once no other caller holds `lock`.
    async fn release_build_lock(&self, document: &DocumentId, lock: Arc<Mutex<()>>) {
        let mut locks = self.build_locks.lock().await;
        // One reference in the map and one in `lock`.
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(document);
        }
    }

    async fn build(&self, document: &DocumentId, chunks: Vec<Chunk>) -> Result<SimilarityIndex> {
        if chunks.is_empty() {
            error!(document.id = %document, "document produced no chunks");
            return Err(DocQaError::build_failed(document, "document produced no chunks"));
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embedded = tokio::time::timeout(
            self.embedding_timeout,
            self.embedding_provider.embed_batch(&texts),
        )
        .await;

        let embeddings = match embedded {
            Ok(Ok(embeddings)) => embeddings,
            Ok(Err(e)) => {
                error!(document.id = %document, error = %e, "embedding failed during index build");
                return Err(DocQaError::build_failed(document, format!("embedding failed: {e}")));
            }
            Err(_) => {
                let secs = self.embedding_timeout.as_secs();
                error!(document.id = %document, timeout_secs = secs, "embedding timed out");
                return Err(DocQaError::build_failed(
                    document,
                    format!("embedding timed out after {secs}s"),
                ));
            }
        };

        let index = SimilarityIndex::build(document.clone(), chunks, embeddings)?;

        let expected = self.embedding_provider.dimensions();
        if index.dimensions() != expected {
            error!(
                document.id = %document,
                dimensions = index.dimensions(),
                expected,
                "embedding dimensionality mismatch"
            );
            return Err(DocQaError::build_failed(
                document,
                format!("embeddings have {} dimensions, expected {expected}", index.dimensions()),
            ));
        }

        Ok(index)
    }
}
