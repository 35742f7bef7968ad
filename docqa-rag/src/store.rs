//! Persistence for similarity indices.
//!
//! [`IndexStore`] is the seam between the index cache and wherever indices
//! live. Two backends are provided:
//!
//! - [`FsIndexStore`]: one JSON file per document in a directory, written
//!   through a temporary file and an atomic rename
//! - [`InMemoryIndexStore`]: a `HashMap` behind a `tokio::sync::RwLock`, for
//!   tests and single-process use

use std::collections::HashMap;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, error};
use uuid::Uuid;

use crate::document::DocumentId;
use crate::error::{DocQaError, Result};
use crate::index::SimilarityIndex;

/// A storage backend holding at most one index per document.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Load the index for `document`, or `None` if none is stored.
    async fn load(&self, document: &DocumentId) -> Result<Option<Arc<SimilarityIndex>>>;

    /// Store the index for `document`, replacing any previous one.
    ///
    /// Readers never observe a partially written index.
    async fn save(&self, document: &DocumentId, index: &SimilarityIndex) -> Result<()>;

    /// Remove the index for `document`. No-op if none is stored.
    async fn delete(&self, document: &DocumentId) -> Result<()>;

    /// Whether an index is stored for `document`.
    async fn contains(&self, document: &DocumentId) -> Result<bool> {
        Ok(self.load(document).await?.is_some())
    }
}

/// Stores each index as `<dir>/<document_id>.index.json`.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{FsIndexStore, IndexStore};
///
/// let store = FsIndexStore::new("indices");
/// store.save(&id, &index).await?;
/// ```
#[derive(Debug, Clone)]
pub struct FsIndexStore {
    dir: PathBuf,
}

impl FsIndexStore {
    /// Create a store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory holding the index files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the index file for `document`.
    pub fn path_for(&self, document: &DocumentId) -> PathBuf {
        self.dir.join(format!("{document}.index.json"))
    }
}

fn fs_error(action: &str, path: &Path, e: impl std::fmt::Display) -> DocQaError {
    error!(backend = "Fs", path = %path.display(), error = %e, "failed to {action}");
    DocQaError::IndexStore {
        backend: "Fs".to_string(),
        message: format!("failed to {action} '{}': {e}", path.display()),
    }
}

#[async_trait]
impl IndexStore for FsIndexStore {
    async fn load(&self, document: &DocumentId) -> Result<Option<Arc<SimilarityIndex>>> {
        let path = self.path_for(document);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(fs_error("read index", &path, e)),
        };

        let index: SimilarityIndex =
            serde_json::from_slice(&bytes).map_err(|e| fs_error("decode index", &path, e))?;
        if index.document_id() != document {
            return Err(fs_error(
                "load index",
                &path,
                format!("file belongs to '{}'", index.document_id()),
            ));
        }

        debug!(document.id = %document, chunk_count = index.len(), "loaded persisted index");
        Ok(Some(Arc::new(index)))
    }

    async fn save(&self, document: &DocumentId, index: &SimilarityIndex) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| fs_error("create index directory", &self.dir, e))?;

        let path = self.path_for(document);
        let tmp = self.dir.join(format!(".{document}.{}.tmp", Uuid::new_v4()));
        let bytes = serde_json::to_vec(index).map_err(|e| fs_error("encode index", &path, e))?;

        if let Err(e) = tokio::fs::write(&tmp, &bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(fs_error("write index", &tmp, e));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(fs_error("install index", &path, e));
        }

        debug!(document.id = %document, path = %path.display(), "persisted index");
        Ok(())
    }

    async fn delete(&self, document: &DocumentId) -> Result<()> {
        let path = self.path_for(document);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => Err(fs_error("delete index", &path, e)),
        }
    }

    async fn contains(&self, document: &DocumentId) -> Result<bool> {
        tokio::fs::try_exists(self.path_for(document))
            .await
            .map_err(|e| fs_error("stat index", &self.path_for(document), e))
    }
}

/// An in-memory index store.
///
/// All operations are async-safe via `tokio::sync::RwLock`.
#[derive(Debug, Default)]
pub struct InMemoryIndexStore {
    indices: RwLock<HashMap<DocumentId, Arc<SimilarityIndex>>>,
}

impl InMemoryIndexStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored indices.
    pub async fn len(&self) -> usize {
        self.indices.read().await.len()
    }

    /// Whether no index is stored.
    pub async fn is_empty(&self) -> bool {
        self.indices.read().await.is_empty()
    }
}

#[async_trait]
impl IndexStore for InMemoryIndexStore {
    async fn load(&self, document: &DocumentId) -> Result<Option<Arc<SimilarityIndex>>> {
        Ok(self.indices.read().await.get(document).cloned())
    }

    async fn save(&self, document: &DocumentId, index: &SimilarityIndex) -> Result<()> {
        self.indices.write().await.insert(document.clone(), Arc::new(index.clone()));
        Ok(())
    }

    async fn delete(&self, document: &DocumentId) -> Result<()> {
        self.indices.write().await.remove(document);
        Ok(())
    }

    async fn contains(&self, document: &DocumentId) -> Result<bool> {
        Ok(self.indices.read().await.contains_key(document))
    }
}
