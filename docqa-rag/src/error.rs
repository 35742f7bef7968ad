//! Error types for the `docqa-rag` crate.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Errors that can occur while indexing documents or answering questions.
#[derive(Debug, Error)]
pub enum DocQaError {
    /// The document could not be read or decoded into text units.
    #[error("Document '{document}' is unreadable: {message}")]
    DocumentUnreadable {
        /// The document that failed to load.
        document: String,
        /// A description of the failure.
        message: String,
    },

    /// Embedding or index construction failed. Nothing was persisted.
    #[error("Index build failed for '{document}': {message}")]
    IndexBuildFailed {
        /// The document whose index could not be built.
        document: String,
        /// A description of the failure.
        message: String,
    },

    /// The index persistence backend failed.
    #[error("Index store error ({backend}): {message}")]
    IndexStore {
        /// The store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The query could not be matched against the index.
    #[error("Retrieval failed: {0}")]
    RetrievalFailed(String),

    /// The generation capability is unreachable or returned an error.
    #[error("Generation unavailable ({provider}): {message}")]
    GenerationUnavailable {
        /// The generator that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// Translation into one target language failed.
    #[error("Translation to '{language}' failed: {message}")]
    TranslationFailed {
        /// The target language code.
        language: String,
        /// A description of the failure.
        message: String,
    },

    /// A document name that cannot be used as an identity.
    #[error("Invalid document id '{0}'")]
    InvalidDocumentId(String),

    /// The question was rejected before any stage ran.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// A convenience result type for document QA operations.
pub type Result<T> = std::result::Result<T, DocQaError>;

/// Machine-distinguishable classification of a [`DocQaError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DocumentUnreadable,
    IndexBuildFailed,
    IndexStore,
    Embedding,
    RetrievalFailed,
    GenerationUnavailable,
    TranslationFailed,
    InvalidDocumentId,
    InvalidQuery,
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DocumentUnreadable => "document_unreadable",
            Self::IndexBuildFailed => "index_build_failed",
            Self::IndexStore => "index_store",
            Self::Embedding => "embedding",
            Self::RetrievalFailed => "retrieval_failed",
            Self::GenerationUnavailable => "generation_unavailable",
            Self::TranslationFailed => "translation_failed",
            Self::InvalidDocumentId => "invalid_document_id",
            Self::InvalidQuery => "invalid_query",
            Self::Config => "config",
        };
        f.write_str(name)
    }
}

impl DocQaError {
    /// Return the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DocumentUnreadable { .. } => ErrorKind::DocumentUnreadable,
            Self::IndexBuildFailed { .. } => ErrorKind::IndexBuildFailed,
            Self::IndexStore { .. } => ErrorKind::IndexStore,
            Self::Embedding { .. } => ErrorKind::Embedding,
            Self::RetrievalFailed(_) => ErrorKind::RetrievalFailed,
            Self::GenerationUnavailable { .. } => ErrorKind::GenerationUnavailable,
            Self::TranslationFailed { .. } => ErrorKind::TranslationFailed,
            Self::InvalidDocumentId(_) => ErrorKind::InvalidDocumentId,
            Self::InvalidQuery(_) => ErrorKind::InvalidQuery,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    pub(crate) fn unreadable(document: impl fmt::Display, message: impl Into<String>) -> Self {
        Self::DocumentUnreadable { document: document.to_string(), message: message.into() }
    }

    pub(crate) fn build_failed(document: impl fmt::Display, message: impl Into<String>) -> Self {
        Self::IndexBuildFailed { document: document.to_string(), message: message.into() }
    }
}
