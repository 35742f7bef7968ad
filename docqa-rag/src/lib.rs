//! Document question answering with cached per-document indices.
//!
//! This crate provides:
//! - Document loading for CSV, plain text, PDF and spreadsheet files
//! - Recursive, overlap-aware chunking
//! - A build-once similarity index cache with filesystem and in-memory stores
//! - Context-only answer synthesis with deterministic policy pre-checks
//! - Multi-language answer bundles
//! - A [`DocQaPipeline`] orchestrating all of the above per question
//!
//! Embedding, generation and translation backends are capability traits.
//! OpenAI-compatible providers ship behind the `openai` feature and a Google
//! translator behind `google-translate`.

pub mod cache;
pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod expander;
pub mod generation;
pub mod index;
pub mod loader;
pub mod pipeline;
pub mod policy;
pub mod retriever;
pub mod session;
pub mod store;
pub mod synthesizer;
pub mod translate;

#[cfg(feature = "google-translate")]
pub mod google;
#[cfg(feature = "openai")]
pub mod openai;

pub use cache::{IndexCache, IndexSource};
pub use chunking::{Chunker, RecursiveChunker, Span, reassemble};
pub use config::{DocQaConfig, DocQaConfigBuilder, ProviderSettings};
pub use document::{Chunk, Document, DocumentId, DocumentKind, DocumentUnit, SearchResult};
pub use embedding::EmbeddingProvider;
pub use error::{DocQaError, ErrorKind, Result};
pub use expander::{AnswerBundle, MultiLanguageExpander};
pub use generation::{GenerationRequest, Generator};
pub use index::{IndexedChunk, SimilarityIndex};
pub use loader::{DocumentLoader, FsDocumentLoader, InMemoryDocumentLoader};
pub use pipeline::{
    DocQaPipeline, DocQaPipelineBuilder, PipelineStage, QueryFailure, QueryOutcome, QueryRequest,
};
pub use policy::{AnswerKind, AnswerPolicy};
pub use retriever::Retriever;
pub use session::{ConversationSession, Turn};
pub use store::{FsIndexStore, InMemoryIndexStore, IndexStore};
pub use synthesizer::{Answer, AnswerSynthesizer};
pub use translate::{Translator, wrap_preserving_lines};

#[cfg(feature = "google-translate")]
pub use google::GoogleTranslator;
#[cfg(feature = "openai")]
pub use openai::{OpenAIChatGenerator, OpenAIEmbeddingProvider};
