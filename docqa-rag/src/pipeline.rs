//! Question-answering pipeline orchestrator.
//!
//! The [`DocQaPipeline`] runs one question through the stages
//! load-or-reuse index → retrieve → synthesize → expand, composing a
//! [`DocumentLoader`], a [`Chunker`], an [`IndexCache`], a [`Retriever`], an
//! [`AnswerSynthesizer`] and a [`MultiLanguageExpander`].
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_rag::{ConversationSession, DocQaPipeline, DocumentId, QueryRequest};
//!
//! let pipeline = DocQaPipeline::builder()
//!     .loader(Arc::new(FsDocumentLoader::new("uploads")))
//!     .embedding_provider(Arc::new(embedder))
//!     .index_store(Arc::new(FsIndexStore::new("indices")))
//!     .generator(Arc::new(generator))
//!     .translator(Arc::new(translator))
//!     .build()?;
//!
//! let session = pipeline.new_session();
//! let request = QueryRequest::new(DocumentId::new("faq.csv")?, "what is ML?", "hi");
//! let outcome = pipeline.ask(&session, &request).await?;
//! println!("{}", outcome.answer);
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::cache::{IndexCache, IndexSource};
use crate::chunking::{Chunker, RecursiveChunker};
use crate::config::DocQaConfig;
use crate::document::DocumentId;
use crate::embedding::EmbeddingProvider;
use crate::error::{DocQaError, ErrorKind, Result};
use crate::expander::{AnswerBundle, MultiLanguageExpander};
use crate::generation::Generator;
use crate::index::SimilarityIndex;
use crate::loader::DocumentLoader;
use crate::policy::{AnswerKind, AnswerPolicy, normalize_question};
use crate::retriever::Retriever;
use crate::session::ConversationSession;
use crate::store::{InMemoryIndexStore, IndexStore};
use crate::synthesizer::{Answer, AnswerSynthesizer};
use crate::translate::Translator;

/// The stages a question passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Idle,
    DocumentLoading,
    Chunking,
    IndexReady,
    Retrieving,
    Synthesizing,
    Expanding,
    Done,
    Failed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::DocumentLoading => "document_loading",
            Self::Chunking => "chunking",
            Self::IndexReady => "index_ready",
            Self::Retrieving => "retrieving",
            Self::Synthesizing => "synthesizing",
            Self::Expanding => "expanding",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One question about one document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryRequest {
    /// The document to answer from.
    pub document: DocumentId,
    /// The question as typed.
    pub question: String,
    /// The language code the caller wants the answer in.
    pub language: String,
}

impl QueryRequest {
    /// Create a request.
    pub fn new(
        document: DocumentId,
        question: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self { document, question: question.into(), language: language.into() }
    }
}

/// The result of a successfully answered question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryOutcome {
    /// The answer in every language produced.
    pub bundle: AnswerBundle,
    /// The language of [`answer`](Self::answer). Differs from the requested
    /// language when that translation was unavailable.
    pub language: String,
    /// The answer in [`language`](Self::language).
    pub answer: String,
    /// How the answer was produced.
    pub kind: AnswerKind,
    /// Whether the index was reused or built; `None` when no index was needed.
    pub index_source: Option<IndexSource>,
    /// Every stage visited, in order.
    pub stages: Vec<PipelineStage>,
}

/// A question that could not be answered.
#[derive(Debug, Error)]
#[error("query failed during {stage}: {error}")]
pub struct QueryFailure {
    /// The stage in which the failure happened.
    pub stage: PipelineStage,
    /// The underlying error.
    #[source]
    pub error: DocQaError,
    /// Every stage visited, ending in [`PipelineStage::Failed`].
    pub stages: Vec<PipelineStage>,
}

impl QueryFailure {
    /// The kind of the underlying error.
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

/// Stages visited by one query.
struct Trace(Vec<PipelineStage>);

impl Trace {
    fn new() -> Self {
        Self(vec![PipelineStage::Idle])
    }

    fn enter(&mut self, stage: PipelineStage) {
        debug!(stage = %stage, "entering stage");
        self.0.push(stage);
    }

    fn fail(mut self, stage: PipelineStage, error: DocQaError) -> QueryFailure {
        if self.0.last() != Some(&stage) {
            self.0.push(stage);
        }
        self.0.push(PipelineStage::Failed);
        error!(stage = %stage, kind = %error.kind(), error = %error, "query failed");
        QueryFailure { stage, error, stages: self.0 }
    }
}

// How far the lazy chunk producer got.
const REACHED_NONE: u8 = 0;
const REACHED_LOADING: u8 = 1;
const REACHED_CHUNKING: u8 = 2;

/// The document question-answering pipeline.
///
/// Construct one via [`DocQaPipeline::builder()`]. A pipeline is shared by
/// all callers; conversation state lives in the [`ConversationSession`] each
/// caller passes in.
pub struct DocQaPipeline {
    config: DocQaConfig,
    loader: Arc<dyn DocumentLoader>,
    chunker: Arc<dyn Chunker>,
    cache: IndexCache,
    retriever: Retriever,
    synthesizer: AnswerSynthesizer,
    expander: MultiLanguageExpander,
}

impl DocQaPipeline {
    /// Create a new [`DocQaPipelineBuilder`].
    pub fn builder() -> DocQaPipelineBuilder {
        DocQaPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &DocQaConfig {
        &self.config
    }

    /// Return a reference to the index cache.
    pub fn cache(&self) -> &IndexCache {
        &self.cache
    }

    /// Start a conversation with the configured history limit.
    pub fn new_session(&self) -> ConversationSession {
        ConversationSession::new(self.config.max_history_turns)
    }

    /// Build the index for `document` ahead of any question.
    ///
    /// Returns [`IndexSource::Cached`] if it already existed.
    ///
    /// # Errors
    ///
    /// Returns [`DocQaError::DocumentUnreadable`] or
    /// [`DocQaError::IndexBuildFailed`] if the index cannot be built.
    pub async fn prepare(&self, document: &DocumentId) -> Result<IndexSource> {
        let reached = AtomicU8::new(REACHED_NONE);
        let (_, source) = self.acquire_index(document, &reached).await?;
        Ok(source)
    }

    /// Drop the persisted index of `document`, e.g. after it was deleted or
    /// replaced. Idempotent.
    pub async fn forget(&self, document: &DocumentId) -> Result<()> {
        self.cache.invalidate(document).await
    }

    /// Answer one question.
    ///
    /// Small talk is answered without touching the document. Otherwise the
    /// document's index is loaded, or built when absent, the best chunks are
    /// retrieved, an answer is synthesized under the answer policy and
    /// expanded into every configured language. The turn is recorded in
    /// `session` on success.
    ///
    /// # Errors
    ///
    /// Returns a [`QueryFailure`] naming the stage that failed. An empty
    /// question fails with [`DocQaError::InvalidQuery`] before any stage runs.
    #[tracing::instrument(
        skip_all,
        fields(
            document.id = %request.document,
            language = %request.language,
            session.id = session.id(),
        )
    )]
    pub async fn ask(
        &self,
        session: &ConversationSession,
        request: &QueryRequest,
    ) -> std::result::Result<QueryOutcome, QueryFailure> {
        let mut trace = Trace::new();

        let question = normalize_question(&request.question);
        if question.is_empty() {
            let error = DocQaError::InvalidQuery("question must not be empty".to_string());
            return Err(trace.fail(PipelineStage::Idle, error));
        }

        if let Some(answer) = self.synthesizer.small_talk(&question) {
            debug!("answering small talk without the document");
            trace.enter(PipelineStage::Synthesizing);
            return Ok(self.finish(session, request, &question, answer, None, trace).await);
        }

        let reached = AtomicU8::new(REACHED_NONE);
        let (index, source) = match self.acquire_index(&request.document, &reached).await {
            Ok(acquired) => acquired,
            Err(e) => {
                let stage = match reached.load(Ordering::Acquire) {
                    REACHED_CHUNKING => {
                        trace.enter(PipelineStage::DocumentLoading);
                        PipelineStage::Chunking
                    }
                    _ => PipelineStage::DocumentLoading,
                };
                return Err(trace.fail(stage, e));
            }
        };
        if source == IndexSource::Built {
            trace.enter(PipelineStage::DocumentLoading);
            trace.enter(PipelineStage::Chunking);
        }
        trace.enter(PipelineStage::IndexReady);

        trace.enter(PipelineStage::Retrieving);
        let retrieved = match self.retriever.retrieve(&index, &question).await {
            Ok(retrieved) => retrieved,
            Err(e) => return Err(trace.fail(PipelineStage::Retrieving, e)),
        };

        trace.enter(PipelineStage::Synthesizing);
        let history = session.history().await;
        let answer = match self.synthesizer.synthesize(&retrieved, &question, history).await {
            Ok(answer) => answer,
            Err(e) => return Err(trace.fail(PipelineStage::Synthesizing, e)),
        };

        Ok(self.finish(session, request, &question, answer, Some(source), trace).await)
    }

    /// Expand `answer`, pick the requested language and record the turn.
    async fn finish(
        &self,
        session: &ConversationSession,
        request: &QueryRequest,
        question: &str,
        answer: Answer,
        index_source: Option<IndexSource>,
        mut trace: Trace,
    ) -> QueryOutcome {
        trace.enter(PipelineStage::Expanding);
        let bundle = self.expander.expand(&answer.text).await;

        let requested = request.language.trim();
        let source_language = self.expander.source_language();
        let language = match bundle.get(requested) {
            Some(_) => requested.to_string(),
            None => {
                if !requested.is_empty() && requested != source_language {
                    let reason = if bundle.is_unavailable(requested) {
                        "translation unavailable"
                    } else {
                        "language not configured"
                    };
                    warn!(
                        requested,
                        fallback = source_language,
                        reason,
                        "answering in the source language"
                    );
                }
                source_language.to_string()
            }
        };
        let selected = bundle.get(&language).unwrap_or(&answer.text).to_string();

        session.record(question, answer.text.as_str()).await;
        trace.enter(PipelineStage::Done);

        info!(kind = ?answer.kind, language = %language, "answered question");
        QueryOutcome {
            bundle,
            language,
            answer: selected,
            kind: answer.kind,
            index_source,
            stages: trace.0,
        }
    }

    /// Load or build the index, recording in `reached` how far the lazy
    /// load-and-chunk step got.
    async fn acquire_index(
        &self,
        document: &DocumentId,
        reached: &AtomicU8,
    ) -> Result<(Arc<SimilarityIndex>, IndexSource)> {
        let loader = &self.loader;
        let chunker = &self.chunker;
        self.cache
            .get_or_build_with(document, move || async move {
                reached.store(REACHED_LOADING, Ordering::Release);
                let loaded = loader.load(document).await?;
                reached.store(REACHED_CHUNKING, Ordering::Release);
                let chunks = chunker.chunk(&loaded);
                debug!(
                    document.id = %document,
                    unit_count = loaded.units.len(),
                    chunk_count = chunks.len(),
                    "chunked document"
                );
                Ok(chunks)
            })
            .await
    }
}

/// Builder for constructing a [`DocQaPipeline`].
///
/// The loader, embedding provider, generator and translator are required.
/// The configuration defaults to [`DocQaConfig::default()`], the chunker to a
/// [`RecursiveChunker`] sized by the configuration, the index store to an
/// [`InMemoryIndexStore`] and the policy to [`AnswerPolicy::default()`].
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = DocQaPipeline::builder()
///     .config(DocQaConfig::from_env()?)
///     .loader(Arc::new(loader))
///     .embedding_provider(Arc::new(embedder))
///     .index_store(Arc::new(store))   // optional
///     .generator(Arc::new(generator))
///     .translator(Arc::new(translator))
///     .build()?;
/// ```
#[derive(Default)]
pub struct DocQaPipelineBuilder {
    config: Option<DocQaConfig>,
    loader: Option<Arc<dyn DocumentLoader>>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    index_store: Option<Arc<dyn IndexStore>>,
    chunker: Option<Arc<dyn Chunker>>,
    generator: Option<Arc<dyn Generator>>,
    translator: Option<Arc<dyn Translator>>,
    policy: Option<AnswerPolicy>,
}

impl DocQaPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: DocQaConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the document loader.
    pub fn loader(mut self, loader: Arc<dyn DocumentLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Set the embedding provider used for indices and questions.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the index persistence backend.
    pub fn index_store(mut self, store: Arc<dyn IndexStore>) -> Self {
        self.index_store = Some(store);
        self
    }

    /// Set the document chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the answer generator.
    pub fn generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Set the translator.
    pub fn translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    /// Replace the default answer policy.
    pub fn policy(mut self, policy: AnswerPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Build the [`DocQaPipeline`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`DocQaError::Config`] if any required field is missing.
    pub fn build(self) -> Result<DocQaPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let loader =
            self.loader.ok_or_else(|| DocQaError::Config("loader is required".to_string()))?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| DocQaError::Config("embedding_provider is required".to_string()))?;
        let generator = self
            .generator
            .ok_or_else(|| DocQaError::Config("generator is required".to_string()))?;
        let translator = self
            .translator
            .ok_or_else(|| DocQaError::Config("translator is required".to_string()))?;
        let index_store: Arc<dyn IndexStore> =
            self.index_store.unwrap_or_else(|| Arc::new(InMemoryIndexStore::new()));
        let chunker: Arc<dyn Chunker> =
            self.chunker.unwrap_or_else(|| Arc::new(RecursiveChunker::from_config(&config)));

        let cache =
            IndexCache::new(index_store, embedding_provider.clone(), config.embedding_timeout());
        let retriever =
            Retriever::new(embedding_provider, config.top_k, config.embedding_timeout())
                .with_similarity_threshold(config.similarity_threshold);
        let synthesizer = AnswerSynthesizer::new(
            generator,
            self.policy.unwrap_or_default(),
            config.generation_timeout(),
        );
        let expander = MultiLanguageExpander::from_config(translator, &config);

        Ok(DocQaPipeline { config, loader, chunker, cache, retriever, synthesizer, expander })
    }
}
