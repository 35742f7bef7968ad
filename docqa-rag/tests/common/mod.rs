//! Deterministic fakes shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use docqa_rag::{
    DocQaConfig, DocQaError, DocQaPipeline, DocumentId, EmbeddingProvider, GenerationRequest,
    Generator, InMemoryDocumentLoader, IndexStore, Result, Translator,
};

pub const DIMENSIONS: usize = 64;

pub fn id(name: &str) -> DocumentId {
    DocumentId::new(name).unwrap()
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()).map(str::to_lowercase)
}

/// Bag-of-words embedder: each word adds 1.0 to a hashed bucket.
#[derive(Default)]
pub struct HashingEmbedder {
    pub batch_calls: AtomicUsize,
    pub single_calls: AtomicUsize,
    pub delay: Option<Duration>,
}

impl HashingEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slow(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Self::default() }
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0; DIMENSIONS];
        for word in words(text) {
            let hash =
                word.bytes().fold(2166136261u32, |h, b| (h ^ u32::from(b)).wrapping_mul(16777619));
            v[hash as usize % DIMENSIONS] += 1.0;
        }
        v
    }

    pub fn batches(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::vector(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }
}

const IGNORED: [&str; 10] =
    ["what", "is", "the", "of", "a", "an", "do", "does", "for", "fullform"];

/// Answers with the first context line sharing a content word with the question.
#[derive(Default)]
pub struct ContextEchoGenerator {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Generator for ContextEchoGenerator {
    fn name(&self) -> &str {
        "context-echo"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let question: Vec<String> =
            words(&request.question).filter(|w| !IGNORED.contains(&w.as_str())).collect();
        let line = request
            .context
            .lines()
            .find(|line| words(line).any(|w| question.contains(&w)))
            .unwrap_or("Information is not available for this question.");
        Ok(line.to_string())
    }
}

/// Always fails.
pub struct DownGenerator;

#[async_trait]
impl Generator for DownGenerator {
    fn name(&self) -> &str {
        "down"
    }

    async fn generate(&self, _request: &GenerationRequest) -> Result<String> {
        Err(DocQaError::GenerationUnavailable {
            provider: "down".to_string(),
            message: "connection refused".to_string(),
        })
    }
}

/// Prefixes the text with the target language.
#[derive(Default)]
pub struct TaggingTranslator {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Translator for TaggingTranslator {
    fn name(&self) -> &str {
        "tagging"
    }

    async fn translate(&self, text: &str, _source: &str, target: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("[{target}] {text}"))
    }
}

/// Fails every call.
pub struct DownTranslator;

#[async_trait]
impl Translator for DownTranslator {
    fn name(&self) -> &str {
        "down"
    }

    async fn translate(&self, _text: &str, _source: &str, target: &str) -> Result<String> {
        Err(DocQaError::TranslationFailed {
            language: target.to_string(),
            message: "service unavailable".to_string(),
        })
    }
}

pub const GLOSSARY: &str = "ML stands for Machine Learning.\n\
DL stands for Deep Learning.\n\
The release code is 42.\n\
Deployments happen every Friday.";

/// Everything an end-to-end test needs to inspect.
pub struct Harness {
    pub pipeline: DocQaPipeline,
    pub loader: Arc<InMemoryDocumentLoader>,
    pub embedder: Arc<HashingEmbedder>,
    pub generator: Arc<ContextEchoGenerator>,
}

pub async fn harness_with(
    store: Arc<dyn IndexStore>,
    translator: Arc<dyn Translator>,
    generator: Option<Arc<dyn Generator>>,
) -> Harness {
    let loader = Arc::new(InMemoryDocumentLoader::new());
    loader.insert_text(id("glossary.txt"), GLOSSARY).await;

    let embedder = Arc::new(HashingEmbedder::new());
    let echo = Arc::new(ContextEchoGenerator::default());
    let generator = generator.unwrap_or_else(|| echo.clone() as Arc<dyn Generator>);

    let config =
        DocQaConfig::builder().chunk_size(40).chunk_overlap(10).top_k(8).build().unwrap();
    let pipeline = DocQaPipeline::builder()
        .config(config)
        .loader(loader.clone())
        .embedding_provider(embedder.clone())
        .index_store(store)
        .generator(generator)
        .translator(translator)
        .build()
        .unwrap();

    Harness { pipeline, loader, embedder, generator: echo }
}

pub async fn harness() -> Harness {
    harness_with(
        Arc::new(docqa_rag::InMemoryIndexStore::new()),
        Arc::new(TaggingTranslator::default()),
        None,
    )
    .await
}
