//! OpenAI-compatible embedding and chat providers.
//!
//! This module is only available when the `openai` feature is enabled. Both
//! providers accept a base URL, so any server speaking the OpenAI wire format
//! (OpenAI, Groq, a local gateway) can be used.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::ProviderSettings;
use crate::embedding::EmbeddingProvider;
use crate::error::{DocQaError, Result};
use crate::generation::{GenerationRequest, Generator};

/// The default OpenAI API base URL, used for embeddings.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// The default chat base URL: Groq's OpenAI-compatible endpoint.
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// The default model for embeddings.
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// The default dimensionality for `text-embedding-3-small`.
const DEFAULT_DIMENSIONS: usize = 1536;

/// The default chat model.
const DEFAULT_CHAT_MODEL: &str = "llama-3.1-70b-versatile";

/// Join `path` onto a base URL that may or may not end in `/v1`.
fn endpoint(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with(path) {
        base.to_string()
    } else if base.ends_with("/v1") {
        format!("{base}{path}")
    } else {
        format!("{base}/v1{path}")
    }
}

/// Pull the `error.message` out of an OpenAI-style error body, or return the body.
fn error_detail(body: String) -> String {
    serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body)
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// An [`EmbeddingProvider`] backed by an OpenAI-compatible embeddings API.
///
/// Uses `reqwest` to call the `/embeddings` endpoint directly.
///
/// # Configuration
///
/// - `base_url`: defaults to `https://api.openai.com/v1`.
/// - `model`: defaults to `text-embedding-3-small`.
/// - `dimensions`: optional Matryoshka dimension override.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::openai::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::new("sk-...")?;
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
    /// If set, passed to the API for Matryoshka dimension truncation.
    request_dimensions: Option<usize>,
}

impl OpenAIEmbeddingProvider {
    /// Create a new provider with the given API key.
    ///
    /// Uses the default model (`text-embedding-3-small`) and dimensions (1536).
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(DocQaError::Embedding {
                provider: "OpenAI".into(),
                message: "API key must not be empty".into(),
            });
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: OPENAI_BASE_URL.into(),
            model: DEFAULT_EMBEDDING_MODEL.into(),
            dimensions: DEFAULT_DIMENSIONS,
            request_dimensions: None,
        })
    }

    /// Create a provider from resolved [`ProviderSettings`].
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self> {
        let api_key = settings.embedding_api_key.clone().ok_or_else(|| {
            DocQaError::Config(
                "no embedding API key (set DOCQA_EMBEDDING_API_KEY or OPENAI_API_KEY)".into(),
            )
        })?;
        let mut provider = Self::new(api_key)?;
        if let Some(base_url) = &settings.embedding_base_url {
            provider = provider.with_base_url(base_url);
        }
        if let Some(model) = &settings.embedding_model {
            provider = provider.with_model(model);
        }
        if let Some(dims) = settings.embedding_dimensions {
            provider = provider.with_dimensions(dims);
        }
        Ok(provider)
    }

    /// Set the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the model name (e.g. `text-embedding-3-large`).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the output dimensions (Matryoshka support).
    ///
    /// When set, the API returns embeddings truncated to this size.
    /// This also updates the value returned by [`dimensions()`](EmbeddingProvider::dimensions).
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = Some(dims);
        self
    }
}

// ── Embeddings API request/response types ──────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

// ── EmbeddingProvider implementation ───────────────────────────────

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = "OpenAI", text_len = text.len(), "embedding single text");

        let results = self.embed_batch(&[text]).await?;
        results.into_iter().next().ok_or_else(|| DocQaError::Embedding {
            provider: "OpenAI".into(),
            message: "API returned empty response".into(),
        })
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            provider = "OpenAI",
            batch_size = texts.len(),
            model = %self.model,
            "embedding batch"
        );

        let request_body = EmbeddingRequest {
            model: &self.model,
            input: texts.to_vec(),
            dimensions: self.request_dimensions,
        };

        let response = self
            .client
            .post(endpoint(&self.base_url, "/embeddings"))
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = "OpenAI", error = %e, "request failed");
                DocQaError::Embedding {
                    provider: "OpenAI".into(),
                    message: format!("request failed: {e}"),
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = error_detail(response.text().await.unwrap_or_default());

            error!(provider = "OpenAI", %status, "API error");
            return Err(DocQaError::Embedding {
                provider: "OpenAI".into(),
                message: format!("API returned {status}: {detail}"),
            });
        }

        let mut embedding_response: EmbeddingResponse = response.json().await.map_err(|e| {
            error!(provider = "OpenAI", error = %e, "failed to parse response");
            DocQaError::Embedding {
                provider: "OpenAI".into(),
                message: format!("failed to parse response: {e}"),
            }
        })?;

        // Some compatible servers return the batch out of order.
        embedding_response.data.sort_by_key(|d| d.index.unwrap_or(usize::MAX));
        Ok(embedding_response.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// A [`Generator`] backed by an OpenAI-compatible chat completions API.
///
/// The policy is sent as the system message, earlier session turns as
/// alternating user/assistant messages, and the context plus question as
/// the final user message. Sampling temperature is fixed at 0.
///
/// # Configuration
///
/// - `base_url`: defaults to Groq (`https://api.groq.com/openai/v1`).
/// - `model`: defaults to `llama-3.1-70b-versatile`.
pub struct OpenAIChatGenerator {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: Option<u32>,
}

impl OpenAIChatGenerator {
    /// Create a generator with the given API key and the default endpoint and model.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(DocQaError::GenerationUnavailable {
                provider: "OpenAI-chat".into(),
                message: "API key must not be empty".into(),
            });
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: GROQ_BASE_URL.into(),
            model: DEFAULT_CHAT_MODEL.into(),
            max_tokens: None,
        })
    }

    /// Create a generator from resolved [`ProviderSettings`].
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self> {
        let api_key = settings.llm_api_key.clone().ok_or_else(|| {
            DocQaError::Config("no chat API key (set DOCQA_LLM_API_KEY or GROQ_API_KEY)".into())
        })?;
        let mut generator = Self::new(api_key)?;
        if let Some(base_url) = &settings.llm_base_url {
            generator = generator.with_base_url(base_url);
        }
        if let Some(model) = &settings.llm_model {
            generator = generator.with_model(model);
        }
        Ok(generator)
    }

    /// Set the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the chat model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Cap the reply length.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    fn unavailable(&self, message: String) -> DocQaError {
        DocQaError::GenerationUnavailable { provider: self.name().to_string(), message }
    }
}

// ── Chat completions request/response types ────────────────────────

#[derive(Debug, Serialize, PartialEq)]
struct ChatMessage<'a> {
    role: &'static str,
    content: std::borrow::Cow<'a, str>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

fn chat_messages(request: &GenerationRequest) -> Vec<ChatMessage<'_>> {
    let mut messages = Vec::with_capacity(request.history.len() * 2 + 2);
    messages.push(ChatMessage { role: "system", content: request.policy.as_str().into() });
    for turn in &request.history {
        messages.push(ChatMessage { role: "user", content: turn.question.as_str().into() });
        messages.push(ChatMessage { role: "assistant", content: turn.answer.as_str().into() });
    }
    let prompt = format!("Context:\n{}\n\nQuestion:\n{}", request.context, request.question);
    messages.push(ChatMessage { role: "user", content: prompt.into() });
    messages
}

// ── Generator implementation ───────────────────────────────────────

#[async_trait]
impl Generator for OpenAIChatGenerator {
    fn name(&self) -> &str {
        "OpenAI-chat"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        debug!(
            provider = self.name(),
            model = %self.model,
            history_turns = request.history.len(),
            context_len = request.context.len(),
            "requesting chat completion"
        );

        let body = ChatRequest {
            model: &self.model,
            messages: chat_messages(request),
            temperature: 0.0,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(endpoint(&self.base_url, "/chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = self.name(), error = %e, "request failed");
                self.unavailable(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = error_detail(response.text().await.unwrap_or_default());

            error!(provider = self.name(), %status, "API error");
            return Err(self.unavailable(format!("API returned {status}: {detail}")));
        }

        let chat: ChatResponse = response.json().await.map_err(|e| {
            error!(provider = self.name(), error = %e, "failed to parse response");
            self.unavailable(format!("failed to parse response: {e}"))
        })?;

        Ok(chat.choices.into_iter().next().and_then(|c| c.message.content).unwrap_or_default())
    }
}
