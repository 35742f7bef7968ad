//! Configuration for the question-answering pipeline and its providers.
//!
//! Nothing in the pipeline reads credentials or endpoints directly: a
//! [`DocQaConfig`] and a [`ProviderSettings`] are resolved once at process
//! start and handed to the components that need them.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DocQaError, Result};

/// Configuration parameters for the question-answering pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DocQaConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of chunks retrieved per question.
    pub top_k: usize,
    /// Results scoring below this are dropped before synthesis.
    pub similarity_threshold: Option<f32>,
    /// Language of the synthesized answer.
    pub source_language: String,
    /// Languages the answer is translated into.
    pub target_languages: Vec<String>,
    /// Display width each translated line is reflowed to.
    pub wrap_width: usize,
    /// Limit for embedding calls (index build and query embedding).
    pub embedding_timeout_secs: u64,
    /// Limit for a single generation call.
    pub generation_timeout_secs: u64,
    /// Limit for a single translation call.
    pub translation_timeout_secs: u64,
    /// Extra attempts after a failed translation call.
    pub translation_retries: u32,
    /// Number of past turns a session keeps.
    pub max_history_turns: usize,
}

impl Default for DocQaConfig {
    fn default() -> Self {
        Self {
            chunk_size: 700,
            chunk_overlap: 100,
            top_k: 4,
            similarity_threshold: None,
            source_language: "en".to_string(),
            target_languages: vec!["gu".to_string(), "hi".to_string(), "ta".to_string()],
            wrap_width: 110,
            embedding_timeout_secs: 60,
            generation_timeout_secs: 60,
            translation_timeout_secs: 30,
            translation_retries: 1,
            max_history_turns: 10,
        }
    }
}

impl DocQaConfig {
    /// Create a new builder for constructing a [`DocQaConfig`].
    pub fn builder() -> DocQaConfigBuilder {
        DocQaConfigBuilder::default()
    }

    /// Build a configuration from `DOCQA_*` environment variables.
    ///
    /// Unset variables keep their defaults. See [`DocQaConfig::from_lookup`].
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from a variable lookup function.
    ///
    /// Recognised keys: `DOCQA_CHUNK_SIZE`, `DOCQA_CHUNK_OVERLAP`, `DOCQA_TOP_K`,
    /// `DOCQA_SIMILARITY_THRESHOLD`, `DOCQA_SOURCE_LANGUAGE`,
    /// `DOCQA_TARGET_LANGUAGES` (comma separated, may be empty),
    /// `DOCQA_WRAP_WIDTH`, `DOCQA_EMBEDDING_TIMEOUT_SECS`,
    /// `DOCQA_GENERATION_TIMEOUT_SECS`, `DOCQA_TRANSLATION_TIMEOUT_SECS`,
    /// `DOCQA_TRANSLATION_RETRIES` and `DOCQA_MAX_HISTORY_TURNS`.
    ///
    /// # Errors
    ///
    /// Returns [`DocQaError::Config`] if a value does not parse or the
    /// resulting configuration fails validation.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();
        let config = &mut builder.config;

        if let Some(v) = parse_var(&lookup, "DOCQA_CHUNK_SIZE")? {
            config.chunk_size = v;
        }
        if let Some(v) = parse_var(&lookup, "DOCQA_CHUNK_OVERLAP")? {
            config.chunk_overlap = v;
        }
        if let Some(v) = parse_var(&lookup, "DOCQA_TOP_K")? {
            config.top_k = v;
        }
        if let Some(v) = parse_var(&lookup, "DOCQA_SIMILARITY_THRESHOLD")? {
            config.similarity_threshold = Some(v);
        }
        if let Some(v) = lookup("DOCQA_SOURCE_LANGUAGE") {
            config.source_language = v.trim().to_string();
        }
        if let Some(v) = lookup("DOCQA_TARGET_LANGUAGES") {
            config.target_languages = v
                .split(',')
                .map(str::trim)
                .filter(|lang| !lang.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = parse_var(&lookup, "DOCQA_WRAP_WIDTH")? {
            config.wrap_width = v;
        }
        if let Some(v) = parse_var(&lookup, "DOCQA_EMBEDDING_TIMEOUT_SECS")? {
            config.embedding_timeout_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "DOCQA_GENERATION_TIMEOUT_SECS")? {
            config.generation_timeout_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "DOCQA_TRANSLATION_TIMEOUT_SECS")? {
            config.translation_timeout_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "DOCQA_TRANSLATION_RETRIES")? {
            config.translation_retries = v;
        }
        if let Some(v) = parse_var(&lookup, "DOCQA_MAX_HISTORY_TURNS")? {
            config.max_history_turns = v;
        }

        builder.build()
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`DocQaError::Config`] if:
    /// - `chunk_size == 0` or `chunk_overlap >= chunk_size`
    /// - `top_k == 0`
    /// - `wrap_width == 0`
    /// - `source_language` is empty
    /// - any timeout is zero
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(DocQaError::Config("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(DocQaError::Config(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(DocQaError::Config("top_k must be greater than zero".to_string()));
        }
        if self.wrap_width == 0 {
            return Err(DocQaError::Config("wrap_width must be greater than zero".to_string()));
        }
        if self.source_language.trim().is_empty() {
            return Err(DocQaError::Config("source_language must not be empty".to_string()));
        }
        if self.embedding_timeout_secs == 0
            || self.generation_timeout_secs == 0
            || self.translation_timeout_secs == 0
        {
            return Err(DocQaError::Config("timeouts must be at least one second".to_string()));
        }
        Ok(())
    }

    /// Limit for embedding calls.
    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_secs(self.embedding_timeout_secs)
    }

    /// Limit for a single generation call.
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    /// Limit for a single translation call.
    pub fn translation_timeout(&self) -> Duration {
        Duration::from_secs(self.translation_timeout_secs)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| DocQaError::Config(format!("{key}={raw:?} is not valid: {e}"))),
    }
}

/// Builder for constructing a validated [`DocQaConfig`].
#[derive(Debug, Clone, Default)]
pub struct DocQaConfigBuilder {
    config: DocQaConfig,
}

impl DocQaConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of chunks retrieved per question.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the minimum similarity score for retrieved chunks.
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = Some(threshold);
        self
    }

    /// Set the language of the synthesized answer.
    pub fn source_language(mut self, lang: impl Into<String>) -> Self {
        self.config.source_language = lang.into();
        self
    }

    /// Set the languages the answer is translated into.
    pub fn target_languages<I, S>(mut self, langs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.target_languages = langs.into_iter().map(Into::into).collect();
        self
    }

    /// Set the display width for reflowed translations.
    pub fn wrap_width(mut self, width: usize) -> Self {
        self.config.wrap_width = width;
        self
    }

    /// Set the embedding timeout in seconds.
    pub fn embedding_timeout_secs(mut self, secs: u64) -> Self {
        self.config.embedding_timeout_secs = secs;
        self
    }

    /// Set the generation timeout in seconds.
    pub fn generation_timeout_secs(mut self, secs: u64) -> Self {
        self.config.generation_timeout_secs = secs;
        self
    }

    /// Set the per-call translation timeout in seconds.
    pub fn translation_timeout_secs(mut self, secs: u64) -> Self {
        self.config.translation_timeout_secs = secs;
        self
    }

    /// Set how many times a failed translation is retried.
    pub fn translation_retries(mut self, retries: u32) -> Self {
        self.config.translation_retries = retries;
        self
    }

    /// Set how many past turns a session keeps.
    pub fn max_history_turns(mut self, turns: usize) -> Self {
        self.config.max_history_turns = turns;
        self
    }

    /// Build the [`DocQaConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`DocQaError::Config`] if [`DocQaConfig::validate`] fails.
    pub fn build(self) -> Result<DocQaConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Endpoints, models and credentials for the provider adapters.
///
/// Resolved from the environment at start-up; the pipeline itself never
/// sees these values.
#[derive(Clone, Default, PartialEq)]
pub struct ProviderSettings {
    /// API key for the chat completions endpoint.
    pub llm_api_key: Option<String>,
    /// Base URL of an OpenAI-compatible chat completions API.
    pub llm_base_url: Option<String>,
    /// Chat model name.
    pub llm_model: Option<String>,
    /// API key for the embeddings endpoint.
    pub embedding_api_key: Option<String>,
    /// Base URL of an OpenAI-compatible embeddings API.
    pub embedding_base_url: Option<String>,
    /// Embedding model name.
    pub embedding_model: Option<String>,
    /// Embedding dimensionality override.
    pub embedding_dimensions: Option<usize>,
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |key: &Option<String>| key.as_ref().map(|_| "<redacted>");
        f.debug_struct("ProviderSettings")
            .field("llm_api_key", &redact(&self.llm_api_key))
            .field("llm_base_url", &self.llm_base_url)
            .field("llm_model", &self.llm_model)
            .field("embedding_api_key", &redact(&self.embedding_api_key))
            .field("embedding_base_url", &self.embedding_base_url)
            .field("embedding_model", &self.embedding_model)
            .field("embedding_dimensions", &self.embedding_dimensions)
            .finish()
    }
}

impl ProviderSettings {
    /// Resolve provider settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve provider settings from a variable lookup function.
    ///
    /// `DOCQA_LLM_API_KEY` falls back to `GROQ_API_KEY`, and
    /// `DOCQA_EMBEDDING_API_KEY` falls back to `OPENAI_API_KEY`. Empty values
    /// count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Ok(Self {
            llm_api_key: get("DOCQA_LLM_API_KEY").or_else(|| get("GROQ_API_KEY")),
            llm_base_url: get("DOCQA_LLM_BASE_URL"),
            llm_model: get("DOCQA_LLM_MODEL"),
            embedding_api_key: get("DOCQA_EMBEDDING_API_KEY").or_else(|| get("OPENAI_API_KEY")),
            embedding_base_url: get("DOCQA_EMBEDDING_BASE_URL"),
            embedding_model: get("DOCQA_EMBEDDING_MODEL"),
            embedding_dimensions: parse_var(&get, "DOCQA_EMBEDDING_DIMENSIONS")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = DocQaConfig::default();
        assert_eq!(config.chunk_size, 700);
        assert_eq!(config.chunk_overlap, 100);
        assert_eq!(config.target_languages, vec!["gu", "hi", "ta"]);
        assert_eq!(config.wrap_width, 110);
        assert!(DocQaConfig::builder().build().is_ok());
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        let err = DocQaConfig::builder().chunk_size(100).chunk_overlap(100).build().unwrap_err();
        assert!(matches!(err, DocQaError::Config(_)));
    }

    #[test]
    fn rejects_zero_top_k_and_width() {
        assert!(DocQaConfig::builder().top_k(0).build().is_err());
        assert!(DocQaConfig::builder().wrap_width(0).build().is_err());
        assert!(DocQaConfig::builder().generation_timeout_secs(0).build().is_err());
    }

    #[test]
    fn env_overrides_are_applied() {
        let config = DocQaConfig::from_lookup(lookup(&[
            ("DOCQA_CHUNK_SIZE", "400"),
            ("DOCQA_CHUNK_OVERLAP", "50"),
            ("DOCQA_TARGET_LANGUAGES", "hi, ta ,"),
            ("DOCQA_SIMILARITY_THRESHOLD", "0.25"),
        ]))
        .unwrap();
        assert_eq!(config.chunk_size, 400);
        assert_eq!(config.chunk_overlap, 50);
        assert_eq!(config.target_languages, vec!["hi", "ta"]);
        assert_eq!(config.similarity_threshold, Some(0.25));
    }

    #[test]
    fn env_parse_failure_is_config_error() {
        let err = DocQaConfig::from_lookup(lookup(&[("DOCQA_TOP_K", "many")])).unwrap_err();
        assert!(err.to_string().contains("DOCQA_TOP_K"));
    }

    #[test]
    fn provider_keys_fall_back_and_are_redacted() {
        let settings = ProviderSettings::from_lookup(lookup(&[
            ("GROQ_API_KEY", "gsk-secret"),
            ("DOCQA_EMBEDDING_API_KEY", ""),
            ("OPENAI_API_KEY", "sk-secret"),
        ]))
        .unwrap();
        assert_eq!(settings.llm_api_key.as_deref(), Some("gsk-secret"));
        assert_eq!(settings.embedding_api_key.as_deref(), Some("sk-secret"));
        let debug = format!("{settings:?}");
        assert!(!debug.contains("secret"));
    }
}
