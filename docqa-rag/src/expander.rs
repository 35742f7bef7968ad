//! Multi-language answer bundles.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::DocQaConfig;
use crate::error::{DocQaError, Result};
use crate::translate::{Translator, wrap_preserving_lines};

/// One answer in every language it could be produced in.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AnswerBundle {
    /// Language code to answer text. Always holds the source language.
    pub answers: BTreeMap<String, String>,
    /// Language code to failure message for translations that failed.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub unavailable: BTreeMap<String, String>,
}

impl AnswerBundle {
    /// The answer in `language`, if it was produced.
    pub fn get(&self, language: &str) -> Option<&str> {
        self.answers.get(language).map(String::as_str)
    }

    /// Whether `language` was requested but its translation failed.
    pub fn is_unavailable(&self, language: &str) -> bool {
        self.unavailable.contains_key(language)
    }

    /// Languages with an answer, in code order.
    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.answers.keys().map(String::as_str)
    }
}

/// Translates a source-language answer into a fixed set of languages.
pub struct MultiLanguageExpander {
    translator: Arc<dyn Translator>,
    source_language: String,
    targets: Vec<String>,
    wrap_width: usize,
    timeout: Duration,
    retries: u32,
}

impl MultiLanguageExpander {
    /// Create an expander from `source_language` into `targets`.
    pub fn new(
        translator: Arc<dyn Translator>,
        source_language: impl Into<String>,
        targets: Vec<String>,
    ) -> Self {
        Self {
            translator,
            source_language: source_language.into(),
            targets,
            wrap_width: 110,
            timeout: Duration::from_secs(30),
            retries: 1,
        }
    }

    /// Create an expander with languages, width, timeout and retries from `config`.
    pub fn from_config(translator: Arc<dyn Translator>, config: &DocQaConfig) -> Self {
        Self::new(translator, config.source_language.clone(), config.target_languages.clone())
            .with_wrap_width(config.wrap_width)
            .with_timeout(config.translation_timeout())
            .with_retries(config.translation_retries)
    }

    /// Set the display width translations are reflowed to.
    pub fn with_wrap_width(mut self, width: usize) -> Self {
        self.wrap_width = width;
        self
    }

    /// Set the per-call translation timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set how many times a failed translation is retried.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// The language answers are synthesized in.
    pub fn source_language(&self) -> &str {
        &self.source_language
    }

    /// The languages answers are translated into.
    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// Whether a bundle from this expander can hold `language`.
    pub fn covers(&self, language: &str) -> bool {
        language == self.source_language || self.targets.iter().any(|t| t == language)
    }

    /// Build the bundle for `answer`.
    ///
    /// The source language maps to `answer` unchanged. Target languages are
    /// translated concurrently; a language whose translation fails after the
    /// configured retries is listed in [`AnswerBundle::unavailable`] and never
    /// affects the others.
    pub async fn expand(&self, answer: &str) -> AnswerBundle {
        let mut bundle = AnswerBundle::default();
        bundle.answers.insert(self.source_language.clone(), answer.to_string());

        let mut pending = Vec::new();
        for target in &self.targets {
            if *target == self.source_language {
                continue;
            }
            if pending.contains(&target.as_str()) {
                continue;
            }
            pending.push(target.as_str());
        }

        let translations = join_all(pending.into_iter().map(|target| async move {
            (target, self.translate_with_retry(answer, target).await)
        }))
        .await;

        for (target, result) in translations {
            match result {
                Ok(text) => {
                    let text = wrap_preserving_lines(&text, self.wrap_width);
                    bundle.answers.insert(target.to_string(), text);
                }
                Err(e) => {
                    warn!(
                        language = target,
                        translator = self.translator.name(),
                        error = %e,
                        "translation unavailable"
                    );
                    bundle.unavailable.insert(target.to_string(), e.to_string());
                }
            }
        }

        debug!(
            languages = bundle.answers.len(),
            unavailable = bundle.unavailable.len(),
            "expanded answer"
        );
        bundle
    }

    async fn translate_with_retry(&self, text: &str, target: &str) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.translate_once(text, target).await {
                Ok(translated) => return Ok(translated),
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    debug!(language = target, attempt, error = %e, "retrying translation");
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn translate_once(&self, text: &str, target: &str) -> Result<String> {
        let call = self.translator.translate(text, &self.source_language, target);
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(translated)) => Ok(translated),
            Ok(Err(e @ DocQaError::TranslationFailed { .. })) => Err(e),
            Ok(Err(e)) => Err(DocQaError::TranslationFailed {
                language: target.to_string(),
                message: e.to_string(),
            }),
            Err(_) => Err(DocQaError::TranslationFailed {
                language: target.to_string(),
                message: format!("no reply within {}s", self.timeout.as_secs()),
            }),
        }
    }
}
