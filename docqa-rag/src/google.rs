//! Google Translate provider using the public `translate_a/single` endpoint.
//!
//! This module is only available when the `google-translate` feature is enabled.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error};

use crate::error::{DocQaError, Result};
use crate::translate::Translator;

/// The public web translation endpoint.
const TRANSLATE_URL: &str = "https://translate.googleapis.com/translate_a/single";

/// Longest text sent in one request; longer answers are split on line breaks.
const MAX_REQUEST_CHARS: usize = 4500;

/// A [`Translator`] backed by Google's public web translation endpoint.
///
/// Needs no API key. Long texts are sent in several requests, split between
/// lines, and joined back with the original line breaks.
pub struct GoogleTranslator {
    client: reqwest::Client,
    url: String,
}

impl GoogleTranslator {
    /// Create a translator using the public endpoint.
    pub fn new() -> Self {
        Self { client: reqwest::Client::new(), url: TRANSLATE_URL.to_string() }
    }

    /// Point the translator at another endpoint speaking the same protocol.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    fn failed(target: &str, message: String) -> DocQaError {
        DocQaError::TranslationFailed { language: target.to_string(), message }
    }

    async fn translate_piece(&self, text: &str, source: &str, target: &str) -> Result<String> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("client", "gtx"), ("sl", source), ("tl", target), ("dt", "t"), ("q", text)])
            .send()
            .await
            .map_err(|e| {
                error!(language = target, error = %e, "translation request failed");
                Self::failed(target, format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            error!(language = target, %status, "translation API error");
            return Err(Self::failed(target, format!("API returned {status}")));
        }

        let body: Value = response.json().await.map_err(|e| {
            error!(language = target, error = %e, "failed to parse translation response");
            Self::failed(target, format!("failed to parse response: {e}"))
        })?;

        parse_translation(&body)
            .ok_or_else(|| Self::failed(target, "response had no translated segments".to_string()))
    }
}

impl Default for GoogleTranslator {
    fn default() -> Self {
        Self::new()
    }
}

/// Concatenate the translated segments of a `translate_a/single` reply.
///
/// The reply is a nested array whose first element lists segments as
/// `[translated, original, ...]`.
fn parse_translation(body: &Value) -> Option<String> {
    let segments = body.get(0)?.as_array()?;
    let text: String =
        segments.iter().filter_map(|segment| segment.get(0).and_then(Value::as_str)).collect();
    (!segments.is_empty()).then_some(text)
}

/// Group lines into pieces of at most `limit` characters where possible.
///
/// A single line longer than `limit` becomes its own piece.
fn split_for_requests(text: &str, limit: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current: Option<String> = None;
    for line in text.split('\n') {
        match current.as_mut() {
            Some(piece) if piece.chars().count() + 1 + line.chars().count() <= limit => {
                piece.push('\n');
                piece.push_str(line);
            }
            _ => {
                pieces.extend(current.take());
                current = Some(line.to_string());
            }
        }
    }
    pieces.extend(current);
    pieces
}

#[async_trait]
impl Translator for GoogleTranslator {
    fn name(&self) -> &str {
        "google-translate"
    }

    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String> {
        if text.trim().is_empty() {
            return Ok(text.to_string());
        }

        let pieces = split_for_requests(text, MAX_REQUEST_CHARS);
        debug!(language = target, pieces = pieces.len(), text_len = text.len(), "translating");

        let mut translated = Vec::with_capacity(pieces.len());
        for piece in &pieces {
            if piece.trim().is_empty() {
                translated.push(piece.clone());
            } else {
                translated.push(self.translate_piece(piece, source, target).await?);
            }
        }
        Ok(translated.join("\n"))
    }
}
