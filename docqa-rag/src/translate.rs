//! Translator trait and line-preserving reflow.

use async_trait::async_trait;

use crate::error::Result;

/// A machine translation backend.
///
/// Failures are per call; the expander decides how to retry and report them.
#[async_trait]
pub trait Translator: Send + Sync {
    /// A short provider name for logs and errors.
    fn name(&self) -> &str;

    /// Translate `text` from language `source` into language `target`.
    ///
    /// Language codes are ISO 639-1 (`en`, `gu`, `hi`, `ta`, ...).
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String>;
}

/// Reflow every line of `text` to `width` columns independently.
///
/// Existing line breaks, including a trailing one, are kept as they are; a
/// line longer than `width` is wrapped onto extra lines directly below it.
pub fn wrap_preserving_lines(text: &str, width: usize) -> String {
    text.split('\n').map(|line| textwrap::fill(line, width)).collect::<Vec<_>>().join("\n")
}
