//! Generator trait for producing answers from a policy, context and question.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::session::Turn;

/// Everything a generator receives for one question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationRequest {
    /// The behavioural policy the answer must obey.
    pub policy: String,
    /// Retrieved chunk texts joined by blank lines.
    pub context: String,
    /// The normalized question.
    pub question: String,
    /// Earlier turns of the caller's session, oldest first.
    pub history: Vec<Turn>,
}

/// A text generation backend.
///
/// Implementations turn a [`GenerationRequest`] into a single reply. Any
/// transport or backend failure must be reported as
/// [`DocQaError::GenerationUnavailable`](crate::DocQaError::GenerationUnavailable).
#[async_trait]
pub trait Generator: Send + Sync {
    /// A short provider name for logs and errors.
    fn name(&self) -> &str;

    /// Generate the reply for `request`.
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}
