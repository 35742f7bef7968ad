//! Answer synthesis under the context-only policy.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::document::SearchResult;
use crate::error::{DocQaError, Result};
use crate::generation::{GenerationRequest, Generator};
use crate::policy::{AnswerKind, AnswerPolicy, NOT_AVAILABLE, Verdict, normalize_question};
use crate::session::Turn;

/// A synthesized base-language answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    /// The answer text.
    pub text: String,
    /// How the answer was produced.
    pub kind: AnswerKind,
}

impl From<Verdict> for Answer {
    fn from(verdict: Verdict) -> Self {
        Self { text: verdict.text.to_string(), kind: verdict.kind }
    }
}

/// Turns retrieved chunks and a question into one grounded answer.
pub struct AnswerSynthesizer {
    generator: Arc<dyn Generator>,
    policy: AnswerPolicy,
    timeout: Duration,
}

impl AnswerSynthesizer {
    /// Create a synthesizer calling `generator` under `policy`.
    pub fn new(generator: Arc<dyn Generator>, policy: AnswerPolicy, timeout: Duration) -> Self {
        Self { generator, policy, timeout }
    }

    /// The policy in force.
    pub fn policy(&self) -> &AnswerPolicy {
        &self.policy
    }

    /// Answer small talk without any context, or return `None`.
    pub fn small_talk(&self, question: &str) -> Option<Answer> {
        self.policy.small_talk(&normalize_question(question)).map(Answer::from)
    }

    /// Synthesize the answer to `question` from `retrieved` chunks.
    ///
    /// Replies the policy settles locally are returned without a generation
    /// call. Otherwise the policy, the joined chunk texts and the question
    /// are sent to the generator and its trimmed reply is returned; an empty
    /// reply counts as "not available".
    ///
    /// # Errors
    ///
    /// Returns [`DocQaError::GenerationUnavailable`] if the generator fails or
    /// does not reply within the configured timeout.
    pub async fn synthesize(
        &self,
        retrieved: &[SearchResult],
        question: &str,
        history: Vec<Turn>,
    ) -> Result<Answer> {
        let question = normalize_question(question);

        if let Some(verdict) = self.policy.precheck(&question, retrieved) {
            debug!(kind = ?verdict.kind, "answer decided by policy precheck");
            return Ok(verdict.into());
        }

        let request = GenerationRequest {
            policy: self.policy.instructions().to_string(),
            context: join_context(retrieved),
            question,
            history,
        };

        let provider = self.generator.name().to_string();
        let call = self.generator.generate(&request);
        let reply = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e @ DocQaError::GenerationUnavailable { .. })) => {
                error!(provider = %provider, error = %e, "generation failed");
                return Err(e);
            }
            Ok(Err(e)) => {
                error!(provider = %provider, error = %e, "generation failed");
                return Err(DocQaError::GenerationUnavailable { provider, message: e.to_string() });
            }
            Err(_) => {
                let secs = self.timeout.as_secs();
                error!(provider = %provider, timeout_secs = secs, "generation timed out");
                return Err(DocQaError::GenerationUnavailable {
                    provider,
                    message: format!("no reply within {secs}s"),
                });
            }
        };

        let text = reply.trim();
        if text.is_empty() {
            return Ok(Answer { text: NOT_AVAILABLE.to_string(), kind: AnswerKind::NoAnswer });
        }

        let kind = self.policy.classify_reply(text);
        debug!(provider = %provider, kind = ?kind, "generated answer");
        Ok(Answer { text: text.to_string(), kind })
    }
}

/// Join chunk texts, best match first, separated by blank lines.
fn join_context(retrieved: &[SearchResult]) -> String {
    retrieved.iter().map(|r| r.chunk.text.trim()).collect::<Vec<_>>().join("\n\n")
}
