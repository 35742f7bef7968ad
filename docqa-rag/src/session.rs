//! Per-caller conversation state.
//!
//! Each caller owns a [`ConversationSession`] and passes it into every
//! question; nothing about one conversation is visible to another.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

/// One answered question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    /// The normalized question.
    pub question: String,
    /// The base-language answer.
    pub answer: String,
    /// When the answer was produced.
    pub at: DateTime<Utc>,
}

/// Bounded history of one caller's questions and answers.
#[derive(Debug)]
pub struct ConversationSession {
    id: String,
    max_turns: usize,
    turns: Mutex<VecDeque<Turn>>,
}

impl ConversationSession {
    /// Create an empty session keeping at most `max_turns` turns.
    pub fn new(max_turns: usize) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), max_turns)
    }

    /// Create an empty session with a caller-chosen id.
    pub fn with_id(id: impl Into<String>, max_turns: usize) -> Self {
        Self { id: id.into(), max_turns, turns: Mutex::new(VecDeque::new()) }
    }

    /// The session id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// A snapshot of the stored turns, oldest first.
    pub async fn history(&self) -> Vec<Turn> {
        self.turns.lock().await.iter().cloned().collect()
    }

    /// Append a turn, evicting the oldest beyond the limit.
    pub async fn record(&self, question: impl Into<String>, answer: impl Into<String>) {
        if self.max_turns == 0 {
            return;
        }
        let mut turns = self.turns.lock().await;
        turns.push_back(Turn { question: question.into(), answer: answer.into(), at: Utc::now() });
        while turns.len() > self.max_turns {
            turns.pop_front();
        }
    }

    /// Forget every turn.
    pub async fn clear(&self) {
        self.turns.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn history_is_bounded_and_ordered() {
        let session = ConversationSession::new(2);
        session.record("q1", "a1").await;
        session.record("q2", "a2").await;
        session.record("q3", "a3").await;

        let history = session.history().await;
        let questions: Vec<&str> = history.iter().map(|t| t.question.as_str()).collect();
        assert_eq!(questions, vec!["q2", "q3"]);
    }

    #[tokio::test]
    async fn sessions_are_independent() {
        let a = ConversationSession::new(5);
        let b = ConversationSession::new(5);
        a.record("q", "a").await;
        assert_eq!(a.history().await.len(), 1);
        assert!(b.history().await.is_empty());
        assert_ne!(a.id(), b.id());

        a.clear().await;
        assert!(a.history().await.is_empty());
    }

    #[tokio::test]
    async fn zero_limit_keeps_nothing() {
        let session = ConversationSession::with_id("s-1", 0);
        session.record("q", "a").await;
        assert!(session.history().await.is_empty());
        assert_eq!(session.id(), "s-1");
    }
}
