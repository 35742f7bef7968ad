//! End-to-end tests of the question-answering pipeline with fake providers.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use common::{DownGenerator, DownTranslator, TaggingTranslator, harness, harness_with, id};
use docqa_rag::policy::{ACRONYM_NOT_AVAILABLE, GREETING_REPLY, WORD_NOT_AVAILABLE};
use docqa_rag::{
    AnswerKind, ErrorKind, InMemoryIndexStore, IndexSource, PipelineStage, QueryRequest,
};

use PipelineStage::*;

fn ask(question: &str, language: &str) -> QueryRequest {
    QueryRequest::new(id("glossary.txt"), question, language)
}

#[tokio::test]
async fn greeting_is_answered_without_touching_the_document() {
    let h = harness().await;
    let session = h.pipeline.new_session();

    let outcome = h.pipeline.ask(&session, &ask("Hello", "en")).await.unwrap();

    assert_eq!(outcome.answer, GREETING_REPLY);
    assert_eq!(outcome.kind, AnswerKind::Canned);
    assert_eq!(outcome.index_source, None);
    assert_eq!(outcome.stages, vec![Idle, Synthesizing, Expanding, Done]);
    assert_eq!(outcome.bundle.get("hi"), Some("[hi] Hello, please ask your question."));

    assert_eq!(h.embedder.batches(), 0);
    assert_eq!(h.embedder.single_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.generator.calls.load(Ordering::SeqCst), 0);
    assert!(!h.pipeline.cache().contains(&id("glossary.txt")).await.unwrap());
}

#[tokio::test]
async fn acronym_in_context_is_expanded() {
    let h = harness().await;
    let session = h.pipeline.new_session();

    let outcome = h.pipeline.ask(&session, &ask("what is fullform of ML", "en")).await.unwrap();

    assert!(outcome.answer.contains("Machine Learning"), "answer was {:?}", outcome.answer);
    assert_eq!(outcome.kind, AnswerKind::Grounded);
    assert_eq!(outcome.index_source, Some(IndexSource::Built));
    assert_eq!(
        outcome.stages,
        vec![
            Idle,
            DocumentLoading,
            Chunking,
            IndexReady,
            Retrieving,
            Synthesizing,
            Expanding,
            Done
        ]
    );
}

#[tokio::test]
async fn acronym_missing_from_context_is_declined() {
    let h = harness().await;
    let session = h.pipeline.new_session();

    let outcome = h.pipeline.ask(&session, &ask("what is fullform of XZ", "en")).await.unwrap();

    assert_eq!(outcome.answer, ACRONYM_NOT_AVAILABLE);
    assert_eq!(outcome.kind, AnswerKind::NoAnswer);
    assert_eq!(h.generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_single_word_gets_word_reply() {
    let h = harness().await;
    let session = h.pipeline.new_session();

    let outcome = h.pipeline.ask(&session, &ask("payroll", "en")).await.unwrap();

    assert_eq!(outcome.answer, WORD_NOT_AVAILABLE);
    assert_eq!(outcome.kind, AnswerKind::NoAnswer);
}

#[tokio::test]
async fn second_question_reuses_the_index() {
    let h = harness().await;
    let session = h.pipeline.new_session();

    let first = h.pipeline.ask(&session, &ask("what is the release code", "en")).await.unwrap();
    let second = h.pipeline.ask(&session, &ask("what is fullform of DL", "en")).await.unwrap();

    assert_eq!(first.index_source, Some(IndexSource::Built));
    assert_eq!(first.answer, "The release code is 42.");
    assert_eq!(second.index_source, Some(IndexSource::Cached));
    assert!(second.answer.contains("Deep Learning"));
    assert_eq!(
        second.stages,
        vec![Idle, IndexReady, Retrieving, Synthesizing, Expanding, Done]
    );
    assert_eq!(h.embedder.batches(), 1);
    assert_eq!(session.history().await.len(), 2);
}

#[tokio::test]
async fn selected_language_is_returned() {
    let h = harness().await;
    let session = h.pipeline.new_session();

    let outcome = h.pipeline.ask(&session, &ask("what is the release code", "hi")).await.unwrap();

    assert_eq!(outcome.language, "hi");
    assert_eq!(outcome.answer, "[hi] The release code is 42.");
    let languages: Vec<&str> = outcome.bundle.languages().collect();
    assert_eq!(languages, vec!["en", "gu", "hi", "ta"]);
    assert_eq!(outcome.bundle.get("en"), Some("The release code is 42."));
}

#[tokio::test]
async fn failed_translations_fall_back_to_english() {
    let h = harness_with(Arc::new(InMemoryIndexStore::new()), Arc::new(DownTranslator), None).await;
    let session = h.pipeline.new_session();

    let outcome = h.pipeline.ask(&session, &ask("what is the release code", "ta")).await.unwrap();

    assert_eq!(outcome.language, "en");
    assert_eq!(outcome.answer, "The release code is 42.");
    assert_eq!(outcome.bundle.languages().collect::<Vec<_>>(), vec!["en"]);
    for language in ["gu", "hi", "ta"] {
        assert!(outcome.bundle.is_unavailable(language), "{language} should be unavailable");
    }
}

#[tokio::test]
async fn unreadable_document_fails_at_loading() {
    let h = harness().await;
    let session = h.pipeline.new_session();
    let request = QueryRequest::new(id("missing.txt"), "what is the release code", "en");

    let failure = h.pipeline.ask(&session, &request).await.unwrap_err();

    assert_eq!(failure.stage, DocumentLoading);
    assert_eq!(failure.kind(), ErrorKind::DocumentUnreadable);
    assert_eq!(failure.stages, vec![Idle, DocumentLoading, Failed]);
    assert!(session.history().await.is_empty());
}

#[tokio::test]
async fn generator_outage_fails_at_synthesizing() {
    let h = harness_with(
        Arc::new(InMemoryIndexStore::new()),
        Arc::new(TaggingTranslator::default()),
        Some(Arc::new(DownGenerator)),
    )
    .await;
    let session = h.pipeline.new_session();

    let failure =
        h.pipeline.ask(&session, &ask("what is the release code", "en")).await.unwrap_err();

    assert_eq!(failure.stage, Synthesizing);
    assert_eq!(failure.kind(), ErrorKind::GenerationUnavailable);
    assert_eq!(failure.stages.last(), Some(&Failed));
    assert!(failure.to_string().contains("connection refused"));
}

#[tokio::test]
async fn empty_question_is_rejected_before_any_stage() {
    let h = harness().await;
    let session = h.pipeline.new_session();

    let failure = h.pipeline.ask(&session, &ask("   ", "en")).await.unwrap_err();

    assert_eq!(failure.kind(), ErrorKind::InvalidQuery);
    assert_eq!(failure.stages, vec![Idle, Failed]);
    assert_eq!(h.embedder.batches(), 0);
}

#[tokio::test]
async fn forgetting_a_document_rebuilds_once() {
    let h = harness().await;
    let session = h.pipeline.new_session();
    let doc = id("glossary.txt");

    assert_eq!(h.pipeline.prepare(&doc).await.unwrap(), IndexSource::Built);
    assert_eq!(h.pipeline.prepare(&doc).await.unwrap(), IndexSource::Cached);

    h.pipeline.forget(&doc).await.unwrap();
    h.pipeline.forget(&doc).await.unwrap();

    let rebuilt = h.pipeline.ask(&session, &ask("what is the release code", "en")).await.unwrap();
    let reused = h.pipeline.ask(&session, &ask("what is the release code", "en")).await.unwrap();

    assert_eq!(rebuilt.index_source, Some(IndexSource::Built));
    assert_eq!(reused.index_source, Some(IndexSource::Cached));
    assert_eq!(h.embedder.batches(), 2);
}

#[tokio::test]
async fn replaced_document_is_served_stale_until_forgotten() {
    let h = harness().await;
    let session = h.pipeline.new_session();
    let doc = id("glossary.txt");

    h.pipeline.prepare(&doc).await.unwrap();
    h.loader.insert_text(doc.clone(), "The release code is 99.").await;

    let stale = h.pipeline.ask(&session, &ask("what is the release code", "en")).await.unwrap();
    assert_eq!(stale.answer, "The release code is 42.");

    h.pipeline.forget(&doc).await.unwrap();
    let fresh = h.pipeline.ask(&session, &ask("what is the release code", "en")).await.unwrap();
    assert_eq!(fresh.answer, "The release code is 99.");
}
