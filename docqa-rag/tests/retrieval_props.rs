//! Property tests for similarity search ordering.

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::{HashingEmbedder, id};
use docqa_rag::{Chunk, Retriever, SimilarityIndex};
use proptest::prelude::*;

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map(
        "non-zero embedding",
        |mut v| {
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm < 1e-8 {
                return None;
            }
            for val in &mut v {
                *val /= norm;
            }
            Some(v)
        },
    )
}

fn chunk(ordinal: usize, text: &str) -> Chunk {
    Chunk {
        id: format!("doc.txt_{ordinal}"),
        document_id: id("doc.txt"),
        ordinal,
        unit: 0,
        start: 0,
        end: text.chars().count(),
        text: text.to_string(),
        metadata: HashMap::new(),
    }
}

fn build(embeddings: Vec<Vec<f32>>) -> SimilarityIndex {
    let chunks = (0..embeddings.len()).map(|i| chunk(i, &format!("chunk {i}"))).collect();
    SimilarityIndex::build(id("doc.txt"), chunks, embeddings).unwrap()
}

/// Searching returns at most `top_k` results, ordered by descending score,
/// with equal scores in document order.
mod prop_search_ordering {
    use super::*;

    const DIM: usize = 16;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_ordered_descending_and_bounded_by_top_k(
            embeddings in proptest::collection::vec(arb_normalized_embedding(DIM), 1..20),
            query in arb_normalized_embedding(DIM),
            top_k in 1usize..25,
        ) {
            let count = embeddings.len();
            let index = build(embeddings);
            let results = index.search(&query, top_k);

            prop_assert_eq!(results.len(), top_k.min(count));
            for pair in results.windows(2) {
                prop_assert!(
                    pair[0].score >= pair[1].score,
                    "scores not descending: {} then {}",
                    pair[0].score,
                    pair[1].score
                );
                if pair[0].score == pair[1].score {
                    prop_assert!(pair[0].chunk.ordinal < pair[1].chunk.ordinal);
                }
            }
        }

        #[test]
        fn duplicate_embeddings_keep_document_order(
            embedding in arb_normalized_embedding(DIM),
            copies in 2usize..10,
        ) {
            let index = build(vec![embedding.clone(); copies]);
            let ordinals: Vec<usize> =
                index.search(&embedding, copies).iter().map(|r| r.chunk.ordinal).collect();
            prop_assert_eq!(ordinals, (0..copies).collect::<Vec<_>>());
        }

        #[test]
        fn search_is_deterministic_and_read_only(
            embeddings in proptest::collection::vec(arb_normalized_embedding(DIM), 1..10),
            query in arb_normalized_embedding(DIM),
        ) {
            let index = build(embeddings);
            let before = index.clone();

            let ordinals =
                |k| index.search(&query, k).iter().map(|r| r.chunk.ordinal).collect::<Vec<_>>();
            let first = ordinals(5);
            let second = ordinals(5);

            prop_assert_eq!(first, second);
            prop_assert_eq!(index, before);
        }
    }
}

#[tokio::test]
async fn retriever_ranks_matching_chunk_first() {
    let texts = ["billing happens monthly", "the release code is 42", "office opens at nine"];
    let chunks: Vec<Chunk> = texts.iter().enumerate().map(|(i, t)| chunk(i, t)).collect();
    let embeddings = texts.iter().map(|t| HashingEmbedder::vector(t)).collect();
    let index = SimilarityIndex::build(id("doc.txt"), chunks, embeddings).unwrap();

    let embedder = Arc::new(HashingEmbedder::new());
    let retriever = Retriever::new(embedder.clone(), 2, Duration::from_secs(5));
    let results = retriever.retrieve(&index, "release code").await.unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].chunk.text, "the release code is 42");
    assert!(results[0].score > results[1].score);
    assert_eq!(embedder.batches(), 0);
}

#[tokio::test]
async fn retriever_threshold_drops_weak_matches() {
    let texts = ["the release code is 42", "office opens at nine"];
    let chunks: Vec<Chunk> = texts.iter().enumerate().map(|(i, t)| chunk(i, t)).collect();
    let embeddings = texts.iter().map(|t| HashingEmbedder::vector(t)).collect();
    let index = SimilarityIndex::build(id("doc.txt"), chunks, embeddings).unwrap();

    let retriever = Retriever::new(Arc::new(HashingEmbedder::new()), 5, Duration::from_secs(5))
        .with_similarity_threshold(Some(0.5));
    let results = retriever.retrieve(&index, "release code").await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].chunk.ordinal, 0);
}
