//! Property tests for retrieval ordering and verdict extraction.

use std::sync::Arc;

use medrag_rag::{
    Bm25Params, Document, EmbeddingRetriever, Generation, HashingEmbeddingProvider,
    LexicalRetriever, Retriever, SearchResult, Verdict, interpret_forced_choice,
};
use proptest::prelude::*;

const VOCABULARY: &[&str] = &[
    "aspirin", "statin", "mortality", "fracture", "vitamin", "trial", "cohort", "risk", "dose",
    "placebo", "sepsis", "insulin",
];

fn arb_text() -> impl Strategy<Value = String> {
    proptest::collection::vec(proptest::sample::select(VOCABULARY), 1..12)
        .prop_map(|words| words.join(" "))
}

fn arb_corpus() -> impl Strategy<Value = Vec<Document>> {
    proptest::collection::vec(arb_text(), 1..20).prop_map(|texts| {
        texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| Document::new(i.to_string(), text))
            .collect()
    })
}

fn assert_ranked(results: &[SearchResult], corpus_len: usize, top_k: usize) -> Result<(), TestCaseError> {
    prop_assert_eq!(results.len(), top_k.min(corpus_len));
    for pair in results.windows(2) {
        prop_assert!(pair[0].score >= pair[1].score, "scores not descending: {:?}", pair);
    }
    Ok(())
}

/// For any corpus and query, lexical retrieval returns exactly
/// `min(top_k, |corpus|)` documents in non-increasing score order, and ties
/// keep insertion order.
mod prop_lexical_ordering {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn bounded_and_descending(corpus in arb_corpus(), query in arb_text(), top_k in 1usize..25) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let len = corpus.len();
            let results = rt.block_on(async {
                let generation = Generation::new(1, corpus);
                LexicalRetriever::new(Bm25Params::default())
                    .retrieve(&generation, &query, top_k)
                    .await
                    .unwrap()
            });

            assert_ranked(&results, len, top_k)?;
            for pair in results.windows(2) {
                if pair[0].score == pair[1].score {
                    let a: usize = pair[0].document.id.parse().unwrap();
                    let b: usize = pair[1].document.id.parse().unwrap();
                    prop_assert!(a < b, "tie broke insertion order: {} before {}", a, b);
                }
            }
        }
    }
}

/// The same guarantees hold for embedding retrieval.
mod prop_embedding_ordering {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn bounded_and_descending(corpus in arb_corpus(), query in arb_text(), top_k in 1usize..25) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let len = corpus.len();
            let results = rt.block_on(async {
                let retriever = EmbeddingRetriever::new(Arc::new(HashingEmbeddingProvider::new(64)))
                    .with_batch_size(4);
                let generation = retriever.index(Generation::new(1, corpus)).await.unwrap();
                retriever.retrieve(&generation, &query, top_k).await.unwrap()
            });

            assert_ranked(&results, len, top_k)?;
        }
    }
}

/// Verdict extraction depends only on the first line, and is stable.
mod prop_forced_choice {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn later_lines_never_change_the_verdict(first in "[A-Za-z ,.]{0,40}", rest in "[A-Za-z \n]{0,80}") {
            let alone = interpret_forced_choice(&first);
            let with_rest = interpret_forced_choice(&format!("{first}\n{rest}"));
            prop_assert_eq!(alone, with_rest);
            prop_assert_eq!(alone, interpret_forced_choice(&first));
        }

        #[test]
        fn yes_anywhere_on_the_first_line_wins(prefix in "[a-z ]{0,20}", suffix in "[a-z ]{0,20}") {
            let text = format!("{prefix}yes{suffix}");
            prop_assert_eq!(interpret_forced_choice(&text), Verdict::Yes);
        }
    }
}
