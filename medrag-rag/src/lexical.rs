//! BM25 lexical ranking.
//!
//! Term statistics are computed once per [`Generation`] at write time;
//! [`LexicalRetriever`] scores queries against them with the Okapi BM25
//! formula (saturating term frequency, IDF weighting, length normalization
//! against the corpus average).

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::debug;

use crate::config::{Bm25Params, RetrievalMode};
use crate::document::{Document, SearchResult};
use crate::error::{RagError, Result};
use crate::retriever::{Retriever, rank, validate_query};
use crate::store::Generation;

/// Split text into lower-cased alphanumeric terms.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Per-generation term statistics.
#[derive(Debug, Clone, Default)]
pub struct Bm25Index {
    term_freqs: Vec<HashMap<String, u32>>,
    lengths: Vec<usize>,
    doc_freqs: HashMap<String, usize>,
    avg_len: f32,
}

impl Bm25Index {
    /// Collect term frequencies, document frequencies and lengths.
    pub fn build(documents: &[Document]) -> Self {
        let mut term_freqs = Vec::with_capacity(documents.len());
        let mut lengths = Vec::with_capacity(documents.len());
        let mut doc_freqs: HashMap<String, usize> = HashMap::new();

        for document in documents {
            let terms = tokenize(&document.content);
            lengths.push(terms.len());
            let mut freqs: HashMap<String, u32> = HashMap::new();
            for term in terms {
                *freqs.entry(term).or_default() += 1;
            }
            for term in freqs.keys() {
                *doc_freqs.entry(term.clone()).or_default() += 1;
            }
            term_freqs.push(freqs);
        }

        let total: usize = lengths.iter().sum();
        let avg_len = if lengths.is_empty() { 0.0 } else { total as f32 / lengths.len() as f32 };
        Self { term_freqs, lengths, doc_freqs, avg_len }
    }

    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    pub fn avg_len(&self) -> f32 {
        self.avg_len
    }

    /// Lucene-style IDF, always non-negative.
    fn idf(&self, term: &str) -> f32 {
        let n = self.len() as f32;
        let df = self.doc_freqs.get(term).copied().unwrap_or(0) as f32;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    /// Score every document against the query, in document order.
    pub fn score(&self, query: &str, params: &Bm25Params) -> Vec<f32> {
        let mut terms = tokenize(query);
        terms.sort();
        terms.dedup();

        let avg_len = self.avg_len.max(f32::EPSILON);
        let idfs: Vec<(String, f32)> = terms
            .into_iter()
            .map(|t| {
                let idf = self.idf(&t);
                (t, idf)
            })
            .collect();

        self.term_freqs
            .iter()
            .zip(&self.lengths)
            .map(|(freqs, &len)| {
                let norm = params.k1 * (1.0 - params.b + params.b * (len as f32 / avg_len));
                idfs.iter()
                    .map(|(term, idf)| {
                        let tf = freqs.get(term).copied().unwrap_or(0) as f32;
                        if tf == 0.0 { 0.0 } else { idf * tf * (params.k1 + 1.0) / (tf + norm) }
                    })
                    .sum()
            })
            .collect()
    }
}

/// Ranks documents by BM25 score.
#[derive(Debug, Clone, Default)]
pub struct LexicalRetriever {
    params: Bm25Params,
}

impl LexicalRetriever {
    pub fn new(params: Bm25Params) -> Self {
        Self { params }
    }
}

#[async_trait]
impl Retriever for LexicalRetriever {
    fn mode(&self) -> RetrievalMode {
        RetrievalMode::Lexical
    }

    async fn retrieve(
        &self,
        generation: &Generation,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        validate_query(query, top_k)?;
        if tokenize(query).is_empty() {
            return Err(RagError::InvalidQuery(format!("query {query:?} has no searchable terms")));
        }
        let scores = generation.lexical().score(query, &self.params);
        debug!(generation = generation.id(), candidates = scores.len(), "bm25 scored");
        Ok(rank(generation.documents(), scores, top_k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<Document> {
        vec![
            Document::new("1", "Statins lower LDL cholesterol in adults."),
            Document::new("2", "Metformin is first-line therapy for type 2 diabetes."),
            Document::new("3", "High-dose statins and muscle pain: statins statins."),
        ]
    }

    #[test]
    fn tokenize_lowercases_and_splits_on_punctuation() {
        assert_eq!(tokenize("Type-2 Diabetes, HbA1c!"), ["type", "2", "diabetes", "hba1c"]);
        assert!(tokenize("  ?! ").is_empty());
    }

    #[test]
    fn term_frequency_saturates() {
        let index = Bm25Index::build(&corpus());
        let scores = index.score("statins", &Bm25Params::default());
        assert!(scores[2] > scores[0]);
        assert!(scores[2] < scores[0] * 3.0);
        assert_eq!(scores[1], 0.0);
    }

    #[test]
    fn rarer_terms_weigh_more() {
        let index = Bm25Index::build(&corpus());
        assert!(index.idf("metformin") > index.idf("statins"));
        assert!(index.idf("unseen") > index.idf("metformin"));
    }

    #[tokio::test]
    async fn retrieves_best_match_first() {
        let retriever = LexicalRetriever::default();
        let generation = Generation::new(1, corpus());
        let results = retriever.retrieve(&generation, "metformin diabetes", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].document.id, "2");
    }

    #[tokio::test]
    async fn query_without_terms_is_invalid() {
        let generation = Generation::new(1, corpus());
        let result = LexicalRetriever::default().retrieve(&generation, "???", 2).await;
        assert!(matches!(result, Err(RagError::InvalidQuery(_))));
    }

    #[tokio::test]
    async fn empty_index_scores_nothing() {
        let generation = Generation::new(1, Vec::new());
        let results = LexicalRetriever::default().retrieve(&generation, "anything", 5).await.unwrap();
        assert!(results.is_empty());
    }
}
