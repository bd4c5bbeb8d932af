//! Retrieval strategies over a published [`Generation`].
//!
//! Both strategies implement [`Retriever`]: [`LexicalRetriever`](crate::LexicalRetriever)
//! ranks by BM25, [`EmbeddingRetriever`] by cosine similarity between a query
//! embedding and document embeddings cached on the generation at write time.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::config::{RetrievalMode, RetryPolicy};
use crate::document::{Document, SearchResult};
use crate::embedding::{EmbeddingProvider, cosine_similarity};
use crate::error::{RagError, Result};
use crate::retry::with_retry;
use crate::store::Generation;

/// A ranking strategy over one generation of documents.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Which strategy this is.
    fn mode(&self) -> RetrievalMode;

    /// Derive strategy-specific data for a generation before it is published.
    ///
    /// The default implementation adds nothing.
    async fn index(&self, generation: Generation) -> Result<Generation> {
        Ok(generation)
    }

    /// Return up to `top_k` documents ordered by descending score.
    ///
    /// Ties keep insertion order. An empty generation yields an empty result.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidQuery`] for blank query text or `top_k == 0`.
    async fn retrieve(
        &self,
        generation: &Generation,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchResult>>;
}

/// Reject blank queries and a zero `top_k`.
pub fn validate_query(query: &str, top_k: usize) -> Result<()> {
    if query.trim().is_empty() {
        return Err(RagError::InvalidQuery("query text must not be empty".to_string()));
    }
    if top_k == 0 {
        return Err(RagError::InvalidQuery("top_k must be greater than zero".to_string()));
    }
    Ok(())
}

/// Pair documents with their scores, sort descending (stable, so ties keep
/// insertion order) and keep the first `top_k`.
pub fn rank(documents: &[Document], scores: Vec<f32>, top_k: usize) -> Vec<SearchResult> {
    let mut scored: Vec<(usize, f32)> = scores
        .into_iter()
        .map(|s| if s.is_nan() { f32::NEG_INFINITY } else { s })
        .enumerate()
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(top_k);
    scored
        .into_iter()
        .map(|(i, score)| SearchResult { document: documents[i].clone(), score })
        .collect()
}

/// Ranks documents by cosine similarity of embeddings.
///
/// Document vectors are computed in batches when a generation is indexed
/// and cached on it; only the query is embedded per call.
pub struct EmbeddingRetriever {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    retry: RetryPolicy,
}

impl EmbeddingRetriever {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { provider, batch_size: 32, retry: RetryPolicy::default() }
    }

    /// Set how many documents are embedded per provider call.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set the retry policy for embedding calls.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let provider = self.provider.as_ref();
        let embeddings =
            with_retry(&self.retry, "embed_batch", move || provider.embed_batch(texts)).await?;
        if embeddings.len() != texts.len() {
            return Err(RagError::Embedding {
                provider: "embedding".to_string(),
                message: format!("requested {} embeddings, got {}", texts.len(), embeddings.len()),
            });
        }
        Ok(embeddings)
    }
}

#[async_trait]
impl Retriever for EmbeddingRetriever {
    fn mode(&self) -> RetrievalMode {
        RetrievalMode::Embedding
    }

    async fn index(&self, generation: Generation) -> Result<Generation> {
        let mut embeddings = Vec::with_capacity(generation.len());
        for batch in generation.documents().chunks(self.batch_size) {
            let texts: Vec<&str> = batch.iter().map(|d| d.content.as_str()).collect();
            let vectors = self.embed_batch(&texts).await.map_err(|e| {
                error!(generation = generation.id(), error = %e, "embedding failed during indexing");
                e
            })?;
            embeddings.extend(vectors);
        }
        info!(generation = generation.id(), document_count = embeddings.len(), "embedded generation");
        generation.with_embeddings(embeddings)
    }

    async fn retrieve(
        &self,
        generation: &Generation,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        validate_query(query, top_k)?;
        if generation.is_empty() {
            return Ok(Vec::new());
        }
        let Some(embeddings) = generation.embeddings() else {
            return Err(RagError::Pipeline(format!(
                "generation {} was not indexed for embedding retrieval",
                generation.id()
            )));
        };

        let provider = self.provider.as_ref();
        let query_embedding = with_retry(&self.retry, "embed_query", move || provider.embed(query))
            .await
            .map_err(|e| {
                error!(error = %e, "embedding failed during query");
                e
            })?;
        let expected = embeddings.first().map_or(0, Vec::len);
        if query_embedding.len() != expected {
            error!(expected, actual = query_embedding.len(), "query embedding dimension mismatch");
            return Err(RagError::Embedding {
                provider: "embedding".to_string(),
                message: format!(
                    "query embedding has {} dimensions, documents have {expected}",
                    query_embedding.len()
                ),
            });
        }

        let scores = embeddings.iter().map(|e| cosine_similarity(e, &query_embedding)).collect();
        debug!(generation = generation.id(), candidates = embeddings.len(), "cosine scored");
        Ok(rank(generation.documents(), scores, top_k))
    }
}
