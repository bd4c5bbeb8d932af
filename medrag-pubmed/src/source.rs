//! Collaborator capabilities used during acquisition.

use async_trait::async_trait;
use medrag_rag::{ArticleRecord, Result};

/// Turns a free-text question into a literature search query.
#[async_trait]
pub trait QueryRewriter: Send + Sync {
    /// `None` when no query could be produced; callers short-circuit on it.
    async fn rewrite(&self, question: &str) -> Option<String>;
}

/// Searches a literature index for article identifiers.
#[async_trait]
pub trait LiteratureSearch: Send + Sync {
    fn name(&self) -> &str;

    /// Identifiers in relevance order, at most `max_results`. No match is an
    /// empty vector.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::UpstreamFetch`](medrag_rag::RagError::UpstreamFetch)
    /// when the service cannot be reached or answers with a non-2xx status.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<String>>;
}

/// Fetches title and abstract for one article.
#[async_trait]
pub trait ArticleFetcher: Send + Sync {
    async fn fetch(&self, id: &str) -> Result<ArticleRecord>;
}

/// Uses the question verbatim as the search query.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerbatimRewriter;

#[async_trait]
impl QueryRewriter for VerbatimRewriter {
    async fn rewrite(&self, question: &str) -> Option<String> {
        let question = question.trim();
        (!question.is_empty()).then(|| question.to_string())
    }
}
