//! Question-to-articles acquisition with partial-failure tolerance.
//!
//! ```text
//! question ──► rewrite ──► search ──► fetch each id ──► Acquisition
//!                 │           │             │
//!               None      error/empty    failed id recorded, batch continues
//!                 └───────────┴──► empty acquisition
//! ```

use std::sync::Arc;

use futures::StreamExt;
use medrag_rag::{ArticleRecord, ArticleSet, QuestionArticles, Result};
use tracing::{info, warn};

use crate::source::{ArticleFetcher, LiteratureSearch, QueryRewriter};

/// What was gathered for one question.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Acquisition {
    pub question: String,
    /// The rewritten search query; `None` when rewriting failed.
    pub query: Option<String>,
    pub articles: ArticleSet,
    /// Identifiers whose fetch failed, in search order.
    pub failed_ids: Vec<String>,
}

impl Acquisition {
    fn empty(question: &str, query: Option<String>) -> Self {
        Self { question: question.to_string(), query, ..Self::default() }
    }
}

/// Runs the acquisition collaborators for one question at a time.
pub struct Collector {
    rewriter: Arc<dyn QueryRewriter>,
    search: Arc<dyn LiteratureSearch>,
    fetcher: Arc<dyn ArticleFetcher>,
    max_results: usize,
    max_parallel_fetches: usize,
}

impl Collector {
    pub fn new(
        rewriter: Arc<dyn QueryRewriter>,
        search: Arc<dyn LiteratureSearch>,
        fetcher: Arc<dyn ArticleFetcher>,
    ) -> Self {
        Self { rewriter, search, fetcher, max_results: 20, max_parallel_fetches: 3 }
    }

    /// Identifiers requested per search.
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }

    /// Article fetches in flight at once. Output order is unaffected.
    pub fn with_max_parallel_fetches(mut self, max_parallel_fetches: usize) -> Self {
        self.max_parallel_fetches = max_parallel_fetches.max(1);
        self
    }

    /// Gather articles for `question`.
    ///
    /// Never fails: a failed rewrite or search yields an empty acquisition,
    /// and a failed fetch is recorded in `failed_ids` while the rest
    /// continue.
    pub async fn collect(&self, question: &str) -> Acquisition {
        let Some(query) = self.rewriter.rewrite(question).await else {
            warn!(question, "no search query, skipping acquisition");
            return Acquisition::empty(question, None);
        };

        let ids = match self.search.search(&query, self.max_results).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(service = self.search.name(), error = %e, "search failed, no articles collected");
                return Acquisition::empty(question, Some(query));
            }
        };
        if ids.is_empty() {
            info!(query = %query, "no articles found for query");
            return Acquisition::empty(question, Some(query));
        }

        let fetcher = self.fetcher.as_ref();
        let results: Vec<(String, Result<ArticleRecord>)> = futures::stream::iter(ids)
            .map(|id| async move {
                let result = fetcher.fetch(&id).await;
                (id, result)
            })
            .buffered(self.max_parallel_fetches)
            .collect()
            .await;

        let mut acquisition = Acquisition::empty(question, Some(query));
        for (id, result) in results {
            match result {
                Ok(record) => acquisition.articles.insert(id, record),
                Err(e) => {
                    warn!(document.id = %id, error = %e, "article fetch failed, skipping");
                    acquisition.failed_ids.push(id);
                }
            }
        }

        info!(
            result_count = acquisition.articles.len(),
            failed = acquisition.failed_ids.len(),
            "acquisition completed"
        );
        acquisition
    }

    /// Gather articles for each question in turn.
    pub async fn collect_all(&self, questions: &[String]) -> Vec<Acquisition> {
        let mut acquisitions = Vec::with_capacity(questions.len());
        for question in questions {
            acquisitions.push(self.collect(question).await);
        }
        acquisitions
    }
}

/// Key each acquisition's articles by its question.
pub fn question_articles(acquisitions: &[Acquisition]) -> QuestionArticles {
    acquisitions.iter().map(|a| (a.question.clone(), a.articles.clone())).collect()
}

/// Union of all acquired articles; a later duplicate id replaces an earlier one.
pub fn merged_articles(acquisitions: &[Acquisition]) -> ArticleSet {
    let mut merged = ArticleSet::new();
    for acquisition in acquisitions {
        merged.extend(acquisition.articles.clone());
    }
    merged
}

/// Split a question file on `?`, keeping the mark and dropping blanks.
pub fn split_questions(content: &str) -> Vec<String> {
    content
        .split('?')
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(|q| format!("{q}?"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_question_marks() {
        let content = "Do statins help?\n  Is aspirin safe? \n\n?Trailing text";
        assert_eq!(
            split_questions(content),
            ["Do statins help?", "Is aspirin safe?", "Trailing text?"]
        );
    }

    #[test]
    fn blank_file_has_no_questions() {
        assert!(split_questions("  \n ? ?").is_empty());
    }
}
