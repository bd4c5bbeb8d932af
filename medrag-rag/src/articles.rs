//! The at-rest interchange format between acquisition and indexing.
//!
//! An [`ArticleSet`] is a JSON object keyed by article identifier:
//!
//! ```json
//! { "31452104": { "title": "...", "abstract": "..." } }
//! ```
//!
//! File order is preserved so that retrieval ties break the same way on
//! every load.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::document::{Document, TITLE_KEY};
use crate::error::Result;

/// Metadata key holding the PubMed identifier.
pub const PMID_KEY: &str = "pmid";

/// Title and abstract of one fetched article.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ArticleRecord {
    #[serde(default)]
    pub title: String,
    #[serde(rename = "abstract", default)]
    pub abstract_text: String,
}

/// Articles keyed by identifier, in insertion order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(transparent)]
pub struct ArticleSet {
    articles: IndexMap<String, ArticleRecord>,
}

impl ArticleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an article.
    pub fn insert(&mut self, id: impl Into<String>, record: ArticleRecord) {
        self.articles.insert(id.into(), record);
    }

    pub fn get(&self, id: &str) -> Option<&ArticleRecord> {
        self.articles.get(id)
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ArticleRecord)> {
        self.articles.iter()
    }

    /// Merge `other` into `self`; later entries replace earlier ones.
    pub fn extend(&mut self, other: ArticleSet) {
        self.articles.extend(other.articles);
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let set = Self::from_json_str(&std::fs::read_to_string(path)?)?;
        info!(path = %path.display(), article_count = set.len(), "loaded articles");
        Ok(set)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Convert to documents: the abstract becomes the content, the id and
    /// title go into metadata. Articles without an abstract are skipped.
    pub fn to_documents(&self) -> Vec<Document> {
        self.articles
            .iter()
            .filter_map(|(id, record)| {
                if record.abstract_text.trim().is_empty() {
                    warn!(document.id = %id, "skipping article without abstract");
                    return None;
                }
                Some(
                    Document::new(id.clone(), record.abstract_text.clone())
                        .with_metadata(PMID_KEY, id.as_str())
                        .with_metadata(TITLE_KEY, record.title.as_str()),
                )
            })
            .collect()
    }
}

impl FromIterator<(String, ArticleRecord)> for ArticleSet {
    fn from_iter<T: IntoIterator<Item = (String, ArticleRecord)>>(iter: T) -> Self {
        Self { articles: iter.into_iter().collect() }
    }
}

/// Article sets keyed by the question they were acquired for.
pub type QuestionArticles = IndexMap<String, ArticleSet>;

/// Load a `{question: {id: {title, abstract}}}` file.
pub fn load_question_articles(path: impl AsRef<Path>) -> Result<QuestionArticles> {
    let path = path.as_ref();
    let sets: QuestionArticles = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    info!(path = %path.display(), question_count = sets.len(), "loaded articles by question");
    Ok(sets)
}

/// Write a `{question: {id: {title, abstract}}}` file.
pub fn save_question_articles(path: impl AsRef<Path>, sets: &QuestionArticles) -> Result<()> {
    std::fs::write(path, serde_json::to_string_pretty(sets)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "42": {"title": "Y", "abstract": "X"},
        "7": {"title": "Untitled trial", "abstract": ""},
        "13": {"title": "B", "abstract": "Second abstract"}
    }"#;

    #[test]
    fn parses_in_file_order_and_skips_empty_abstracts() {
        let set = ArticleSet::from_json_str(SAMPLE).unwrap();
        assert_eq!(set.len(), 3);
        let docs = set.to_documents();
        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["42", "13"]);
        assert_eq!(docs[0].content, "X");
        assert_eq!(docs[0].title(), Some("Y"));
        assert_eq!(docs[0].metadata[PMID_KEY].to_string(), "42");
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let set = ArticleSet::from_json_str(r#"{"1": {"title": "only title"}}"#).unwrap();
        assert_eq!(set.get("1").unwrap().abstract_text, "");
        assert!(set.to_documents().is_empty());
    }

    #[test]
    fn save_and_load_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("articles.json");
        let set = ArticleSet::from_json_str(SAMPLE).unwrap();
        set.save(&path).unwrap();
        assert_eq!(ArticleSet::load(&path).unwrap(), set);
    }

    #[test]
    fn question_articles_round_trip_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("retrieved_articles.json");
        std::fs::write(&path, format!(r#"{{"Does X help?": {SAMPLE}, "Is Y safe?": {{}}}}"#))
            .unwrap();

        let sets = load_question_articles(&path).unwrap();
        let questions: Vec<_> = sets.keys().map(String::as_str).collect();
        assert_eq!(questions, ["Does X help?", "Is Y safe?"]);
        assert_eq!(sets["Does X help?"].len(), 3);
        assert!(sets["Is Y safe?"].is_empty());

        save_question_articles(&path, &sets).unwrap();
        assert_eq!(load_question_articles(&path).unwrap(), sets);
    }
}
