//! Data types for documents and retrieval results.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Metadata key holding a document's human-readable title.
pub const TITLE_KEY: &str = "title";

/// A metadata value: dataset-specific attributes are either text or numbers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MetadataValue {
    Text(String),
    Number(f64),
}

impl MetadataValue {
    /// Return the value as text, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            MetadataValue::Number(_) => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Text(s) => f.write_str(s),
            MetadataValue::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Number(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Number(value as f64)
    }
}

/// An indexed text unit, typically one article abstract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Stable external identifier (e.g. a PubMed id).
    pub id: String,
    /// The text content of the document.
    pub content: String,
    /// Open, dataset-specific attributes (title, year, question, ...).
    #[serde(default)]
    pub metadata: HashMap<String, MetadataValue>,
}

impl Document {
    /// Create a document without metadata.
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { id: id.into(), content: content.into(), metadata: HashMap::new() }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The title metadata entry, if one was recorded.
    pub fn title(&self) -> Option<&str> {
        self.metadata.get(TITLE_KEY).and_then(MetadataValue::as_text)
    }
}

/// A retrieved [`Document`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The retrieved document.
    pub document: Document,
    /// The retrieval score (higher is more relevant).
    pub score: f32,
}

/// Identifiers of retrieved documents, in rank order.
pub fn document_ids(results: &[SearchResult]) -> Vec<String> {
    results.iter().map(|r| r.document.id.clone()).collect()
}
