//! Labeled yes/no/maybe question sets in the PubMedQA layout.
//!
//! ```json
//! { "21645374": { "QUESTION": "...", "CONTEXTS": ["..."], "final_decision": "yes",
//!                 "LONG_ANSWER": "...", "YEAR": "2011" } }
//! ```

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::articles::PMID_KEY;
use crate::document::{Document, MetadataValue};
use crate::error::{RagError, Result};
use crate::interpreter::Verdict;

/// A question with its expected verdict.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabeledQuestion {
    pub id: String,
    pub question: String,
    pub expected: Verdict,
}

#[derive(Debug, Clone, Deserialize)]
struct RawEntry {
    #[serde(rename = "QUESTION")]
    question: String,
    final_decision: String,
    #[serde(rename = "CONTEXTS", default)]
    contexts: Vec<String>,
    #[serde(rename = "LONG_ANSWER", default)]
    long_answer: Option<String>,
    #[serde(rename = "YEAR", default)]
    year: Option<serde_json::Value>,
}

/// A parsed labeled dataset, in file order.
#[derive(Debug, Clone)]
pub struct LabeledDataset {
    entries: IndexMap<String, RawEntry>,
}

impl LabeledDataset {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let entries: IndexMap<String, RawEntry> = serde_json::from_str(raw)?;
        Ok(Self { entries })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The labeled questions.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Dataset`] if a `final_decision` is not yes/no/maybe.
    pub fn questions(&self) -> Result<Vec<LabeledQuestion>> {
        self.entries
            .iter()
            .map(|(id, entry)| {
                let expected = entry.final_decision.parse::<Verdict>().map_err(|e| {
                    RagError::Dataset(format!("entry {id}: {e}"))
                })?;
                Ok(LabeledQuestion { id: id.clone(), question: entry.question.clone(), expected })
            })
            .collect()
    }

    /// One document per entry with contexts, joined into a single content
    /// block. The entry's question, long answer and year are kept as metadata.
    pub fn documents(&self) -> Vec<Document> {
        self.entries
            .iter()
            .filter(|(_, entry)| !entry.contexts.is_empty())
            .map(|(id, entry)| {
                let mut doc = Document::new(id.clone(), entry.contexts.join("\n"))
                    .with_metadata(PMID_KEY, id.as_str())
                    .with_metadata("question", entry.question.as_str());
                if let Some(answer) = &entry.long_answer {
                    doc = doc.with_metadata("answer", answer.as_str());
                }
                match &entry.year {
                    Some(serde_json::Value::String(s)) => doc = doc.with_metadata("year", s.as_str()),
                    Some(serde_json::Value::Number(n)) => {
                        if let Some(n) = n.as_f64() {
                            doc = doc.with_metadata("year", MetadataValue::Number(n));
                        }
                    }
                    _ => {}
                }
                doc
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "1": {"QUESTION": "Does A work?", "CONTEXTS": ["ctx one", "ctx two"],
              "final_decision": "yes", "LONG_ANSWER": "A works.", "YEAR": "2010"},
        "2": {"QUESTION": "Is B safe?", "final_decision": "maybe", "YEAR": 2012}
    }"#;

    #[test]
    fn questions_keep_file_order_and_labels() {
        let dataset = LabeledDataset::from_json_str(SAMPLE).unwrap();
        let questions = dataset.questions().unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].id, "1");
        assert_eq!(questions[0].expected, Verdict::Yes);
        assert_eq!(questions[1].expected, Verdict::Maybe);
    }

    #[test]
    fn documents_come_from_contexts() {
        let dataset = LabeledDataset::from_json_str(SAMPLE).unwrap();
        let docs = dataset.documents();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "ctx one\nctx two");
        assert_eq!(docs[0].metadata["answer"].to_string(), "A works.");
        assert_eq!(docs[0].metadata["year"].to_string(), "2010");
    }

    #[test]
    fn unknown_label_is_a_dataset_error() {
        let raw = r#"{"1": {"QUESTION": "q", "final_decision": "probably"}}"#;
        let dataset = LabeledDataset::from_json_str(raw).unwrap();
        assert!(matches!(dataset.questions(), Err(RagError::Dataset(_))));
    }
}
