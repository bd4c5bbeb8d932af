//! Grounded prompt construction.
//!
//! Every template renders the same context block: one entry per retrieved
//! document, in rank order, with its identifier, title and full content.
//! [`ComposedPrompt::document_ids`] lists exactly the identifiers rendered,
//! which is what downstream results report as the documents used.

use std::fmt::{self, Write};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::error::RagError;

/// The answer format a prompt asks for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    /// Free-text answer with citations.
    #[default]
    Open,
    /// One of yes / no / maybe, followed by reasoning.
    #[serde(alias = "yes_no")]
    ForcedChoice,
}

impl TemplateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateKind::Open => "open",
            TemplateKind::ForcedChoice => "forced_choice",
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TemplateKind {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "open" => Ok(TemplateKind::Open),
            "forced_choice" | "yes_no" => Ok(TemplateKind::ForcedChoice),
            other => Err(RagError::Config(format!("unknown answer format '{other}'"))),
        }
    }
}

const OPEN_INSTRUCTIONS: &str = "\
You are an expert scientific research assistant. Your answers must be:
- Factually accurate based solely on the provided context
- Detailed and comprehensive
- Include citations to the source documents by their Document ID

If the context doesn't contain enough information to answer properly, say \"I don't have enough information to answer this question definitively.\" Do not use knowledge outside the context.";

const FORCED_CHOICE_INSTRUCTIONS: &str = "\
Answer the question based only on the provided PubMed abstracts.
Begin your answer with exactly one of: 'yes', 'no', or 'maybe', on its own first line.

Then provide the full reasoning for your answer, citing documents by their Document ID.";

/// A rendered prompt and the documents it cites, in rank order.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedPrompt {
    pub text: String,
    pub document_ids: Vec<String>,
}

/// Renders answer-generation prompts.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptComposer;

impl PromptComposer {
    pub fn new() -> Self {
        Self
    }

    /// Render `question` and `documents` (in retrieval-rank order) for `kind`.
    pub fn compose(
        &self,
        question: &str,
        documents: &[&Document],
        kind: TemplateKind,
    ) -> ComposedPrompt {
        let instructions = match kind {
            TemplateKind::Open => OPEN_INSTRUCTIONS,
            TemplateKind::ForcedChoice => FORCED_CHOICE_INSTRUCTIONS,
        };

        let mut text = String::with_capacity(
            instructions.len() + documents.iter().map(|d| d.content.len() + 64).sum::<usize>(),
        );
        text.push_str(instructions);
        text.push_str("\n\nContext:\n");
        let document_ids = render_context(&mut text, documents);
        // writing to a String cannot fail
        let _ = write!(text, "\nQuestion: {question}\nAnswer:\n");

        ComposedPrompt { text, document_ids }
    }
}

fn render_context(out: &mut String, documents: &[&Document]) -> Vec<String> {
    if documents.is_empty() {
        out.push_str("(no documents were retrieved)\n");
    }
    let mut ids = Vec::with_capacity(documents.len());
    for document in documents {
        let _ = write!(
            out,
            "---\nDocument ID: {}\nTitle: {}\n\nContent:\n{}\n",
            document.id,
            document.title().unwrap_or("(untitled)"),
            document.content.trim()
        );
        ids.push(document.id.clone());
    }
    ids
}
