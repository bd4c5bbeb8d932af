//! LLM-backed query rewriting.

use std::sync::Arc;

use async_trait::async_trait;
use medrag_rag::TextGenerator;
use tracing::{info, warn};

use crate::source::QueryRewriter;

const REWRITE_PREFIX: &str =
    "Convert the following medical question into a concise, searchable query for research articles: ";

/// Asks a [`TextGenerator`] to condense a question into a search query.
pub struct LlmQueryRewriter {
    generator: Arc<dyn TextGenerator>,
}

impl LlmQueryRewriter {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    fn build_prompt(question: &str) -> String {
        format!("{REWRITE_PREFIX}{question}")
    }
}

/// Drop surrounding whitespace and quotes the model tends to add.
fn clean_query(raw: &str) -> &str {
    raw.trim().trim_matches(|c| c == '"' || c == '\'' || c == '`').trim()
}

#[async_trait]
impl QueryRewriter for LlmQueryRewriter {
    async fn rewrite(&self, question: &str) -> Option<String> {
        if question.trim().is_empty() {
            warn!("refusing to rewrite an empty question");
            return None;
        }
        match self.generator.complete(&Self::build_prompt(question)).await {
            Ok(raw) => {
                let query = clean_query(&raw);
                if query.is_empty() {
                    warn!(generator = self.generator.name(), "rewriter returned an empty query");
                    return None;
                }
                info!(query, "rewrote question into search query");
                Some(query.to_string())
            }
            Err(e) => {
                warn!(generator = self.generator.name(), error = %e, "query rewriting failed");
                None
            }
        }
    }
}
