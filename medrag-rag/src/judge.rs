//! LLM-as-judge scorers.
//!
//! Both scorers prompt a [`TextGenerator`] for a small JSON verdict and turn
//! it into a `[0, 1]` score:
//!
//! - [`LlmRelevanceScorer`] asks, per context, which statements from the
//!   context are relevant to the question. A context with at least one
//!   relevant statement scores 1, otherwise 0.
//! - [`LlmFaithfulnessScorer`] asks the judge to split the answer into
//!   statements and mark each as inferable (1) or not (0) from the contexts.
//!   The score is the fraction of inferable statements.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::{RagError, Result};
use crate::evaluator::{FaithfulnessScorer, RelevanceScorer};
use crate::generator::TextGenerator;

const RELEVANCE_INSTRUCTIONS: &str = "Your task is to judge how relevant the provided context is \
for answering a question. Extract the sentences from the context that are relevant to the \
question, verbatim. If no sentence is relevant, return an empty list. Respond only with JSON of \
the form {\"relevant_statements\": [\"...\"]}.";

const FAITHFULNESS_INSTRUCTIONS: &str = "Your task is to judge the faithfulness of an answer \
to the provided context. Split the answer into individual statements. For each statement, \
give 1 if it can be inferred from the context and 0 otherwise. Respond only with JSON of the \
form {\"statements\": [\"...\"], \"statement_scores\": [1, 0]}.";

#[derive(Debug, Deserialize)]
struct RelevanceVerdict {
    #[serde(default)]
    relevant_statements: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct FaithfulnessVerdict {
    #[serde(default)]
    statements: Vec<String>,
    #[serde(default)]
    statement_scores: Vec<f32>,
}

/// Extract JSON from a response that may be wrapped in markdown code fences
/// or surrounded by prose.
fn extract_json(response: &str) -> &str {
    let trimmed = response.trim();

    if let Some(start) = trimmed.find("```") {
        let after_start = &trimmed[start + 3..];
        let body_start = after_start.find('\n').map_or(0, |i| i + 1);
        let body = &after_start[body_start..];
        if let Some(end) = body.find("```") {
            return body[..end].trim();
        }
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => &trimmed[start..=end],
        _ => trimmed,
    }
}

fn parse_verdict<T: for<'de> Deserialize<'de>>(scorer: &str, response: &str) -> Result<T> {
    serde_json::from_str(extract_json(response)).map_err(|e| RagError::Scoring {
        scorer: scorer.to_string(),
        message: format!("unparseable judge response ({e}): {response}"),
    })
}

fn judge_failure(scorer: &str, e: RagError) -> RagError {
    RagError::Scoring { scorer: scorer.to_string(), message: e.to_string() }
}

/// Context relevance judged by a language model.
pub struct LlmRelevanceScorer {
    judge: Arc<dyn TextGenerator>,
}

impl LlmRelevanceScorer {
    pub fn new(judge: Arc<dyn TextGenerator>) -> Self {
        Self { judge }
    }

    fn build_prompt(question: &str, context: &str) -> String {
        format!("{RELEVANCE_INSTRUCTIONS}\n\nQuestion: {question}\n\nContext:\n{context}\n\nJSON:")
    }
}

#[async_trait]
impl RelevanceScorer for LlmRelevanceScorer {
    fn name(&self) -> &str {
        "llm_context_relevance"
    }

    async fn score(&self, questions: &[&str], contexts: &[&str]) -> Result<Vec<f32>> {
        let mut scores = Vec::with_capacity(contexts.len());
        for (question, context) in questions.iter().zip(contexts) {
            let response = self
                .judge
                .complete(&Self::build_prompt(question, context))
                .await
                .map_err(|e| judge_failure(self.name(), e))?;
            let verdict: RelevanceVerdict = parse_verdict(self.name(), &response)?;
            debug!(relevant = verdict.relevant_statements.len(), "relevance judged");
            scores.push(if verdict.relevant_statements.is_empty() { 0.0 } else { 1.0 });
        }
        Ok(scores)
    }
}

/// Answer faithfulness judged by a language model.
pub struct LlmFaithfulnessScorer {
    judge: Arc<dyn TextGenerator>,
}

impl LlmFaithfulnessScorer {
    pub fn new(judge: Arc<dyn TextGenerator>) -> Self {
        Self { judge }
    }

    fn build_prompt(question: &str, answer: &str, contexts: &[&str]) -> String {
        let mut prompt = format!("{FAITHFULNESS_INSTRUCTIONS}\n\nQuestion: {question}\n\nContext:\n");
        for context in contexts {
            prompt.push_str(context);
            prompt.push('\n');
        }
        prompt.push_str(&format!("\nAnswer: {answer}\n\nJSON:"));
        prompt
    }
}

#[async_trait]
impl FaithfulnessScorer for LlmFaithfulnessScorer {
    fn name(&self) -> &str {
        "llm_faithfulness"
    }

    async fn score(&self, question: &str, answer: &str, contexts: &[&str]) -> Result<f32> {
        let response = self
            .judge
            .complete(&Self::build_prompt(question, answer, contexts))
            .await
            .map_err(|e| judge_failure(self.name(), e))?;
        let verdict: FaithfulnessVerdict = parse_verdict(self.name(), &response)?;
        debug!(statements = verdict.statements.len(), "faithfulness judged");

        // An answer with no extracted statements scores 0.
        if verdict.statement_scores.is_empty() {
            return Ok(0.0);
        }
        let supported: f32 = verdict.statement_scores.iter().sum();
        Ok(supported / verdict.statement_scores.len() as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockGenerator;

    #[test]
    fn extracts_json_from_fences_and_prose() {
        assert_eq!(extract_json("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(extract_json("Sure: {\"a\": 1} done"), "{\"a\": 1}");
        assert_eq!(extract_json("{\"a\": 1}"), "{\"a\": 1}");
    }

    #[tokio::test]
    async fn relevance_is_binary_per_context() {
        let judge = Arc::new(MockGenerator::default().with_replies([
            r#"{"relevant_statements": ["Statins lowered mortality."]}"#,
            r#"{"relevant_statements": []}"#,
        ]));
        let scorer = LlmRelevanceScorer::new(judge.clone());
        let scores = scorer.score(&["q", "q"], &["statins", "weather"]).await.unwrap();
        assert_eq!(scores, [1.0, 0.0]);
        assert_eq!(judge.prompts().len(), 2);
        assert!(judge.prompts()[1].contains("weather"));
    }

    #[tokio::test]
    async fn faithfulness_is_fraction_of_supported_statements() {
        let judge = Arc::new(MockGenerator::new(
            "```json\n{\"statements\": [\"a\", \"b\", \"c\", \"d\"], \"statement_scores\": [1, 1, 0, 1]}\n```",
        ));
        let scorer = LlmFaithfulnessScorer::new(judge);
        let score = scorer.score("q", "answer", &["c1", "c2"]).await.unwrap();
        assert_eq!(score, 0.75);
    }

    #[tokio::test]
    async fn answer_without_statements_scores_zero() {
        let judge = Arc::new(MockGenerator::new(r#"{"statements": [], "statement_scores": []}"#));
        let scorer = LlmFaithfulnessScorer::new(judge);
        assert_eq!(scorer.score("q", "", &["c"]).await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn garbage_response_is_a_scoring_error() {
        let scorer = LlmFaithfulnessScorer::new(Arc::new(MockGenerator::new("I cannot judge this.")));
        let err = scorer.score("q", "a", &["c"]).await.unwrap_err();
        assert!(matches!(err, RagError::Scoring { .. }));
    }

    #[tokio::test]
    async fn judge_failure_becomes_scoring_error() {
        let judge = Arc::new(MockGenerator::default().with_failure("quota exceeded"));
        let scorer = LlmRelevanceScorer::new(judge);
        let err = scorer.score(&["q"], &["c"]).await.unwrap_err();
        assert!(matches!(err, RagError::Scoring { .. }));
    }
}
