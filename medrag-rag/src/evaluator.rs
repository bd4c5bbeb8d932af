//! Answer evaluation: context relevance, faithfulness and accuracy.
//!
//! The [`Evaluator`] does not score anything itself. It feeds the retrieved
//! contexts, in rank order, to a pluggable [`RelevanceScorer`] (question
//! replicated once per document) and [`FaithfulnessScorer`], validates what
//! they return and assembles an [`EvaluationResult`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::document::{SearchResult, document_ids};
use crate::error::{RagError, Result};
use crate::interpreter::Verdict;

/// Rates how well each context answers its question, on `[0, 1]`.
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    fn name(&self) -> &str;

    /// `questions` and `contexts` have equal length; one score per pair.
    async fn score(&self, questions: &[&str], contexts: &[&str]) -> Result<Vec<f32>>;
}

/// Rates, on `[0, 1]`, whether an answer's claims follow from the contexts.
#[async_trait]
pub trait FaithfulnessScorer: Send + Sync {
    fn name(&self) -> &str;

    async fn score(&self, question: &str, answer: &str, contexts: &[&str]) -> Result<f32>;
}

/// Per-document relevance scores and their mean.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ContextRelevance {
    pub per_document: Vec<f32>,
    /// Arithmetic mean of `per_document`; 0 when nothing was retrieved.
    pub average: f32,
}

impl ContextRelevance {
    pub fn from_scores(per_document: Vec<f32>) -> Self {
        let average = if per_document.is_empty() {
            0.0
        } else {
            per_document.iter().sum::<f32>() / per_document.len() as f32
        };
        Self { per_document, average }
    }
}

/// The scored record for one answered question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationResult {
    pub question: String,
    pub correct_answer: Option<Verdict>,
    pub verdict: Option<Verdict>,
    pub raw_text: String,
    pub context_relevance: ContextRelevance,
    pub faithfulness: f32,
    pub used_document_ids: Vec<String>,
}

impl EvaluationResult {
    /// Whether the parsed verdict matches the expected label.
    ///
    /// `None` when there is no label or no verdict to compare.
    pub fn is_correct(&self) -> Option<bool> {
        match (self.verdict, self.correct_answer) {
            (Some(v), Some(expected)) => Some(v == expected),
            _ => None,
        }
    }
}

impl fmt::Display for EvaluationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Question: {}", self.question)?;
        if let Some(correct) = self.correct_answer {
            writeln!(f, "Correct Answer: {correct}")?;
        }
        if let Some(verdict) = self.verdict {
            writeln!(f, "Yes/No Answer: {verdict}")?;
        }
        writeln!(f, "\nFull Response:\n{}\n", self.raw_text)?;
        writeln!(f, "Context Relevance:")?;
        writeln!(f, " - Individual Scores: {:?}", self.context_relevance.per_document)?;
        writeln!(f, " - Average Score: {:.2}", self.context_relevance.average)?;
        writeln!(f, "Faithfulness Score: {:.2}", self.faithfulness)?;
        write!(f, "Documents Used: {:?}", self.used_document_ids)
    }
}

fn checked_score(scorer: &str, score: f32) -> Result<f32> {
    if score.is_nan() {
        return Err(RagError::Scoring { scorer: scorer.to_string(), message: "score is NaN".into() });
    }
    if !(0.0..=1.0).contains(&score) {
        warn!(scorer, score, "score outside [0, 1], clamping");
    }
    Ok(score.clamp(0.0, 1.0))
}

/// Orchestrates relevance and faithfulness scoring for one answer.
pub struct Evaluator {
    relevance: Arc<dyn RelevanceScorer>,
    faithfulness: Arc<dyn FaithfulnessScorer>,
}

impl Evaluator {
    pub fn new(
        relevance: Arc<dyn RelevanceScorer>,
        faithfulness: Arc<dyn FaithfulnessScorer>,
    ) -> Self {
        Self { relevance, faithfulness }
    }

    /// Score `generated_text` against the documents it was conditioned on.
    ///
    /// With no retrieved documents both scores are 0 and neither scorer is
    /// called. The returned record has no verdict or label; the pipeline
    /// fills those in.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Scoring`] when a scorer fails, returns the wrong
    /// number of scores, or returns NaN.
    pub async fn evaluate(
        &self,
        question: &str,
        retrieved: &[SearchResult],
        generated_text: &str,
    ) -> Result<EvaluationResult> {
        let contexts: Vec<&str> = retrieved.iter().map(|r| r.document.content.as_str()).collect();

        let (context_relevance, faithfulness) = if contexts.is_empty() {
            (ContextRelevance::default(), 0.0)
        } else {
            let questions = vec![question; contexts.len()];
            let relevance_name = self.relevance.name().to_string();
            let scores = self.relevance.score(&questions, &contexts).await.map_err(|e| {
                error!(scorer = %relevance_name, error = %e, "relevance scoring failed");
                e
            })?;
            if scores.len() != contexts.len() {
                return Err(RagError::Scoring {
                    scorer: relevance_name,
                    message: format!(
                        "expected {} scores, got {}",
                        contexts.len(),
                        scores.len()
                    ),
                });
            }
            let scores = scores
                .into_iter()
                .map(|s| checked_score(&relevance_name, s))
                .collect::<Result<Vec<_>>>()?;

            let faithfulness_name = self.faithfulness.name().to_string();
            let faithfulness =
                self.faithfulness.score(question, generated_text, &contexts).await.map_err(|e| {
                    error!(scorer = %faithfulness_name, error = %e, "faithfulness scoring failed");
                    e
                })?;
            (ContextRelevance::from_scores(scores), checked_score(&faithfulness_name, faithfulness)?)
        };

        info!(
            document_count = contexts.len(),
            relevance = context_relevance.average,
            faithfulness,
            "evaluated answer"
        );

        Ok(EvaluationResult {
            question: question.to_string(),
            correct_answer: None,
            verdict: None,
            raw_text: generated_text.to_string(),
            context_relevance,
            faithfulness,
            used_document_ids: document_ids(retrieved),
        })
    }
}

/// Running accuracy over a labeled question set.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Accuracy {
    pub correct: usize,
    pub total: usize,
}

impl Accuracy {
    /// Count one question; `verdict == expected` is a correct answer.
    pub fn record(&mut self, verdict: Option<Verdict>, expected: Verdict) {
        self.total += 1;
        if verdict == Some(expected) {
            self.correct += 1;
        }
    }

    /// `correct / total`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmptyEvaluationSet`] when nothing was recorded.
    pub fn ratio(&self) -> Result<f64> {
        if self.total == 0 {
            return Err(RagError::EmptyEvaluationSet);
        }
        Ok(self.correct as f64 / self.total as f64)
    }
}
