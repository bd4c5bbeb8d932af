//! Answering pipeline orchestrator.
//!
//! The [`RagPipeline`] owns its [`DocumentStore`] and wires a [`Retriever`],
//! the [`PromptComposer`], a [`TextGenerator`] and an optional [`Evaluator`]
//! into one request/response flow:
//!
//! ```text
//! setup(documents) ──► index ──► publish generation
//! answer(question) ──► retrieve ──► compose ──► generate ──► interpret
//! evaluate(...)    ──► answer ──► relevance + faithfulness
//! ```
//!
//! The pipeline is `uninitialized` until the first successful
//! [`setup`](RagPipeline::setup); afterwards it stays `ready`, and each
//! further `setup` replaces the corpus wholesale. A failed `setup` leaves
//! the previous state untouched.
//!
//! # Example
//!
//! ```rust,ignore
//! use medrag_rag::{RagPipeline, RagConfig, TemplateKind};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(my_embedder))
//!     .generator(Arc::new(my_llm))
//!     .build()?;
//!
//! pipeline.setup(articles.to_documents()).await?;
//! let answer = pipeline.answer("Do statins reduce mortality?", TemplateKind::Open).await?;
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::{RagConfig, RetrievalMode, RetryPolicy};
use crate::dataset::LabeledQuestion;
use crate::document::{Document, SearchResult};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::evaluator::{
    Accuracy, EvaluationResult, Evaluator, FaithfulnessScorer, RelevanceScorer,
};
use crate::generator::TextGenerator;
use crate::interpreter::{Verdict, interpret_forced_choice};
use crate::lexical::LexicalRetriever;
use crate::prompt::{PromptComposer, TemplateKind};
use crate::retriever::{EmbeddingRetriever, Retriever};
use crate::store::{DocumentStore, Generation};

/// One question to answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub text: String,
    pub format: TemplateKind,
    pub top_k: usize,
}

impl Query {
    pub fn new(text: impl Into<String>, format: TemplateKind, top_k: usize) -> Self {
        Self { text: text.into(), format, top_k }
    }
}

/// A generated answer and the documents it was grounded on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerResult {
    pub question: String,
    pub raw_text: String,
    /// Parsed verdict for forced-choice prompts; `None` for open answers.
    pub verdict: Option<Verdict>,
    /// Identifiers rendered into the prompt, in rank order.
    pub used_document_ids: Vec<String>,
}

/// Outcome of one question in a batch evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntryOutcome {
    Evaluated(EvaluationResult),
    Failed { error: String },
}

/// One labeled question and what happened to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationEntry {
    pub id: String,
    pub question: String,
    pub expected: Verdict,
    pub outcome: EntryOutcome,
}

/// Results of [`RagPipeline::evaluate_batch`], in question order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub entries: Vec<EvaluationEntry>,
    pub accuracy: Accuracy,
}

impl BatchReport {
    /// `correct / total`; failed entries count as incorrect.
    pub fn accuracy_ratio(&self) -> Result<f64> {
        self.accuracy.ratio()
    }

    pub fn failed_count(&self) -> usize {
        self.entries.iter().filter(|e| matches!(e.outcome, EntryOutcome::Failed { .. })).count()
    }
}

/// The retrieval-augmented answering pipeline. Construct one via
/// [`RagPipeline::builder()`].
pub struct RagPipeline {
    config: RagConfig,
    store: DocumentStore,
    /// Held from prepare to publish so overlapping setups publish in call order.
    setup_lock: Mutex<()>,
    retriever: Arc<dyn Retriever>,
    composer: PromptComposer,
    generator: Arc<dyn TextGenerator>,
    evaluator: Option<Evaluator>,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the document store.
    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// Whether a generation has been published.
    pub async fn is_ready(&self) -> bool {
        self.store.snapshot().await.is_some()
    }

    /// Index `documents` and publish them as the new generation.
    ///
    /// An empty document set is valid. Duplicate ids are tolerated (last
    /// write wins).
    ///
    /// # Errors
    ///
    /// Propagates indexing failures (e.g. [`RagError::Embedding`]); the
    /// previously published generation, if any, stays in place.
    ///
    /// Concurrent calls are serialized: the last call to start is the one
    /// whose corpus stays published.
    pub async fn setup(&self, documents: Vec<Document>) -> Result<Arc<Generation>> {
        let _guard = self.setup_lock.lock().await;
        let generation = self.store.prepare(documents);
        let generation_id = generation.id();
        let generation = self.retriever.index(generation).await.map_err(|e| {
            error!(generation = generation_id, error = %e, "setup failed, keeping previous state");
            e
        })?;
        if generation.is_empty() {
            warn!(generation = generation_id, "setup with an empty corpus");
        }
        Ok(self.store.publish(generation).await)
    }

    async fn ready_generation(&self) -> Result<Arc<Generation>> {
        self.store.snapshot().await.ok_or(RagError::NotReady)
    }

    /// Retrieve the top documents for `question` from the current generation.
    pub async fn retrieve(&self, question: &str) -> Result<Vec<SearchResult>> {
        let generation = self.ready_generation().await?;
        self.retrieve_from(&generation, question, self.config.top_k).await
    }

    async fn retrieve_from(
        &self,
        generation: &Generation,
        question: &str,
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let results = self.retriever.retrieve(generation, question, top_k).await?;
        if results.is_empty() {
            warn!(generation = generation.id(), "retrieval returned no documents");
        }
        Ok(results)
    }

    /// Answer `question` in the requested format.
    ///
    /// # Errors
    ///
    /// - [`RagError::NotReady`] before the first `setup`
    /// - [`RagError::InvalidQuery`] for a blank question
    /// - [`RagError::Generation`] when the model call fails (not retried)
    pub async fn answer(&self, question: &str, format: TemplateKind) -> Result<AnswerResult> {
        let query = Query::new(question, format, self.config.top_k);
        self.answer_query(&query).await.map(|(answer, _)| answer)
    }

    /// Answer a fully specified [`Query`], also returning what was retrieved.
    pub async fn answer_query(&self, query: &Query) -> Result<(AnswerResult, Vec<SearchResult>)> {
        let generation = self.ready_generation().await?;
        let retrieved = self.retrieve_from(&generation, &query.text, query.top_k).await?;

        let documents: Vec<&Document> = retrieved.iter().map(|r| &r.document).collect();
        let prompt = self.composer.compose(&query.text, &documents, query.format);

        let raw_text = self.generator.complete(&prompt.text).await.map_err(|e| {
            error!(generator = self.generator.name(), error = %e, "generation failed");
            e
        })?;

        let verdict = match query.format {
            TemplateKind::ForcedChoice => Some(interpret_forced_choice(&raw_text)),
            TemplateKind::Open => None,
        };

        info!(
            generation = generation.id(),
            format = %query.format,
            document_count = prompt.document_ids.len(),
            "answered question"
        );

        let answer = AnswerResult {
            question: query.text.clone(),
            raw_text,
            verdict,
            used_document_ids: prompt.document_ids,
        };
        Ok((answer, retrieved))
    }

    /// Answer `question` and score the answer.
    ///
    /// # Errors
    ///
    /// Everything [`answer`](Self::answer) returns, plus [`RagError::Config`]
    /// when no scorers were configured and [`RagError::Scoring`] when a
    /// scorer fails.
    pub async fn evaluate(
        &self,
        question: &str,
        format: TemplateKind,
        expected: Option<Verdict>,
    ) -> Result<EvaluationResult> {
        self.ready_generation().await?;
        let evaluator = self.evaluator.as_ref().ok_or_else(|| {
            RagError::Config("evaluation requires relevance and faithfulness scorers".to_string())
        })?;

        let query = Query::new(question, format, self.config.top_k);
        let (answer, retrieved) = self.answer_query(&query).await?;

        let mut result = evaluator.evaluate(question, &retrieved, &answer.raw_text).await?;
        result.verdict = answer.verdict;
        result.correct_answer = expected;
        Ok(result)
    }

    /// Evaluate a labeled question set in order.
    ///
    /// A failure on one question is recorded as a failed entry (counted as
    /// incorrect) and the batch continues.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmptyEvaluationSet`] for an empty question set
    /// - [`RagError::NotReady`] before the first `setup`
    pub async fn evaluate_batch(
        &self,
        questions: &[LabeledQuestion],
        format: TemplateKind,
    ) -> Result<BatchReport> {
        if questions.is_empty() {
            return Err(RagError::EmptyEvaluationSet);
        }
        self.ready_generation().await?;

        let mut accuracy = Accuracy::default();
        let mut entries = Vec::with_capacity(questions.len());
        for labeled in questions {
            let outcome = match self.evaluate(&labeled.question, format, Some(labeled.expected)).await
            {
                Ok(result) => {
                    accuracy.record(result.verdict, labeled.expected);
                    EntryOutcome::Evaluated(result)
                }
                Err(e) => {
                    warn!(question.id = %labeled.id, error = %e, "evaluation failed, continuing");
                    accuracy.record(None, labeled.expected);
                    EntryOutcome::Failed { error: e.to_string() }
                }
            };
            entries.push(EvaluationEntry {
                id: labeled.id.clone(),
                question: labeled.question.clone(),
                expected: labeled.expected,
                outcome,
            });
        }

        info!(correct = accuracy.correct, total = accuracy.total, "batch evaluation completed");
        Ok(BatchReport { entries, accuracy })
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// A generator is required. The retriever is either given explicitly or
/// derived from the config's `retrieval_mode` (embedding mode then needs an
/// embedding provider). Scorers are optional but must be given together.
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    retriever: Option<Arc<dyn Retriever>>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    retry: Option<RetryPolicy>,
    generator: Option<Arc<dyn TextGenerator>>,
    relevance: Option<Arc<dyn RelevanceScorer>>,
    faithfulness: Option<Arc<dyn FaithfulnessScorer>>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration (defaults to [`RagConfig::default`]).
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use a specific retriever instead of deriving one from the config.
    pub fn retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Set the embedding provider used in embedding mode.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the retry policy for embedding calls.
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Set the answer generator.
    pub fn generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Set the scorers used by [`RagPipeline::evaluate`].
    pub fn scorers(
        mut self,
        relevance: Arc<dyn RelevanceScorer>,
        faithfulness: Arc<dyn FaithfulnessScorer>,
    ) -> Self {
        self.relevance = Some(relevance);
        self.faithfulness = Some(faithfulness);
        self
    }

    /// Build the [`RagPipeline`], validating the configuration and that all
    /// required collaborators are present.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] on an invalid config, a missing
    /// generator, or embedding mode without an embedding provider.
    pub fn build(self) -> Result<RagPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let generator =
            self.generator.ok_or_else(|| RagError::Config("generator is required".to_string()))?;

        let retriever: Arc<dyn Retriever> = match (self.retriever, config.retrieval_mode) {
            (Some(retriever), _) => retriever,
            (None, RetrievalMode::Lexical) => Arc::new(LexicalRetriever::new(config.bm25)),
            (None, RetrievalMode::Embedding) => {
                let provider = self.embedding_provider.ok_or_else(|| {
                    RagError::Config("embedding mode requires an embedding_provider".to_string())
                })?;
                Arc::new(
                    EmbeddingRetriever::new(provider)
                        .with_batch_size(config.embedding_batch_size)
                        .with_retry(self.retry.unwrap_or_default()),
                )
            }
        };

        let evaluator = match (self.relevance, self.faithfulness) {
            (Some(relevance), Some(faithfulness)) => Some(Evaluator::new(relevance, faithfulness)),
            _ => None,
        };

        Ok(RagPipeline {
            config,
            store: DocumentStore::new(),
            setup_lock: Mutex::new(()),
            retriever,
            composer: PromptComposer::new(),
            generator,
            evaluator,
        })
    }
}
