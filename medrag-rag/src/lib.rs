//! Retrieval-augmented answering over biomedical literature.
//!
//! This crate provides:
//! - An in-memory document store with atomic generation swaps
//! - BM25 and embedding retrieval behind one [`Retriever`] trait
//! - Grounded prompt composition for open and yes/no/maybe answers
//! - Forced-choice verdict extraction
//! - Context relevance, faithfulness and accuracy evaluation
//! - The article and labeled-question interchange formats
//!
//! The [`RagPipeline`] ties these together:
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use medrag_rag::{ArticleSet, HashingEmbeddingProvider, MockGenerator, RagPipeline, TemplateKind};
//!
//! let pipeline = RagPipeline::builder()
//!     .embedding_provider(Arc::new(HashingEmbeddingProvider::default()))
//!     .generator(Arc::new(MockGenerator::new("Yes.")))
//!     .build()?;
//! pipeline.setup(ArticleSet::load("articles.json")?.to_documents()).await?;
//! let answer = pipeline.answer("Do statins reduce mortality?", TemplateKind::ForcedChoice).await?;
//! ```
//!
//! The `openai` feature adds OpenAI-backed embedding and generation.

pub mod articles;
pub mod config;
pub mod dataset;
pub mod document;
pub mod embedding;
pub mod error;
pub mod evaluator;
pub mod generator;
pub mod interpreter;
pub mod judge;
pub mod lexical;
pub mod mock;
pub mod pipeline;
pub mod prompt;
pub mod retriever;
pub mod retry;
pub mod store;

#[cfg(feature = "openai")]
pub mod openai;

pub use articles::{
    ArticleRecord, ArticleSet, PMID_KEY, QuestionArticles, load_question_articles,
    save_question_articles,
};
pub use config::{Bm25Params, RagConfig, RagConfigBuilder, RetrievalMode, RetryPolicy};
pub use dataset::{LabeledDataset, LabeledQuestion};
pub use document::{Document, MetadataValue, SearchResult, TITLE_KEY};
pub use embedding::{EmbeddingProvider, HashingEmbeddingProvider, cosine_similarity};
pub use error::{RagError, Result};
pub use evaluator::{
    Accuracy, ContextRelevance, EvaluationResult, Evaluator, FaithfulnessScorer, RelevanceScorer,
};
pub use generator::TextGenerator;
pub use interpreter::{Verdict, interpret_forced_choice};
pub use judge::{LlmFaithfulnessScorer, LlmRelevanceScorer};
pub use lexical::{Bm25Index, LexicalRetriever, tokenize};
pub use mock::MockGenerator;
pub use pipeline::{
    AnswerResult, BatchReport, EntryOutcome, EvaluationEntry, Query, RagPipeline,
    RagPipelineBuilder,
};
pub use prompt::{ComposedPrompt, PromptComposer, TemplateKind};
pub use retriever::{EmbeddingRetriever, Retriever};
pub use retry::with_retry;
pub use store::{DocumentStore, Generation};

#[cfg(feature = "openai")]
pub use openai::{OpenAIConfig, OpenAIEmbeddingProvider, OpenAIGenerator};
