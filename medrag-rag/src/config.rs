//! Configuration for the answering pipeline.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Which retrieval strategy a pipeline uses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    /// BM25 term-weighted ranking.
    Lexical,
    /// Cosine similarity over dense embeddings.
    #[default]
    Embedding,
}

/// BM25 ranking parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Bm25Params {
    /// Term frequency saturation. Typical range 1.2 - 2.0.
    #[serde(default = "default_k1")]
    pub k1: f32,
    /// Document length normalization, 0.0 (none) to 1.0 (full).
    #[serde(default = "default_b")]
    pub b: f32,
}

fn default_k1() -> f32 {
    1.2
}

fn default_b() -> f32 {
    0.75
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: default_k1(), b: default_b() }
    }
}

/// Configuration parameters for the answering pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Number of documents retrieved per question.
    pub top_k: usize,
    /// Retrieval strategy.
    pub retrieval_mode: RetrievalMode,
    /// BM25 parameters, used in lexical mode.
    pub bm25: Bm25Params,
    /// Number of documents embedded per provider call at setup time.
    pub embedding_batch_size: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            retrieval_mode: RetrievalMode::default(),
            bm25: Bm25Params::default(),
            embedding_batch_size: 32,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Load a JSON config file; absent fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: RagConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that parameters are within their supported ranges.
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(RagError::Config("top_k must be greater than zero".to_string()));
        }
        if !(0.5..=3.0).contains(&self.bm25.k1) {
            return Err(RagError::Config(format!(
                "bm25.k1 ({}) must be within [0.5, 3.0]",
                self.bm25.k1
            )));
        }
        if !(0.0..=1.0).contains(&self.bm25.b) {
            return Err(RagError::Config(format!(
                "bm25.b ({}) must be within [0.0, 1.0]",
                self.bm25.b
            )));
        }
        if self.embedding_batch_size == 0 {
            return Err(RagError::Config(
                "embedding_batch_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the number of documents retrieved per question.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the retrieval strategy.
    pub fn retrieval_mode(mut self, mode: RetrievalMode) -> Self {
        self.config.retrieval_mode = mode;
        self
    }

    /// Set the BM25 parameters.
    pub fn bm25(mut self, k1: f32, b: f32) -> Self {
        self.config.bm25 = Bm25Params { k1, b };
        self
    }

    /// Set how many documents are embedded per provider call.
    pub fn embedding_batch_size(mut self, size: usize) -> Self {
        self.config.embedding_batch_size = size;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if:
    /// - `top_k == 0`
    /// - `bm25.k1` is outside `[0.5, 3.0]` or `bm25.b` outside `[0.0, 1.0]`
    /// - `embedding_batch_size == 0`
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Bounded exponential-backoff retry for idempotent collaborator calls.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. `1` disables retrying.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, initial_backoff_ms: 250, max_backoff_ms: 4000 }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self { max_attempts: 1, ..Self::default() }
    }

    /// Delay before the given retry (1-based: the delay after the first failure is `backoff(1)`).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry.saturating_sub(1)).unwrap_or(u64::MAX);
        let ms = self.initial_backoff_ms.saturating_mul(factor).min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}
