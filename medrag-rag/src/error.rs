//! Error types for the `medrag-rag` crate.

use thiserror::Error;

/// Errors that can occur while indexing, retrieving, answering or evaluating.
#[derive(Debug, Error)]
pub enum RagError {
    /// The query text was empty or otherwise unusable.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// `answer` or `evaluate` was called before a successful `setup`.
    #[error("Pipeline is not ready: call setup() with a document set first")]
    NotReady,

    /// A literature search or article fetch collaborator failed.
    #[error("Upstream fetch error ({service}): {message}")]
    UpstreamFetch {
        /// The upstream service that produced the error.
        service: String,
        /// A description of the failure.
        message: String,
    },

    /// The text-generation service failed (timeout, quota, malformed response).
    #[error("Generation error ({provider}): {message}")]
    Generation {
        /// The generation provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A relevance or faithfulness scorer failed or returned unusable output.
    #[error("Scoring error ({scorer}): {message}")]
    Scoring {
        /// The scorer that produced the error.
        scorer: String,
        /// A description of the failure.
        message: String,
    },

    /// Accuracy was requested over zero labeled questions.
    #[error("Cannot compute accuracy over an empty question set")]
    EmptyEvaluationSet,

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An error in the pipeline orchestration.
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// A dataset or interchange file could not be interpreted.
    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl RagError {
    /// Whether the failure is worth retrying at the collaborator boundary.
    ///
    /// Generation failures are never transient here: completions are
    /// non-deterministic and billed, so they are not replayed verbatim.
    pub fn is_transient(&self) -> bool {
        matches!(self, RagError::UpstreamFetch { .. } | RagError::Embedding { .. })
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_errors_are_not_retried() {
        let err = RagError::Generation { provider: "openai".into(), message: "timeout".into() };
        assert!(!err.is_transient());

        let err = RagError::UpstreamFetch { service: "pubmed".into(), message: "502".into() };
        assert!(err.is_transient());
    }

    #[test]
    fn display_includes_provider() {
        let err = RagError::Embedding { provider: "OpenAI".into(), message: "quota".into() };
        assert_eq!(err.to_string(), "Embedding error (OpenAI): quota");
    }
}
