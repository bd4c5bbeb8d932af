//! Text-generation capability.

use async_trait::async_trait;

use crate::error::Result;

/// A language model that turns a prompt into free text.
///
/// Failures (timeouts, quota, malformed responses) surface as
/// [`RagError::Generation`](crate::RagError::Generation). Callers do not
/// retry them automatically.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// A short name for logs and error messages (usually the model id).
    fn name(&self) -> &str;

    /// Complete a single prompt.
    async fn complete(&self, prompt: &str) -> Result<String>;
}
