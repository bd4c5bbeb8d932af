//! Deterministic in-process generator for tests and dry runs.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{RagError, Result};
use crate::generator::TextGenerator;

/// A [`TextGenerator`] that replays queued replies, then repeats a fallback.
///
/// Every prompt it receives is recorded so tests can assert on grounding.
#[derive(Debug, Default)]
pub struct MockGenerator {
    replies: Mutex<VecDeque<Result<String>>>,
    fallback: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl MockGenerator {
    /// A generator that always answers `reply`.
    pub fn new(reply: impl Into<String>) -> Self {
        Self { fallback: Some(reply.into()), ..Self::default() }
    }

    /// Queue replies returned in order before the fallback.
    pub fn with_replies<I, S>(self, replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock_replies().extend(replies.into_iter().map(|r| Ok(r.into())));
        self
    }

    /// Queue a generation failure.
    pub fn with_failure(self, message: impl Into<String>) -> Self {
        self.lock_replies().push_back(Err(RagError::Generation {
            provider: "mock".to_string(),
            message: message.into(),
        }));
        self
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn lock_replies(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String>>> {
        self.replies.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        if let Some(reply) = self.lock_replies().pop_front() {
            return reply;
        }
        self.fallback.clone().ok_or_else(|| RagError::Generation {
            provider: "mock".to_string(),
            message: "no reply queued".to_string(),
        })
    }
}
