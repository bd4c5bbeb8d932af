//! PubMed E-utilities client settings.

use medrag_rag::{RagError, Result, RetryPolicy};
use serde::{Deserialize, Serialize};

/// Default NCBI E-utilities base URL.
pub const DEFAULT_EUTILS_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

/// Settings for [`PubMedClient`](crate::PubMedClient) and the
/// [`Collector`](crate::Collector).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PubMedConfig {
    pub base_url: String,
    /// Identifiers requested per search (`retmax`).
    pub max_results: usize,
    /// NCBI API key; raises the rate limit from 3 to 10 requests per second.
    pub api_key: Option<String>,
    /// Tool name reported to NCBI.
    pub tool: Option<String>,
    /// Contact address reported to NCBI.
    pub email: Option<String>,
    pub timeout_ms: u64,
    /// Article fetches in flight at once.
    pub max_parallel_fetches: usize,
    pub retry: RetryPolicy,
}

impl Default for PubMedConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_EUTILS_URL.to_string(),
            max_results: 20,
            api_key: None,
            tool: None,
            email: None,
            timeout_ms: 10_000,
            max_parallel_fetches: 3,
            retry: RetryPolicy::default(),
        }
    }
}

impl PubMedConfig {
    /// Defaults with `NCBI_API_KEY` and `NCBI_EMAIL` picked up from the
    /// environment when set.
    pub fn from_env() -> Self {
        let non_empty = |name| std::env::var(name).ok().filter(|v: &String| !v.is_empty());
        Self { api_key: non_empty("NCBI_API_KEY"), email: non_empty("NCBI_EMAIL"), ..Self::default() }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_results == 0 {
            return Err(RagError::Config("max_results must be greater than zero".into()));
        }
        if self.max_parallel_fetches == 0 {
            return Err(RagError::Config("max_parallel_fetches must be greater than zero".into()));
        }
        if self.timeout_ms == 0 {
            return Err(RagError::Config("timeout_ms must be greater than zero".into()));
        }
        Ok(())
    }

    /// Query parameters NCBI asks every request to carry.
    pub(crate) fn identity_params(&self) -> Vec<(&'static str, &str)> {
        let mut params = Vec::new();
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.as_str()));
        }
        if let Some(tool) = &self.tool {
            params.push(("tool", tool.as_str()));
        }
        if let Some(email) = &self.email {
            params.push(("email", email.as_str()));
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_eutils_conventions() {
        let config = PubMedConfig::default();
        assert_eq!(config.max_results, 20);
        assert_eq!(config.timeout_ms, 10_000);
        assert!(config.validate().is_ok());
        assert!(config.identity_params().is_empty());
    }

    #[test]
    fn zero_results_is_rejected() {
        let config = PubMedConfig { max_results: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(RagError::Config(_))));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: PubMedConfig =
            serde_json::from_str(r#"{"max_results": 5, "email": "a@b.org"}"#).unwrap();
        assert_eq!(config.max_results, 5);
        assert_eq!(config.identity_params(), [("email", "a@b.org")]);
        assert_eq!(config.base_url, DEFAULT_EUTILS_URL);
    }
}
