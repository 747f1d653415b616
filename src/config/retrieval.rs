//! Retrieval backend configuration (Qdrant)

use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Vector store configuration. Without a URL the RAG handler is unavailable.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    /// Qdrant REST endpoint, e.g. `http://localhost:6333`
    pub qdrant_url: Option<String>,

    #[serde(default = "default_collection")]
    pub collection: String,

    /// Passages fetched per query
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    pub api_key: Option<SecretString>,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl RetrievalConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn is_configured(&self) -> bool {
        self.qdrant_url.as_ref().is_some_and(|u| !u.trim().is_empty())
    }

    /// Validate retrieval configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(url) = &self.qdrant_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ValidationError::InvalidUrl("RETRIEVAL_QDRANT_URL"));
            }
        }
        if self.collection.trim().is_empty() {
            return Err(ValidationError::MissingRequired("RETRIEVAL_COLLECTION"));
        }
        if self.top_k == 0 {
            return Err(ValidationError::MissingRequired("RETRIEVAL_TOP_K"));
        }
        Ok(())
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            qdrant_url: None,
            collection: default_collection(),
            top_k: default_top_k(),
            api_key: None,
            timeout_secs: default_timeout(),
        }
    }
}

fn default_collection() -> String {
    "documents".to_string()
}

fn default_top_k() -> usize {
    5
}

fn default_timeout() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_unconfigured() {
        let config = RetrievalConfig::default();
        assert!(!config.is_configured());
        assert_eq!(config.top_k, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_url() {
        let config = RetrievalConfig {
            qdrant_url: Some("localhost:6333".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_top_k() {
        let config = RetrievalConfig {
            qdrant_url: Some("http://localhost:6333".to_string()),
            top_k: 0,
            ..Default::default()
        };
        assert!(config.is_configured());
        assert!(config.validate().is_err());
    }
}
