//! Model provider configuration (OpenAI-compatible chat and embeddings)

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Model provider configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
    /// API key; without it the engine runs in offline mode
    pub api_key: Option<SecretString>,

    /// Base URL of an OpenAI-compatible API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used for classification, direct answers and tool selection
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Model used for query and prototype embeddings
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Enable the embedding classifier layer
    #[serde(default = "default_embeddings_enabled")]
    pub embeddings_enabled: bool,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries on retryable failures
    #[serde(default = "default_retries")]
    pub max_retries: u32,
}

impl AiConfig {
    /// Get timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Check if an API key is configured
    pub fn has_api_key(&self) -> bool {
        self.api_key
            .as_ref()
            .is_some_and(|k| !k.expose_secret().trim().is_empty())
    }

    /// Validate AI configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ValidationError::InvalidUrl("AI_BASE_URL"));
        }
        if self.chat_model.trim().is_empty() {
            return Err(ValidationError::MissingRequired("AI_CHAT_MODEL"));
        }
        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout("AI_TIMEOUT_SECS"));
        }
        Ok(())
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            embeddings_enabled: default_embeddings_enabled(),
            timeout_secs: default_timeout(),
            max_retries: default_retries(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embeddings_enabled() -> bool {
    true
}

fn default_timeout() -> u64 {
    120
}

fn default_retries() -> u32 {
    3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ai_config_defaults() {
        let config = AiConfig::default();
        assert_eq!(config.chat_model, "gpt-4o-mini");
        assert_eq!(config.timeout_secs, 120);
        assert_eq!(config.max_retries, 3);
        assert!(config.embeddings_enabled);
        assert!(!config.has_api_key());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_timeout_duration() {
        let config = AiConfig {
            timeout_secs: 60,
            ..Default::default()
        };
        assert_eq!(config.timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_blank_key_is_not_configured() {
        let config = AiConfig {
            api_key: Some(SecretString::new("  ".to_string())),
            ..Default::default()
        };
        assert!(!config.has_api_key());

        let config = AiConfig {
            api_key: Some(SecretString::new("sk-xxx".to_string())),
            ..Default::default()
        };
        assert!(config.has_api_key());
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = AiConfig {
            api_key: Some(SecretString::new("sk-very-secret".to_string())),
            ..Default::default()
        };
        assert!(!format!("{:?}", config).contains("sk-very-secret"));
    }

    #[test]
    fn test_validation_invalid_base_url() {
        let config = AiConfig {
            base_url: "api.openai.com".to_string(),
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidUrl("AI_BASE_URL")));
    }
}
