//! Orchestrator errors.

use thiserror::Error;

use crate::ports::{LlmError, RepositoryError};

/// Failures the decision engine cannot turn into an answer.
#[derive(Debug, Clone, Error)]
pub enum OrchestratorError {
    /// The LLM classifier layer failed and no layer is left to fall back to.
    #[error("Classification failed: {0}")]
    Classification(#[from] LlmError),

    /// The engine was built without a required collaborator.
    #[error("Orchestrator misconfigured: {0}")]
    Configuration(String),

    /// Rules could not be loaded on reload.
    #[error("Rule store error: {0}")]
    Rules(#[from] RepositoryError),
}

impl OrchestratorError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Text safe to show to an end user. Never includes provider details.
    pub fn user_message(&self) -> &'static str {
        match self {
            OrchestratorError::Classification(e) if e.is_retryable() => {
                "The assistant is busy right now. Please try again in a moment."
            }
            _ => "Sorry, something went wrong while answering. Please try again later.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_hides_provider_details() {
        let err = OrchestratorError::from(LlmError::unavailable("upstream 503 from 10.0.0.7"));
        assert!(!err.user_message().contains("10.0.0.7"));
        assert!(err.to_string().contains("10.0.0.7"));
    }

    #[test]
    fn timeout_is_reported_as_busy() {
        let err = OrchestratorError::from(LlmError::timeout(60.0));
        assert!(err.user_message().contains("busy"));
        let err = OrchestratorError::configuration("no llm");
        assert!(err.user_message().starts_with("Sorry"));
    }
}
