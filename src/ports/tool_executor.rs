//! Tool Executor Port - Interface for running tools chosen by the model.
//!
//! A tool is described to the model by a function schema; when the model
//! calls it, the registered executor runs it with the model's arguments and
//! returns a JSON result that is then summarised for the user.
//!
//! # Example
//!
//! ```ignore
//! struct Clock;
//!
//! #[async_trait]
//! impl ToolExecutor for Clock {
//!     async fn execute(&self, _name: &str, _args: &Value) -> Result<Value, ToolExecutionError> {
//!         Ok(json!({ "now": Utc::now().to_rfc3339() }))
//!     }
//! }
//! ```

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Port for executing one named tool.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute `name` with the model-provided `arguments` object.
    ///
    /// # Errors
    ///
    /// * `InvalidArguments` - arguments do not fit the tool
    /// * `Failed` - the tool ran and failed
    /// * `Timeout` - the tool did not answer in time
    async fn execute(&self, name: &str, arguments: &Value) -> Result<Value, ToolExecutionError>;
}

/// Errors that can occur during tool execution.
#[derive(Debug, Clone, Error)]
pub enum ToolExecutionError {
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{0}")]
    Failed(String),

    #[error("Tool timed out after {timeout_secs}s")]
    Timeout { timeout_secs: f64 },
}

impl ToolExecutionError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_displays_bare_message() {
        assert_eq!(ToolExecutionError::failed("boom").to_string(), "boom");
        assert_eq!(
            ToolExecutionError::ToolNotFound("weather".into()).to_string(),
            "Tool not found: weather"
        );
    }
}
