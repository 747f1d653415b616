//! Mock tool executor for testing.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::ports::{ToolExecutionError, ToolExecutor};

/// Returns a configured result per tool name and records every call.
#[derive(Debug, Clone, Default)]
pub struct MockToolExecutor {
    outcomes: Arc<Mutex<HashMap<String, Result<Value, ToolExecutionError>>>>,
    calls: Arc<Mutex<Vec<(String, Value)>>>,
}

impl MockToolExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(self, name: impl Into<String>, result: Value) -> Self {
        self.outcomes.lock().unwrap().insert(name.into(), Ok(result));
        self
    }

    pub fn with_error(self, name: impl Into<String>, error: ToolExecutionError) -> Self {
        self.outcomes.lock().unwrap().insert(name.into(), Err(error));
        self
    }

    /// Recorded `(tool name, arguments)` pairs, in call order.
    pub fn get_calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolExecutor for MockToolExecutor {
    async fn execute(&self, name: &str, arguments: &Value) -> Result<Value, ToolExecutionError> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), arguments.clone()));

        self.outcomes
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_else(|| Err(ToolExecutionError::ToolNotFound(name.to_string())))
    }
}
