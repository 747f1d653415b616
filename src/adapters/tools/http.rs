//! HTTP tool executor.
//!
//! Each tool name maps to an endpoint. The model's arguments are POSTed as
//! the JSON body and the JSON response becomes the tool result.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

use crate::ports::{ToolExecutionError, ToolExecutor};

pub struct HttpToolExecutor {
    client: Client,
    endpoints: HashMap<String, String>,
    timeout: Duration,
}

impl HttpToolExecutor {
    pub fn new(timeout: Duration) -> Result<Self, ToolExecutionError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ToolExecutionError::failed(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoints: HashMap::new(),
            timeout,
        })
    }

    pub fn with_endpoint(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.endpoints.insert(name.into(), url.into());
        self
    }

    pub fn endpoint(&self, name: &str) -> Option<&str> {
        self.endpoints.get(name).map(String::as_str)
    }
}

#[async_trait]
impl ToolExecutor for HttpToolExecutor {
    async fn execute(&self, name: &str, arguments: &Value) -> Result<Value, ToolExecutionError> {
        let url = self
            .endpoint(name)
            .ok_or_else(|| ToolExecutionError::ToolNotFound(name.to_string()))?;
        if !arguments.is_object() {
            return Err(ToolExecutionError::invalid_arguments("arguments must be a JSON object"));
        }

        let response = self
            .client
            .post(url)
            .json(arguments)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ToolExecutionError::Timeout {
                        timeout_secs: self.timeout.as_secs_f64(),
                    }
                } else {
                    ToolExecutionError::failed(format!("request failed: {}", e))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ToolExecutionError::failed(format!("failed to read response: {}", e)))?;

        match status.as_u16() {
            200..=299 => Ok(serde_json::from_str(&body).unwrap_or_else(|_| json!({ "text": body }))),
            400 | 422 => Err(ToolExecutionError::invalid_arguments(body)),
            code => Err(ToolExecutionError::failed(format!("tool endpoint returned {}: {}", code, body))),
        }
    }
}
