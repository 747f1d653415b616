//! Mock LLM Provider for testing.
//!
//! Provides a configurable mock implementation of the LlmProvider port,
//! allowing tests to run without calling real model APIs.
//!
//! # Features
//!
//! - Pre-configured completions and function calls
//! - Simulated delays for timeout testing
//! - Error injection for resilience testing
//! - Call tracking for verification
//!
//! # Example
//!
//! ```ignore
//! let provider = MockLlmProvider::new()
//!     .with_response(r#"{"intent":"direct","confidence":0.9}"#)
//!     .with_response("Merhaba!")
//!     .with_delay(Duration::from_millis(100));
//!
//! let response = provider.complete(request).await?;
//! ```

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::ports::{
    CompletionRequest, CompletionResponse, FunctionCall, FunctionCallRequest, LlmError,
    LlmProvider, ProviderInfo, TokenUsage,
};

/// Mock LLM provider for testing.
///
/// Completions and function calls are served from two separate queues.
/// An empty completion queue yields "Mock response"; an empty function
/// queue yields no call.
#[derive(Debug, Clone)]
pub struct MockLlmProvider {
    responses: Arc<Mutex<VecDeque<Result<String, LlmError>>>>,
    function_calls: Arc<Mutex<VecDeque<Result<FunctionCall, LlmError>>>>,
    info: ProviderInfo,
    delay: Duration,
    calls: Arc<Mutex<Vec<CompletionRequest>>>,
    function_requests: Arc<Mutex<Vec<FunctionCallRequest>>>,
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            function_calls: Arc::new(Mutex::new(VecDeque::new())),
            info: ProviderInfo::new("mock", "mock-model-1").with_functions(true),
            delay: Duration::ZERO,
            calls: Arc::new(Mutex::new(Vec::new())),
            function_requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Adds a successful completion to the queue.
    pub fn with_response(self, content: impl Into<String>) -> Self {
        self.responses.lock().unwrap().push_back(Ok(content.into()));
        self
    }

    /// Adds a failing completion to the queue.
    pub fn with_error(self, error: LlmError) -> Self {
        self.responses.lock().unwrap().push_back(Err(error));
        self
    }

    /// Adds a function call to the function-call queue.
    pub fn with_function_call(self, name: impl Into<String>, arguments: Value) -> Self {
        self.function_calls.lock().unwrap().push_back(Ok(FunctionCall {
            name: name.into(),
            arguments,
        }));
        self
    }

    /// Adds a failing function call to the function-call queue.
    pub fn with_function_error(self, error: LlmError) -> Self {
        self.function_calls.lock().unwrap().push_back(Err(error));
        self
    }

    /// Reports no function-calling support.
    pub fn without_functions(mut self) -> Self {
        self.info.supports_functions = false;
        self
    }

    /// Sets simulated latency per request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_provider_info(mut self, info: ProviderInfo) -> Self {
        self.info = info;
        self
    }

    /// Number of completion calls made.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// All recorded completion requests, in call order.
    pub fn get_calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// All recorded function-call requests, in call order.
    pub fn get_function_calls(&self) -> Vec<FunctionCallRequest> {
        self.function_requests.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
        self.function_requests.lock().unwrap().clear();
    }

    async fn simulate_latency(&self) {
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.lock().unwrap().push(request);
        self.simulate_latency().await;

        let next = self.responses.lock().unwrap().pop_front();
        let content = next.unwrap_or_else(|| Ok("Mock response".to_string()))?;

        Ok(CompletionResponse {
            content,
            usage: TokenUsage::new(10, 20),
            model: self.info.model.clone(),
        })
    }

    async fn function_call(&self, request: FunctionCallRequest) -> Result<Option<FunctionCall>, LlmError> {
        self.function_requests.lock().unwrap().push(request);
        self.simulate_latency().await;

        let next = self.function_calls.lock().unwrap().pop_front();
        next.transpose()
    }

    fn provider_info(&self) -> ProviderInfo {
        self.info.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn responses_are_served_in_order_then_default() {
        let provider = MockLlmProvider::new().with_response("bir").with_response("iki");

        let first = provider.complete(CompletionRequest::prompt("a")).await.unwrap();
        let second = provider.complete(CompletionRequest::prompt("b")).await.unwrap();
        let third = provider.complete(CompletionRequest::prompt("c")).await.unwrap();

        assert_eq!(first.content, "bir");
        assert_eq!(second.content, "iki");
        assert_eq!(third.content, "Mock response");
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn injected_error_is_returned() {
        let provider = MockLlmProvider::new().with_error(LlmError::AuthenticationFailed);

        let result = provider.complete(CompletionRequest::prompt("a")).await;

        assert!(matches!(result, Err(LlmError::AuthenticationFailed)));
    }

    #[tokio::test]
    async fn function_calls_use_their_own_queue() {
        let provider = MockLlmProvider::new()
            .with_response("metin")
            .with_function_call("weather", json!({"city": "İzmir"}));

        let call = provider
            .function_call(FunctionCallRequest::new("hava", Vec::new()))
            .await
            .unwrap()
            .unwrap();
        let none = provider
            .function_call(FunctionCallRequest::new("hava", Vec::new()))
            .await
            .unwrap();

        assert_eq!(call.name, "weather");
        assert!(none.is_none());
        assert_eq!(provider.call_count(), 0);
        assert_eq!(provider.get_function_calls().len(), 2);
    }

    #[tokio::test]
    async fn clones_share_state() {
        let provider = MockLlmProvider::new();
        let clone = provider.clone();

        clone.complete(CompletionRequest::prompt("a")).await.unwrap();

        assert_eq!(provider.call_count(), 1);
        provider.clear_calls();
        assert_eq!(clone.call_count(), 0);
    }

    #[test]
    fn functions_can_be_disabled() {
        assert!(MockLlmProvider::new().provider_info().supports_functions);
        assert!(!MockLlmProvider::new().without_functions().provider_info().supports_functions);
    }
}
