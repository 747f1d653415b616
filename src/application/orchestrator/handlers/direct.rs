//! Direct handler: a plain model answer with conversation history.

use async_trait::async_trait;
use std::sync::Arc;

use super::{failed, system_prompt, HandlerRequest, IntentHandler};
use crate::application::orchestrator::deadline::complete_within;
use crate::config::BotConfig;
use crate::domain::orchestrator::{IntentType, OrchestratorResult};
use crate::ports::{CompletionRequest, LlmError, LlmProvider, PromptRole};

pub struct DirectHandler {
    llm: Arc<dyn LlmProvider>,
    config: Arc<BotConfig>,
}

impl DirectHandler {
    pub fn new(llm: Arc<dyn LlmProvider>, config: Arc<BotConfig>) -> Self {
        Self { llm, config }
    }
}

#[async_trait]
impl IntentHandler for DirectHandler {
    fn intent(&self) -> IntentType {
        IntentType::Direct
    }

    async fn handle(&self, request: &HandlerRequest<'_>) -> OrchestratorResult {
        let completion = CompletionRequest::new()
            .with_system_prompt(system_prompt(&self.config))
            .with_history(request.history)
            .with_message(PromptRole::User, request.query);

        let mut result =
            match complete_within(self.llm.as_ref(), completion, self.config.llm_timeout_seconds).await {
                Ok(response) => {
                    let mut result = OrchestratorResult::new(request.query, IntentType::Direct);
                    result.answer = Some(response.content);
                    result
                }
                Err(e) => {
                    let error = match &e {
                        LlmError::Timeout { .. } => "timeout".to_string(),
                        other => other.to_string(),
                    };
                    tracing::warn!("Direct answer failed: {}", e);
                    let mut result = failed(request.query, IntentType::Direct, error);
                    result.answer = Some(self.config.messages.service_error.clone());
                    result
                }
            };
        result.metrics.llm_calls_count = 1;
        result
    }
}
