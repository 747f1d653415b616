//! Tool handler: the model picks a tool, the tool runs, the model
//! phrases the result.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{HandlerRequest, IntentHandler};
use crate::application::orchestrator::deadline::{complete_within, within};
use crate::application::orchestrator::tools::ToolRegistry;
use crate::config::BotConfig;
use crate::domain::orchestrator::{IntentType, OrchestratorResult};
use crate::ports::{
    CompletionRequest, FunctionCallRequest, LlmError, LlmProvider, ToolExecutionError,
};

pub struct ToolHandler {
    registry: Arc<ToolRegistry>,
    llm: Arc<dyn LlmProvider>,
    config: Arc<BotConfig>,
}

impl ToolHandler {
    pub fn new(registry: Arc<ToolRegistry>, llm: Arc<dyn LlmProvider>, config: Arc<BotConfig>) -> Self {
        Self {
            registry,
            llm,
            config,
        }
    }

    fn answer(&self, query: &str, text: impl Into<String>) -> OrchestratorResult {
        let mut result = OrchestratorResult::new(query, IntentType::Tool);
        result.answer = Some(text.into());
        result
    }

    fn with_available_tools(&self, mut result: OrchestratorResult) -> OrchestratorResult {
        result
            .metadata
            .insert("available_tools".to_string(), json!(self.registry.names()));
        result
    }
}

fn synthesis_prompt(query: &str, tool: &str, output: &str) -> String {
    format!(
        "The user asked: {}\nThe tool '{}' returned the following result:\n{}\n\n\
         Based on this result, provide a concise and helpful answer to the user. \
         Respond in the same language the user used.",
        query, tool, output
    )
}

#[async_trait]
impl IntentHandler for ToolHandler {
    fn intent(&self) -> IntentType {
        IntentType::Tool
    }

    async fn handle(&self, request: &HandlerRequest<'_>) -> OrchestratorResult {
        let query = request.query;
        let timeout = self.config.llm_timeout_seconds;

        let schemas = self.registry.function_schemas();
        if schemas.is_empty() || !self.llm.provider_info().supports_functions {
            return self.with_available_tools(self.answer(query, "Tool support is not configured."));
        }

        let call_request = FunctionCallRequest::new(query, schemas).with_history(request.history);
        let selected = within(timeout, self.llm.function_call(call_request), LlmError::timeout).await;
        let mut llm_calls = 1;

        let call = match selected {
            Ok(Some(call)) if !call.name.trim().is_empty() => call,
            Ok(_) => {
                let mut result = self.with_available_tools(
                    self.answer(query, "I couldn't determine which tool to use for your request."),
                );
                result.metrics.llm_calls_count = llm_calls;
                return result;
            }
            Err(e) => {
                tracing::warn!("Tool selection failed: {}", e);
                let mut result = self.with_available_tools(
                    self.answer(query, "I couldn't determine which tool to use for your request."),
                );
                result.metadata.insert("error".to_string(), e.to_string().into());
                result.metrics.llm_calls_count = llm_calls;
                return result;
            }
        };

        let executor = self
            .registry
            .get(&call.name)
            .filter(|_| self.registry.is_enabled(&call.name))
            .and_then(|tool| tool.executor().cloned());
        let Some(executor) = executor else {
            let mut result = self.answer(
                query,
                format!("Tool '{}' is registered but not executable.", call.name),
            );
            result.tool_called = Some(call.name);
            result.metrics.llm_calls_count = llm_calls;
            return result;
        };

        let output = within(timeout, executor.execute(&call.name, &call.arguments), |secs| {
            ToolExecutionError::Timeout { timeout_secs: secs }
        })
        .await;

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                tracing::error!(tool = %call.name, arguments = %call.arguments, "Tool execution failed: {}", e);
                let text = match &e {
                    ToolExecutionError::InvalidArguments(detail) => {
                        format!("Tool call failed (invalid arguments): {}", detail)
                    }
                    other => format!("Tool execution failed: {}", other),
                };
                let mut result = self.answer(query, text);
                result.tool_called = Some(call.name);
                result.metadata.insert("error".to_string(), e.to_string().into());
                result.metrics.llm_calls_count = llm_calls;
                return result;
            }
        };

        let rendered = output.to_string();
        let completion = CompletionRequest::prompt(synthesis_prompt(query, &call.name, &rendered));
        llm_calls += 1;
        let answer = match complete_within(self.llm.as_ref(), completion, timeout).await {
            Ok(response) if !response.content.trim().is_empty() => response.content,
            Ok(_) => format!("Tool result: {}", rendered),
            Err(e) => {
                tracing::warn!(tool = %call.name, "Tool result synthesis failed: {}", e);
                format!("Tool result: {}", rendered)
            }
        };

        tracing::info!(tool = %call.name, "Tool answer generated");

        let mut result = self.answer(query, answer);
        result.tool_called = Some(call.name.clone());
        result.metadata.insert("tool_name".to_string(), Value::String(call.name));
        result.metadata.insert("tool_arguments".to_string(), call.arguments);
        result.metadata.insert("tool_result".to_string(), output);
        result.metrics.llm_calls_count = llm_calls;
        result
    }
}
