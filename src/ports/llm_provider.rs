//! LLM Provider Port - Interface for language model integrations.
//!
//! This port abstracts completion and function-calling requests so the
//! classifier cascade and the intent handlers never depend on a specific
//! vendor API.
//!
//! Both the LLM classifier layer and the direct/rag/tool handlers go
//! through it. Failures surface as [`LlmError`]; the orchestrator decides
//! which of them are terminal.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::conversation::MessageRole;
use crate::domain::orchestrator::ConversationTurn;

/// Port for language model interactions.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a single completion.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Ask the model to pick one of `request.functions` and fill in its arguments.
    ///
    /// Returns `Ok(None)` when the model answered without calling a function.
    /// Providers without function calling keep the default.
    async fn function_call(
        &self,
        request: FunctionCallRequest,
    ) -> Result<Option<FunctionCall>, LlmError> {
        let _ = request;
        Ok(None)
    }

    /// Get provider information (name, model, capabilities).
    fn provider_info(&self) -> ProviderInfo;
}

/// Request for a completion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionRequest {
    /// Conversation messages, oldest first.
    pub messages: Vec<PromptMessage>,
    /// System prompt to guide model behavior.
    pub system_prompt: Option<String>,
    pub max_tokens: Option<u32>,
    /// 0.0 is deterministic.
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// A request made of a single user prompt.
    pub fn prompt(text: impl Into<String>) -> Self {
        Self::new().with_message(PromptRole::User, text)
    }

    /// Adds a message to the conversation.
    pub fn with_message(mut self, role: PromptRole, content: impl Into<String>) -> Self {
        self.messages.push(PromptMessage {
            role,
            content: content.into(),
        });
        self
    }

    /// Appends prior conversation turns.
    pub fn with_history(mut self, history: &[ConversationTurn]) -> Self {
        self.messages.extend(history.iter().map(PromptMessage::from));
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    /// Content of the last user message, if any.
    pub fn last_user_content(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == PromptRole::User)
            .map(|m| m.content.clone())
    }
}

/// A message sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
}

impl From<&ConversationTurn> for PromptMessage {
    fn from(turn: &ConversationTurn) -> Self {
        let role = match turn.role {
            MessageRole::User => PromptRole::User,
            MessageRole::Assistant => PromptRole::Assistant,
        };
        Self {
            role,
            content: turn.content.clone(),
        }
    }
}

/// Role of a prompt message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

/// Response from a completion.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResponse {
    pub content: String,
    pub usage: TokenUsage,
    /// Model that generated the response.
    pub model: String,
}

impl CompletionResponse {
    pub fn new(content: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: TokenUsage::default(),
            model: model.into(),
        }
    }
}

/// Token usage information.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// A callable function offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments object.
    pub parameters: Value,
}

/// Request for a function-calling completion.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCallRequest {
    pub messages: Vec<PromptMessage>,
    pub functions: Vec<FunctionSchema>,
}

impl FunctionCallRequest {
    pub fn new(query: impl Into<String>, functions: Vec<FunctionSchema>) -> Self {
        Self {
            messages: vec![PromptMessage {
                role: PromptRole::User,
                content: query.into(),
            }],
            functions,
        }
    }

    /// Puts prior turns before the query.
    pub fn with_history(mut self, history: &[ConversationTurn]) -> Self {
        let mut messages: Vec<PromptMessage> = history.iter().map(PromptMessage::from).collect();
        messages.append(&mut self.messages);
        self.messages = messages;
        self
    }
}

/// The function the model chose to call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: Value,
}

/// Provider information and capabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInfo {
    /// Provider name (e.g., "openai").
    pub name: String,
    pub model: String,
    pub supports_functions: bool,
}

impl ProviderInfo {
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            supports_functions: false,
        }
    }

    pub fn with_functions(mut self, supports: bool) -> Self {
        self.supports_functions = supports;
        self
    }
}

/// LLM provider errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u32 },

    #[error("content filtered: {reason}")]
    ContentFiltered { reason: String },

    #[error("provider unavailable: {message}")]
    Unavailable { message: String },

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("network error: {0}")]
    Network(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: f64 },
}

impl LlmError {
    pub fn rate_limited(retry_after_secs: u32) -> Self {
        Self::RateLimited { retry_after_secs }
    }

    pub fn content_filtered(reason: impl Into<String>) -> Self {
        Self::ContentFiltered {
            reason: reason.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    pub fn timeout(timeout_secs: f64) -> Self {
        Self::Timeout { timeout_secs }
    }

    /// Returns true if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited { .. }
                | LlmError::Unavailable { .. }
                | LlmError::Network(_)
                | LlmError::Timeout { .. }
        )
    }
}
