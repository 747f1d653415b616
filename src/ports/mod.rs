//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Model Ports
//!
//! - `LlmProvider` - Completions and function calling
//! - `EmbeddingProvider` - Text embeddings for the classifier and RAG
//! - `RetrievalBackend` - Vector search over the knowledge base
//! - `ToolExecutor` - Runs a tool chosen by the model
//!
//! ## Persistence Ports
//!
//! - `RuleRepository` - Active rule snapshots
//! - `ConversationRepository` / `MessageRepository` - Conversation reads
//! - `TurnRecorder` - Atomic writes around one decision

mod conversation_repository;
mod embedding_provider;
mod llm_provider;
mod retrieval_backend;
mod rule_repository;
mod tool_executor;

pub use conversation_repository::{
    ConversationRepository, FlowStateUpdate, MessageRepository, TurnRecorder,
};
pub use embedding_provider::{EmbeddingError, EmbeddingProvider};
pub use llm_provider::{
    CompletionRequest, CompletionResponse, FunctionCall, FunctionCallRequest, FunctionSchema,
    LlmError, LlmProvider, PromptMessage, PromptRole, ProviderInfo, TokenUsage,
};
pub use retrieval_backend::{Passage, RetrievalBackend, RetrievalError};
pub use rule_repository::RuleRepository;
pub use tool_executor::{ToolExecutionError, ToolExecutor};

use crate::domain::foundation::ConversationId;

/// Errors from the persistence ports.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RepositoryError {
    #[error("Conversation not found: {0}")]
    ConversationNotFound(ConversationId),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RepositoryError {
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database(message.into())
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }
}
