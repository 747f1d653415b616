//! Conversation tracking ports.
//!
//! Reads go through [`ConversationRepository`] and [`MessageRepository`].
//! The two writes made around one decision go through [`TurnRecorder`], so
//! each of them is a single unit of work:
//!
//! 1. the user message and its message-count bump, committed before the
//!    decision runs
//! 2. the assistant message, its events and the flow-state update,
//!    committed together afterwards

use async_trait::async_trait;
use serde_json::Value;

use super::RepositoryError;
use crate::domain::conversation::{Conversation, Message, MessageEvent};
use crate::domain::foundation::{ConversationId, MessageId};

/// Repository port for conversation records.
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Save a new conversation.
    async fn create(&self, conversation: &Conversation) -> Result<(), RepositoryError>;

    /// Returns `None` if not found.
    async fn find_by_id(&self, id: ConversationId) -> Result<Option<Conversation>, RepositoryError>;

    /// Active conversations, most recently updated first.
    async fn list_active(
        &self,
        platform: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Conversation>, RepositoryError>;

    /// Close a conversation. Returns false if it was unknown or already closed.
    async fn close(&self, id: ConversationId) -> Result<bool, RepositoryError>;

    /// The raw persisted flow state, `None` when no flow is active.
    async fn get_flow_state(&self, id: ConversationId) -> Result<Option<Value>, RepositoryError>;

    /// Replace the persisted flow state; `None` clears it.
    async fn update_flow_state(
        &self,
        id: ConversationId,
        state: Option<Value>,
    ) -> Result<(), RepositoryError>;

    async fn increment_message_count(&self, id: ConversationId) -> Result<(), RepositoryError>;
}

/// Repository port for persisted turns.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn add_user_message(&self, message: &Message) -> Result<(), RepositoryError>;

    /// Store an assistant message with its events.
    async fn add_assistant_message(
        &self,
        message: &Message,
        events: &[MessageEvent],
    ) -> Result<(), RepositoryError>;

    /// The last `limit` messages of a conversation, oldest first.
    async fn get_recent(
        &self,
        conversation_id: ConversationId,
        limit: usize,
    ) -> Result<Vec<Message>, RepositoryError>;

    /// Events of one message in creation order.
    async fn events_for(&self, message_id: MessageId) -> Result<Vec<MessageEvent>, RepositoryError>;
}

/// What to do with the persisted flow state after an assistant turn.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowStateUpdate {
    /// Leave the stored state untouched.
    Keep,
    /// Replace it; `None` clears it.
    Set(Option<Value>),
}

/// Atomic writes around a single decision.
#[async_trait]
pub trait TurnRecorder: Send + Sync {
    /// Persist the incoming user message and count it, in one transaction.
    async fn record_user_turn(&self, message: &Message) -> Result<(), RepositoryError>;

    /// Persist the assistant message, its events, the message count and the
    /// flow-state update, in one transaction.
    async fn record_assistant_turn(
        &self,
        message: &Message,
        events: &[MessageEvent],
        flow_state: FlowStateUpdate,
    ) -> Result<(), RepositoryError>;
}
