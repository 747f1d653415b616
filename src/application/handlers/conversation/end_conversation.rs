//! EndConversationHandler - Close a tracked conversation

use std::sync::Arc;

use crate::domain::foundation::ConversationId;
use crate::ports::{ConversationRepository, RepositoryError};

/// Command to end a conversation
#[derive(Debug, Clone)]
pub struct EndConversationCommand {
    pub conversation_id: ConversationId,
}

/// Error type for ending conversations
#[derive(Debug, Clone)]
pub enum EndConversationError {
    /// Storage error
    Storage(String),
}

impl std::fmt::Display for EndConversationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndConversationError::Storage(err) => write!(f, "Storage error: {}", err),
        }
    }
}

impl std::error::Error for EndConversationError {}

impl From<RepositoryError> for EndConversationError {
    fn from(err: RepositoryError) -> Self {
        EndConversationError::Storage(err.to_string())
    }
}

/// Handler for ending conversations
pub struct EndConversationHandler {
    conversations: Arc<dyn ConversationRepository>,
}

impl EndConversationHandler {
    pub fn new(conversations: Arc<dyn ConversationRepository>) -> Self {
        Self { conversations }
    }

    /// Returns false when the conversation was unknown or already closed.
    pub async fn handle(&self, cmd: EndConversationCommand) -> Result<bool, EndConversationError> {
        let closed = self.conversations.close(cmd.conversation_id).await?;
        if closed {
            tracing::info!(conversation_id = %cmd.conversation_id, "Conversation closed");
        }
        Ok(closed)
    }
}
