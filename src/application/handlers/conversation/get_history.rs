//! GetConversationHistoryHandler - Read the last turns of a conversation

use std::sync::Arc;

use crate::domain::conversation::Message;
use crate::domain::foundation::ConversationId;
use crate::ports::{ConversationRepository, MessageRepository, RepositoryError};

/// Query for the last `last_n` messages, oldest first.
#[derive(Debug, Clone)]
pub struct GetConversationHistoryQuery {
    pub conversation_id: ConversationId,
    pub last_n: usize,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum GetConversationHistoryError {
    #[error("Conversation not found: {0}")]
    NotFound(ConversationId),

    #[error("Storage error: {0}")]
    Storage(#[from] RepositoryError),
}

pub struct GetConversationHistoryHandler {
    conversations: Arc<dyn ConversationRepository>,
    messages: Arc<dyn MessageRepository>,
}

impl GetConversationHistoryHandler {
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        messages: Arc<dyn MessageRepository>,
    ) -> Self {
        Self {
            conversations,
            messages,
        }
    }

    pub async fn handle(
        &self,
        query: GetConversationHistoryQuery,
    ) -> Result<Vec<Message>, GetConversationHistoryError> {
        if self.conversations.find_by_id(query.conversation_id).await?.is_none() {
            return Err(GetConversationHistoryError::NotFound(query.conversation_id));
        }
        Ok(self.messages.get_recent(query.conversation_id, query.last_n).await?)
    }
}
