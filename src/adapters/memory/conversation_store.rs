//! In-Memory Conversation Store
//!
//! Implements all three conversation tracking ports over one lock, so each
//! recorded turn is applied as a unit. Useful for testing and the CLI.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::conversation::{Conversation, Message, MessageEvent};
use crate::domain::foundation::{ConversationId, MessageId, Timestamp};
use crate::ports::{
    ConversationRepository, FlowStateUpdate, MessageRepository, RepositoryError, TurnRecorder,
};

#[derive(Debug, Default)]
struct State {
    conversations: HashMap<ConversationId, Conversation>,
    messages: HashMap<ConversationId, Vec<Message>>,
    events: HashMap<MessageId, Vec<MessageEvent>>,
}

impl State {
    fn conversation_mut(&mut self, id: ConversationId) -> Result<&mut Conversation, RepositoryError> {
        self.conversations
            .get_mut(&id)
            .ok_or(RepositoryError::ConversationNotFound(id))
    }

    fn append(&mut self, message: &Message) -> Result<(), RepositoryError> {
        self.conversation_mut(message.conversation_id())?
            .record_message(message.created_at());
        self.messages
            .entry(message.conversation_id())
            .or_default()
            .push(message.clone());
        Ok(())
    }
}

/// In-memory conversations, messages and message events.
#[derive(Debug, Clone, Default)]
pub struct InMemoryConversationStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn conversation_count(&self) -> usize {
        self.state.read().await.conversations.len()
    }

    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.conversations.clear();
        state.messages.clear();
        state.events.clear();
    }
}

#[async_trait]
impl ConversationRepository for InMemoryConversationStore {
    async fn create(&self, conversation: &Conversation) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if state.conversations.contains_key(&conversation.id()) {
            return Err(RepositoryError::database(format!(
                "conversation {} already exists",
                conversation.id()
            )));
        }
        state
            .conversations
            .insert(conversation.id(), conversation.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: ConversationId) -> Result<Option<Conversation>, RepositoryError> {
        Ok(self.state.read().await.conversations.get(&id).cloned())
    }

    async fn list_active(
        &self,
        platform: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Conversation>, RepositoryError> {
        let state = self.state.read().await;
        let mut active: Vec<Conversation> = state
            .conversations
            .values()
            .filter(|c| c.is_active())
            .filter(|c| platform.map_or(true, |p| c.platform() == p))
            .cloned()
            .collect();
        active.sort_by(|a, b| b.updated_at().cmp(&a.updated_at()));
        active.truncate(limit);
        Ok(active)
    }

    async fn close(&self, id: ConversationId) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        Ok(state
            .conversations
            .get_mut(&id)
            .map(Conversation::close)
            .unwrap_or(false))
    }

    async fn get_flow_state(&self, id: ConversationId) -> Result<Option<Value>, RepositoryError> {
        let state = self.state.read().await;
        let conversation = state
            .conversations
            .get(&id)
            .ok_or(RepositoryError::ConversationNotFound(id))?;
        Ok(conversation.flow_state().cloned())
    }

    async fn update_flow_state(
        &self,
        id: ConversationId,
        flow_state: Option<Value>,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.conversation_mut(id)?.set_flow_state(flow_state);
        Ok(())
    }

    async fn increment_message_count(&self, id: ConversationId) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state
            .conversation_mut(id)?
            .record_message(Timestamp::now());
        Ok(())
    }
}

#[async_trait]
impl MessageRepository for InMemoryConversationStore {
    async fn add_user_message(&self, message: &Message) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.conversation_mut(message.conversation_id())?;
        state
            .messages
            .entry(message.conversation_id())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn add_assistant_message(
        &self,
        message: &Message,
        events: &[MessageEvent],
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.conversation_mut(message.conversation_id())?;
        state
            .messages
            .entry(message.conversation_id())
            .or_default()
            .push(message.clone());
        state.events.insert(message.id(), events.to_vec());
        Ok(())
    }

    async fn get_recent(
        &self,
        conversation_id: ConversationId,
        limit: usize,
    ) -> Result<Vec<Message>, RepositoryError> {
        let state = self.state.read().await;
        let messages = state
            .messages
            .get(&conversation_id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        Ok(messages[messages.len().saturating_sub(limit)..].to_vec())
    }

    async fn events_for(&self, message_id: MessageId) -> Result<Vec<MessageEvent>, RepositoryError> {
        Ok(self
            .state
            .read()
            .await
            .events
            .get(&message_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl TurnRecorder for InMemoryConversationStore {
    async fn record_user_turn(&self, message: &Message) -> Result<(), RepositoryError> {
        self.state.write().await.append(message)
    }

    async fn record_assistant_turn(
        &self,
        message: &Message,
        events: &[MessageEvent],
        flow_state: FlowStateUpdate,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.append(message)?;
        state.events.insert(message.id(), events.to_vec());
        if let FlowStateUpdate::Set(next) = flow_state {
            state
                .conversation_mut(message.conversation_id())?
                .set_flow_state(next);
        }
        Ok(())
    }
}
