//! StartConversationHandler - Open a tracked conversation

use std::sync::Arc;

use crate::domain::conversation::{ContactInfo, Conversation};
use crate::domain::foundation::{ConversationId, ValidationError};
use crate::ports::{ConversationRepository, RepositoryError};

/// Command to start a conversation
#[derive(Debug, Clone)]
pub struct StartConversationCommand {
    pub platform: String,
    pub channel_id: Option<String>,
    pub contact: ContactInfo,
}

impl StartConversationCommand {
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            channel_id: None,
            contact: ContactInfo::default(),
        }
    }

    pub fn with_channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }

    pub fn with_contact(mut self, contact: ContactInfo) -> Self {
        self.contact = contact;
        self
    }
}

/// Result of starting a conversation
#[derive(Debug, Clone)]
pub struct StartConversationResult {
    pub conversation_id: ConversationId,
}

/// Error type for starting conversations
#[derive(Debug, Clone)]
pub enum StartConversationError {
    /// Command failed validation
    Validation(ValidationError),
    /// Storage error
    Storage(String),
}

impl std::fmt::Display for StartConversationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartConversationError::Validation(err) => write!(f, "{}", err),
            StartConversationError::Storage(err) => write!(f, "Storage error: {}", err),
        }
    }
}

impl std::error::Error for StartConversationError {}

impl From<ValidationError> for StartConversationError {
    fn from(err: ValidationError) -> Self {
        StartConversationError::Validation(err)
    }
}

impl From<RepositoryError> for StartConversationError {
    fn from(err: RepositoryError) -> Self {
        StartConversationError::Storage(err.to_string())
    }
}

/// Handler for starting conversations
pub struct StartConversationHandler {
    conversations: Arc<dyn ConversationRepository>,
}

impl StartConversationHandler {
    pub fn new(conversations: Arc<dyn ConversationRepository>) -> Self {
        Self { conversations }
    }

    pub async fn handle(
        &self,
        cmd: StartConversationCommand,
    ) -> Result<StartConversationResult, StartConversationError> {
        let conversation = Conversation::start(cmd.platform, cmd.channel_id, cmd.contact)?;
        self.conversations.create(&conversation).await?;

        tracing::info!(
            conversation_id = %conversation.id(),
            platform = %conversation.platform(),
            "Conversation started"
        );

        Ok(StartConversationResult {
            conversation_id: conversation.id(),
        })
    }
}
