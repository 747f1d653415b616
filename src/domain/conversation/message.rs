//! Message entity for tracked conversations.
//!
//! Messages are immutable records of one turn. Assistant messages carry the
//! decision details of the orchestrator result that produced them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::domain::foundation::{ConversationId, MessageId, Timestamp};
use crate::domain::orchestrator::{ClassifierLayer, IntentType, OrchestratorResult, Source};

/// Who sent a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            _ => None,
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification and cost details stored with an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantDetails {
    pub intent: IntentType,
    pub confidence: Option<f64>,
    pub classifier_layer: Option<ClassifierLayer>,
    pub rule_matched: Option<String>,
    pub fallback_used: bool,
    pub needs_clarification: bool,
    pub total_ms: f64,
    pub llm_calls_count: u32,
    pub sources: Vec<Source>,
    pub extra_metadata: Map<String, Value>,
}

impl AssistantDetails {
    pub fn from_result(result: &OrchestratorResult) -> Self {
        let mut extra_metadata = result.metadata.clone();
        if let Some(tool) = &result.tool_called {
            extra_metadata.insert("tool_called".to_string(), Value::String(tool.clone()));
        }
        Self {
            intent: result.intent,
            confidence: result.confidence(),
            classifier_layer: result.classifier_layer(),
            rule_matched: result.rule_matched.clone(),
            fallback_used: result.fallback_used,
            needs_clarification: result.needs_clarification,
            total_ms: result.metrics.total_ms,
            llm_calls_count: result.metrics.llm_calls_count,
            sources: result.sources.clone(),
            extra_metadata,
        }
    }
}

/// One persisted turn of a conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    id: MessageId,
    conversation_id: ConversationId,
    role: MessageRole,
    content: String,
    details: Option<AssistantDetails>,
    created_at: Timestamp,
}

impl Message {
    /// Creates a user message.
    pub fn user(conversation_id: ConversationId, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            conversation_id,
            role: MessageRole::User,
            content: content.into(),
            details: None,
            created_at: Timestamp::now(),
        }
    }

    /// Creates the assistant message for an orchestrator result.
    ///
    /// A result without an answer is stored with empty content.
    pub fn assistant(conversation_id: ConversationId, result: &OrchestratorResult) -> Self {
        Self {
            id: MessageId::new(),
            conversation_id,
            role: MessageRole::Assistant,
            content: result.answer.clone().unwrap_or_default(),
            details: Some(AssistantDetails::from_result(result)),
            created_at: Timestamp::now(),
        }
    }

    /// Reconstitutes a message from persistence (no validation).
    pub fn reconstitute(
        id: MessageId,
        conversation_id: ConversationId,
        role: MessageRole,
        content: String,
        details: Option<AssistantDetails>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            conversation_id,
            role,
            content,
            details,
            created_at,
        }
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn conversation_id(&self) -> ConversationId {
        self.conversation_id
    }

    pub fn role(&self) -> MessageRole {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn details(&self) -> Option<&AssistantDetails> {
        self.details.as_ref()
    }

    pub fn intent(&self) -> Option<IntentType> {
        self.details.as_ref().map(|d| d.intent)
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn is_assistant(&self) -> bool {
        self.role == MessageRole::Assistant
    }
}
