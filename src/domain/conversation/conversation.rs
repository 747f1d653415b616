//! Conversation entity - one tracked chat session on a channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::domain::foundation::{ConversationId, Timestamp, ValidationError};

/// Lifecycle status of a conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    #[default]
    Active,
    Closed,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::Active => "active",
            ConversationStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ConversationStatus::Active),
            "closed" => Some(ConversationStatus::Closed),
            _ => None,
        }
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is on the other side of the conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub phone: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    /// Channel-specific extras (profile ids, locale, ...).
    pub meta: Option<Value>,
}

impl ContactInfo {
    pub fn is_empty(&self) -> bool {
        self.phone.is_none() && self.email.is_none() && self.name.is_none() && self.meta.is_none()
    }
}

/// A chat session on one platform.
///
/// # Invariants
///
/// - `platform` is non-empty
/// - a closed conversation never reopens
/// - `flow_state` is the raw persisted blob; it is interpreted by the engine
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    id: ConversationId,
    platform: String,
    channel_id: Option<String>,
    contact: ContactInfo,
    status: ConversationStatus,
    message_count: u32,
    last_message_at: Option<Timestamp>,
    flow_state: Option<Value>,
    created_at: Timestamp,
    updated_at: Timestamp,
}

impl Conversation {
    /// Starts a new active conversation.
    ///
    /// # Errors
    ///
    /// - `EmptyField` if `platform` is blank
    pub fn start(
        platform: impl Into<String>,
        channel_id: Option<String>,
        contact: ContactInfo,
    ) -> Result<Self, ValidationError> {
        let platform = platform.into();
        if platform.trim().is_empty() {
            return Err(ValidationError::empty_field("platform"));
        }
        let now = Timestamp::now();
        Ok(Self {
            id: ConversationId::new(),
            platform,
            channel_id,
            contact,
            status: ConversationStatus::Active,
            message_count: 0,
            last_message_at: None,
            flow_state: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Reconstitutes a conversation from persistence.
    #[allow(clippy::too_many_arguments)]
    pub fn reconstitute(
        id: ConversationId,
        platform: String,
        channel_id: Option<String>,
        contact: ContactInfo,
        status: ConversationStatus,
        message_count: u32,
        last_message_at: Option<Timestamp>,
        flow_state: Option<Value>,
        created_at: Timestamp,
        updated_at: Timestamp,
    ) -> Self {
        Self {
            id,
            platform,
            channel_id,
            contact,
            status,
            message_count,
            last_message_at,
            flow_state,
            created_at,
            updated_at,
        }
    }

    // === Accessors ===

    pub fn id(&self) -> ConversationId {
        self.id
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn channel_id(&self) -> Option<&str> {
        self.channel_id.as_deref()
    }

    pub fn contact(&self) -> &ContactInfo {
        &self.contact
    }

    pub fn status(&self) -> ConversationStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == ConversationStatus::Active
    }

    pub fn message_count(&self) -> u32 {
        self.message_count
    }

    pub fn last_message_at(&self) -> Option<Timestamp> {
        self.last_message_at
    }

    pub fn flow_state(&self) -> Option<&Value> {
        self.flow_state.as_ref()
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    // === Mutations ===

    /// Closes the conversation. Returns false if it was already closed.
    pub fn close(&mut self) -> bool {
        if !self.is_active() {
            return false;
        }
        self.status = ConversationStatus::Closed;
        self.updated_at = Timestamp::now();
        true
    }

    /// Counts one more persisted message.
    pub fn record_message(&mut self, at: Timestamp) {
        self.message_count = self.message_count.saturating_add(1);
        self.last_message_at = Some(at);
        self.updated_at = at;
    }

    /// Replaces the persisted flow state; `None` or `null` clears it.
    pub fn set_flow_state(&mut self, state: Option<Value>) {
        self.flow_state = state.filter(|v| !v.is_null());
        self.updated_at = Timestamp::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn conversation() -> Conversation {
        Conversation::start("cli", None, ContactInfo::default()).unwrap()
    }

    #[test]
    fn start_is_active_and_empty() {
        let conv = conversation();
        assert!(conv.is_active());
        assert_eq!(conv.message_count(), 0);
        assert!(conv.flow_state().is_none());
    }

    #[test]
    fn start_rejects_blank_platform() {
        let err = Conversation::start("  ", None, ContactInfo::default()).unwrap_err();
        assert_eq!(err, ValidationError::empty_field("platform"));
    }

    #[test]
    fn close_only_once() {
        let mut conv = conversation();
        assert!(conv.close());
        assert!(!conv.close());
        assert_eq!(conv.status(), ConversationStatus::Closed);
    }

    #[test]
    fn record_message_counts_and_stamps() {
        let mut conv = conversation();
        let at = Timestamp::now();
        conv.record_message(at);
        conv.record_message(at);
        assert_eq!(conv.message_count(), 2);
        assert_eq!(conv.last_message_at(), Some(at));
    }

    #[test]
    fn null_flow_state_clears() {
        let mut conv = conversation();
        conv.set_flow_state(Some(json!({"flow_id": "f", "current_step": "s"})));
        assert!(conv.flow_state().is_some());
        conv.set_flow_state(Some(Value::Null));
        assert!(conv.flow_state().is_none());
    }
}
