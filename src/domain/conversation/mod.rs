//! Conversation tracking domain.
//!
//! Conversations, their persisted turns, and the structured events that
//! explain how each assistant turn was decided.

mod conversation;
mod event;
mod message;

pub use conversation::{ContactInfo, Conversation, ConversationStatus};
pub use event::{MessageEvent, MessageEventType};
pub use message::{AssistantDetails, Message, MessageRole};
