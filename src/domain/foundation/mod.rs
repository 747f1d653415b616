//! Foundation module - Shared domain primitives.
//!
//! Contains identifiers, timestamps and validation errors that form the
//! vocabulary of the orchestrator domain.

mod errors;
mod ids;
mod timestamp;

pub use errors::ValidationError;
pub use ids::{ConversationId, EventId, MessageId, RuleId};
pub use timestamp::Timestamp;
