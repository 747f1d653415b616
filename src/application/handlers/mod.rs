//! Application handlers.
//!
//! Command and query handlers that coordinate the orchestrator with the
//! persistence ports.

pub mod conversation;

pub use conversation::{
    // Commands
    EndConversationCommand, ProcessMessageCommand, StartConversationCommand,
    // Queries
    GetConversationHistoryQuery,
    // Handlers
    EndConversationHandler, GetConversationHistoryHandler, ProcessMessageHandler,
    StartConversationHandler,
    // Results and errors
    EndConversationError, GetConversationHistoryError, ProcessMessageError, ProcessMessageResult,
    StartConversationError, StartConversationResult,
};
