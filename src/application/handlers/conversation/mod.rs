//! Conversation command and query handlers.
//!
//! Starting and ending tracked conversations, processing a message with
//! full persistence, and reading history back.

mod end_conversation;
mod get_history;
mod process_message;
mod start_conversation;

pub use end_conversation::{EndConversationCommand, EndConversationError, EndConversationHandler};
pub use get_history::{
    GetConversationHistoryError, GetConversationHistoryHandler, GetConversationHistoryQuery,
};
pub use process_message::{
    ProcessMessageCommand, ProcessMessageError, ProcessMessageHandler, ProcessMessageResult,
    LAST_INTENT_SCAN,
};
pub use start_conversation::{
    StartConversationCommand, StartConversationError, StartConversationHandler,
    StartConversationResult,
};
