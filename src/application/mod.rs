//! Application layer - the decision engine and the handlers around it.
//!
//! `orchestrator` decides how to answer a single message; `handlers`
//! wraps it with conversation tracking.

pub mod handlers;
pub mod orchestrator;

pub use handlers::{
    EndConversationCommand, EndConversationHandler, GetConversationHistoryHandler,
    GetConversationHistoryQuery, ProcessMessageCommand, ProcessMessageHandler,
    StartConversationCommand, StartConversationHandler,
};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, OrchestratorError, ProcessRequest};
