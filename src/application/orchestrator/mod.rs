//! Orchestrator - routes each message to a rule, a retrieval answer, a
//! direct model answer or a tool call.

pub mod classifiers;
mod deadline;
mod engine;
mod error;
pub mod handlers;
mod tools;

pub use deadline::{complete_within, within};
pub use engine::{
    Orchestrator, OrchestratorBuilder, OrchestratorSnapshot, ProcessRequest, DEFAULT_TOP_K,
    MAX_REDISPATCHES,
};
pub use error::OrchestratorError;
pub use tools::{ToolDefinition, ToolRegistry};
