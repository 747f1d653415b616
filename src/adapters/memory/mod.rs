//! In-memory repositories for tests and local runs.

mod conversation_store;
mod rule_repository;

pub use conversation_store::InMemoryConversationStore;
pub use rule_repository::InMemoryRuleRepository;
