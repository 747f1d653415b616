//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! - `PostgresRuleRepository` - Rule snapshots for the matcher
//! - `PostgresConversationStore` - Conversations, messages and decision
//!   events, with one transaction per recorded turn
//!
//! Schema lives in `migrations/`.

mod conversation_store;
mod rule_repository;

pub use conversation_store::PostgresConversationStore;
pub use rule_repository::PostgresRuleRepository;
