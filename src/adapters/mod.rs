//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the orchestrator to external systems:
//! - `ai` - Model providers (OpenAI-compatible, mocks)
//! - `retrieval` - Vector search (Qdrant, in-memory)
//! - `tools` - Tool executors (HTTP, mock)
//! - `memory` - In-memory repositories
//! - `postgres` - PostgreSQL repositories

pub mod ai;
pub mod memory;
pub mod postgres;
pub mod retrieval;
pub mod tools;

pub use ai::{MockEmbeddingProvider, MockLlmProvider, OpenAiConfig, OpenAiProvider};
pub use memory::{InMemoryConversationStore, InMemoryRuleRepository};
pub use postgres::{PostgresConversationStore, PostgresRuleRepository};
pub use retrieval::{InMemoryRetrievalBackend, QdrantRetrievalBackend};
pub use tools::{HttpToolExecutor, MockToolExecutor};
