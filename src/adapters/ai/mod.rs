//! Model Provider Adapters.
//!
//! ## Available Adapters
//!
//! - `MockLlmProvider` - Configurable completion mock for testing
//! - `MockEmbeddingProvider` - Deterministic embeddings for testing
//! - `OpenAiProvider` - OpenAI-compatible completions, function calling
//!   and embeddings

mod mock_embedding_provider;
mod mock_provider;
mod openai_provider;

pub use mock_embedding_provider::MockEmbeddingProvider;
pub use mock_provider::MockLlmProvider;
pub use openai_provider::{OpenAiConfig, OpenAiProvider};
