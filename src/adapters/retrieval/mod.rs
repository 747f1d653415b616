//! Retrieval backend adapters.

mod in_memory;
mod qdrant;

pub use in_memory::InMemoryRetrievalBackend;
pub use qdrant::QdrantRetrievalBackend;
