//! Retrieval Backend Port - nearest-neighbour search over document chunks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::orchestrator::Source;

/// Port for the vector store that backs knowledge-base answers.
#[async_trait]
pub trait RetrievalBackend: Send + Sync {
    /// Returns up to `top_k` passages closest to `vector`, best first.
    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<Passage>, RetrievalError>;
}

/// A retrieved document chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub text: String,
    pub title: String,
    pub document_id: Option<String>,
    pub chunk_index: Option<u32>,
    pub score: f64,
}

impl Passage {
    pub fn new(title: impl Into<String>, text: impl Into<String>, score: f64) -> Self {
        Self {
            text: text.into(),
            title: title.into(),
            document_id: None,
            chunk_index: None,
            score,
        }
    }

    pub fn with_document(mut self, document_id: impl Into<String>, chunk_index: u32) -> Self {
        self.document_id = Some(document_id.into());
        self.chunk_index = Some(chunk_index);
        self
    }

    /// Citation for this passage.
    pub fn to_source(&self) -> Source {
        Source {
            title: self.title.clone(),
            document_id: self.document_id.clone(),
            chunk_index: self.chunk_index,
            score: self.score,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RetrievalError {
    #[error("retrieval backend unavailable: {0}")]
    Unavailable(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("retrieval timed out after {timeout_secs}s")]
    Timeout { timeout_secs: f64 },
}

impl RetrievalError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}
