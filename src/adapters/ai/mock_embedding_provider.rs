//! Mock embedding provider for testing.
//!
//! Known texts map to fixed vectors; anything else gets a deterministic
//! vector derived from its bytes, so equal texts always embed equally.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::ports::{EmbeddingError, EmbeddingProvider};

/// Dimension of vectors produced for unknown texts.
const FALLBACK_DIMENSION: usize = 8;

#[derive(Debug, Clone, Default)]
pub struct MockEmbeddingProvider {
    vectors: Arc<Mutex<HashMap<String, Vec<f32>>>>,
    failing: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl MockEmbeddingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vector(self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.vectors.lock().unwrap().insert(text.into(), vector);
        self
    }

    /// Every call fails with `Unavailable`.
    pub fn failing(self) -> Self {
        self.set_failing(true);
        self
    }

    /// Switches failure on or off for this provider and all its clones.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of texts embedded so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fallback_vector(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; FALLBACK_DIMENSION];
        for (i, byte) in text.bytes().enumerate() {
            vector[i % FALLBACK_DIMENSION] += f32::from(byte) / 255.0;
        }
        // Keep the vector non-zero even for empty text.
        vector[0] += 1.0;
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(EmbeddingError::unavailable("mock embedding failure"));
        }

        let known = self.vectors.lock().unwrap().get(text).cloned();
        Ok(known.unwrap_or_else(|| Self::fallback_vector(text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn known_text_uses_configured_vector() {
        let provider = MockEmbeddingProvider::new().with_vector("selam", vec![0.0, 1.0]);
        assert_eq!(provider.embed("selam").await.unwrap(), vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn unknown_text_is_deterministic() {
        let provider = MockEmbeddingProvider::new();
        let a = provider.embed("iade").await.unwrap();
        let b = provider.embed("iade").await.unwrap();
        assert_eq!(a, b);
        assert!(provider.embed("").await.unwrap().iter().any(|v| *v != 0.0));
    }

    #[tokio::test]
    async fn failure_switch_is_shared_by_clones() {
        let provider = MockEmbeddingProvider::new();
        let clone = provider.clone();

        provider.set_failing(true);
        assert!(clone.embed("x").await.is_err());

        provider.set_failing(false);
        assert!(clone.embed("x").await.is_ok());
        assert_eq!(provider.call_count(), 2);
    }
}
