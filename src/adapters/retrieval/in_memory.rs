//! In-memory retrieval backend for testing and demos.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::ports::{Passage, RetrievalBackend, RetrievalError};

#[derive(Debug, Clone)]
struct StoredPassage {
    passage: Passage,
    vector: Option<Vec<f32>>,
}

/// Holds passages in memory.
///
/// Passages added with a vector are scored by cosine similarity against the
/// query; passages without one keep their stored score.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRetrievalBackend {
    passages: Arc<RwLock<Vec<StoredPassage>>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryRetrievalBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_passage(self, passage: Passage) -> Self {
        self.insert(passage, None);
        self
    }

    pub fn with_embedded_passage(self, passage: Passage, vector: Vec<f32>) -> Self {
        self.insert(passage, Some(vector));
        self
    }

    /// Every search fails with `Unavailable`.
    pub fn failing(self) -> Self {
        self.failing.store(true, Ordering::SeqCst);
        self
    }

    pub fn insert(&self, passage: Passage, vector: Option<Vec<f32>>) {
        self.passages
            .write()
            .unwrap()
            .push(StoredPassage { passage, vector });
    }

    pub fn len(&self) -> usize {
        self.passages.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    let norm_a: f64 = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl RetrievalBackend for InMemoryRetrievalBackend {
    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<Passage>, RetrievalError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RetrievalError::unavailable("in-memory backend set to fail"));
        }

        let mut scored: Vec<Passage> = self
            .passages
            .read()
            .unwrap()
            .iter()
            .map(|stored| {
                let mut passage = stored.passage.clone();
                if let Some(stored_vector) = &stored.vector {
                    passage.score = cosine(vector, stored_vector);
                }
                passage
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_best_first_up_to_top_k() {
        let backend = InMemoryRetrievalBackend::new()
            .with_passage(Passage::new("a", "düşük", 0.2))
            .with_passage(Passage::new("b", "yüksek", 0.9))
            .with_passage(Passage::new("c", "orta", 0.5));

        let found = backend.search(&[1.0], 2).await.unwrap();

        let titles: Vec<_> = found.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn embedded_passages_are_scored_against_query() {
        let backend = InMemoryRetrievalBackend::new()
            .with_embedded_passage(Passage::new("kargo", "Kargo 2 gün", 0.0), vec![1.0, 0.0])
            .with_embedded_passage(Passage::new("iade", "İade 14 gün", 0.0), vec![0.0, 1.0]);

        let found = backend.search(&[0.1, 0.9], 1).await.unwrap();

        assert_eq!(found[0].title, "iade");
        assert!(found[0].score > 0.9);
    }

    #[tokio::test]
    async fn failing_backend_errors() {
        let backend = InMemoryRetrievalBackend::new().failing();
        assert!(matches!(
            backend.search(&[1.0], 3).await,
            Err(RetrievalError::Unavailable(_))
        ));
    }
}
