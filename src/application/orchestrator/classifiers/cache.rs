//! Classification cache for history-free queries.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::domain::orchestrator::ClassificationResult;

pub const DEFAULT_CACHE_CAPACITY: usize = 500;
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// LRU of classifier verdicts keyed by the trimmed, lower-cased query.
#[derive(Debug)]
pub struct ClassificationCache {
    entries: Mutex<LruCache<String, (ClassificationResult, Instant)>>,
    ttl: Duration,
}

impl Default for ClassificationCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL)
    }
}

impl ClassificationCache {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    fn key(query: &str) -> String {
        query.trim().to_lowercase()
    }

    /// The stored verdict flagged as cached, unless missing or expired.
    pub async fn get(&self, query: &str) -> Option<ClassificationResult> {
        let key = Self::key(query);
        let mut entries = self.entries.lock().await;
        let expired = match entries.get(&key) {
            None => return None,
            Some((_, stored_at)) => stored_at.elapsed() > self.ttl,
        };
        if expired {
            entries.pop(&key);
            return None;
        }
        tracing::debug!(query = %key, "Classification cache hit");
        entries.get(&key).map(|(result, _)| result.from_cache())
    }

    pub async fn put(&self, query: &str, result: ClassificationResult) {
        self.entries
            .lock()
            .await
            .put(Self::key(query), (result, Instant::now()));
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
