use std::sync::Arc;
use std::time::Duration;

use filings_models::Passage;
use moka::future::Cache;

/// In-memory hot cache of ranked query results, backed by moka.
///
/// Keys combine the store generation and the requested `top_k` with the
/// normalized query so the same question asked twice skips the store scan.
/// Entries ranked against an older generation are never looked up again.
/// They expire after the TTL and are dropped wholesale when the store changes.
pub struct QueryCache {
    inner: Cache<String, Arc<Vec<Passage>>>,
}

impl QueryCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub fn key(generation: u64, query: &str, top_k: usize) -> String {
        let normalized = query.split_whitespace().collect::<Vec<_>>().join(" ");
        format!("{generation}:{top_k}:{}", normalized.to_lowercase())
    }

    pub async fn get(&self, key: &str) -> Option<Arc<Vec<Passage>>> {
        self.inner.get(key).await
    }

    pub async fn insert(&self, key: String, passages: Arc<Vec<Passage>>) {
        self.inner.insert(key, passages).await;
    }

    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }
}
