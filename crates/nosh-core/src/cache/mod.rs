//! Time-boxed response cache with prefix invalidation.
//!
//! Keys are the logical request paths of cache-eligible read endpoints.
//! Expired entries are treated as absent and purged lazily at read time;
//! mutations invalidate whole topics by key prefix.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

struct CacheEntry {
    payload: Vec<u8>,
    expires_at: Instant,
}

/// In-memory payload cache consulted before and repopulated after network
/// reads. All access is serialized through one internal lock, so a reader
/// never observes a half-written entry.
#[derive(Default)]
pub struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached payload, or `None` if absent or expired.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.payload.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Stores a payload with an absolute expiry of now + `ttl`.
    pub async fn set(&self, key: &str, payload: Vec<u8>, ttl: Duration) {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            CacheEntry {
                payload,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Removes every entry whose key starts with `prefix`.
    pub async fn invalidate_prefix(&self, prefix: &str) {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        let dropped = before - entries.len();
        if dropped > 0 {
            tracing::debug!(prefix, dropped, "Invalidated cached responses");
        }
    }

    /// Drops everything, e.g. on logout.
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}
