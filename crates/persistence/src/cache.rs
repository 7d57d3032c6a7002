//! Write-through TTL cache used by the DHT adapter.
//!
//! Entries are keyed by the identity string of a path element. An entry is
//! visible only while `now < expires_at`; lookups never evict, expired
//! entries linger until overwritten or cleared.

use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::trace;

#[derive(Debug, Clone)]
struct CacheEntry {
    expires_at: Instant,
    payload: Vec<u8>,
}

/// Thread-safe map from path identity to bytes with a fixed time-to-live.
#[derive(Debug)]
pub struct DhtCache {
    ttl: Duration,
    entries: DashMap<String, CacheEntry>,
}

impl DhtCache {
    /// A zero `ttl` makes every entry stale on insertion.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Insert or overwrite, resetting the expiry to `now + ttl`.
    pub fn put(&self, key: &str, payload: &[u8]) {
        let entry = CacheEntry {
            expires_at: Instant::now() + self.ttl,
            payload: payload.to_vec(),
        };
        self.entries.insert(key.to_string(), entry);
    }

    /// The payload if present and not yet expired.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let entry = self.entries.get(key)?;
        if Instant::now() < entry.expires_at {
            trace!(key, "cache hit");
            Some(entry.payload.clone())
        } else {
            trace!(key, "cache entry expired");
            None
        }
    }

    pub fn clear(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn clear_all(&self) {
        self.entries.clear();
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
