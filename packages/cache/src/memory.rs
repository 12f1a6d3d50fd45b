//! Bounded in-memory cache tier.

use std::time::Duration;

use crate::{CacheEntry, CacheProvider};

/// In-memory LRU cache with a fixed entry cap.
///
/// Backed by a `moka` synchronous cache; TTL is enforced per entry at
/// read time so the file tier and memory tier agree on expiry.
pub struct MemoryCache {
    inner: moka::sync::Cache<String, CacheEntry>,
}

impl MemoryCache {
    /// Creates a cache holding at most `max_size` entries.
    #[must_use]
    pub fn new(max_size: u64) -> Self {
        Self {
            inner: moka::sync::Cache::builder().max_capacity(max_size).build(),
        }
    }

    /// Inserts an already-constructed entry (used by the hybrid tier to
    /// promote file hits without resetting `created_at`).
    pub fn put_entry(&self, key: &str, entry: CacheEntry) {
        self.inner.insert(key.to_string(), entry);
    }
}

impl CacheProvider for MemoryCache {
    fn get(&self, key: &str) -> Option<CacheEntry> {
        let entry = self.inner.get(key)?;
        if entry.is_expired() {
            self.inner.invalidate(key);
            return None;
        }
        Some(entry)
    }

    fn set(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) {
        self.inner
            .insert(key.to_string(), CacheEntry::new(value, ttl));
    }

    fn delete(&self, key: &str) {
        self.inner.invalidate(key);
    }

    fn clear(&self) {
        self.inner.invalidate_all();
    }
}
