#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Caching for upstream API responses.
//!
//! Four providers share one interface: a bounded in-memory LRU, a
//! content-addressed file cache, a hybrid of the two (memory front,
//! file back), and a no-op that always misses. Keys are the MD5 of a
//! canonical JSON rendering of the request parameters, so identical
//! requests hash identically regardless of parameter ordering. Values
//! are opaque JSON.

mod file;
mod key;
mod memory;

pub use file::FileCache;
pub use key::cache_key;
pub use memory::MemoryCache;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// I/O error reading or writing the cache directory.
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A cache file held something other than a serialized entry.
    #[error("corrupt cache entry: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// A cached value with its lifetime bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The cached payload, opaque to the cache.
    pub value: serde_json::Value,
    /// When the entry was stored.
    pub created_at: DateTime<Utc>,
    /// When the entry stops being served, if it expires at all.
    pub expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    /// Creates an entry expiring `ttl` from now (or never, if `None`).
    #[must_use]
    pub fn new(value: serde_json::Value, ttl: Option<Duration>) -> Self {
        let created_at = Utc::now();
        let expires_at = ttl.and_then(|ttl| {
            chrono::Duration::from_std(ttl)
                .ok()
                .map(|ttl| created_at + ttl)
        });
        Self {
            value,
            created_at,
            expires_at,
        }
    }

    /// Returns `true` once the entry has outlived its TTL.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() > at)
    }
}

/// The common interface implemented by every cache variant.
///
/// Providers are shared read-many behind an [`Arc`]; writes are guarded
/// internally, so all methods take `&self`.
pub trait CacheProvider: Send + Sync {
    /// Looks up a live entry. Expired entries are treated as misses
    /// (and may be evicted as a side effect).
    fn get(&self, key: &str) -> Option<CacheEntry>;

    /// Stores a value under `key`, replacing any previous entry.
    fn set(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>);

    /// Removes the entry for `key`, if present.
    fn delete(&self, key: &str);

    /// Drops every entry.
    fn clear(&self);
}

/// Which cache variant to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheStrategy {
    /// Bounded in-memory LRU only.
    Memory,
    /// On-disk file cache only.
    File,
    /// Memory front, file back; file hits are promoted into memory.
    #[default]
    Hybrid,
    /// No caching: every lookup misses.
    None,
}

/// Settings shared by the disk-backed variants.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Strategy to construct.
    pub strategy: CacheStrategy,
    /// Directory for cache files.
    pub directory: PathBuf,
    /// Entry cap for the memory tier.
    pub max_size: u64,
    /// File-count cap for the disk tier (LRU by mtime).
    pub max_files: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            strategy: CacheStrategy::Hybrid,
            directory: default_cache_dir(),
            max_size: 512,
            max_files: 4096,
        }
    }
}

/// `~/.socialmapper/census_cache`, falling back to a relative path when
/// no home directory is resolvable.
#[must_use]
pub fn default_cache_dir() -> PathBuf {
    std::env::var_os("HOME").map_or_else(
        || PathBuf::from(".socialmapper/census_cache"),
        |home| PathBuf::from(home).join(".socialmapper/census_cache"),
    )
}

/// Constructs the provider selected by `config.strategy`.
#[must_use]
pub fn build_provider(config: &CacheConfig) -> Arc<dyn CacheProvider> {
    match config.strategy {
        CacheStrategy::Memory => Arc::new(MemoryCache::new(config.max_size)),
        CacheStrategy::File => Arc::new(FileCache::new(config.directory.clone(), config.max_files)),
        CacheStrategy::Hybrid => Arc::new(HybridCache::new(
            MemoryCache::new(config.max_size),
            FileCache::new(config.directory.clone(), config.max_files),
        )),
        CacheStrategy::None => Arc::new(NoopCache),
    }
}

/// Memory-front, file-back cache.
pub struct HybridCache {
    memory: MemoryCache,
    file: FileCache,
}

impl HybridCache {
    /// Combines a memory tier and a file tier.
    #[must_use]
    pub const fn new(memory: MemoryCache, file: FileCache) -> Self {
        Self { memory, file }
    }
}

impl CacheProvider for HybridCache {
    fn get(&self, key: &str) -> Option<CacheEntry> {
        if let Some(entry) = self.memory.get(key) {
            return Some(entry);
        }

        // File hit: promote into the memory tier before returning.
        let entry = self.file.get(key)?;
        self.memory.put_entry(key, entry.clone());
        Some(entry)
    }

    fn set(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) {
        self.memory.set(key, value.clone(), ttl);
        self.file.set(key, value, ttl);
    }

    fn delete(&self, key: &str) {
        self.memory.delete(key);
        self.file.delete(key);
    }

    fn clear(&self) {
        self.memory.clear();
        self.file.clear();
    }
}

/// Cache that never stores anything.
pub struct NoopCache;

impl CacheProvider for NoopCache {
    fn get(&self, _key: &str) -> Option<CacheEntry> {
        None
    }

    fn set(&self, _key: &str, _value: serde_json::Value, _ttl: Option<Duration>) {}

    fn delete(&self, _key: &str) {}

    fn clear(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entry_without_ttl_never_expires() {
        let entry = CacheEntry::new(json!({"a": 1}), None);
        assert!(!entry.is_expired());
        assert!(entry.expires_at.is_none());
    }

    #[test]
    fn entry_with_zero_ttl_expires() {
        let entry = CacheEntry::new(json!(1), Some(Duration::from_secs(0)));
        std::thread::sleep(Duration::from_millis(5));
        assert!(entry.is_expired());
    }

    #[test]
    fn noop_always_misses() {
        let cache = NoopCache;
        cache.set("k", json!(42), None);
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn hybrid_promotes_file_hits() {
        let dir = tempfile::tempdir().unwrap();
        let file = FileCache::new(dir.path().to_path_buf(), 16);
        file.set("k", json!("v"), None);

        let hybrid = HybridCache::new(MemoryCache::new(4), file);
        assert_eq!(hybrid.get("k").unwrap().value, json!("v"));
        // Now present in the memory tier too.
        assert_eq!(hybrid.memory.get("k").unwrap().value, json!("v"));
    }
}
