//! On-disk cache tier.
//!
//! Entries are content-addressed files (`<md5>.json`) under the cache
//! directory. Writes go through a temp file and an atomic rename so a
//! crash never leaves a half-written entry. When the file count grows
//! past the cap, the oldest files by mtime are evicted.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use crate::{CacheEntry, CacheError, CacheProvider};

/// Content-addressed file cache with an mtime-LRU file cap.
pub struct FileCache {
    directory: PathBuf,
    max_files: usize,
    // Serializes eviction scans; individual writes are already atomic.
    evict_lock: Mutex<()>,
}

impl FileCache {
    /// Creates a file cache rooted at `directory` (created on first
    /// write), keeping at most `max_files` entries.
    #[must_use]
    pub fn new(directory: PathBuf, max_files: usize) -> Self {
        Self {
            directory,
            max_files,
            evict_lock: Mutex::new(()),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.directory.join(format!("{key}.json"))
    }

    fn read_entry(path: &Path) -> Result<CacheEntry, CacheError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn write_entry(&self, path: &Path, entry: &CacheEntry) -> Result<(), CacheError> {
        fs::create_dir_all(&self.directory)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.directory)?;
        tmp.write_all(serde_json::to_string(entry)?.as_bytes())?;
        tmp.persist(path).map_err(|e| CacheError::Io(e.error))?;
        Ok(())
    }

    /// Removes the oldest files (by mtime) until the cap is respected.
    fn evict_over_cap(&self) -> Result<(), CacheError> {
        let _guard = match self.evict_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut files: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();
        for dirent in fs::read_dir(&self.directory)? {
            let dirent = dirent?;
            let path = dirent.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                let modified = dirent
                    .metadata()?
                    .modified()
                    .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
                files.push((path, modified));
            }
        }

        if files.len() <= self.max_files {
            return Ok(());
        }

        files.sort_by_key(|(_, modified)| *modified);
        let excess = files.len() - self.max_files;
        for (path, _) in files.into_iter().take(excess) {
            if let Err(e) = fs::remove_file(&path) {
                log::warn!("failed to evict cache file {}: {e}", path.display());
            }
        }
        Ok(())
    }
}

impl CacheProvider for FileCache {
    fn get(&self, key: &str) -> Option<CacheEntry> {
        let path = self.path_for(key);
        if !path.exists() {
            return None;
        }

        match Self::read_entry(&path) {
            Ok(entry) => {
                if entry.is_expired() {
                    let _ = fs::remove_file(&path);
                    return None;
                }
                Some(entry)
            }
            Err(e) => {
                // Unreadable entries are dropped so they stop costing
                // a parse on every lookup.
                log::warn!("dropping corrupt cache file {}: {e}", path.display());
                let _ = fs::remove_file(&path);
                None
            }
        }
    }

    fn set(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) {
        let entry = CacheEntry::new(value, ttl);
        let path = self.path_for(key);
        if let Err(e) = self.write_entry(&path, &entry) {
            log::warn!("failed to write cache file {}: {e}", path.display());
            return;
        }
        if let Err(e) = self.evict_over_cap() {
            log::warn!("cache eviction scan failed: {e}");
        }
    }

    fn delete(&self, key: &str) {
        let path = self.path_for(key);
        if path.exists() {
            if let Err(e) = fs::remove_file(&path) {
                log::warn!("failed to delete cache file {}: {e}", path.display());
            }
        }
    }

    fn clear(&self) {
        let Ok(entries) = fs::read_dir(&self.directory) else {
            return;
        };
        for dirent in entries.flatten() {
            let path = dirent.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                let _ = fs::remove_file(&path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path().to_path_buf(), 16);
        cache.set("abc123", json!({"features": []}), None);
        assert_eq!(cache.get("abc123").unwrap().value, json!({"features": []}));
    }

    #[test]
    fn expired_entries_are_removed_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path().to_path_buf(), 16);
        cache.set("k", json!(1), Some(Duration::from_millis(1)));
        std::thread::sleep(Duration::from_millis(10));
        assert!(cache.get("k").is_none());
        assert!(!dir.path().join("k.json").exists());
    }

    #[test]
    fn corrupt_entries_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path().to_path_buf(), 16);
        fs::create_dir_all(dir.path()).unwrap();
        fs::write(dir.path().join("bad.json"), "not json").unwrap();
        assert!(cache.get("bad").is_none());
        assert!(!dir.path().join("bad.json").exists());
    }

    #[test]
    fn file_cap_evicts_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path().to_path_buf(), 2);
        cache.set("first", json!(1), None);
        std::thread::sleep(Duration::from_millis(20));
        cache.set("second", json!(2), None);
        std::thread::sleep(Duration::from_millis(20));
        cache.set("third", json!(3), None);

        let remaining: Vec<bool> = ["first", "second", "third"]
            .iter()
            .map(|k| cache.get(k).is_some())
            .collect();
        assert_eq!(remaining.iter().filter(|hit| **hit).count(), 2);
        assert!(!remaining[0], "oldest entry should have been evicted");
    }

    #[test]
    fn clear_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path().to_path_buf(), 16);
        cache.set("a", json!(1), None);
        cache.set("b", json!(2), None);
        cache.clear();
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_none());
    }
}
