//! Fallback cache backend: the whole key→value map loaded at open time,
//! mutated in memory, written atomically on close if dirty.
//!
//! Not concurrent — suitable only for single-threaded use, per the
//! distilled spec. Atomic write mirrors the teacher's `config::save()`
//! write-to-`.tmp`-then-rename pattern.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{CacheBackend, CacheStats};
use crate::error::{CacheError, Result};
use crate::model::{FileHash, Fingerprint};

#[derive(Debug, Default, Serialize, Deserialize)]
struct JsonEntry {
    fingerprint: String,
    created_at: i64,
    last_accessed: i64,
}

struct State {
    entries: HashMap<String, JsonEntry>,
    dirty: bool,
}

pub struct JsonCacheBackend {
    path: PathBuf,
    state: Mutex<State>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl JsonCacheBackend {
    /// Load the whole map from `path` (an absent file is an empty map).
    pub fn open(path: &Path) -> Result<Self> {
        let entries = if path.exists() {
            let raw = std::fs::read_to_string(path).map_err(CacheError::Json)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(State { entries, dirty: false }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    /// Write the map to disk if it has been mutated since open/last flush,
    /// via write-to-`.tmp`-then-rename so a crash mid-write never
    /// corrupts the existing file.
    pub fn flush(&self) -> Result<()> {
        let mut state = self.state.lock();
        if !state.dirty {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(CacheError::Json)?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        let serialised = serde_json::to_string(&state.entries)
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        std::fs::write(&tmp_path, serialised).map_err(CacheError::Json)?;
        std::fs::rename(&tmp_path, &self.path).map_err(CacheError::Json)?;
        state.dirty = false;
        Ok(())
    }

    /// Every stored entry, for migration tooling.
    pub fn all_entries(&self) -> Vec<(FileHash, Fingerprint)> {
        let state = self.state.lock();
        state
            .entries
            .iter()
            .filter_map(|(hash, entry)| {
                Fingerprint::from_cache_string(&entry.fingerprint)
                    .map(|fp| (FileHash(hash.clone()), fp))
            })
            .collect()
    }
}

impl Drop for JsonCacheBackend {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

impl CacheBackend for JsonCacheBackend {
    fn get(&self, key: &FileHash) -> Result<Option<Fingerprint>> {
        let mut state = self.state.lock();
        let now = now_unix();
        match state.entries.get_mut(key.as_str()) {
            Some(entry) => {
                entry.last_accessed = now;
                state.dirty = true;
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Fingerprint::from_cache_string(&entry.fingerprint))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    fn put(&self, key: &FileHash, fingerprint: &Fingerprint) -> Result<()> {
        let mut state = self.state.lock();
        let now = now_unix();
        let created_at = state
            .entries
            .get(key.as_str())
            .map(|e| e.created_at)
            .unwrap_or(now);
        state.entries.insert(
            key.as_str().to_string(),
            JsonEntry {
                fingerprint: fingerprint.to_cache_string(),
                created_at,
                last_accessed: now,
            },
        );
        state.dirty = true;
        Ok(())
    }

    fn stats(&self) -> Result<CacheStats> {
        let state = self.state.lock();
        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: state.entries.len() as u64,
        })
    }

    fn clear(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.entries.clear();
        state.dirty = true;
        Ok(())
    }

    fn cleanup_older_than(&self, max_age_days: u32) -> Result<u64> {
        let mut state = self.state.lock();
        let cutoff = now_unix() - (max_age_days as i64) * 86_400;
        let before = state.entries.len();
        state.entries.retain(|_, e| e.last_accessed >= cutoff);
        let removed = before - state.entries.len();
        if removed > 0 {
            state.dirty = true;
        }
        Ok(removed as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fp(seed: u32) -> Fingerprint {
        Fingerprint::new(120, vec![seed, seed + 1, seed + 2])
    }

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let cache = JsonCacheBackend::open(&dir.path().join("hashes.json")).unwrap();
        let key = FileHash("abc".to_string());
        cache.put(&key, &fp(1)).unwrap();
        assert_eq!(cache.get(&key).unwrap(), Some(fp(1)));
    }

    #[test]
    fn opening_an_absent_file_starts_empty() {
        let dir = tempdir().unwrap();
        let cache = JsonCacheBackend::open(&dir.path().join("missing.json")).unwrap();
        assert_eq!(cache.stats().unwrap().entries, 0);
    }

    #[test]
    fn flush_writes_file_atomically_and_reopen_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hashes.json");
        {
            let cache = JsonCacheBackend::open(&path).unwrap();
            cache.put(&FileHash("a".to_string()), &fp(1)).unwrap();
            cache.flush().unwrap();
        }
        assert!(path.exists());
        let reopened = JsonCacheBackend::open(&path).unwrap();
        assert_eq!(reopened.get(&FileHash("a".to_string())).unwrap(), Some(fp(1)));
    }

    #[test]
    fn clear_then_get_is_none() {
        let dir = tempdir().unwrap();
        let cache = JsonCacheBackend::open(&dir.path().join("hashes.json")).unwrap();
        let key = FileHash("a".to_string());
        cache.put(&key, &fp(1)).unwrap();
        cache.clear().unwrap();
        assert_eq!(cache.get(&key).unwrap(), None);
    }

    #[test]
    fn cleanup_older_than_removes_stale_entries() {
        let dir = tempdir().unwrap();
        let cache = JsonCacheBackend::open(&dir.path().join("hashes.json")).unwrap();
        let key = FileHash("a".to_string());
        cache.put(&key, &fp(1)).unwrap();
        {
            let mut state = cache.state.lock();
            state.entries.get_mut("a").unwrap().last_accessed = 0;
        }
        let removed = cache.cleanup_older_than(1).unwrap();
        assert_eq!(removed, 1);
    }
}
