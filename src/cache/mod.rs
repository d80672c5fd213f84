//! Fingerprint Cache (C3): a concurrent, content-addressed store mapping
//! [`FileHash`] to [`Fingerprint`], behind one `CacheBackend` trait so
//! callers (the hasher, migration tooling, tests) never need to know which
//! concrete backend is in play.
//!
//! Two implementations, selected by [`crate::config::CacheBackendKind`]:
//! [`sqlite::SqliteCacheBackend`] (primary, grounded on the teacher's
//! `db::mod` `sqlx::SqlitePool` usage) and [`json::JsonCacheBackend`]
//! (fallback, grounded on the teacher's `config::save()` atomic-write
//! pattern).

pub mod json;
pub mod sqlite;

use crate::error::{CacheError, Result};
use crate::model::{FileHash, Fingerprint};

/// Point-in-time statistics for a cache handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: u64,
}

/// Contract every fingerprint cache backend implements.
///
/// Implementations must be safe to call from multiple worker threads
/// concurrently (§5): reads must never block on writes, and a write to one
/// key must not interfere with a write to a different key.
pub trait CacheBackend: Send + Sync {
    /// Look up a fingerprint by content hash, updating `last_accessed` on a
    /// hit and incrementing the appropriate hit/miss counter.
    fn get(&self, key: &FileHash) -> Result<Option<Fingerprint>>;

    /// Insert or replace the fingerprint for `key`. Idempotent.
    fn put(&self, key: &FileHash, fingerprint: &Fingerprint) -> Result<()>;

    /// Current hit/miss/entry counters.
    fn stats(&self) -> Result<CacheStats>;

    /// Remove every entry.
    fn clear(&self) -> Result<()>;

    /// Remove entries whose `last_accessed` is older than `max_age_days`.
    /// Returns the number of entries removed.
    fn cleanup_older_than(&self, max_age_days: u32) -> Result<u64>;
}

/// Migrate every entry out of a JSON cache file and into a SQLite cache
/// database. Idempotent: re-running it against an already-migrated
/// destination writes identical values a second time, not a correctness
/// problem (§8 cache-idempotence property).
/// load every entry out of a JSON cache file and `put` it into a SQLite
/// cache database.
pub fn migrate_json_to_sqlite(
    json_path: &std::path::Path,
    sqlite_path: &std::path::Path,
) -> Result<u64> {
    let source = json::JsonCacheBackend::open(json_path)?;
    let dest = sqlite::SqliteCacheBackend::open(sqlite_path)?;
    let mut count = 0;
    for (key, fingerprint) in source.all_entries() {
        dest.put(&key, &fingerprint)?;
        count += 1;
    }
    Ok(count)
}
