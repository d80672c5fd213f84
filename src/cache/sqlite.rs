//! Primary cache backend: an embedded SQLite store behind a small
//! dedicated `tokio::runtime::Runtime`, grounded on the teacher's
//! `db::mod` (`sqlx::SqlitePool`, `ON CONFLICT ... RETURNING` upsert
//! idiom) but without `sqlx::migrate!`, since no `migrations/` directory
//! travelled with the teacher source — schema setup is a single
//! `CREATE TABLE IF NOT EXISTS` run once at open time.
//!
//! Worker threads call into the pool through `rt.block_on(...)`, the same
//! wrap-async-core-in-a-sync-call shape the teacher's
//! `cli::commands::scan::cmd_scan` uses, since the cache's callers (§5)
//! are plain OS threads, not async tasks.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tokio::runtime::Runtime;

use super::{CacheBackend, CacheStats};
use crate::error::{CacheError, Result};
use crate::model::{FileHash, Fingerprint};

pub struct SqliteCacheBackend {
    pool: SqlitePool,
    rt: Runtime,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SqliteCacheBackend {
    /// Open (creating if absent) the SQLite database at `path`, in WAL
    /// mode, with enough pooled connections that the configured worker
    /// count never queues on the pool itself.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(CacheError::Json)?;
        }
        let rt = Runtime::new().map_err(CacheError::Json)?;
        let url = format!("sqlite:{}?mode=rwc", path.display());

        let pool = rt.block_on(async {
            if !sqlx::Sqlite::database_exists(&url).await.unwrap_or(false) {
                sqlx::Sqlite::create_database(&url).await?;
            }
            let pool = SqlitePoolOptions::new()
                .max_connections(16)
                .connect(&url)
                .await?;

            sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
            sqlx::query("PRAGMA foreign_keys=ON").execute(&pool).await?;
            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS fingerprint_cache (
                    file_hash TEXT PRIMARY KEY,
                    fingerprint TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    last_accessed INTEGER NOT NULL
                )
                "#,
            )
            .execute(&pool)
            .await?;
            sqlx::query(
                "CREATE INDEX IF NOT EXISTS idx_fingerprint_cache_last_accessed \
                 ON fingerprint_cache(last_accessed)",
            )
            .execute(&pool)
            .await?;

            Ok::<_, sqlx::Error>(pool)
        })
        .map_err(CacheError::Sqlite)?;

        Ok(Self {
            pool,
            rt,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    /// Open an in-memory database, for tests that don't want an on-disk
    /// fixture.
    pub fn open_in_memory() -> Result<Self> {
        let rt = Runtime::new().map_err(CacheError::Json)?;
        let pool = rt
            .block_on(async {
                let pool = SqlitePoolOptions::new()
                    .max_connections(16)
                    .connect("sqlite::memory:")
                    .await?;
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS fingerprint_cache (
                        file_hash TEXT PRIMARY KEY,
                        fingerprint TEXT NOT NULL,
                        created_at INTEGER NOT NULL,
                        last_accessed INTEGER NOT NULL
                    )
                    "#,
                )
                .execute(&pool)
                .await?;
                Ok::<_, sqlx::Error>(pool)
            })
            .map_err(CacheError::Sqlite)?;
        Ok(Self {
            pool,
            rt,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }
}

fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

impl CacheBackend for SqliteCacheBackend {
    fn get(&self, key: &FileHash) -> Result<Option<Fingerprint>> {
        let now = now_unix();
        let row: Option<(String,)> = self
            .rt
            .block_on(async {
                sqlx::query_as(
                    "UPDATE fingerprint_cache SET last_accessed = ? \
                     WHERE file_hash = ? RETURNING fingerprint",
                )
                .bind(now)
                .bind(key.as_str())
                .fetch_optional(&self.pool)
                .await
            })
            .map_err(CacheError::Sqlite)?;

        match row {
            Some((raw,)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Fingerprint::from_cache_string(&raw))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    fn put(&self, key: &FileHash, fingerprint: &Fingerprint) -> Result<()> {
        let now = now_unix();
        let serialised = fingerprint.to_cache_string();
        self.rt
            .block_on(async {
                sqlx::query(
                    r#"
                    INSERT INTO fingerprint_cache (file_hash, fingerprint, created_at, last_accessed)
                    VALUES (?, ?, ?, ?)
                    ON CONFLICT(file_hash) DO UPDATE SET
                        fingerprint = excluded.fingerprint,
                        last_accessed = excluded.last_accessed
                    "#,
                )
                .bind(key.as_str())
                .bind(&serialised)
                .bind(now)
                .bind(now)
                .execute(&self.pool)
                .await
            })
            .map_err(CacheError::Sqlite)?;
        Ok(())
    }

    fn stats(&self) -> Result<CacheStats> {
        let count: (i64,) = self
            .rt
            .block_on(async {
                sqlx::query_as("SELECT COUNT(*) FROM fingerprint_cache")
                    .fetch_one(&self.pool)
                    .await
            })
            .map_err(CacheError::Sqlite)?;
        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: count.0 as u64,
        })
    }

    fn clear(&self) -> Result<()> {
        self.rt
            .block_on(async { sqlx::query("DELETE FROM fingerprint_cache").execute(&self.pool).await })
            .map_err(CacheError::Sqlite)?;
        Ok(())
    }

    fn cleanup_older_than(&self, max_age_days: u32) -> Result<u64> {
        let cutoff = now_unix() - (max_age_days as i64) * 86_400;
        let result = self
            .rt
            .block_on(async {
                sqlx::query("DELETE FROM fingerprint_cache WHERE last_accessed < ?")
                    .bind(cutoff)
                    .execute(&self.pool)
                    .await
            })
            .map_err(CacheError::Sqlite)?;
        Ok(result.rows_affected())
    }
}

impl SqliteCacheBackend {
    /// Iterate every stored entry, for migration tooling.
    pub fn all_entries(&self) -> Vec<(FileHash, Fingerprint)> {
        let rows: Vec<(String, String)> = self
            .rt
            .block_on(async {
                sqlx::query("SELECT file_hash, fingerprint FROM fingerprint_cache")
                    .fetch_all(&self.pool)
                    .await
                    .map(|rows| {
                        rows.iter()
                            .map(|r| (r.get::<String, _>(0), r.get::<String, _>(1)))
                            .collect()
                    })
            })
            .unwrap_or_default();

        rows.into_iter()
            .filter_map(|(hash, raw)| {
                Fingerprint::from_cache_string(&raw).map(|fp| (FileHash(hash), fp))
            })
            .collect()
    }
}
