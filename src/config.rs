//! In-memory configuration shared by every component.
//!
//! Unlike the teacher's `config::Config`, nothing here is loaded from an
//! on-disk file or environment variable — reading a config file is an
//! explicit front-end concern the distilled spec places out of scope. What
//! *is* in scope is the shape: a nested, `#[serde(default)]`-annotated
//! struct with a `Default` impl, mirroring the teacher's
//! `AppearanceConfig`/`AudioConfig`/`LibraryConfig` sub-struct layout.
//! Callers construct a `Config` directly and pass it to library entry points.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration threaded through every component operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub extractor: ExtractorConfig,
    pub probe: ProbeConfig,
    pub cache: CacheConfig,
    pub similarity: SimilarityConfig,
    pub concurrency: ConcurrencyConfig,
}

/// Fingerprint extractor adapter settings (C1).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Executable name or path invoked as a subprocess.
    pub executable: String,
    /// Bounded timeout enforced by a watchdog thread.
    pub timeout: Duration,
    /// Analysis window in seconds (first N seconds of audio are fingerprinted).
    pub analysis_window_secs: u32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            executable: "fpcalc".to_string(),
            timeout: Duration::from_secs(30),
            analysis_window_secs: 120,
        }
    }
}

/// Metadata probe adapter settings (C2).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub executable: String,
    pub timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            executable: "ffprobe".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Which fingerprint cache backend to use, and where it lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackendKind,
    /// Override path; if absent, resolved via [`cache_dir`].
    pub path: Option<PathBuf>,
    /// Acquisition timeout on the shared store.
    pub acquire_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::Sqlite,
            path: None,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    #[default]
    Sqlite,
    Json,
}

/// Track and album clustering thresholds (C5/C6/C8).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    /// Minimum similarity percentage for two tracks/albums to be clustered.
    pub threshold: f64,
    /// Fingerprints truncated below this length are too short to compare
    /// reliably and yield a similarity of 0.
    pub minimum_length: usize,
    /// Whether album clustering accepts unequal track counts via bipartite
    /// matching of shared tracks.
    pub partial_overlap: bool,
    /// Minimum overlap percentage for a partial-overlap album pair to cluster.
    pub min_overlap: f64,
    /// Skip C5 and group by `FileHash` equality instead.
    pub exact_match: bool,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            threshold: 98.0,
            minimum_length: 10,
            partial_overlap: true,
            min_overlap: 70.0,
            exact_match: false,
        }
    }
}

/// Worker pool sizing (§5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    pub workers: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self { workers: 8 }
    }
}

/// Resolve the per-user cache directory (`~/.config/audiotwin` style),
/// mirroring the teacher's `config::config_dir()` use of the `dirs` crate.
pub fn cache_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("audiotwin"))
}

/// Resolve the configured cache store path, defaulting to `hashes.db` or
/// `hashes.json` under [`cache_dir`] depending on backend.
pub fn resolve_cache_path(cfg: &CacheConfig) -> Option<PathBuf> {
    if let Some(p) = &cfg.path {
        return Some(p.clone());
    }
    let dir = cache_dir()?;
    Some(match cfg.backend {
        CacheBackendKind::Sqlite => dir.join("hashes.db"),
        CacheBackendKind::Json => dir.join("hashes.json"),
    })
}
