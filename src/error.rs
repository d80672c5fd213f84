//! Crate-wide error types.
//!
//! Each component family (extractor, probe, cache, staging) owns a focused
//! error enum; this module's top-level [`Error`] aggregates them via
//! `#[from]` so callers can propagate with `?` regardless of which
//! component failed.

use std::path::PathBuf;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level crate error, aggregating every component's error kind.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O failed while hashing or reading a file; the caller should skip
    /// the file and continue the scan.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The fingerprint cache database could not be opened or queried.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// The external fingerprint extractor failed in one of its well-known ways.
    #[error("extractor error: {0}")]
    Extractor(#[from] ExtractError),

    /// The rule document failed to parse; fatal to the apply operation.
    #[error("rule document invalid: {0}")]
    RuleFileInvalid(String),

    /// Staging or restore hit a filesystem conflict.
    #[error("staging error: {0}")]
    Staging(#[from] StagingError),

    /// The user requested cancellation of an in-progress scan.
    #[error("cancelled")]
    Cancelled,

    /// Generic error with added context, mirroring the teacher's
    /// with-context composition pattern.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to results, mirroring the teacher's
/// `ResultExt`.
pub trait ResultExt<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

/// Errors from the fingerprint extractor adapter (C1).
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// The extractor executable could not be found or launched.
    #[error("fingerprint extractor unavailable: {0}")]
    Unavailable(String),

    /// The extractor did not finish within the configured timeout.
    #[error("fingerprint extractor timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The extractor exited non-zero.
    #[error("fingerprint extractor failed (exit {code:?}): {stderr}")]
    Failed {
        code: Option<i32>,
        stderr: String,
    },

    /// The extractor's stdout was missing the duration or fingerprint field.
    #[error("fingerprint extractor produced malformed output: {0}")]
    Malformed(String),
}

/// Errors from the fingerprint cache (C3).
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("json cache io error: {0}")]
    Json(#[from] std::io::Error),

    #[error("cache acquisition timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Errors from the staging manager (C11).
#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    /// The destination path already exists, or the filesystem refused the
    /// rename. Already-moved items in the current batch are left staged
    /// and the manifest is still written.
    #[error("staging conflict: destination {0} already exists")]
    Conflict(PathBuf),

    /// An original location was occupied during restore; nothing was moved.
    #[error("restore conflict: {0} already exists")]
    RestoreConflict(PathBuf),

    /// The requested batch does not exist or has no manifest.
    #[error("staging batch not found: {0}")]
    BatchNotFound(String),

    /// The manifest on disk failed to parse.
    #[error("staging manifest invalid: {0}")]
    ManifestInvalid(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_context_chain_displays_both_levels() {
        let err = Error::Cancelled.context("while staging batch_2026");
        let msg = err.to_string();
        assert!(msg.contains("while staging batch_2026"));
        assert!(msg.contains("cancelled"));
    }

    #[test]
    fn extract_error_displays_stderr() {
        let err = ExtractError::Failed {
            code: Some(1),
            stderr: "no such file".to_string(),
        };
        assert!(err.to_string().contains("no such file"));
    }
}
