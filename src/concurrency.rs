//! Thread-pool scheduling model (§5): one dispatcher submits file paths,
//! `W` workers run concurrently, each composing the hasher (C4, which may
//! invoke the extractor subprocess and the shared cache) and the
//! metadata probe (C2) into a [`TrackRecord`].
//!
//! Grounded on the teacher's `cli::commands::scan::cmd_watch` debounce
//! loop's channel-based event plumbing and the `crossbeam-channel`
//! dependency already present in the teacher's `Cargo.toml`, translated
//! from an async-channel shape into a plain OS-thread/`crossbeam_channel`
//! shape since the worker pool here is specified as a thread-pool model
//! (§5: "blocking threads are the unit of concurrency"), not a task model.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, unbounded};

use crate::cache::CacheBackend;
use crate::config::{ExtractorConfig, ProbeConfig};
use crate::model::TrackRecord;
use crate::{hasher, probe, quality};

/// A cooperative cancellation flag, checked at the checkpoints the spec
/// names: "after each fingerprint completion and between clustering
/// passes." Cloning shares the same underlying flag.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One path's outcome: either a fully-formed `TrackRecord`, or a path plus
/// the error that caused it to be skipped (§7: per-item errors are
/// recovered locally and counted, the scan continues).
pub enum TrackOutcome {
    Ok(TrackRecord),
    Skipped { path: PathBuf, error: crate::error::Error },
}

/// Fan a list of file paths out across `workers` OS threads, each
/// computing a [`TrackRecord`] (hash + fingerprint via C4, tags via C2,
/// codec info via C9's in-process reader), and collect the unordered
/// results. The order in which fingerprints complete is unspecified and
/// must not (and does not) affect the result set — callers sort
/// deterministically downstream (C6/C7/C8).
pub fn fingerprint_all(
    paths: Vec<PathBuf>,
    workers: usize,
    cache: Option<Arc<dyn CacheBackend>>,
    extractor_cfg: ExtractorConfig,
    probe_cfg: ProbeConfig,
    cancel: &CancellationToken,
) -> Vec<TrackOutcome> {
    let workers = workers.max(1);
    let (path_tx, path_rx) = bounded::<PathBuf>(workers * 4);
    let (result_tx, result_rx) = unbounded::<TrackOutcome>();

    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let path_rx = path_rx.clone();
        let result_tx = result_tx.clone();
        let cache = cache.clone();
        let extractor_cfg = extractor_cfg.clone();
        let probe_cfg = probe_cfg.clone();
        let cancel = cancel.clone();

        handles.push(std::thread::spawn(move || {
            while let Ok(path) = path_rx.recv() {
                if cancel.is_cancelled() {
                    continue;
                }
                let outcome = compute_track(&path, cache.as_deref(), &extractor_cfg, &probe_cfg);
                let _ = result_tx.send(outcome);
            }
        }));
    }
    drop(result_tx);

    let total = paths.len();
    let dispatcher = std::thread::spawn({
        let cancel = cancel.clone();
        move || {
            for path in paths {
                if cancel.is_cancelled() {
                    break;
                }
                if path_tx.send(path).is_err() {
                    break;
                }
            }
        }
    });

    let mut results = Vec::with_capacity(total);
    while let Ok(outcome) = result_rx.recv() {
        results.push(outcome);
        // cancellation checkpoint: after each fingerprint completion
        if results.len() >= total {
            break;
        }
    }

    let _ = dispatcher.join();
    for h in handles {
        let _ = h.join();
    }

    results
}

fn compute_track(
    path: &PathBuf,
    cache: Option<&dyn CacheBackend>,
    extractor_cfg: &ExtractorConfig,
    probe_cfg: &ProbeConfig,
) -> TrackOutcome {
    let (file_hash, fingerprint) = match hasher::hash_track(path, cache, extractor_cfg) {
        Ok(v) => v,
        Err(e) => return TrackOutcome::Skipped { path: path.clone(), error: e },
    };

    let codec = match quality::read_codec_info(path) {
        Ok(c) => c,
        Err(e) => return TrackOutcome::Skipped { path: path.clone(), error: e },
    };

    let file_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    let tags = probe::probe_tags(path, probe_cfg);

    TrackOutcome::Ok(TrackRecord {
        path: path.clone(),
        file_hash,
        fingerprint: fingerprint.clone(),
        duration_secs: fingerprint.duration_secs,
        tags,
        codec,
        file_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_token_starts_uncancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancellation_token_clone_shares_state() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn fingerprint_all_on_empty_input_returns_empty() {
        let cancel = CancellationToken::new();
        let results = fingerprint_all(
            vec![],
            4,
            None,
            ExtractorConfig::default(),
            ProbeConfig::default(),
            &cancel,
        );
        assert!(results.is_empty());
    }

    #[test]
    fn fingerprint_all_reports_skips_for_unreadable_paths() {
        let cancel = CancellationToken::new();
        let results = fingerprint_all(
            vec![PathBuf::from("/nonexistent/path/track.mp3")],
            2,
            None,
            ExtractorConfig::default(),
            ProbeConfig::default(),
            &cancel,
        );
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], TrackOutcome::Skipped { .. }));
    }
}
