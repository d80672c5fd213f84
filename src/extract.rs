//! Fingerprint Extractor Adapter (C1): invokes an external fingerprinting
//! tool as a subprocess and parses its stdout into a [`Fingerprint`].
//!
//! Grounded on the teacher's `enrichment::fingerprint` module (path probing
//! via a fixed candidate list, `Command::...output()`, JSON stdout parsing,
//! and a matching `#[cfg(test)]` module), generalised per the executable
//! name now being configurable (`ExtractorConfig::executable`) rather than
//! hard-coded to `fpcalc`, and with a watchdog thread enforcing the
//! configured timeout, since `std::process::Command` has no native one.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::time::Duration;

use crate::config::ExtractorConfig;
use crate::error::ExtractError;
use crate::model::Fingerprint;

/// Invoke the configured extractor on `path` and parse its output.
///
/// Tries a JSON object with `duration`/`fingerprint` keys first, then falls
/// back to `DURATION=`/`FINGERPRINT=` line-oriented stdout, since the
/// contract allows either the extractor's native form.
pub fn extract_fingerprint(path: &Path, cfg: &ExtractorConfig) -> Result<Fingerprint, ExtractError> {
    let output = run_with_timeout(&cfg.executable, path, cfg.analysis_window_secs, cfg.timeout)?;

    if !output.status.success() {
        return Err(ExtractError::Failed {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_json_form(&stdout).or_else(|| parse_line_form(&stdout)).ok_or_else(|| {
        ExtractError::Malformed(format!(
            "neither JSON duration/fingerprint keys nor DURATION=/FINGERPRINT= lines found in: {}",
            stdout.trim()
        ))
    })
}

/// Run the extractor, enforcing `timeout` via a watchdog thread: the child
/// is spawned, and a second thread waits `timeout` then kills it if it is
/// still running, so the primary thread's blocking `wait_with_output` call
/// returns either way.
///
/// `analysis_window_secs` is passed as `-length N` (§6), bounding analysis
/// to the first N seconds of audio rather than the whole file.
fn run_with_timeout(
    executable: &str,
    path: &Path,
    analysis_window_secs: u32,
    timeout: Duration,
) -> Result<std::process::Output, ExtractError> {
    let mut child = Command::new(executable)
        .arg("-length")
        .arg(analysis_window_secs.to_string())
        .arg(path)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ExtractError::Unavailable(format!("{executable}: {e}")))?;

    let (tx, rx) = mpsc::channel();
    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();
    let mut waiter = child;

    let handle = std::thread::spawn(move || {
        let mut out = Vec::new();
        let mut err = Vec::new();
        if let Some(s) = stdout.as_mut() {
            let _ = s.read_to_end(&mut out);
        }
        if let Some(s) = stderr.as_mut() {
            let _ = s.read_to_end(&mut err);
        }
        let status = waiter.wait();
        let _ = tx.send((status, out, err));
    });

    match rx.recv_timeout(timeout) {
        Ok((Ok(status), stdout, stderr)) => {
            let _ = handle.join();
            Ok(std::process::Output { status, stdout, stderr })
        }
        Ok((Err(e), _, _)) => {
            let _ = handle.join();
            Err(ExtractError::Unavailable(format!("{executable}: {e}")))
        }
        Err(mpsc::RecvTimeoutError::Timeout) => Err(ExtractError::Timeout(timeout)),
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Err(ExtractError::Unavailable(format!("{executable}: process vanished")))
        }
    }
}

#[derive(serde::Deserialize)]
struct JsonForm {
    duration: f64,
    fingerprint: Vec<u32>,
}

fn parse_json_form(stdout: &str) -> Option<Fingerprint> {
    let parsed: JsonForm = serde_json::from_str(stdout.trim()).ok()?;
    Some(Fingerprint::new(parsed.duration.round() as u32, parsed.fingerprint))
}

fn parse_line_form(stdout: &str) -> Option<Fingerprint> {
    let mut duration: Option<u32> = None;
    let mut fingerprint: Option<Vec<u32>> = None;

    for line in stdout.lines() {
        if let Some(v) = line.strip_prefix("DURATION=") {
            duration = v.trim().parse().ok();
        } else if let Some(v) = line.strip_prefix("FINGERPRINT=") {
            fingerprint = v
                .trim()
                .split(',')
                .filter(|s| !s.is_empty())
                .map(|s| s.parse::<u32>())
                .collect::<Result<Vec<_>, _>>()
                .ok();
        }
    }

    Some(Fingerprint::new(duration?, fingerprint?))
}
