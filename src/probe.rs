//! Metadata Probe Adapter (C2): invokes an external metadata tool as a
//! subprocess and extracts a [`TagBundle`] from its JSON stdout, never
//! failing on an absent or malformed tag.
//!
//! Grounded on the teacher's `enrichment::fingerprint` subprocess-adapter
//! shape (own config, own timeout, own error variant), with tag lookup
//! semantics lifted from `original_source/src/duperscooper/album.py`'s
//! `get_musicbrainz_albumid`/`get_album_tags`: case-insensitive key match
//! under `format.tags`, several accepted aliases per field, silent `None`
//! on any failure to parse rather than an error — the probe's whole
//! purpose is "best effort tags," never a hard dependency for clustering.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::time::Duration;

use serde_json::Value;

use crate::config::ProbeConfig;
use crate::error::ExtractError;
use crate::model::TagBundle;

/// Invoke the configured probe on `path` and extract whatever tags are
/// present. Returns `TagBundle::default()` (all fields `None`) rather than
/// an error whenever the probe is unavailable, times out, fails, or emits
/// unparseable JSON — matching the contract's "never fails on missing
/// tags," generalised to "never fails, full stop."
pub fn probe_tags(path: &Path, cfg: &ProbeConfig) -> TagBundle {
    match run_probe(path, cfg) {
        Ok(stdout) => parse_tags(&stdout),
        Err(_) => TagBundle::default(),
    }
}

/// Same subprocess call as [`probe_tags`], surfaced with its error instead
/// of swallowed, for callers that want to distinguish "no tags" from "probe
/// broken."
pub fn probe_tags_checked(path: &Path, cfg: &ProbeConfig) -> Result<TagBundle, ExtractError> {
    let stdout = run_probe(path, cfg)?;
    Ok(parse_tags(&stdout))
}

fn run_probe(path: &Path, cfg: &ProbeConfig) -> Result<String, ExtractError> {
    let mut child = Command::new(&cfg.executable)
        .args(["-v", "quiet", "-print_format", "json", "-show_format"])
        .arg(path)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ExtractError::Unavailable(format!("{}: {e}", cfg.executable)))?;

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

    match rx.recv_timeout(cfg.timeout) {
        Ok((Ok(status), stdout, stderr)) => {
            let _ = handle.join();
            if !status.success() {
                return Err(ExtractError::Failed {
                    code: status.code(),
                    stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
                });
            }
            Ok(String::from_utf8_lossy(&stdout).into_owned())
        }
        Ok((Err(e), _, _)) => {
            let _ = handle.join();
            Err(ExtractError::Unavailable(format!("{}: {e}", cfg.executable)))
        }
        Err(mpsc::RecvTimeoutError::Timeout) => Err(ExtractError::Timeout(cfg.timeout)),
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Err(ExtractError::Unavailable(format!("{}: process vanished", cfg.executable)))
        }
    }
}

/// Extract tags from a probe's JSON stdout, independent of the subprocess
/// call — used both by [`probe_tags`] and by tests that feed canned JSON.
pub fn parse_tags(stdout: &str) -> TagBundle {
    let Ok(root) = serde_json::from_str::<Value>(stdout) else {
        return TagBundle::default();
    };
    let Some(tags) = root.get("format").and_then(|f| f.get("tags")).and_then(Value::as_object)
    else {
        return TagBundle::default();
    };

    let mut bundle = TagBundle::default();
    let mut total_discs_from_disc_field: Option<u32> = None;

    for (key, value) in tags {
        let upper = key.to_uppercase();
        let text = value.as_str().map(str::to_string);
        match upper.as_str() {
            "ALBUM" | "ALBUM_TITLE" => bundle.album = bundle.album.or(text),
            "ARTIST" | "ALBUM_ARTIST" | "ALBUMARTIST" => bundle.artist = bundle.artist.or(text),
            "MUSICBRAINZ_ALBUMID" => bundle.musicbrainz_albumid = bundle.musicbrainz_albumid.or(text),
            "DISC" | "DISCNUMBER" => {
                if let Some(t) = &text {
                    let (disc, total) = parse_disc_field(t);
                    bundle.disc = bundle.disc.or(disc);
                    total_discs_from_disc_field = total_discs_from_disc_field.or(total);
                }
            }
            "TOTALDISCS" | "DISCTOTAL" => {
                if let Some(t) = &text {
                    bundle.total_discs = bundle.total_discs.or(t.trim().parse().ok());
                }
            }
            "DISCSUBTITLE" | "DISC_SUBTITLE" => bundle.disc_subtitle = bundle.disc_subtitle.or(text),
            _ => {}
        }
    }

    bundle.total_discs = bundle.total_discs.or(total_discs_from_disc_field);
    bundle
}

/// Parse a `DISC` tag of the form `n` or `n/m`, returning `(disc, total)`.
fn parse_disc_field(raw: &str) -> (Option<u32>, Option<u32>) {
    match raw.trim().split_once('/') {
        Some((n, m)) => (n.trim().parse().ok(), m.trim().parse().ok()),
        None => (raw.trim().parse().ok(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_common_tags_case_insensitively() {
        let json = r#"{
            "format": {
                "tags": {
                    "album": "Nevermind",
                    "ARTIST": "Nirvana",
                    "MusicBrainz_AlbumId": "1b022e01-4da6-387b-8658-8678046e4cef"
                }
            }
        }"#;
        let tags = parse_tags(json);
        assert_eq!(tags.album.as_deref(), Some("Nevermind"));
        assert_eq!(tags.artist.as_deref(), Some("Nirvana"));
        assert_eq!(tags.musicbrainz_albumid.as_deref(), Some("1b022e01-4da6-387b-8658-8678046e4cef"));
    }

    #[test]
    fn missing_tags_object_yields_default_bundle() {
        let tags = parse_tags(r#"{"format": {}}"#);
        assert_eq!(tags, TagBundle::default());
    }

    #[test]
    fn malformed_json_yields_default_bundle() {
        let tags = parse_tags("not json at all");
        assert_eq!(tags, TagBundle::default());
    }

    #[test]
    fn disc_field_bare_integer() {
        let json = r#"{"format": {"tags": {"DISC": "2"}}}"#;
        let tags = parse_tags(json);
        assert_eq!(tags.disc, Some(2));
        assert_eq!(tags.total_discs, None);
    }

    #[test]
    fn disc_field_n_of_m_populates_total_discs_when_absent() {
        let json = r#"{"format": {"tags": {"DISC": "2/3"}}}"#;
        let tags = parse_tags(json);
        assert_eq!(tags.disc, Some(2));
        assert_eq!(tags.total_discs, Some(3));
    }

    #[test]
    fn explicit_totaldiscs_tag_wins_over_disc_field_m() {
        let json = r#"{"format": {"tags": {"DISC": "2/3", "TOTALDISCS": "5"}}}"#;
        let tags = parse_tags(json);
        assert_eq!(tags.total_discs, Some(5));
    }

    #[test]
    fn probe_tags_checked_fails_when_executable_missing() {
        let cfg = ProbeConfig {
            executable: "definitely-not-a-real-binary-xyz".to_string(),
            timeout: Duration::from_secs(5),
        };
        let err = probe_tags_checked(Path::new("/tmp/whatever.flac"), &cfg).unwrap_err();
        assert!(matches!(err, ExtractError::Unavailable(_)));
    }

    #[test]
    fn probe_tags_never_fails_even_when_executable_missing() {
        let cfg = ProbeConfig {
            executable: "definitely-not-a-real-binary-xyz".to_string(),
            timeout: Duration::from_secs(5),
        };
        let tags = probe_tags(Path::new("/tmp/whatever.flac"), &cfg);
        assert_eq!(tags, TagBundle::default());
    }
}
