//! Album Scanner (C7): walks a directory tree, treating every directory
//! that directly contains at least one recognised audio file as one
//! [`Album`]; sub-directories are independent albums.
//!
//! Grounded on the teacher's `scanner::mod` `WalkDir` usage, generalised
//! from "flat list of audio files" to "one Album per containing
//! directory," and composed with the concurrent fingerprinting pipeline
//! (§5) rather than the teacher's incremental single-file DB upsert path.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::warn;
use walkdir::WalkDir;

use crate::cache::CacheBackend;
use crate::concurrency::{self, CancellationToken, TrackOutcome};
use crate::config::{ExtractorConfig, ProbeConfig};
use crate::model::{is_audio_file, Album, MbAlbumId, TrackRecord};

/// Recursively enumerate every directory under `roots` that directly
/// contains at least one recognised audio file, returning each such
/// directory's audio file paths (unsorted — callers sort per album).
pub fn discover_album_dirs(roots: &[PathBuf]) -> BTreeMap<PathBuf, Vec<PathBuf>> {
    let mut by_dir: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();
    for root in roots {
        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if !is_audio_file(path) {
                continue;
            }
            if let Some(parent) = path.parent() {
                by_dir.entry(parent.to_path_buf()).or_default().push(path.to_path_buf());
            }
        }
    }
    by_dir
}

/// Scan `roots`, fingerprinting every discovered audio file concurrently
/// (§5) and assembling one [`Album`] per containing directory.
///
/// Per-item I/O, extractor, or probe failures are logged and skip only
/// the affected track (§7 `FileUnreadable`/`Extractor*`); the scan as a
/// whole continues.
pub fn scan_albums(
    roots: &[PathBuf],
    workers: usize,
    cache: Option<Arc<dyn CacheBackend>>,
    extractor_cfg: ExtractorConfig,
    probe_cfg: ProbeConfig,
    cancel: &CancellationToken,
) -> Vec<Album> {
    let album_dirs = discover_album_dirs(roots);
    let all_paths: Vec<PathBuf> = album_dirs.values().flatten().cloned().collect();

    let outcomes = concurrency::fingerprint_all(
        all_paths,
        workers,
        cache,
        extractor_cfg,
        probe_cfg,
        cancel,
    );

    let mut by_path: std::collections::HashMap<PathBuf, TrackRecord> = std::collections::HashMap::new();
    for outcome in outcomes {
        match outcome {
            TrackOutcome::Ok(track) => {
                by_path.insert(track.path.clone(), track);
            }
            TrackOutcome::Skipped { path, error } => {
                warn!(path = %path.display(), error = %error, "skipping unreadable track during album scan");
            }
        }
    }

    album_dirs
        .into_iter()
        .filter_map(|(dir, paths)| build_album(&dir, paths, &by_path))
        .collect()
}

fn build_album(
    dir: &Path,
    mut paths: Vec<PathBuf>,
    by_path: &std::collections::HashMap<PathBuf, TrackRecord>,
) -> Option<Album> {
    // Sort lexicographically by filename (byte-wise), so position-based
    // comparison downstream (C8) is stable.
    paths.sort();

    let tracks: Vec<TrackRecord> = paths
        .into_iter()
        .filter_map(|p| by_path.get(&p).cloned())
        .collect();

    if tracks.is_empty() {
        return None;
    }

    let musicbrainz_albumid =
        MbAlbumId::aggregate(tracks.iter().map(|t| t.tags.musicbrainz_albumid.as_deref()));

    let album_name = tracks.first().and_then(|t| t.tags.album.clone());
    let artist_name = tracks.first().and_then(|t| t.tags.artist.clone());
    let total_size = tracks.iter().map(|t| t.file_size).sum();
    let avg_quality_score =
        tracks.iter().map(|t| t.quality_score()).sum::<f64>() / tracks.len() as f64;
    let quality_info = summarise_quality(&tracks);

    Some(Album {
        path: dir.to_path_buf(),
        tracks,
        musicbrainz_albumid,
        album_name,
        artist_name,
        total_size,
        avg_quality_score,
        quality_info,
    })
}

/// A short human-facing summary string, e.g. "FLAC 44.1kHz/16bit (6
/// tracks)" or "mixed (MP3, FLAC)".
fn summarise_quality(tracks: &[TrackRecord]) -> String {
    let mut formats: Vec<&'static str> = tracks.iter().map(|t| t.codec.format.as_str()).collect();
    formats.dedup();
    if formats.len() == 1 {
        format!("{} ({} tracks)", tracks[0].codec.display_string(), tracks.len())
    } else {
        format!("mixed ({}) ({} tracks)", formats.join(", "), tracks.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn discover_album_dirs_groups_by_containing_directory() {
        let root = tempdir().unwrap();
        let album_a = root.path().join("Album A");
        let album_b = root.path().join("Album B").join("Disc 1");
        fs::create_dir_all(&album_a).unwrap();
        fs::create_dir_all(&album_b).unwrap();
        fs::write(album_a.join("01.mp3"), b"x").unwrap();
        fs::write(album_a.join("02.mp3"), b"x").unwrap();
        fs::write(album_b.join("01.flac"), b"x").unwrap();
        fs::write(album_a.join("cover.jpg"), b"x").unwrap();

        let dirs = discover_album_dirs(&[root.path().to_path_buf()]);
        assert_eq!(dirs.len(), 2);
        assert_eq!(dirs.get(&album_a).unwrap().len(), 2);
        assert_eq!(dirs.get(&album_b).unwrap().len(), 1);
    }

    #[test]
    fn empty_directory_tree_yields_no_albums() {
        let root = tempdir().unwrap();
        let dirs = discover_album_dirs(&[root.path().to_path_buf()]);
        assert!(dirs.is_empty());
    }

    #[test]
    fn subdirectories_are_independent_albums() {
        let root = tempdir().unwrap();
        let parent = root.path().join("Box Set");
        let disc1 = parent.join("Disc 1");
        let disc2 = parent.join("Disc 2");
        fs::create_dir_all(&disc1).unwrap();
        fs::create_dir_all(&disc2).unwrap();
        fs::write(disc1.join("01.mp3"), b"x").unwrap();
        fs::write(disc2.join("01.mp3"), b"x").unwrap();

        let dirs = discover_album_dirs(&[root.path().to_path_buf()]);
        assert_eq!(dirs.len(), 2);
        assert!(dirs.contains_key(&disc1));
        assert!(dirs.contains_key(&disc2));
        assert!(!dirs.contains_key(&parent));
    }
}
