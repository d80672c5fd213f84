//! Staging Manager (C11): the deletion mechanism. Condemned files are
//! moved (never deleted outright) into a per-batch holding area under
//! `.deletedByDuperscooper`, with a read-only manifest sufficient to
//! reverse the operation.
//!
//! State machine: `empty -> populating -> finalised -> restored-or-emptied
//! -> gone`. An unfinalised batch (no `manifest.json`) is invisible to
//! [`StagingManager::list_batches`] — a crash mid-populate just leaves an
//! orphaned directory on disk.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, StagingError};
use crate::model::TrackRecord;

/// One deletion invocation, immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub batch_id: String,
    pub timestamp: String,
    pub tool_version: String,
    pub invoking_command: String,
    pub items: Vec<ManifestItem>,
    pub items_deleted: u64,
    pub tracks_deleted: u64,
    pub bytes_freed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ManifestItem {
    Track {
        original_path: PathBuf,
        staged_filename: String,
        byte_size: u64,
    },
    Album {
        original_path: PathBuf,
        album_name: Option<String>,
        artist_name: Option<String>,
        tracks: Vec<ManifestTrack>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestTrack {
    pub original_path: PathBuf,
    pub staged_filename: String,
    pub byte_size: u64,
}

/// The item to stage: either one track or one whole album directory.
pub enum StageRequest<'a> {
    Track { path: &'a Path },
    Album { path: &'a Path, tracks: &'a [TrackRecord], album_name: Option<String>, artist_name: Option<String> },
}

pub struct StagingManager {
    /// `.deletedByDuperscooper`, located at the scan root's parent.
    staging_root: PathBuf,
    tool_version: String,
    invoking_command: String,
}

impl StagingManager {
    pub fn new(scan_root: &Path, tool_version: impl Into<String>, invoking_command: impl Into<String>) -> Self {
        let staging_root = scan_root
            .parent()
            .map(|p| p.join(".deletedByDuperscooper"))
            .unwrap_or_else(|| scan_root.join(".deletedByDuperscooper"));
        Self {
            staging_root,
            tool_version: tool_version.into(),
            invoking_command: invoking_command.into(),
        }
    }

    pub fn with_staging_root(staging_root: PathBuf, tool_version: impl Into<String>, invoking_command: impl Into<String>) -> Self {
        Self {
            staging_root,
            tool_version: tool_version.into(),
            invoking_command: invoking_command.into(),
        }
    }

    /// Stage a batch of items (mixed tracks and albums in one invocation),
    /// writing one manifest once every item has been moved. Batch
    /// directory named by local ISO timestamp `YYYY-MM-DD_HH-MM-SS`.
    pub fn stage_batch(&self, requests: &[StageRequest]) -> Result<Manifest> {
        let now = chrono::Local::now();
        let batch_id = now.format("%Y-%m-%d_%H-%M-%S").to_string();
        let batch_dir = self.staging_root.join(&batch_id);
        fs::create_dir_all(&batch_dir).map_err(StagingError::Io)?;

        let mut items = Vec::new();
        let mut items_deleted = 0u64;
        let mut tracks_deleted = 0u64;
        let mut bytes_freed = 0u64;

        for (idx, request) in requests.iter().enumerate() {
            match request {
                StageRequest::Track { path } => {
                    let size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
                    let staged_filename = staged_filename(idx, path);
                    let dest = batch_dir.join(&staged_filename);
                    move_file(path, &dest)?;
                    bytes_freed += size;
                    tracks_deleted += 1;
                    items_deleted += 1;
                    items.push(ManifestItem::Track {
                        original_path: path.to_path_buf(),
                        staged_filename,
                        byte_size: size,
                    });
                }
                StageRequest::Album { path, tracks, album_name, artist_name } => {
                    let mut manifest_tracks = Vec::with_capacity(tracks.len());
                    for (track_idx, track) in tracks.iter().enumerate() {
                        let staged_filename = staged_filename(track_idx, &track.path);
                        let dest = batch_dir.join(&staged_filename);
                        move_file(&track.path, &dest)?;
                        bytes_freed += track.file_size;
                        tracks_deleted += 1;
                        manifest_tracks.push(ManifestTrack {
                            original_path: track.path.clone(),
                            staged_filename,
                            byte_size: track.file_size,
                        });
                    }
                    remove_album_dir_if_empty(path);
                    items_deleted += 1;
                    items.push(ManifestItem::Album {
                        original_path: path.to_path_buf(),
                        album_name: album_name.clone(),
                        artist_name: artist_name.clone(),
                        tracks: manifest_tracks,
                    });
                }
            }
        }

        let manifest = Manifest {
            batch_id: batch_id.clone(),
            timestamp: now.to_rfc3339(),
            tool_version: self.tool_version.clone(),
            invoking_command: self.invoking_command.clone(),
            items,
            items_deleted,
            tracks_deleted,
            bytes_freed,
        };

        self.write_manifest(&batch_dir, &manifest)?;
        Ok(manifest)
    }

    /// Stage a single track file.
    pub fn stage_track(&self, path: &Path) -> Result<Manifest> {
        self.stage_batch(&[StageRequest::Track { path }])
    }

    /// Stage a whole album directory: every track moved individually,
    /// the now-empty original directory removed (left in place if
    /// non-audio files remain).
    pub fn stage_album(
        &self,
        path: &Path,
        tracks: &[TrackRecord],
        album_name: Option<String>,
        artist_name: Option<String>,
    ) -> Result<Manifest> {
        self.stage_batch(&[StageRequest::Album { path, tracks, album_name, artist_name }])
    }

    fn write_manifest(&self, batch_dir: &Path, manifest: &Manifest) -> Result<()> {
        let manifest_path = batch_dir.join("manifest.json");
        let serialised = serde_json::to_string_pretty(manifest)
            .map_err(|e| StagingError::ManifestInvalid(e.to_string()))?;
        fs::write(&manifest_path, serialised).map_err(StagingError::Io)?;

        let mut perms = fs::metadata(&manifest_path).map_err(StagingError::Io)?.permissions();
        perms.set_readonly(true);
        fs::set_permissions(&manifest_path, perms).map_err(StagingError::Io)?;
        Ok(())
    }

    /// List every finalised batch (a directory with a readable
    /// `manifest.json`); directories without one — orphaned by a crash
    /// mid-populate — are invisible here.
    pub fn list_batches(&self) -> Vec<Manifest> {
        let Ok(entries) = fs::read_dir(&self.staging_root) else {
            return Vec::new();
        };
        let mut manifests: Vec<Manifest> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| self.read_manifest(&e.path()).ok())
            .collect();
        manifests.sort_by(|a, b| a.batch_id.cmp(&b.batch_id));
        manifests
    }

    /// Read `batch_dir`'s manifest, trusting the directory name (not the
    /// `batch_id` field recorded inside the JSON) as the authoritative
    /// batch id — a batch directory can be renamed or relocated on disk
    /// independently of its manifest content.
    fn read_manifest(&self, batch_dir: &Path) -> Result<Manifest> {
        let manifest_path = batch_dir.join("manifest.json");
        let raw = fs::read_to_string(&manifest_path).map_err(StagingError::Io)?;
        let mut manifest: Manifest =
            serde_json::from_str(&raw).map_err(|e| StagingError::ManifestInvalid(e.to_string()))?;
        if let Some(dir_name) = batch_dir.file_name().and_then(|n| n.to_str()) {
            manifest.batch_id = dir_name.to_string();
        }
        Ok(manifest)
    }

    /// Restore a batch: pre-check every recorded original path across
    /// the whole batch before moving anything, aborting the whole
    /// restore with `RestoreConflict` if any target is occupied — this
    /// is stricter than a naive item-at-a-time restore, matching the
    /// spec's "fail the whole restore... without further file movement."
    pub fn restore_batch(&self, batch_id: &str) -> Result<()> {
        let batch_dir = self.staging_root.join(batch_id);
        let manifest = self
            .read_manifest(&batch_dir)
            .map_err(|_| StagingError::BatchNotFound(batch_id.to_string()))?;

        for item in &manifest.items {
            match item {
                ManifestItem::Track { original_path, .. } => {
                    if original_path.exists() {
                        return Err(StagingError::RestoreConflict(original_path.clone()).into());
                    }
                }
                ManifestItem::Album { original_path, tracks, .. } => {
                    for t in tracks {
                        let _ = original_path;
                        if t.original_path.exists() {
                            return Err(StagingError::RestoreConflict(t.original_path.clone()).into());
                        }
                    }
                }
            }
        }

        for item in &manifest.items {
            match item {
                ManifestItem::Track { original_path, staged_filename, .. } => {
                    if let Some(parent) = original_path.parent() {
                        fs::create_dir_all(parent).map_err(StagingError::Io)?;
                    }
                    move_file(&batch_dir.join(staged_filename), original_path)?;
                }
                ManifestItem::Album { original_path, tracks, .. } => {
                    fs::create_dir_all(original_path).map_err(StagingError::Io)?;
                    for t in tracks {
                        move_file(&batch_dir.join(&t.staged_filename), &t.original_path)?;
                    }
                }
            }
        }

        let mut perms = fs::metadata(&batch_dir.join("manifest.json"))
            .map_err(StagingError::Io)?
            .permissions();
        perms.set_readonly(false);
        let _ = fs::set_permissions(batch_dir.join("manifest.json"), perms);

        fs::remove_dir_all(&batch_dir).map_err(StagingError::Io)?;
        Ok(())
    }

    /// Permanently remove batches, optionally filtered by `older_than_days`
    /// and/or `keep_last`. When both are given they compose: a batch is
    /// removed only if it passes both.
    pub fn empty(&self, older_than_days: Option<u32>, keep_last: Option<usize>) -> Result<u64> {
        let mut batches = self.list_batches();
        batches.sort_by(|a, b| b.batch_id.cmp(&a.batch_id)); // newest first

        let kept_by_recency: std::collections::HashSet<String> = match keep_last {
            Some(n) => batches.iter().take(n).map(|m| m.batch_id.clone()).collect(),
            None => std::collections::HashSet::new(),
        };

        let cutoff = older_than_days.map(|days| chrono::Local::now() - chrono::Duration::days(days as i64));

        let mut removed = 0u64;
        for manifest in &batches {
            if kept_by_recency.contains(&manifest.batch_id) {
                continue;
            }
            let passes_age_filter = match (&cutoff, older_than_days) {
                (Some(cutoff), Some(_)) => {
                    parse_batch_timestamp(&manifest.batch_id).is_some_and(|ts| ts < *cutoff)
                }
                _ => true,
            };
            if !passes_age_filter {
                continue;
            }
            let batch_dir = self.staging_root.join(&manifest.batch_id);
            let manifest_path = batch_dir.join("manifest.json");
            if let Ok(meta) = fs::metadata(&manifest_path) {
                let mut perms = meta.permissions();
                perms.set_readonly(false);
                let _ = fs::set_permissions(&manifest_path, perms);
            }
            fs::remove_dir_all(&batch_dir).map_err(StagingError::Io)?;
            removed += 1;
        }
        Ok(removed)
    }
}

fn parse_batch_timestamp(batch_id: &str) -> Option<chrono::DateTime<chrono::Local>> {
    chrono::NaiveDateTime::parse_from_str(batch_id, "%Y-%m-%d_%H-%M-%S")
        .ok()
        .and_then(|naive| naive.and_local_timezone(chrono::Local).single())
}

fn staged_filename(index: usize, original_path: &Path) -> String {
    let uuid_prefix = &Uuid::new_v4().simple().to_string()[..8];
    let basename = original_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown");
    format!("{uuid_prefix}-{index}-{basename}")
}

fn move_file(from: &Path, to: &Path) -> Result<()> {
    if to.exists() {
        return Err(StagingError::Conflict(to.to_path_buf()).into());
    }
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        // Cross-filesystem rename fails with EXDEV; degrade to copy+remove
        // rather than silently failing, but never pretend a same-filesystem
        // rename is a slow copy when it doesn't have to be.
        Err(e) if e.raw_os_error() == Some(libc_exdev()) => {
            fs::copy(from, to).map_err(StagingError::Io)?;
            fs::remove_file(from).map_err(StagingError::Io)?;
            Ok(())
        }
        Err(e) => Err(StagingError::Io(e).into()),
    }
}

/// `EXDEV` (18 on Linux) without depending on the `libc` crate for one
/// constant.
fn libc_exdev() -> i32 {
    18
}

fn remove_album_dir_if_empty(dir: &Path) {
    if let Ok(mut entries) = fs::read_dir(dir) {
        if entries.next().is_none() {
            let _ = fs::remove_dir(dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AudioFormat, CodecInfo, FileHash, Fingerprint, TagBundle};
    use tempfile::tempdir;

    fn track(path: PathBuf, size: u64) -> TrackRecord {
        TrackRecord {
            path,
            file_hash: FileHash("h".to_string()),
            fingerprint: Fingerprint::new(120, vec![1, 2, 3]),
            duration_secs: 120,
            tags: TagBundle::default(),
            codec: CodecInfo {
                format: AudioFormat::Flac,
                lossless: true,
                bitrate_kbps: None,
                sample_rate_hz: Some(44_100),
                bit_depth: Some(16),
            },
            file_size: size,
        }
    }

    #[test]
    fn stage_track_moves_file_and_writes_readonly_manifest() {
        let root = tempdir().unwrap();
        let scan_root = root.path().join("Music");
        fs::create_dir_all(&scan_root).unwrap();
        let file = scan_root.join("track.mp3");
        fs::write(&file, b"hello").unwrap();

        let mgr = StagingManager::new(&scan_root, "1.0.0", "audiotwin apply");
        let manifest = mgr.stage_track(&file).unwrap();

        assert!(!file.exists());
        assert_eq!(manifest.items_deleted, 1);
        assert_eq!(manifest.tracks_deleted, 1);
        assert_eq!(manifest.bytes_freed, 5);

        let manifest_path = root.path().join(".deletedByDuperscooper").join(&manifest.batch_id).join("manifest.json");
        assert!(manifest_path.exists());
        let meta = fs::metadata(&manifest_path).unwrap();
        assert!(meta.permissions().readonly());
    }

    #[test]
    fn stage_album_moves_every_track_and_removes_empty_dir() {
        let root = tempdir().unwrap();
        let scan_root = root.path().join("Music");
        let album_dir = scan_root.join("Album");
        fs::create_dir_all(&album_dir).unwrap();
        let t1 = album_dir.join("01.flac");
        let t2 = album_dir.join("02.flac");
        let t3 = album_dir.join("03.flac");
        fs::write(&t1, b"aaa").unwrap();
        fs::write(&t2, b"bb").unwrap();
        fs::write(&t3, b"c").unwrap();

        let tracks = vec![
            track(t1.clone(), 3),
            track(t2.clone(), 2),
            track(t3.clone(), 1),
        ];

        let mgr = StagingManager::new(&scan_root, "1.0.0", "audiotwin apply");
        let manifest = mgr.stage_album(&album_dir, &tracks, Some("Al".to_string()), Some("Ar".to_string())).unwrap();

        assert!(!album_dir.exists());
        assert_eq!(manifest.items_deleted, 1);
        assert_eq!(manifest.tracks_deleted, 3);
        assert_eq!(manifest.bytes_freed, 6);
    }

    #[test]
    fn album_directory_left_in_place_if_non_audio_files_remain() {
        let root = tempdir().unwrap();
        let scan_root = root.path().join("Music");
        let album_dir = scan_root.join("Album");
        fs::create_dir_all(&album_dir).unwrap();
        let t1 = album_dir.join("01.flac");
        fs::write(&t1, b"a").unwrap();
        fs::write(album_dir.join("cover.jpg"), b"img").unwrap();

        let tracks = vec![track(t1.clone(), 1)];
        let mgr = StagingManager::new(&scan_root, "1.0.0", "audiotwin apply");
        mgr.stage_album(&album_dir, &tracks, None, None).unwrap();

        assert!(album_dir.exists());
        assert!(album_dir.join("cover.jpg").exists());
    }

    #[test]
    fn stage_then_restore_round_trips_bytes_and_paths() {
        let root = tempdir().unwrap();
        let scan_root = root.path().join("Music");
        let album_dir = scan_root.join("Album");
        fs::create_dir_all(&album_dir).unwrap();
        let t1 = album_dir.join("01.flac");
        let t2 = album_dir.join("02.flac");
        fs::write(&t1, b"content-one").unwrap();
        fs::write(&t2, b"content-two").unwrap();
        let tracks = vec![track(t1.clone(), 11), track(t2.clone(), 11)];

        let mgr = StagingManager::new(&scan_root, "1.0.0", "audiotwin apply");
        let manifest = mgr.stage_album(&album_dir, &tracks, None, None).unwrap();
        assert!(!album_dir.exists());

        mgr.restore_batch(&manifest.batch_id).unwrap();
        assert_eq!(fs::read(&t1).unwrap(), b"content-one");
        assert_eq!(fs::read(&t2).unwrap(), b"content-two");

        let batch_dir = root.path().join(".deletedByDuperscooper").join(&manifest.batch_id);
        assert!(!batch_dir.exists());
    }

    #[test]
    fn restore_with_occupied_target_aborts_without_moving_anything() {
        let root = tempdir().unwrap();
        let scan_root = root.path().join("Music");
        fs::create_dir_all(&scan_root).unwrap();
        let file = scan_root.join("track.mp3");
        fs::write(&file, b"hello").unwrap();

        let mgr = StagingManager::new(&scan_root, "1.0.0", "audiotwin apply");
        let manifest = mgr.stage_track(&file).unwrap();

        // Recreate a conflicting file at the original path.
        fs::write(&file, b"someone else wrote here").unwrap();

        let err = mgr.restore_batch(&manifest.batch_id).unwrap_err();
        assert!(matches!(err, crate::error::Error::Staging(StagingError::RestoreConflict(_))));

        // the staged copy must still be present untouched
        let batch_dir = root.path().join(".deletedByDuperscooper").join(&manifest.batch_id);
        assert!(batch_dir.join("manifest.json").exists());
    }

    #[test]
    fn list_batches_ignores_directories_without_a_manifest() {
        let root = tempdir().unwrap();
        let scan_root = root.path().join("Music");
        fs::create_dir_all(&scan_root).unwrap();
        let staging_root = root.path().join(".deletedByDuperscooper");
        fs::create_dir_all(staging_root.join("orphan_no_manifest")).unwrap();

        let mgr = StagingManager::new(&scan_root, "1.0.0", "audiotwin apply");
        assert_eq!(mgr.list_batches().len(), 0);
    }

    #[test]
    fn empty_keep_last_retains_most_recent_n() {
        let root = tempdir().unwrap();
        let scan_root = root.path().join("Music");
        fs::create_dir_all(&scan_root).unwrap();
        let mgr = StagingManager::new(&scan_root, "1.0.0", "audiotwin apply");

        for i in 0..3 {
            let f = scan_root.join(format!("t{i}.mp3"));
            fs::write(&f, b"x").unwrap();
            let manifest = mgr.stage_track(&f).unwrap();
            // force distinct batch ids even if staged within the same second
            let staging_root = root.path().join(".deletedByDuperscooper");
            let old_dir = staging_root.join(&manifest.batch_id);
            let new_id = format!("2020-01-0{}_00-00-00", i + 1);
            let new_dir = staging_root.join(&new_id);
            if old_dir != new_dir {
                fs::rename(&old_dir, &new_dir).unwrap();
            }
        }

        let removed = mgr.empty(None, Some(1)).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(mgr.list_batches().len(), 1);
    }
}
