//! Core data model: fingerprints, file hashes, track and album records,
//! and the duplicate/album group shapes produced by the clusterers.
//!
//! These types are plain data — no I/O, no subprocess invocation. They are
//! constructed by [`crate::extract`], [`crate::probe`], [`crate::hasher`],
//! [`crate::album`] and consumed by [`crate::cluster`], [`crate::album::cluster`],
//! [`crate::quality`], [`crate::rules`] and [`crate::staging`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// SHA-256 over the full file contents; the fingerprint cache key.
///
/// Two files with identical bytes share a `FileHash`; files that differ
/// anywhere produce different hashes with overwhelming probability.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileHash(pub String);

impl FileHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FileHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An ordered vector of perceptual fingerprint integers, plus the duration
/// of the analyzed audio. Shorter sequences come from shorter source audio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub duration_secs: u32,
    pub data: Vec<u32>,
}

impl Fingerprint {
    pub fn new(duration_secs: u32, data: Vec<u32>) -> Self {
        Self {
            duration_secs,
            data,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Serialize to the cache's compact delimited string form.
    pub fn to_cache_string(&self) -> String {
        let joined = self
            .data
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",");
        format!("{}:{}", self.duration_secs, joined)
    }

    /// Parse the cache's compact delimited string form.
    pub fn from_cache_string(s: &str) -> Option<Self> {
        let (duration_part, data_part) = s.split_once(':')?;
        let duration_secs: u32 = duration_part.parse().ok()?;
        let data = if data_part.is_empty() {
            Vec::new()
        } else {
            data_part
                .split(',')
                .map(|v| v.parse::<u32>())
                .collect::<Result<Vec<_>, _>>()
                .ok()?
        };
        Some(Self {
            duration_secs,
            data,
        })
    }
}

/// A persisted cache row: the fingerprint plus the two timestamps that
/// drive age-based eviction. Timestamps are unix seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub file_hash: FileHash,
    pub fingerprint: Fingerprint,
    pub created_at: i64,
    pub last_accessed: i64,
}

/// Recognised audio file extensions (case-insensitive).
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "ogg", "m4a", "aac", "wma"];

/// True if `path` has one of [`AUDIO_EXTENSIONS`] (case-insensitive).
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let lower = e.to_lowercase();
            AUDIO_EXTENSIONS.contains(&lower.as_str())
        })
        .unwrap_or(false)
}

/// Audio container/codec descriptor, computed once and carried on
/// [`TrackRecord`]. The display "quality_info" string is derived from this
/// last, never the other way around (see Design Notes on the source's
/// string-typed format field).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodecInfo {
    pub format: AudioFormat,
    pub lossless: bool,
    pub bitrate_kbps: Option<u32>,
    pub sample_rate_hz: Option<u32>,
    pub bit_depth: Option<u16>,
}

impl CodecInfo {
    /// Render the free-form "quality_info" display string C10's field
    /// extraction re-derives structured fields from when ingesting foreign
    /// scan-result documents, e.g. "FLAC 44.1kHz 16bit" or "MP3 320kbps".
    pub fn display_string(&self) -> String {
        let format = self.format.as_str();
        if self.lossless {
            let mut parts = vec![format.to_string()];
            if let Some(sr) = self.sample_rate_hz {
                parts.push(format!("{:.1}kHz", sr as f64 / 1000.0));
            }
            if let Some(bd) = self.bit_depth {
                parts.push(format!("{bd}bit"));
            }
            parts.join(" ")
        } else if let Some(br) = self.bitrate_kbps {
            format!("{format} {br}kbps")
        } else {
            format.to_string()
        }
    }
}

/// The format family of an audio file, as recognised by [`AUDIO_EXTENSIONS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioFormat {
    Mp3,
    Flac,
    Wav,
    Ogg,
    M4a,
    Aac,
    Wma,
    Unknown,
}

impl AudioFormat {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "mp3" => Self::Mp3,
            "flac" => Self::Flac,
            "wav" => Self::Wav,
            "ogg" => Self::Ogg,
            "m4a" => Self::M4a,
            "aac" => Self::Aac,
            "wma" => Self::Wma,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mp3 => "MP3",
            Self::Flac => "FLAC",
            Self::Wav => "WAV",
            Self::Ogg => "OGG",
            Self::M4a => "M4A",
            Self::Aac => "AAC",
            Self::Wma => "WMA",
            Self::Unknown => "UNKNOWN",
        }
    }

    pub fn is_lossless_family(&self) -> bool {
        matches!(self, Self::Flac | Self::Wav)
    }
}

/// Tag bundle extracted by the metadata probe adapter (C2). Every field is
/// optional; the probe never fails on a missing tag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagBundle {
    pub album: Option<String>,
    pub artist: Option<String>,
    pub musicbrainz_albumid: Option<String>,
    pub disc: Option<u32>,
    pub total_discs: Option<u32>,
    pub disc_subtitle: Option<String>,
}

/// One audio file plus everything computed about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub path: PathBuf,
    pub file_hash: FileHash,
    pub fingerprint: Fingerprint,
    pub duration_secs: u32,
    pub tags: TagBundle,
    pub codec: CodecInfo,
    pub file_size: u64,
}

impl TrackRecord {
    pub fn quality_score(&self) -> f64 {
        crate::quality::track_quality_score(self)
    }

    pub fn is_lossless(&self) -> bool {
        crate::quality::is_lossless_score(self.quality_score())
    }
}

/// The three-way outcome of aggregating MusicBrainz album IDs across an
/// album's tracks: modelled as a sum type rather than "nullable plus flag"
/// per the spec's own Design Notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MbAlbumId {
    Consistent(String),
    Mixed,
    Absent,
}

impl MbAlbumId {
    pub fn consistent_value(&self) -> Option<&str> {
        match self {
            Self::Consistent(id) => Some(id.as_str()),
            _ => None,
        }
    }

    pub fn is_mixed(&self) -> bool {
        matches!(self, Self::Mixed)
    }

    /// Aggregate the non-null MB album IDs from an album's tracks.
    pub fn aggregate<'a>(ids: impl Iterator<Item = Option<&'a str>>) -> Self {
        let mut unique: Vec<&str> = Vec::new();
        for id in ids.flatten() {
            if !unique.contains(&id) {
                unique.push(id);
            }
        }
        match unique.len() {
            0 => Self::Absent,
            1 => Self::Consistent(unique[0].to_string()),
            _ => Self::Mixed,
        }
    }
}

/// A directory holding one or more audio files, treated as a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Album {
    pub path: PathBuf,
    /// Sorted by filename (byte-wise), so position-based comparison is stable.
    pub tracks: Vec<TrackRecord>,
    pub musicbrainz_albumid: MbAlbumId,
    pub album_name: Option<String>,
    pub artist_name: Option<String>,
    pub total_size: u64,
    pub avg_quality_score: f64,
    pub quality_info: String,
}

impl Album {
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }
}

/// One member of a [`DuplicateGroup`], annotated with its similarity to the
/// group's designated best.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateMember {
    pub track: TrackRecord,
    pub is_best: bool,
    pub similarity_to_best: f64,
}

/// A set of two or more tracks clustered as near-duplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub members: Vec<DuplicateMember>,
}

impl DuplicateGroup {
    pub fn best(&self) -> &DuplicateMember {
        self.members
            .iter()
            .find(|m| m.is_best)
            .expect("DuplicateGroup invariant: exactly one is_best member")
    }
}

/// How an [`AlbumGroup`] member was matched to the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMethod {
    Musicbrainz,
    Fingerprint,
}

/// One member of an [`AlbumGroup`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumGroupMember {
    pub album: Album,
    pub is_best: bool,
    pub match_method: MatchMethod,
    /// The metric that produced the clustering decision for this member,
    /// reported verbatim — never recomputed after grouping (critical
    /// invariant, spec §4.8 and §8 property 6).
    pub match_percentage: f64,
    pub is_partial_match: bool,
    pub overlap_percentage: Option<f64>,
}

/// A set of two or more albums clustered as duplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumGroup {
    pub matched_album_name: Option<String>,
    pub matched_artist_name: Option<String>,
    pub members: Vec<AlbumGroupMember>,
}

impl AlbumGroup {
    pub fn best(&self) -> &AlbumGroupMember {
        self.members
            .iter()
            .find(|m| m.is_best)
            .expect("AlbumGroup invariant: exactly one is_best member")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_cache_string_roundtrip() {
        let fp = Fingerprint::new(120, vec![1, 2, 3, u32::MAX]);
        let s = fp.to_cache_string();
        let back = Fingerprint::from_cache_string(&s).unwrap();
        assert_eq!(fp, back);
    }

    #[test]
    fn fingerprint_cache_string_empty_data() {
        let fp = Fingerprint::new(0, vec![]);
        let s = fp.to_cache_string();
        let back = Fingerprint::from_cache_string(&s).unwrap();
        assert_eq!(fp, back);
    }

    #[test]
    fn mb_album_id_aggregates_consistent() {
        let ids = vec![Some("abc"), Some("abc"), Some("abc")];
        assert_eq!(
            MbAlbumId::aggregate(ids.into_iter()),
            MbAlbumId::Consistent("abc".to_string())
        );
    }

    #[test]
    fn mb_album_id_aggregates_mixed() {
        let ids = vec![Some("abc"), Some("def")];
        assert_eq!(MbAlbumId::aggregate(ids.into_iter()), MbAlbumId::Mixed);
    }

    #[test]
    fn mb_album_id_aggregates_absent() {
        let ids: Vec<Option<&str>> = vec![None, None];
        assert_eq!(MbAlbumId::aggregate(ids.into_iter()), MbAlbumId::Absent);
    }

    #[test]
    fn is_audio_file_recognises_all_extensions() {
        for ext in AUDIO_EXTENSIONS {
            let p = PathBuf::from(format!("track.{ext}"));
            assert!(is_audio_file(&p), "{ext} should be recognised");
            let upper = PathBuf::from(format!("track.{}", ext.to_uppercase()));
            assert!(is_audio_file(&upper), "{ext} (uppercase) should be recognised");
        }
        assert!(!is_audio_file(&PathBuf::from("cover.jpg")));
    }
}
