//! Scan-result document (§6): the two shapes emitted by the core and
//! consumed by the rule engine and external tooling — track mode and
//! album mode — plus a CSV rendering that round-trips to the same shape
//! via a `group_id` column.
//!
//! Field decoration for rule evaluation goes through the *structured*
//! path here (`CodecInfo`/`is_best`/`quality_score` read directly off
//! `TrackRecord`/`Album`), per the Design Notes' "carry the structured
//! codec descriptor all the way from C9" — this is the "derive string
//! from struct" direction; [`crate::rules::extract_fields_from_quality_string`]
//! is the inverse, for re-ingesting a foreign document that only carries
//! the display string.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{AlbumGroup, DuplicateGroup, MatchMethod};
use crate::rules::{FieldValue, ItemFields, RuleEngine, Verdict};

fn action_str(v: Verdict) -> &'static str {
    match v {
        Verdict::Keep => "keep",
        Verdict::Delete => "delete",
    }
}

fn track_fields(is_best: bool, is_lossless: bool, quality_score: f64, format: &str, bitrate: Option<u32>, path: &str, file_size: u64) -> ItemFields {
    let mut fields = ItemFields::new();
    fields.insert("is_best".to_string(), FieldValue::Bool(is_best));
    fields.insert("is_lossless".to_string(), FieldValue::Bool(is_lossless));
    fields.insert("quality_score".to_string(), FieldValue::Number(quality_score));
    fields.insert("format".to_string(), FieldValue::Text(format.to_string()));
    fields.insert("codec".to_string(), FieldValue::Text(format.to_string()));
    fields.insert("bitrate".to_string(), FieldValue::Number(bitrate.unwrap_or(0) as f64));
    fields.insert("path".to_string(), FieldValue::Text(path.to_string()));
    fields.insert("file_size".to_string(), FieldValue::Number(file_size as f64));
    fields
}

// ---------------------------------------------------------------------
// Track mode
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackFileEntry {
    pub path: String,
    pub size_bytes: u64,
    pub audio_info: String,
    pub quality_score: f64,
    pub similarity_to_best: f64,
    pub is_best: bool,
    pub recommended_action: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackGroupEntry {
    pub hash: String,
    pub files: Vec<TrackFileEntry>,
}

/// Build the track-mode scan-result document from clustered groups,
/// deciding each member's `recommended_action` via `rule_engine`.
pub fn build_track_groups(groups: &[DuplicateGroup], rule_engine: &RuleEngine) -> Vec<TrackGroupEntry> {
    groups
        .iter()
        .map(|group| {
            let hash = group.best().track.file_hash.as_str().to_string();
            let files = group
                .members
                .iter()
                .map(|member| {
                    let fields = track_fields(
                        member.is_best,
                        member.track.is_lossless(),
                        member.track.quality_score(),
                        member.track.codec.format.as_str(),
                        member.track.codec.bitrate_kbps,
                        &member.track.path.display().to_string(),
                        member.track.file_size,
                    );
                    TrackFileEntry {
                        path: member.track.path.display().to_string(),
                        size_bytes: member.track.file_size,
                        audio_info: member.track.codec.display_string(),
                        quality_score: member.track.quality_score(),
                        similarity_to_best: member.similarity_to_best,
                        is_best: member.is_best,
                        recommended_action: action_str(rule_engine.evaluate(&fields)).to_string(),
                    }
                })
                .collect();
            TrackGroupEntry { hash, files }
        })
        .collect()
}

pub fn track_groups_to_json(groups: &[TrackGroupEntry]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(groups)
}

pub fn track_groups_from_json(text: &str) -> serde_json::Result<Vec<TrackGroupEntry>> {
    serde_json::from_str(text)
}

#[derive(Debug, Serialize, Deserialize)]
struct TrackCsvRow {
    group_id: usize,
    hash: String,
    path: String,
    size_bytes: u64,
    audio_info: String,
    quality_score: f64,
    similarity_to_best: f64,
    is_best: bool,
    recommended_action: String,
}

pub fn track_groups_to_csv(groups: &[TrackGroupEntry]) -> crate::error::Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    for (group_id, group) in groups.iter().enumerate() {
        for file in &group.files {
            writer
                .serialize(TrackCsvRow {
                    group_id,
                    hash: group.hash.clone(),
                    path: file.path.clone(),
                    size_bytes: file.size_bytes,
                    audio_info: file.audio_info.clone(),
                    quality_score: file.quality_score,
                    similarity_to_best: file.similarity_to_best,
                    is_best: file.is_best,
                    recommended_action: file.recommended_action.clone(),
                })
                .map_err(|e| crate::error::Error::RuleFileInvalid(e.to_string()))?;
        }
    }
    let bytes = writer.into_inner().map_err(|e| crate::error::Error::RuleFileInvalid(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| crate::error::Error::RuleFileInvalid(e.to_string()))
}

/// Reconstruct groups from a CSV rendering by grouping rows by
/// `group_id` (ordering of groups and group members may be canonicalised
/// relative to the original, per §6's round-trip contract).
pub fn track_groups_from_csv(text: &str) -> crate::error::Result<Vec<TrackGroupEntry>> {
    let mut reader = csv::Reader::from_reader(text.as_bytes());
    let mut by_group: std::collections::BTreeMap<usize, TrackGroupEntry> = std::collections::BTreeMap::new();

    for result in reader.deserialize() {
        let row: TrackCsvRow = result.map_err(|e| crate::error::Error::RuleFileInvalid(e.to_string()))?;
        let entry = by_group.entry(row.group_id).or_insert_with(|| TrackGroupEntry {
            hash: row.hash.clone(),
            files: Vec::new(),
        });
        entry.files.push(TrackFileEntry {
            path: row.path,
            size_bytes: row.size_bytes,
            audio_info: row.audio_info,
            quality_score: row.quality_score,
            similarity_to_best: row.similarity_to_best,
            is_best: row.is_best,
            recommended_action: row.recommended_action,
        });
    }

    Ok(by_group.into_values().collect())
}

// ---------------------------------------------------------------------
// Album mode
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumEntry {
    pub path: String,
    pub track_count: usize,
    pub total_size_bytes: u64,
    pub quality_info: String,
    pub quality_score: f64,
    pub match_percentage: f64,
    pub match_method: String,
    pub is_best: bool,
    pub recommended_action: String,
    pub musicbrainz_albumid: Option<String>,
    pub album_name: Option<String>,
    pub artist_name: Option<String>,
    pub has_mixed_mb_ids: bool,
    pub is_partial_match: bool,
    pub overlap_percentage: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumGroupEntry {
    pub matched_album: Option<String>,
    pub matched_artist: Option<String>,
    pub albums: Vec<AlbumEntry>,
}

pub fn build_album_groups(groups: &[AlbumGroup], rule_engine: &RuleEngine) -> Vec<AlbumGroupEntry> {
    groups
        .iter()
        .map(|group| {
            let albums = group
                .members
                .iter()
                .map(|member| {
                    let fields = album_fields(member);
                    AlbumEntry {
                        path: member.album.path.display().to_string(),
                        track_count: member.album.track_count(),
                        total_size_bytes: member.album.total_size,
                        quality_info: member.album.quality_info.clone(),
                        quality_score: member.album.avg_quality_score,
                        match_percentage: member.match_percentage,
                        match_method: match member.match_method {
                            MatchMethod::Musicbrainz => "musicbrainz".to_string(),
                            MatchMethod::Fingerprint => "fingerprint".to_string(),
                        },
                        is_best: member.is_best,
                        recommended_action: action_str(rule_engine.evaluate(&fields)).to_string(),
                        musicbrainz_albumid: member.album.musicbrainz_albumid.consistent_value().map(str::to_string),
                        album_name: member.album.album_name.clone(),
                        artist_name: member.album.artist_name.clone(),
                        has_mixed_mb_ids: member.album.musicbrainz_albumid.is_mixed(),
                        is_partial_match: member.is_partial_match,
                        overlap_percentage: member.overlap_percentage,
                    }
                })
                .collect();
            AlbumGroupEntry {
                matched_album: group.matched_album_name.clone(),
                matched_artist: group.matched_artist_name.clone(),
                albums,
            }
        })
        .collect()
}

fn album_fields(member: &crate::model::AlbumGroupMember) -> ItemFields {
    let mut fields: HashMap<String, FieldValue> = HashMap::new();
    fields.insert("is_best".to_string(), FieldValue::Bool(member.is_best));
    fields.insert("is_lossless".to_string(), FieldValue::Bool(member.album.avg_quality_score >= crate::quality::LOSSLESS_SCORE_FLOOR));
    fields.insert("quality_score".to_string(), FieldValue::Number(member.album.avg_quality_score));
    fields.insert("path".to_string(), FieldValue::Text(member.album.path.display().to_string()));
    fields.insert("file_size".to_string(), FieldValue::Number(member.album.total_size as f64));
    fields
}

pub fn album_groups_to_json(groups: &[AlbumGroupEntry]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(groups)
}

pub fn album_groups_from_json(text: &str) -> serde_json::Result<Vec<AlbumGroupEntry>> {
    serde_json::from_str(text)
}

#[derive(Debug, Serialize, Deserialize)]
struct AlbumCsvRow {
    group_id: usize,
    matched_album: Option<String>,
    matched_artist: Option<String>,
    path: String,
    track_count: usize,
    total_size_bytes: u64,
    quality_info: String,
    quality_score: f64,
    match_percentage: f64,
    match_method: String,
    is_best: bool,
    recommended_action: String,
    musicbrainz_albumid: Option<String>,
    album_name: Option<String>,
    artist_name: Option<String>,
    has_mixed_mb_ids: bool,
    is_partial_match: bool,
    overlap_percentage: Option<f64>,
}

pub fn album_groups_to_csv(groups: &[AlbumGroupEntry]) -> crate::error::Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    for (group_id, group) in groups.iter().enumerate() {
        for album in &group.albums {
            writer
                .serialize(AlbumCsvRow {
                    group_id,
                    matched_album: group.matched_album.clone(),
                    matched_artist: group.matched_artist.clone(),
                    path: album.path.clone(),
                    track_count: album.track_count,
                    total_size_bytes: album.total_size_bytes,
                    quality_info: album.quality_info.clone(),
                    quality_score: album.quality_score,
                    match_percentage: album.match_percentage,
                    match_method: album.match_method.clone(),
                    is_best: album.is_best,
                    recommended_action: album.recommended_action.clone(),
                    musicbrainz_albumid: album.musicbrainz_albumid.clone(),
                    album_name: album.album_name.clone(),
                    artist_name: album.artist_name.clone(),
                    has_mixed_mb_ids: album.has_mixed_mb_ids,
                    is_partial_match: album.is_partial_match,
                    overlap_percentage: album.overlap_percentage,
                })
                .map_err(|e| crate::error::Error::RuleFileInvalid(e.to_string()))?;
        }
    }
    let bytes = writer.into_inner().map_err(|e| crate::error::Error::RuleFileInvalid(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| crate::error::Error::RuleFileInvalid(e.to_string()))
}

pub fn album_groups_from_csv(text: &str) -> crate::error::Result<Vec<AlbumGroupEntry>> {
    let mut reader = csv::Reader::from_reader(text.as_bytes());
    let mut by_group: std::collections::BTreeMap<usize, AlbumGroupEntry> = std::collections::BTreeMap::new();

    for result in reader.deserialize() {
        let row: AlbumCsvRow = result.map_err(|e| crate::error::Error::RuleFileInvalid(e.to_string()))?;
        let entry = by_group.entry(row.group_id).or_insert_with(|| AlbumGroupEntry {
            matched_album: row.matched_album.clone(),
            matched_artist: row.matched_artist.clone(),
            albums: Vec::new(),
        });
        entry.albums.push(AlbumEntry {
            path: row.path,
            track_count: row.track_count,
            total_size_bytes: row.total_size_bytes,
            quality_info: row.quality_info,
            quality_score: row.quality_score,
            match_percentage: row.match_percentage,
            match_method: row.match_method,
            is_best: row.is_best,
            recommended_action: row.recommended_action,
            musicbrainz_albumid: row.musicbrainz_albumid,
            album_name: row.album_name,
            artist_name: row.artist_name,
            has_mixed_mb_ids: row.has_mixed_mb_ids,
            is_partial_match: row.is_partial_match,
            overlap_percentage: row.overlap_percentage,
        });
    }

    Ok(by_group.into_values().collect())
}
