//! Quality Scorer (C9): ranks members of a duplicate group and designates
//! one "best". Reads codec properties in-process via `lofty` (bitrate,
//! sample rate, bit depth, lossless-ness) rather than shelling out to a
//! third subprocess — the fingerprint extractor (C1) and metadata probe
//! (C2) are the only two external processes this crate invokes.
//!
//! Structurally grounded on the teacher's `health/quality.rs`
//! (`bitflags!` + scored struct + pure scoring function + thorough
//! per-flag `#[cfg(test)]` coverage), though the semantics here are codec
//! quality, not metadata completeness.

use std::path::Path;

use bitflags::bitflags;
use lofty::file::AudioFile;
use lofty::probe::Probe;

use crate::error::{Error, Result};
use crate::model::{AudioFormat, CodecInfo, TrackRecord};

bitflags! {
    /// Informational properties of a track's codec, exposed on
    /// [`TrackRecord`] and in the `audio_info` display string. These do not
    /// change `is_lossless` or the quality score formula.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CodecFlags: u32 {
        /// Lossless container (FLAC, WAV).
        const LOSSLESS = 1 << 0;
        /// Sample rate > 48kHz or bit depth > 16.
        const HI_RES = 1 << 1;
        /// Bitrate varies across the file rather than being constant.
        const VARIABLE_BITRATE = 1 << 2;
    }
}

impl CodecFlags {
    pub fn from_codec_info(codec: &CodecInfo, variable_bitrate: bool) -> Self {
        let mut flags = Self::empty();
        if codec.lossless {
            flags |= Self::LOSSLESS;
        }
        let hi_res = codec.sample_rate_hz.is_some_and(|sr| sr > 48_000)
            || codec.bit_depth.is_some_and(|bd| bd > 16);
        if hi_res {
            flags |= Self::HI_RES;
        }
        if variable_bitrate {
            flags |= Self::VARIABLE_BITRATE;
        }
        flags
    }
}

/// Score at and above which a track is considered lossless (§4.9).
pub const LOSSLESS_SCORE_FLOOR: f64 = 10_000.0;

/// `score >= `[`LOSSLESS_SCORE_FLOOR`].
pub fn is_lossless_score(score: f64) -> bool {
    score >= LOSSLESS_SCORE_FLOOR
}

/// Compute the quality score for one track.
///
/// Lossless codecs score `LOSSLESS_SCORE_FLOOR` plus a bonus scaled by
/// sample rate and bit depth, so that two lossless tracks of different
/// resolutions are still distinguishable without ever dropping below the
/// lossy range. Lossy codecs score their bitrate in kbps directly.
pub fn track_quality_score(track: &TrackRecord) -> f64 {
    codec_quality_score(&track.codec)
}

pub fn codec_quality_score(codec: &CodecInfo) -> f64 {
    if codec.lossless {
        let sample_rate_bonus = codec.sample_rate_hz.unwrap_or(44_100) as f64 / 1000.0;
        let bit_depth_bonus = codec.bit_depth.unwrap_or(16) as f64 * 10.0;
        LOSSLESS_SCORE_FLOOR + sample_rate_bonus + bit_depth_bonus
    } else {
        codec.bitrate_kbps.unwrap_or(0) as f64
    }
}

/// Read codec properties from an audio file via `lofty`: format family
/// (from extension, since lofty's own format enum is a finer-grained
/// superset we don't need), lossless-ness, bitrate, sample rate, bit
/// depth. Never touches C1/C2 — this is purely in-process tag/property
/// reading.
pub fn read_codec_info(path: &Path) -> Result<CodecInfo> {
    let format = path
        .extension()
        .and_then(|e| e.to_str())
        .map(AudioFormat::from_extension)
        .unwrap_or(AudioFormat::Unknown);

    let tagged_file = Probe::open(path)
        .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?
        .read()
        .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;

    let properties = tagged_file.properties();
    let lossless = format.is_lossless_family();
    let bitrate_kbps = properties.audio_bitrate();
    let sample_rate_hz = properties.sample_rate();
    let bit_depth = properties.bit_depth().map(|b| b as u16);

    Ok(CodecInfo {
        format,
        lossless,
        bitrate_kbps,
        sample_rate_hz,
        bit_depth,
    })
}

/// Rank the quality-scored members of a group and compute each one's
/// similarity to the designated best, without mutating the scores
/// themselves. Shared by the track clusterer (C6) and album clusterer
/// (C8) in-group ordering.
///
/// Ties are broken by `tie_break` (descending) — typically file size —
/// then by `path_key` (ascending) as the final deterministic tie-breaker.
pub fn rank_by_quality<'a, T>(
    items: &'a [T],
    score: impl Fn(&T) -> f64,
    tie_break: impl Fn(&T) -> u64,
    path_key: impl Fn(&T) -> &std::path::Path,
) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..items.len()).collect();
    indices.sort_by(|&a, &b| {
        let sa = score(&items[a]);
        let sb = score(&items[b]);
        sb.partial_cmp(&sa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| tie_break(&items[b]).cmp(&tie_break(&items[a])))
            .then_with(|| path_key(&items[a]).cmp(path_key(&items[b])))
    });
    indices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AudioFormat;

    fn codec(lossless: bool, bitrate: Option<u32>, sr: Option<u32>, bd: Option<u16>) -> CodecInfo {
        CodecInfo {
            format: if lossless { AudioFormat::Flac } else { AudioFormat::Mp3 },
            lossless,
            bitrate_kbps: bitrate,
            sample_rate_hz: sr,
            bit_depth: bd,
        }
    }

    #[test]
    fn lossless_scores_above_floor() {
        let c = codec(true, None, Some(44_100), Some(16));
        let score = codec_quality_score(&c);
        assert!(score >= LOSSLESS_SCORE_FLOOR);
        assert!(is_lossless_score(score));
    }

    #[test]
    fn higher_resolution_lossless_scores_higher() {
        let cd = codec(true, None, Some(44_100), Some(16));
        let hires = codec(true, None, Some(96_000), Some(24));
        assert!(codec_quality_score(&hires) > codec_quality_score(&cd));
    }

    #[test]
    fn lossy_scores_its_bitrate() {
        let c = codec(false, Some(320), None, None);
        assert_eq!(codec_quality_score(&c), 320.0);
        assert!(!is_lossless_score(codec_quality_score(&c)));
    }

    #[test]
    fn missing_bitrate_scores_zero() {
        let c = codec(false, None, None, None);
        assert_eq!(codec_quality_score(&c), 0.0);
    }

    #[test]
    fn codec_flags_detect_hi_res() {
        let hires = codec(true, None, Some(96_000), Some(24));
        let flags = CodecFlags::from_codec_info(&hires, false);
        assert!(flags.contains(CodecFlags::HI_RES));
        assert!(flags.contains(CodecFlags::LOSSLESS));
    }

    #[test]
    fn codec_flags_standard_res_not_hi_res() {
        let cd = codec(true, None, Some(44_100), Some(16));
        let flags = CodecFlags::from_codec_info(&cd, false);
        assert!(!flags.contains(CodecFlags::HI_RES));
    }

    #[test]
    fn rank_by_quality_orders_descending_then_ties_by_size_then_path() {
        #[derive(Clone)]
        struct Item {
            score: f64,
            size: u64,
            path: std::path::PathBuf,
        }
        let items = vec![
            Item { score: 50.0, size: 10, path: "b.mp3".into() },
            Item { score: 90.0, size: 5, path: "a.flac".into() },
            Item { score: 50.0, size: 10, path: "a.mp3".into() },
        ];
        let order = rank_by_quality(
            &items,
            |i| i.score,
            |i| i.size,
            |i| i.path.as_path(),
        );
        assert_eq!(order, vec![1, 2, 0]);
    }
}
