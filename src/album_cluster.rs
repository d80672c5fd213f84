//! Album Clusterer (C8): the subtlest component. Produces [`AlbumGroup`]s
//! via a MusicBrainz-ID fast path plus a fingerprint-aggregation slow
//! path (same-track-count position-based mean, or track-count-mismatch
//! bipartite partial-overlap matching), aggregated with the same
//! Union-Find primitive as C6.
//!
//! **Critical invariant, reproduced verbatim because it is load-bearing:**
//! the match percentage attached to a clustered pair is whatever metric
//! produced the clustering decision for that pair, threaded straight
//! through to the final [`AlbumGroupMember`] — never recomputed from an
//! already-formed group by a different metric. [`PairMatch`] exists
//! specifically so there is no function anywhere in this module that
//! takes a formed group and derives a percentage from it.

use crate::config::SimilarityConfig;
use crate::model::{Album, AlbumGroup, AlbumGroupMember, MatchMethod};
use crate::similarity::similarity_percentage;
use crate::unionfind::UnionFind;

/// The outcome of comparing one pair of albums on the fingerprint slow
/// path: the metric that produced (or would produce) a clustering
/// decision, computed once and carried forward unchanged.
#[derive(Debug, Clone, Copy)]
struct PairMatch {
    percentage: f64,
    is_partial_match: bool,
    overlap_percentage: Option<f64>,
}

/// Cluster `albums` into [`AlbumGroup`]s.
pub fn cluster_albums(albums: &[Album], cfg: &SimilarityConfig) -> Vec<AlbumGroup> {
    let n = albums.len();
    if n < 2 {
        return Vec::new();
    }

    let (mb_eligible, fingerprint_eligible): (Vec<usize>, Vec<usize>) =
        (0..n).partition(|&i| albums[i].musicbrainz_albumid.consistent_value().is_some());

    let mut groups = cluster_by_musicbrainz(albums, &mb_eligible);
    groups.extend(cluster_by_fingerprint(albums, &fingerprint_eligible, cfg));
    groups
}

/// Fast path: partition albums with a consistent, non-null MB album ID by
/// that ID; any partition of size >= 2 becomes a group at 100%.
fn cluster_by_musicbrainz(albums: &[Album], eligible: &[usize]) -> Vec<AlbumGroup> {
    use std::collections::BTreeMap;

    let mut by_mbid: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for &idx in eligible {
        let id = albums[idx].musicbrainz_albumid.consistent_value().unwrap();
        by_mbid.entry(id).or_default().push(idx);
    }

    let mut groups: Vec<AlbumGroup> = by_mbid
        .into_values()
        .filter(|members| members.len() >= 2)
        .map(|mut indices| {
            indices.sort();
            build_musicbrainz_group(albums, &indices)
        })
        .collect();

    groups.sort_by_key(|g| {
        g.members
            .iter()
            .map(|m| m.album.path.clone())
            .min()
            .unwrap()
    });
    groups
}

fn build_musicbrainz_group(albums: &[Album], indices: &[usize]) -> AlbumGroup {
    let best_idx = pick_best_album(albums, indices);
    let members: Vec<AlbumGroupMember> = indices
        .iter()
        .map(|&idx| AlbumGroupMember {
            album: albums[idx].clone(),
            is_best: idx == best_idx,
            match_method: MatchMethod::Musicbrainz,
            match_percentage: 100.0,
            is_partial_match: false,
            overlap_percentage: None,
        })
        .collect();

    let (matched_album_name, matched_artist_name) = pick_matched_names(&members);

    AlbumGroup {
        matched_album_name,
        matched_artist_name,
        members,
    }
}

/// Slow path: for every eligible pair, compute a [`PairMatch`] (or
/// `None` if the pair doesn't cluster), then aggregate clustered pairs
/// via Union-Find exactly as C6.
fn cluster_by_fingerprint(albums: &[Album], eligible: &[usize], cfg: &SimilarityConfig) -> Vec<AlbumGroup> {
    if eligible.len() < 2 {
        return Vec::new();
    }

    // local index space over `eligible`, mapped back to album indices
    let local_n = eligible.len();
    let mut pair_match: std::collections::HashMap<(usize, usize), PairMatch> =
        std::collections::HashMap::new();
    let mut uf = UnionFind::new(local_n);

    for i in 0..local_n {
        for j in (i + 1)..local_n {
            let a = &albums[eligible[i]];
            let b = &albums[eligible[j]];
            if let Some(pm) = compare_albums(a, b, cfg) {
                uf.union(i, j);
                pair_match.insert((i, j), pm);
            }
        }
    }

    uf.groups()
        .into_iter()
        .filter(|g| g.len() >= 2)
        .map(|local_indices| {
            let album_indices: Vec<usize> = local_indices.iter().map(|&li| eligible[li]).collect();
            build_fingerprint_group(albums, &local_indices, &album_indices, &pair_match)
        })
        .collect()
}

/// Compare one pair of albums on the fingerprint slow path, returning
/// the [`PairMatch`] that would cause them to cluster, or `None` if they
/// don't meet the threshold/overlap bar.
fn compare_albums(a: &Album, b: &Album, cfg: &SimilarityConfig) -> Option<PairMatch> {
    if a.tracks.len() == b.tracks.len() {
        position_based_match(a, b, cfg)
    } else if cfg.partial_overlap {
        partial_overlap_match(a, b, cfg)
    } else {
        None
    }
}

/// Same track count: pairwise C5 position-by-position, album similarity
/// is the arithmetic mean. Clustered iff that mean >= `cfg.threshold`.
fn position_based_match(a: &Album, b: &Album, cfg: &SimilarityConfig) -> Option<PairMatch> {
    if a.tracks.is_empty() {
        return None;
    }
    let sims: Vec<f64> = a
        .tracks
        .iter()
        .zip(b.tracks.iter())
        .map(|(ta, tb)| {
            similarity_percentage(&ta.fingerprint.data, &tb.fingerprint.data, cfg.minimum_length)
        })
        .collect();
    let mean = sims.iter().sum::<f64>() / sims.len() as f64;
    if mean >= cfg.threshold {
        Some(PairMatch {
            percentage: mean,
            is_partial_match: false,
            overlap_percentage: None,
        })
    } else {
        None
    }
}

/// Differing track counts, `partial_overlap` enabled: greedy best
/// bipartite matching of each shorter-side track to at most one
/// longer-side track, considering only per-track similarities >=
/// `cfg.threshold`. Overlap = matched / shorter_len * 100; clustered iff
/// overlap >= `cfg.min_overlap`, with `match_percentage` the mean
/// similarity of the matched tracks only (not all positions).
fn partial_overlap_match(a: &Album, b: &Album, cfg: &SimilarityConfig) -> Option<PairMatch> {
    let (shorter, longer) = if a.tracks.len() <= b.tracks.len() {
        (&a.tracks, &b.tracks)
    } else {
        (&b.tracks, &a.tracks)
    };
    let shorter_len = shorter.len();
    if shorter_len == 0 {
        return None;
    }

    // Collect every candidate pair meeting the threshold, sorted by
    // descending similarity, then greedily match highest-similarity
    // pairs first subject to each side being used at most once. This is
    // a standard greedy approximation to maximum-weight bipartite
    // matching, adequate here because ties are rare (fingerprints of
    // genuinely distinct tracks essentially never collide) and the spec
    // only requires "a best bipartite matching," not an exact optimum.
    let mut candidates: Vec<(usize, usize, f64)> = Vec::new();
    for (si, strack) in shorter.iter().enumerate() {
        for (li, ltrack) in longer.iter().enumerate() {
            let sim = similarity_percentage(
                &strack.fingerprint.data,
                &ltrack.fingerprint.data,
                cfg.minimum_length,
            );
            if sim >= cfg.threshold {
                candidates.push((si, li, sim));
            }
        }
    }
    candidates.sort_by(|x, y| y.2.partial_cmp(&x.2).unwrap_or(std::cmp::Ordering::Equal));

    let mut used_short = vec![false; shorter_len];
    let mut used_long = vec![false; longer.len()];
    let mut matched_sims = Vec::new();

    for (si, li, sim) in candidates {
        if used_short[si] || used_long[li] {
            continue;
        }
        used_short[si] = true;
        used_long[li] = true;
        matched_sims.push(sim);
    }

    let overlap_percentage = matched_sims.len() as f64 / shorter_len as f64 * 100.0;
    if overlap_percentage >= cfg.min_overlap {
        let mean_matched = matched_sims.iter().sum::<f64>() / matched_sims.len() as f64;
        Some(PairMatch {
            percentage: mean_matched,
            is_partial_match: true,
            overlap_percentage: Some(overlap_percentage),
        })
    } else {
        None
    }
}

fn build_fingerprint_group(
    albums: &[Album],
    local_indices: &[usize],
    album_indices: &[usize],
    pair_match: &std::collections::HashMap<(usize, usize), PairMatch>,
) -> AlbumGroup {
    let best_idx = pick_best_album(albums, album_indices);
    let best_local = local_indices[album_indices.iter().position(|&a| a == best_idx).unwrap()];

    let members: Vec<AlbumGroupMember> = local_indices
        .iter()
        .zip(album_indices.iter())
        .map(|(&local_idx, &album_idx)| {
            let is_best = album_idx == best_idx;
            let (percentage, is_partial_match, overlap_percentage) = if is_best {
                (100.0, false, None)
            } else {
                let key = if local_idx < best_local {
                    (local_idx, best_local)
                } else {
                    (best_local, local_idx)
                };
                match pair_match.get(&key) {
                    Some(pm) => (pm.percentage, pm.is_partial_match, pm.overlap_percentage),
                    // Clustered transitively (A-B and B-C matched but not
                    // A-C directly): report the best available pairwise
                    // match to any other member, still never recomputed
                    // from the group.
                    None => best_transitive_match(local_idx, local_indices, pair_match),
                }
            };
            AlbumGroupMember {
                album: albums[album_idx].clone(),
                is_best,
                match_method: MatchMethod::Fingerprint,
                match_percentage: percentage,
                is_partial_match,
                overlap_percentage,
            }
        })
        .collect();

    let (matched_album_name, matched_artist_name) = pick_matched_names(&members);

    AlbumGroup {
        matched_album_name,
        matched_artist_name,
        members,
    }
}

/// For a member not directly paired with the best (only reachable through
/// a chain of unions), report its strongest direct pairwise match to any
/// other member of the same group — still the metric that drove some
/// clustering decision, never a fresh recomputation.
fn best_transitive_match(
    local_idx: usize,
    local_indices: &[usize],
    pair_match: &std::collections::HashMap<(usize, usize), PairMatch>,
) -> (f64, bool, Option<f64>) {
    let mut best: Option<PairMatch> = None;
    for &other in local_indices {
        if other == local_idx {
            continue;
        }
        let key = if local_idx < other { (local_idx, other) } else { (other, local_idx) };
        if let Some(pm) = pair_match.get(&key) {
            if best.is_none_or(|b| pm.percentage > b.percentage) {
                best = Some(*pm);
            }
        }
    }
    match best {
        Some(pm) => (pm.percentage, pm.is_partial_match, pm.overlap_percentage),
        None => (0.0, false, None),
    }
}

fn pick_best_album(albums: &[Album], indices: &[usize]) -> usize {
    let order = crate::quality::rank_by_quality(
        indices,
        |&idx| albums[idx].avg_quality_score,
        |&idx| albums[idx].total_size,
        |&idx| albums[idx].path.as_path(),
    );
    indices[order[0]]
}

/// The "matched album name"/"matched artist" shown for a group: the most
/// common non-null value among members, with the best-quality member
/// breaking ties.
fn pick_matched_names(members: &[AlbumGroupMember]) -> (Option<String>, Option<String>) {
    let album_name = most_common_or_best(members, |m| m.album.album_name.as_deref());
    let artist_name = most_common_or_best(members, |m| m.album.artist_name.as_deref());
    (album_name, artist_name)
}

fn most_common_or_best<'a>(
    members: &'a [AlbumGroupMember],
    field: impl Fn(&'a AlbumGroupMember) -> Option<&'a str>,
) -> Option<String> {
    use std::collections::HashMap;

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for m in members {
        if let Some(v) = field(m) {
            *counts.entry(v).or_default() += 1;
        }
    }
    if counts.is_empty() {
        return None;
    }
    let max_count = *counts.values().max().unwrap();
    let tied: Vec<&str> = counts
        .into_iter()
        .filter(|&(_, c)| c == max_count)
        .map(|(v, _)| v)
        .collect();

    if tied.len() == 1 {
        return Some(tied[0].to_string());
    }
    // Tie-break: the best-quality member among those whose value is tied.
    members
        .iter()
        .find(|m| m.is_best && field(m).is_some_and(|v| tied.contains(&v)))
        .and_then(field)
        .or_else(|| members.iter().find_map(|m| field(m).filter(|v| tied.contains(v))))
        .map(|s| s.to_string())
}
