//! Candidate scoring for cross-catalog matching.
//!
//! Tiered decision: an ISRC agreement is authoritative and wins outright;
//! otherwise duration gates a fuzzy name/artist comparison. Tiers never
//! blend; the first satisfied rule decides.

use rustc_hash::FxHashSet;

use crate::models::{
    EntityKind, MatchCandidate, MatchConfidence, MatchResult, MatchSignal, NormalizedEntity,
};
use crate::normalize::version_markers;

// ============================================================================
// Thresholds
// ============================================================================

/// Name similarity required alongside a qualifying artist similarity.
pub const NAME_THRESHOLD: f64 = 0.85;

/// Artist similarity required alongside a qualifying name similarity.
pub const ARTIST_THRESHOLD: f64 = 0.6;

/// Name similarity that qualifies on its own. Covers candidates with
/// missing or alternately-credited artist metadata.
pub const NAME_ONLY_THRESHOLD: f64 = 0.95;

/// Maximum duration delta in seconds for a track candidate to be considered
/// by the fuzzy tier. Cheap filter that prunes covers, remasters, and live
/// takes before string comparison runs.
pub const DURATION_TOLERANCE_SECS: i64 = 2;

/// Fallback when two candidates tie on combined similarity and duration
/// delta.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TieBreak {
    /// Keep the first candidate in the order the search returned.
    SearchOrder,
    /// Treat the tie as ambiguous and return no match.
    Reject,
}

/// Scorer tuning knobs. The defaults are the values above.
#[derive(Clone, Debug)]
pub struct ScoreConfig {
    pub name_threshold: f64,
    pub artist_threshold: f64,
    pub name_only_threshold: f64,
    pub duration_tolerance_secs: i64,
    pub tie_break: TieBreak,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        ScoreConfig {
            name_threshold: NAME_THRESHOLD,
            artist_threshold: ARTIST_THRESHOLD,
            name_only_threshold: NAME_ONLY_THRESHOLD,
            duration_tolerance_secs: DURATION_TOLERANCE_SECS,
            tie_break: TieBreak::SearchOrder,
        }
    }
}

// ============================================================================
// String Similarity
// ============================================================================

/// Normalized similarity between two comparison strings (0.0 to 1.0),
/// insensitive to token order: the better of token-sorted Levenshtein and
/// token-set Jaccard.
pub fn string_similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let lev = strsim::normalized_levenshtein(&sorted_tokens(a), &sorted_tokens(b));
    lev.max(token_jaccard(a, b))
}

fn sorted_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

fn token_jaccard(a: &str, b: &str) -> f64 {
    let tokens_a: FxHashSet<&str> = a.split_whitespace().collect();
    let tokens_b: FxHashSet<&str> = b.split_whitespace().collect();
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }
    let intersection = tokens_a.intersection(&tokens_b).count();
    let union = tokens_a.union(&tokens_b).count();
    intersection as f64 / union as f64
}

// ============================================================================
// Scoring
// ============================================================================

/// Score a source entity against search candidates and pick the best match,
/// or none. Pure and deterministic for identical inputs; candidate order
/// only matters as the configured last-resort tie-break.
pub fn score(
    source: &NormalizedEntity,
    candidates: &[MatchCandidate],
    config: &ScoreConfig,
) -> MatchResult {
    if let Some(result) = isrc_tier(source, candidates) {
        return result;
    }
    fuzzy_tier(source, candidates, config)
}

/// Tier 1: ISRC agreement. A single sharing candidate is an exact match
/// regardless of any other field. Multiple sharers tie-break on duration
/// delta, then name similarity; an unresolved tie is ambiguous and is never
/// guessed at.
fn isrc_tier(source: &NormalizedEntity, candidates: &[MatchCandidate]) -> Option<MatchResult> {
    let isrc = source.isrc.as_deref()?;
    let sharers: Vec<&MatchCandidate> = candidates
        .iter()
        .filter(|c| c.entity.isrc.as_deref() == Some(isrc))
        .collect();

    let winner = match sharers.len() {
        0 => return None,
        1 => sharers[0],
        _ => {
            let min_delta = sharers
                .iter()
                .map(|c| duration_delta(source, &c.entity))
                .min()
                .unwrap_or(i64::MAX);
            let closest: Vec<&MatchCandidate> = sharers
                .iter()
                .copied()
                .filter(|c| duration_delta(source, &c.entity) == min_delta)
                .collect();
            if closest.len() == 1 {
                closest[0]
            } else {
                let best_sim = closest
                    .iter()
                    .map(|c| string_similarity(&source.name, &c.entity.name))
                    .fold(f64::MIN, f64::max);
                let best: Vec<&MatchCandidate> = closest
                    .iter()
                    .copied()
                    .filter(|c| string_similarity(&source.name, &c.entity.name) == best_sim)
                    .collect();
                if best.len() == 1 {
                    best[0]
                } else {
                    // Ambiguous even after both tie-breaks.
                    return Some(MatchResult::no_match(&source.source_id));
                }
            }
        }
    };

    Some(MatchResult {
        source_id: source.source_id.clone(),
        target_id: Some(winner.target_id.clone()),
        confidence: MatchConfidence::Exact,
        signals: vec![MatchSignal::IsrcMatch],
    })
}

/// Tier 2: duration-gated fuzzy identity. Tracks are filtered to
/// candidates within the duration tolerance (albums and artists carry no
/// duration); recording-variant markers must agree on both sides.
fn fuzzy_tier(
    source: &NormalizedEntity,
    candidates: &[MatchCandidate],
    config: &ScoreConfig,
) -> MatchResult {
    let source_markers = version_markers(&source.display_name);

    struct Best<'a> {
        candidate: &'a MatchCandidate,
        combined: f64,
        delta: i64,
        artist_sim: f64,
        tied: bool,
    }
    let mut best: Option<Best> = None;

    for candidate in candidates {
        let delta = match source.kind {
            EntityKind::Track => {
                let delta = duration_delta(source, &candidate.entity);
                if delta > config.duration_tolerance_secs {
                    continue;
                }
                delta
            }
            _ => 0,
        };

        if version_markers(&candidate.entity.display_name) != source_markers {
            continue;
        }

        let name_sim = string_similarity(&source.name, &candidate.entity.name);
        let artist_sim = string_similarity(&source.primary_artist, &candidate.entity.primary_artist);
        let qualifies = (name_sim >= config.name_threshold && artist_sim >= config.artist_threshold)
            || name_sim >= config.name_only_threshold;
        if !qualifies {
            continue;
        }

        let combined = name_sim + artist_sim;
        let is_better = match &best {
            None => true,
            Some(b) => combined > b.combined || (combined == b.combined && delta < b.delta),
        };
        if is_better {
            best = Some(Best {
                candidate,
                combined,
                delta,
                artist_sim,
                tied: false,
            });
        } else if let Some(b) = &mut best {
            if combined == b.combined && delta == b.delta {
                b.tied = true;
            }
        }
    }

    match best {
        Some(b) if !(b.tied && config.tie_break == TieBreak::Reject) => {
            let mut signals = vec![MatchSignal::NameMatch];
            if b.artist_sim >= config.artist_threshold {
                signals.push(MatchSignal::ArtistMatch);
            }
            if source.kind == EntityKind::Track {
                signals.push(MatchSignal::DurationMatch);
            }
            MatchResult {
                source_id: source.source_id.clone(),
                target_id: Some(b.candidate.target_id.clone()),
                confidence: MatchConfidence::High,
                signals,
            }
        }
        _ => MatchResult::no_match(&source.source_id),
    }
}

/// Absolute duration difference; missing durations compare as infinitely
/// far apart so they can never pass the gate on their own.
fn duration_delta(source: &NormalizedEntity, candidate: &NormalizedEntity) -> i64 {
    match (source.duration_secs, candidate.duration_secs) {
        (Some(a), Some(b)) => (a - b).abs(),
        _ => i64::MAX,
    }
}

// ============================================================================
// Tests
// ============================================================================
