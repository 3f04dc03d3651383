//! Core data models for cross-catalog reconciliation.
//!
//! Raw catalog payloads are normalized at the boundary into
//! [`NormalizedEntity`]; matching, indexing, and planning only ever operate
//! on that shape.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

// ============================================================================
// Entity Kinds & Directions
// ============================================================================

/// Kind of library entity being reconciled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Track,
    Album,
    Artist,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Track => "track",
            EntityKind::Album => "album",
            EntityKind::Artist => "artist",
        }
    }

    pub fn parse(s: &str) -> Option<EntityKind> {
        match s {
            "track" => Some(EntityKind::Track),
            "album" => Some(EntityKind::Album),
            "artist" => Some(EntityKind::Artist),
            _ => None,
        }
    }
}

/// Which catalog acts as source vs target for a run. The algorithms are
/// direction-agnostic; the direction only distinguishes cache entries, so a
/// confirmed A→B match never implies the reverse.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "a_to_b")]
    AToB,
    #[serde(rename = "b_to_a")]
    BToA,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::AToB => "a_to_b",
            Direction::BToA => "b_to_a",
        }
    }

    pub fn parse(s: &str) -> Option<Direction> {
        match s {
            "a_to_b" => Some(Direction::AToB),
            "b_to_a" => Some(Direction::BToA),
            _ => None,
        }
    }

    pub fn reversed(self) -> Direction {
        match self {
            Direction::AToB => Direction::BToA,
            Direction::BToA => Direction::AToB,
        }
    }
}

// ============================================================================
// Entities
// ============================================================================

/// Loosely-typed record as a catalog adapter hands it over. Only the
/// normalizer reads this shape.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawEntity {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artists: Vec<String>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<i64>,
    #[serde(default)]
    pub isrc: Option<String>,
}

/// Canonical, comparable shape of a catalog entity.
///
/// `name` and `primary_artist` are the normalized comparison strings;
/// `display_name` and `display_artist` retain the original casing for
/// reports and exports. `duration_secs` is present only for tracks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEntity {
    pub kind: EntityKind,
    pub display_name: String,
    pub display_artist: String,
    pub name: String,
    pub primary_artist: String,
    pub duration_secs: Option<i64>,
    pub isrc: Option<String>,
    pub source_id: String,
}

impl NormalizedEntity {
    /// Key used to test whether two records denote the same real-world
    /// entity: the ISRC when present, else name + artist + duration.
    pub fn identity_key(&self) -> IdentityKey {
        match &self.isrc {
            Some(isrc) => IdentityKey::Isrc(isrc.clone()),
            None => self.name_key(),
        }
    }

    /// Name-based key, ignoring any ISRC. Used as an index fallback so an
    /// ISRC-bearing record can still be recognized against a catalog that
    /// does not expose ISRCs.
    pub fn name_key(&self) -> IdentityKey {
        IdentityKey::NameArtist {
            name: self.name.clone(),
            artist: self.primary_artist.clone(),
            duration_secs: self.duration_secs,
        }
    }
}

/// Computed identity of an entity, hashable for index membership tests.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    Isrc(String),
    NameArtist {
        name: String,
        artist: String,
        duration_secs: Option<i64>,
    },
}

/// A search hit from the other catalog, paired with its platform id.
/// Transient; never persisted.
#[derive(Clone, Debug)]
pub struct MatchCandidate {
    pub entity: NormalizedEntity,
    pub target_id: String,
}

// ============================================================================
// Match Results
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchConfidence {
    /// ISRC-confirmed identity.
    Exact,
    /// Duration + fuzzy name/artist identity.
    High,
    NoMatch,
}

/// Which signals contributed to a match decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchSignal {
    IsrcMatch,
    DurationMatch,
    NameMatch,
    ArtistMatch,
}

/// Outcome of scoring one source entity against a candidate list.
///
/// Invariants: confidence is `Exact` iff `IsrcMatch` is among the signals;
/// `NoMatch` iff `target_id` is absent.
#[derive(Clone, Debug)]
pub struct MatchResult {
    pub source_id: String,
    pub target_id: Option<String>,
    pub confidence: MatchConfidence,
    pub signals: Vec<MatchSignal>,
}

impl MatchResult {
    pub fn no_match(source_id: &str) -> MatchResult {
        MatchResult {
            source_id: source_id.to_string(),
            target_id: None,
            confidence: MatchConfidence::NoMatch,
            signals: Vec::new(),
        }
    }
}

// ============================================================================
// Cache Entries
// ============================================================================

/// One confirmed source→target correspondence, keyed by
/// (kind, direction, source_id). Overwriting an existing key is the only
/// permitted mutation (last-write-wins).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub kind: EntityKind,
    pub direction: Direction,
    pub source_id: String,
    pub target_id: String,
    pub confirmed_at: i64,
}

impl CacheEntry {
    /// Build an entry stamped with the current time.
    pub fn new(
        kind: EntityKind,
        direction: Direction,
        source_id: &str,
        target_id: &str,
    ) -> CacheEntry {
        CacheEntry {
            kind,
            direction,
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            confirmed_at: unix_now(),
        }
    }
}

/// Current unix time in whole seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

// ============================================================================
// Sync Actions & Reports
// ============================================================================

/// Planner decision for one source entity.
#[derive(Clone, Debug, PartialEq)]
pub enum SyncDecision {
    /// Identity key already present in the target collection; no write.
    AlreadyPresent,
    /// A previously confirmed mapping exists; the executor still verifies
    /// the target id against the index before skipping the write.
    CachedMatch { target_id: String },
    /// No index or cache hit; the executor searches and scores.
    SearchRequired,
    /// Known-unresolvable entity carried through for reporting.
    Unmatched,
}

/// One planned step. `order_index` is the entity's position in the source
/// collection and drives order-preserving writes; it is never part of a
/// cache key.
#[derive(Clone, Debug)]
pub struct SyncAction {
    pub source: NormalizedEntity,
    pub decision: SyncDecision,
    pub order_index: usize,
}

/// Tallies and not-found report for one sync run. Every planned action ends
/// up in exactly one bucket; nothing is silently dropped.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub written: usize,
    pub already_present: usize,
    /// Actions resolved from the mapping cache (written or skipped).
    pub from_cache: usize,
    /// Writes the target catalog rejected.
    pub failed_writes: usize,
    /// Source entities no candidate matched.
    pub unmatched: Vec<NormalizedEntity>,
    /// Source ids of records that could not be normalized.
    pub malformed: Vec<String>,
    /// True when the run was aborted before all actions executed.
    pub cancelled: bool,
}

impl SyncReport {
    pub fn total_processed(&self) -> usize {
        self.written + self.already_present + self.failed_writes + self.unmatched.len()
    }
}
