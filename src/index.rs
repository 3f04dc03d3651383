//! Membership index over an existing target collection.
//!
//! Built once per run from a single `list_all` fetch, then read-only.
//! Without it, detecting "already synced" would cost one search per source
//! item and burn through rate limits. The index is a derived view of the
//! target's current state and is discarded at run end, never persisted.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::models::{EntityKind, IdentityKey, MatchCandidate, NormalizedEntity};

pub struct TargetIndex {
    kind: EntityKind,
    by_key: FxHashMap<IdentityKey, String>,
    target_ids: FxHashSet<String>,
}

impl TargetIndex {
    /// One pass over the existing target collection. The first occupant of
    /// a key wins: that is the item already on the platform. ISRC-bearing
    /// entities are additionally indexed under their name key so they stay
    /// recognizable from a catalog that does not expose ISRCs.
    pub fn build(kind: EntityKind, existing: impl IntoIterator<Item = MatchCandidate>) -> TargetIndex {
        let mut by_key: FxHashMap<IdentityKey, String> = FxHashMap::default();
        let mut target_ids = FxHashSet::default();

        for candidate in existing {
            target_ids.insert(candidate.target_id.clone());
            if candidate.entity.isrc.is_some() {
                by_key
                    .entry(candidate.entity.name_key())
                    .or_insert_with(|| candidate.target_id.clone());
            }
            by_key
                .entry(candidate.entity.identity_key())
                .or_insert(candidate.target_id);
        }

        TargetIndex {
            kind,
            by_key,
            target_ids,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Target id of the entry denoting the same real-world entity, if any.
    /// Falls back from the ISRC key to the name key so an ISRC mismatch
    /// between catalogs does not produce a duplicate write.
    pub fn lookup(&self, entity: &NormalizedEntity) -> Option<&str> {
        if let Some(id) = self.by_key.get(&entity.identity_key()) {
            return Some(id.as_str());
        }
        if entity.isrc.is_some() {
            return self.by_key.get(&entity.name_key()).map(String::as_str);
        }
        None
    }

    /// Whether this platform id exists in the indexed collection. Backs the
    /// executor's verification of cached mappings before skipping a write.
    pub fn contains_target(&self, target_id: &str) -> bool {
        self.target_ids.contains(target_id)
    }

    pub fn len(&self) -> usize {
        self.target_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.target_ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawEntity;
    use crate::normalize::normalize_entity;

    fn candidate(id: &str, name: &str, artist: &str, secs: i64, isrc: Option<&str>) -> MatchCandidate {
        let entity = normalize_entity(
            &RawEntity {
                id: id.into(),
                name: name.into(),
                artists: vec![artist.into()],
                duration_ms: Some(secs * 1000),
                isrc: isrc.map(String::from),
                ..Default::default()
            },
            EntityKind::Track,
        )
        .unwrap();
        MatchCandidate {
            entity,
            target_id: id.to_string(),
        }
    }

    #[test]
    fn test_lookup_by_isrc() {
        let index = TargetIndex::build(
            EntityKind::Track,
            vec![candidate("t1", "Song", "Artist", 200, Some("USX1X1234567"))],
        );
        let source = candidate("s1", "Completely Different", "Someone", 300, Some("USX1X1234567"));
        assert_eq!(index.lookup(&source.entity), Some("t1"));
        assert!(index.contains_target("t1"));
        assert!(!index.contains_target("t2"));
    }

    #[test]
    fn test_lookup_by_name_key() {
        let index = TargetIndex::build(
            EntityKind::Track,
            vec![candidate("t1", "Yesterday (Remastered 2009)", "The Beatles", 125, None)],
        );
        let source = candidate("s1", "Yesterday", "Beatles", 125, None);
        assert_eq!(index.lookup(&source.entity), Some("t1"));

        let other = candidate("s2", "Yesterday", "Beatles", 126, None);
        assert_eq!(index.lookup(&other.entity), None);
    }

    #[test]
    fn test_isrc_source_falls_back_to_name_key() {
        // Target catalog exposes no ISRCs; source record carries one.
        let index = TargetIndex::build(
            EntityKind::Track,
            vec![candidate("t1", "Yesterday", "The Beatles", 125, None)],
        );
        let source = candidate("s1", "Yesterday", "The Beatles", 125, Some("GBAYE0601498"));
        assert_eq!(index.lookup(&source.entity), Some("t1"));
    }

    #[test]
    fn test_first_occupant_wins() {
        let index = TargetIndex::build(
            EntityKind::Track,
            vec![
                candidate("t1", "Song", "Artist", 200, None),
                candidate("t2", "Song", "Artist", 200, None),
            ],
        );
        let source = candidate("s1", "Song", "Artist", 200, None);
        assert_eq!(index.lookup(&source.entity), Some("t1"));
        assert_eq!(index.len(), 2);
    }
}
