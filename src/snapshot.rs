//! Offline catalog adapter over exported library snapshots.
//!
//! A snapshot is the JSON export of one catalog's library. Backing
//! [`CatalogApi`] with a snapshot gives the engine a network-free
//! end-to-end path: dry-run planning between two exports, cache warm-up,
//! and adapter tests. Search covers every entity in the snapshot; the
//! "collection" (what `list_all` returns) can be narrowed to model a user
//! library that holds only part of the catalog.

use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::executor::CatalogApi;
use crate::models::{EntityKind, MatchCandidate, NormalizedEntity, RawEntity};
use crate::normalize::normalize_collection;

/// Maximum candidates a search returns, mirroring platform search caps.
const SEARCH_LIMIT: usize = 20;

/// One catalog's exported library.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LibrarySnapshot {
    #[serde(default)]
    pub tracks: Vec<RawEntity>,
    #[serde(default)]
    pub albums: Vec<RawEntity>,
    #[serde(default)]
    pub artists: Vec<RawEntity>,
}

impl LibrarySnapshot {
    pub fn load(path: &Path) -> anyhow::Result<LibrarySnapshot> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading snapshot {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("parsing snapshot {}", path.display()))
    }

    pub fn entities(&self, kind: EntityKind) -> &[RawEntity] {
        match kind {
            EntityKind::Track => &self.tracks,
            EntityKind::Album => &self.albums,
            EntityKind::Artist => &self.artists,
        }
    }
}

/// A write the adapter accepted, kept for inspection and reporting.
#[derive(Clone, Debug, PartialEq)]
pub struct WriteOp {
    pub kind: EntityKind,
    pub target_id: String,
    pub at_position: Option<usize>,
}

/// [`CatalogApi`] over a [`LibrarySnapshot`]. Entities are pre-normalized
/// once at construction; records that cannot be normalized are unsearchable
/// and silently ignored, the same way a platform index would never return
/// them.
pub struct SnapshotCatalog {
    snapshot: LibrarySnapshot,
    candidates: FxHashMap<EntityKind, Vec<MatchCandidate>>,
    collection: Mutex<FxHashSet<String>>,
    writes: Mutex<Vec<WriteOp>>,
}

impl SnapshotCatalog {
    /// Adapter whose collection holds the entire snapshot.
    pub fn new(snapshot: LibrarySnapshot) -> SnapshotCatalog {
        let mut candidates = FxHashMap::default();
        let mut collection = FxHashSet::default();
        for kind in [EntityKind::Track, EntityKind::Album, EntityKind::Artist] {
            let (entities, _) = normalize_collection(kind, snapshot.entities(kind));
            let kind_candidates: Vec<MatchCandidate> = entities
                .into_iter()
                .map(|entity| MatchCandidate {
                    target_id: entity.source_id.clone(),
                    entity,
                })
                .collect();
            collection.extend(kind_candidates.iter().map(|c| c.target_id.clone()));
            candidates.insert(kind, kind_candidates);
        }
        SnapshotCatalog {
            snapshot,
            candidates,
            collection: Mutex::new(collection),
            writes: Mutex::new(Vec::new()),
        }
    }

    /// Narrow the collection to the given platform ids, keeping the whole
    /// snapshot searchable. Models a user library that holds only part of
    /// the catalog.
    pub fn with_collection(mut self, ids: Vec<String>) -> SnapshotCatalog {
        self.collection = Mutex::new(ids.into_iter().collect());
        self
    }

    /// Writes accepted so far, in application order.
    pub fn writes(&self) -> Vec<WriteOp> {
        self.writes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl CatalogApi for SnapshotCatalog {
    fn search(
        &self,
        kind: EntityKind,
        query: &NormalizedEntity,
    ) -> Result<Vec<MatchCandidate>, SyncError> {
        let Some(candidates) = self.candidates.get(&kind) else {
            return Ok(Vec::new());
        };
        let query_tokens: FxHashSet<&str> = query.name.split_whitespace().collect();

        let hits: Vec<MatchCandidate> = candidates
            .iter()
            .filter(|c| {
                if query.isrc.is_some() && c.entity.isrc == query.isrc {
                    return true;
                }
                c.entity
                    .name
                    .split_whitespace()
                    .any(|token| query_tokens.contains(token))
            })
            .take(SEARCH_LIMIT)
            .cloned()
            .collect();
        Ok(hits)
    }

    fn list_all(&self, kind: EntityKind) -> Result<Vec<RawEntity>, SyncError> {
        let collection = self
            .collection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(self
            .snapshot
            .entities(kind)
            .iter()
            .filter(|raw| collection.contains(&raw.id))
            .cloned()
            .collect())
    }

    fn add(
        &self,
        kind: EntityKind,
        target_id: &str,
        at_position: Option<usize>,
    ) -> Result<(), SyncError> {
        if !self
            .candidates
            .get(&kind)
            .is_some_and(|c| c.iter().any(|cand| cand.target_id == target_id))
        {
            return Err(SyncError::Catalog(format!(
                "unknown {} id {target_id}",
                kind.as_str()
            )));
        }
        self.collection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(target_id.to_string());
        self.writes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(WriteOp {
                kind,
                target_id: target_id.to_string(),
                at_position,
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize_entity;

    fn snapshot() -> LibrarySnapshot {
        LibrarySnapshot {
            tracks: vec![
                RawEntity {
                    id: "t1".into(),
                    name: "Yesterday".into(),
                    artists: vec!["The Beatles".into()],
                    duration_ms: Some(125_000),
                    isrc: Some("GBAYE0601498".into()),
                    ..Default::default()
                },
                RawEntity {
                    id: "t2".into(),
                    name: "Let It Be".into(),
                    artists: vec!["The Beatles".into()],
                    duration_ms: Some(243_000),
                    ..Default::default()
                },
            ],
            albums: vec![RawEntity {
                id: "a1".into(),
                name: "Abbey Road".into(),
                artists: vec!["The Beatles".into()],
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn query(name: &str, isrc: Option<&str>) -> NormalizedEntity {
        normalize_entity(
            &RawEntity {
                id: "q".into(),
                name: name.into(),
                artists: vec!["The Beatles".into()],
                duration_ms: Some(125_000),
                isrc: isrc.map(String::from),
                ..Default::default()
            },
            EntityKind::Track,
        )
        .unwrap()
    }

    #[test]
    fn test_search_by_name_token() {
        let catalog = SnapshotCatalog::new(snapshot());
        let hits = catalog.search(EntityKind::Track, &query("Yesterday", None)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].target_id, "t1");
    }

    #[test]
    fn test_search_by_isrc_ignores_name() {
        let catalog = SnapshotCatalog::new(snapshot());
        let hits = catalog
            .search(EntityKind::Track, &query("Renamed Entirely", Some("GBAYE0601498")))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].target_id, "t1");
    }

    #[test]
    fn test_list_all_respects_collection() {
        let catalog = SnapshotCatalog::new(snapshot());
        assert_eq!(catalog.list_all(EntityKind::Track).unwrap().len(), 2);
        assert_eq!(catalog.list_all(EntityKind::Album).unwrap().len(), 1);

        let narrowed = SnapshotCatalog::new(snapshot()).with_collection(vec!["t2".into()]);
        let listed = narrowed.list_all(EntityKind::Track).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "t2");
    }

    #[test]
    fn test_add_appends_and_joins_collection() {
        let catalog = SnapshotCatalog::new(snapshot()).with_collection(Vec::new());
        assert!(catalog.list_all(EntityKind::Track).unwrap().is_empty());

        catalog.add(EntityKind::Track, "t1", None).unwrap();
        assert_eq!(catalog.list_all(EntityKind::Track).unwrap().len(), 1);
        assert_eq!(catalog.writes().len(), 1);
        assert_eq!(catalog.writes()[0].target_id, "t1");

        // Unknown ids are rejected.
        assert!(catalog.add(EntityKind::Track, "nope", None).is_err());
    }
}
