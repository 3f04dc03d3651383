//! Durable mapping cache for confirmed cross-catalog matches.
//!
//! SQLite-backed store keyed by (kind, direction, source id). Both
//! directions live side by side as independent entries: a confirmed A→B
//! match says nothing about B→A. A missing or corrupt store degrades to an
//! empty in-memory cache; a cold cache only costs extra search calls,
//! never incorrect results.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use log::warn;
use rusqlite::{params, Connection};

use crate::models::{CacheEntry, Direction, EntityKind};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS mappings (
        kind         TEXT NOT NULL,
        direction    TEXT NOT NULL,
        source_id    TEXT NOT NULL,
        target_id    TEXT NOT NULL,
        confirmed_at INTEGER NOT NULL,
        PRIMARY KEY (kind, direction, source_id)
    );
";

/// Injectable store of confirmed source→target correspondences. Safe for
/// concurrent use; same-key write races resolve last-write-wins, which is
/// correct because re-matching the same source yields the same result.
pub struct MappingCache {
    conn: Mutex<Connection>,
}

impl MappingCache {
    /// Open (or create) the cache at `path`. Never fails: an unreadable or
    /// corrupt store is logged and replaced by an empty in-memory cache.
    pub fn open(path: &Path) -> MappingCache {
        match Self::try_open(path) {
            Ok(cache) => cache,
            Err(err) => {
                warn!(
                    "mapping cache at {} unavailable ({err}); continuing with an empty in-memory cache",
                    path.display()
                );
                Self::in_memory()
            }
        }
    }

    fn try_open(path: &Path) -> rusqlite::Result<MappingCache> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        conn.execute_batch(SCHEMA)?;
        Ok(MappingCache {
            conn: Mutex::new(conn),
        })
    }

    /// Purely in-memory cache; used for tests and for degraded runs.
    pub fn in_memory() -> MappingCache {
        let conn = Connection::open_in_memory().expect("open in-memory SQLite");
        conn.execute_batch(SCHEMA).expect("create cache schema");
        MappingCache {
            conn: Mutex::new(conn),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // Entries are independently valid rows; a poisoned lock loses nothing.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Look up a previously confirmed target id for this exact
    /// (kind, direction, source) key.
    pub fn lookup(&self, kind: EntityKind, direction: Direction, source_id: &str) -> Option<String> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT target_id FROM mappings
                 WHERE kind = ?1 AND direction = ?2 AND source_id = ?3",
            )
            .ok()?;
        stmt.query_row(
            params![kind.as_str(), direction.as_str(), source_id],
            |row| row.get(0),
        )
        .ok()
    }

    /// Record a confirmed match. Idempotent; an existing key is overwritten
    /// and its timestamp refreshed. Storage failures are logged, not
    /// raised: the match stays valid for the current run either way.
    pub fn record(&self, entry: &CacheEntry) {
        let conn = self.lock();
        let result = conn
            .prepare_cached(
                "INSERT OR REPLACE INTO mappings (kind, direction, source_id, target_id, confirmed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .and_then(|mut stmt| {
                stmt.execute(params![
                    entry.kind.as_str(),
                    entry.direction.as_str(),
                    entry.source_id,
                    entry.target_id,
                    entry.confirmed_at,
                ])
            });
        if let Err(err) = result {
            warn!(
                "failed to record mapping {} -> {}: {err}",
                entry.source_id, entry.target_id
            );
        }
    }

    /// All entries in deterministic order, for portability between
    /// deployments.
    pub fn bulk_export(&self) -> Vec<CacheEntry> {
        let conn = self.lock();
        let mut entries = Vec::new();
        let Ok(mut stmt) = conn.prepare_cached(
            "SELECT kind, direction, source_id, target_id, confirmed_at
             FROM mappings ORDER BY kind, direction, source_id",
        ) else {
            return entries;
        };
        let Ok(mut rows) = stmt.query([]) else {
            return entries;
        };
        while let Ok(Some(row)) = rows.next() {
            let kind: String = match row.get(0) {
                Ok(v) => v,
                Err(_) => continue,
            };
            let direction: String = match row.get(1) {
                Ok(v) => v,
                Err(_) => continue,
            };
            let (Some(kind), Some(direction)) =
                (EntityKind::parse(&kind), Direction::parse(&direction))
            else {
                warn!("skipping cache row with unknown kind/direction {kind}/{direction}");
                continue;
            };
            if let (Ok(source_id), Ok(target_id), Ok(confirmed_at)) =
                (row.get(2), row.get(3), row.get(4))
            {
                entries.push(CacheEntry {
                    kind,
                    direction,
                    source_id,
                    target_id,
                    confirmed_at,
                });
            }
        }
        entries
    }

    /// Import entries wholesale, keeping their original timestamps.
    /// Existing keys are overwritten (last-write-wins).
    pub fn bulk_import(&self, entries: &[CacheEntry]) {
        let mut conn = self.lock();
        let Ok(tx) = conn.transaction() else {
            warn!("cache import failed to start a transaction");
            return;
        };
        {
            let Ok(mut stmt) = tx.prepare_cached(
                "INSERT OR REPLACE INTO mappings (kind, direction, source_id, target_id, confirmed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            ) else {
                return;
            };
            for entry in entries {
                if let Err(err) = stmt.execute(params![
                    entry.kind.as_str(),
                    entry.direction.as_str(),
                    entry.source_id,
                    entry.target_id,
                    entry.confirmed_at,
                ]) {
                    warn!("cache import skipped {}: {err}", entry.source_id);
                }
            }
        }
        if let Err(err) = tx.commit() {
            warn!("cache import commit failed: {err}");
        }
    }

    /// Write all entries to a JSON file; returns the entry count.
    pub fn export_json(&self, path: &Path) -> anyhow::Result<usize> {
        let entries = self.bulk_export();
        let json = serde_json::to_string_pretty(&entries)?;
        std::fs::write(path, json)?;
        Ok(entries.len())
    }

    /// Load entries from a JSON file produced by [`export_json`];
    /// returns the entry count.
    ///
    /// [`export_json`]: MappingCache::export_json
    pub fn import_json(&self, path: &Path) -> anyhow::Result<usize> {
        let data = std::fs::read_to_string(path)?;
        let entries: Vec<CacheEntry> = serde_json::from_str(&data)?;
        self.bulk_import(&entries);
        Ok(entries.len())
    }

    pub fn len(&self) -> usize {
        let conn = self.lock();
        conn.query_row("SELECT COUNT(*) FROM mappings", [], |row| row.get::<_, i64>(0))
            .map(|n| n as usize)
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_miss_on_empty_cache() {
        let cache = MappingCache::in_memory();
        assert_eq!(cache.lookup(EntityKind::Track, Direction::AToB, "sp:1"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_record_and_lookup() {
        let cache = MappingCache::in_memory();
        cache.record(&CacheEntry::new(
            EntityKind::Track,
            Direction::AToB,
            "sp:1",
            "td:9",
        ));
        assert_eq!(
            cache.lookup(EntityKind::Track, Direction::AToB, "sp:1"),
            Some("td:9".to_string())
        );
        // Distinct kind and direction keys stay independent.
        assert_eq!(cache.lookup(EntityKind::Album, Direction::AToB, "sp:1"), None);
        assert_eq!(cache.lookup(EntityKind::Track, Direction::BToA, "sp:1"), None);
    }

    #[test]
    fn test_forward_entry_does_not_imply_reverse() {
        let cache = MappingCache::in_memory();
        cache.record(&CacheEntry::new(
            EntityKind::Track,
            Direction::AToB,
            "sp:1",
            "td:9",
        ));
        assert_eq!(cache.lookup(EntityKind::Track, Direction::BToA, "td:9"), None);
    }

    #[test]
    fn test_record_overwrites_last_write_wins() {
        let cache = MappingCache::in_memory();
        cache.record(&CacheEntry {
            kind: EntityKind::Track,
            direction: Direction::AToB,
            source_id: "sp:1".into(),
            target_id: "td:old".into(),
            confirmed_at: 100,
        });
        cache.record(&CacheEntry {
            kind: EntityKind::Track,
            direction: Direction::AToB,
            source_id: "sp:1".into(),
            target_id: "td:new".into(),
            confirmed_at: 200,
        });
        assert_eq!(
            cache.lookup(EntityKind::Track, Direction::AToB, "sp:1"),
            Some("td:new".to_string())
        );
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.bulk_export()[0].confirmed_at, 200);
    }

    #[test]
    fn test_bulk_export_import_round_trip() {
        let cache = MappingCache::in_memory();
        cache.record(&CacheEntry::new(
            EntityKind::Track,
            Direction::AToB,
            "sp:1",
            "td:1",
        ));
        cache.record(&CacheEntry::new(
            EntityKind::Artist,
            Direction::BToA,
            "td:7",
            "sp:7",
        ));

        let exported = cache.bulk_export();
        assert_eq!(exported.len(), 2);

        let other = MappingCache::in_memory();
        other.bulk_import(&exported);
        assert_eq!(other.bulk_export(), exported);
    }

    #[test]
    fn test_corrupt_store_degrades_to_empty_cache() {
        let dir = std::env::temp_dir().join("crosstune-cache-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("corrupt.sqlite3");
        std::fs::write(&path, b"this is not a database").unwrap();

        let cache = MappingCache::open(&path);
        assert_eq!(cache.lookup(EntityKind::Track, Direction::AToB, "sp:1"), None);

        // Still usable for the rest of the run.
        cache.record(&CacheEntry::new(
            EntityKind::Track,
            Direction::AToB,
            "sp:1",
            "td:1",
        ));
        assert_eq!(
            cache.lookup(EntityKind::Track, Direction::AToB, "sp:1"),
            Some("td:1".to_string())
        );

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_open_persists_across_reopen() {
        let dir = std::env::temp_dir().join("crosstune-cache-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("persist.sqlite3");
        std::fs::remove_file(&path).ok();

        {
            let cache = MappingCache::open(&path);
            cache.record(&CacheEntry::new(
                EntityKind::Album,
                Direction::AToB,
                "sp:a",
                "td:a",
            ));
        }
        let reopened = MappingCache::open(&path);
        assert_eq!(
            reopened.lookup(EntityKind::Album, Direction::AToB, "sp:a"),
            Some("td:a".to_string())
        );

        std::fs::remove_file(&path).ok();
    }
}
