//! Execution boundary: drives a plan against catalog adapters.
//!
//! Search lookups are independent, latency-bound calls, so `SearchRequired`
//! actions run on a bounded worker pool. Completion order never reorders
//! writes: results are buffered and applied strictly by `order_index`, so
//! an append-only target ends up a supersequence preserving the source
//! collection's relative order. Each confirmed match is recorded into the
//! mapping cache as it lands, independently durable with no run-wide
//! transaction, so an aborted run's partial progress stays valid.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::unbounded;
use log::{debug, warn};
use rustc_hash::FxHashMap;

use crate::cache::MappingCache;
use crate::error::SyncError;
use crate::index::TargetIndex;
use crate::models::{
    CacheEntry, Direction, EntityKind, MatchCandidate, MatchResult, NormalizedEntity, RawEntity,
    SyncAction, SyncDecision, SyncReport,
};
use crate::normalize::normalize_collection;
use crate::planner;
use crate::progress::{create_progress_bar, create_spinner};
use crate::scoring::{score, ScoreConfig};

/// Opaque search/list/write surface of one catalog. Adapters wrap the
/// platform client libraries; implementations must be callable from
/// multiple worker threads.
pub trait CatalogApi: Sync {
    /// Search the catalog for candidates resembling the query entity.
    /// May return zero or more candidates in no particular order.
    fn search(
        &self,
        kind: EntityKind,
        query: &NormalizedEntity,
    ) -> Result<Vec<MatchCandidate>, SyncError>;

    /// Full listing of the user's existing collection, fetched once per run
    /// to build the target index.
    fn list_all(&self, kind: EntityKind) -> Result<Vec<RawEntity>, SyncError>;

    /// Add an entity to the collection. `at_position` is honored by
    /// position-aware targets; `None` appends.
    fn add(
        &self,
        kind: EntityKind,
        target_id: &str,
        at_position: Option<usize>,
    ) -> Result<(), SyncError>;
}

#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    /// Bounded worker pool size for concurrent search calls.
    pub workers: usize,
    /// Match and report without performing writes.
    pub dry_run: bool,
    pub score: ScoreConfig,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig {
            workers: 4,
            dry_run: false,
            score: ScoreConfig::default(),
        }
    }
}

/// Runs plans against a target catalog, feeding confirmed matches back into
/// the mapping cache.
pub struct SyncExecutor<'a, C: CatalogApi> {
    catalog: &'a C,
    cache: &'a MappingCache,
    config: ExecutorConfig,
    cancelled: Arc<AtomicBool>,
}

impl<'a, C: CatalogApi> SyncExecutor<'a, C> {
    pub fn new(catalog: &'a C, cache: &'a MappingCache, config: ExecutorConfig) -> Self {
        SyncExecutor {
            catalog,
            cache,
            config,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for aborting the run between actions. Cache writes made
    /// before the abort remain valid.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Reconcile one collection end to end: normalize the source, index the
    /// target, plan, execute. The only fatal error is a failed target
    /// listing, since without it duplicate detection cannot be guaranteed.
    /// Per-entity failures land in the report and never abort the rest.
    pub fn sync_collection(
        &self,
        kind: EntityKind,
        source_raw: &[RawEntity],
        direction: Direction,
    ) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::default();

        let (source, malformed) = normalize_collection(kind, source_raw);
        for source_id in &malformed {
            debug!("skipping malformed source record {source_id}");
        }
        report.malformed = malformed;

        let spinner = create_spinner("Indexing target collection");
        let index = self.build_target_index(kind)?;
        spinner.finish_with_message(format!(
            "Indexed {} existing target {}s",
            index.len(),
            kind.as_str()
        ));

        let actions = planner::plan(&source, &index, self.cache, direction);
        self.execute(actions, &index, direction, &mut report);
        Ok(report)
    }

    /// Fetch and index the target collection. Malformed target records are
    /// dropped: they cannot collide with anything we could write.
    pub fn build_target_index(&self, kind: EntityKind) -> Result<TargetIndex, SyncError> {
        let raw = self
            .catalog
            .list_all(kind)
            .map_err(|e| SyncError::TargetListing(e.to_string()))?;
        let (entities, malformed) = normalize_collection(kind, &raw);
        if !malformed.is_empty() {
            debug!("dropped {} unparseable target records", malformed.len());
        }
        let candidates = entities
            .into_iter()
            .map(|entity| MatchCandidate {
                target_id: entity.source_id.clone(),
                entity,
            })
            .collect::<Vec<_>>();
        Ok(TargetIndex::build(kind, candidates))
    }

    /// Execute a plan. Searches fan out over the worker pool; writes are
    /// applied in `order_index` order regardless of completion order.
    pub fn execute(
        &self,
        actions: Vec<SyncAction>,
        index: &TargetIndex,
        direction: Direction,
        report: &mut SyncReport,
    ) {
        let kind = index.kind();
        let (work_tx, work_rx) = unbounded::<(usize, NormalizedEntity)>();
        let (result_tx, result_rx) = unbounded::<(usize, MatchResult)>();

        let mut searches = 0usize;
        for action in &actions {
            if action.decision == SyncDecision::SearchRequired {
                work_tx
                    .send((action.order_index, action.source.clone()))
                    .ok();
                searches += 1;
            }
        }
        drop(work_tx);

        let pb = create_progress_bar(actions.len() as u64, "Syncing");
        let workers = self.config.workers.max(1).min(searches.max(1));

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let work_rx = work_rx.clone();
                let result_tx = result_tx.clone();
                let cancelled = Arc::clone(&self.cancelled);
                let score_config = self.config.score.clone();
                let catalog = self.catalog;
                scope.spawn(move || {
                    while let Ok((order_index, entity)) = work_rx.recv() {
                        if cancelled.load(Ordering::Relaxed) {
                            break;
                        }
                        let result = match catalog.search(kind, &entity) {
                            Ok(candidates) => score(&entity, &candidates, &score_config),
                            Err(err) => {
                                warn!("search failed for {}: {err}", entity.source_id);
                                MatchResult::no_match(&entity.source_id)
                            }
                        };
                        result_tx.send((order_index, result)).ok();
                    }
                });
            }
            drop(result_tx);

            // Apply loop: strictly ascending order_index. Results that
            // arrive early wait in the buffer until it is their turn.
            let mut arrived: FxHashMap<usize, MatchResult> = FxHashMap::default();
            for action in &actions {
                if self.cancelled.load(Ordering::Relaxed) {
                    report.cancelled = true;
                    break;
                }
                match &action.decision {
                    SyncDecision::AlreadyPresent => {
                        report.already_present += 1;
                    }
                    SyncDecision::CachedMatch { target_id } => {
                        report.from_cache += 1;
                        if index.contains_target(target_id) {
                            report.already_present += 1;
                        } else {
                            self.apply_write(kind, target_id, report);
                        }
                    }
                    SyncDecision::SearchRequired => {
                        let result = loop {
                            if let Some(result) = arrived.remove(&action.order_index) {
                                break Some(result);
                            }
                            match result_rx.recv() {
                                Ok((order_index, result)) => {
                                    arrived.insert(order_index, result);
                                }
                                Err(_) => break None,
                            }
                        };
                        let Some(result) = result else {
                            // Workers exited early; only cancellation does that.
                            report.cancelled = true;
                            break;
                        };
                        match result.target_id {
                            Some(target_id) => {
                                self.cache.record(&CacheEntry::new(
                                    kind,
                                    direction,
                                    &action.source.source_id,
                                    &target_id,
                                ));
                                if index.contains_target(&target_id) {
                                    report.already_present += 1;
                                } else {
                                    self.apply_write(kind, &target_id, report);
                                }
                            }
                            None => report.unmatched.push(action.source.clone()),
                        }
                    }
                    SyncDecision::Unmatched => {
                        report.unmatched.push(action.source.clone());
                    }
                }
                pb.inc(1);
            }
        });

        pb.finish_with_message(format!(
            "Synced: {} written, {} present, {} unmatched",
            report.written,
            report.already_present,
            report.unmatched.len()
        ));
    }

    fn apply_write(&self, kind: EntityKind, target_id: &str, report: &mut SyncReport) {
        if self.config.dry_run {
            report.written += 1;
            return;
        }
        match self.catalog.add(kind, target_id, None) {
            Ok(()) => report.written += 1,
            Err(err) => {
                warn!("failed to add {} {target_id}: {err}", kind.as_str());
                report.failed_writes += 1;
            }
        }
    }
}
