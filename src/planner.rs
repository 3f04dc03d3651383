//! Sync planning: derive the ordered action list for one run.
//!
//! Pure function over supplied data: membership comes from the target
//! index, prior decisions from the mapping cache, and everything else is
//! deferred to the executor as a search. `order_index` carries each
//! entity's source position so writes can be applied deterministically even
//! when searches complete out of order.

use crate::cache::MappingCache;
use crate::index::TargetIndex;
use crate::models::{Direction, NormalizedEntity, SyncAction, SyncDecision};

/// Plan one direction of a sync. For each source entity, in source order:
/// present in the target index → `AlreadyPresent`; known mapping in the
/// cache → `CachedMatch`; otherwise `SearchRequired`.
pub fn plan(
    source: &[NormalizedEntity],
    target: &TargetIndex,
    cache: &MappingCache,
    direction: Direction,
) -> Vec<SyncAction> {
    source
        .iter()
        .enumerate()
        .map(|(order_index, entity)| {
            let decision = if target.lookup(entity).is_some() {
                SyncDecision::AlreadyPresent
            } else if let Some(target_id) =
                cache.lookup(entity.kind, direction, &entity.source_id)
            {
                SyncDecision::CachedMatch { target_id }
            } else {
                SyncDecision::SearchRequired
            };
            SyncAction {
                source: entity.clone(),
                decision,
                order_index,
            }
        })
        .collect()
}
