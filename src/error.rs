//! Error types for the reconciliation engine.

use thiserror::Error;

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors surfaced by the reconciliation engine.
///
/// Per-entity failures (`MalformedEntity`, `Catalog`) are isolated by the
/// executor and collected into the run report; only `TargetListing` aborts
/// a run, since without the target collection duplicate detection cannot be
/// guaranteed. A scorer returning no match is a normal outcome, not an error.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The raw record carries neither a name nor an ISRC; nothing to match on.
    #[error("entity {source_id:?} has neither a name nor an ISRC")]
    MalformedEntity { source_id: String },

    /// The target collection could not be listed. Fatal for the run.
    #[error("failed to list the target collection: {0}")]
    TargetListing(String),

    /// A catalog adapter call (search or write) failed.
    #[error("catalog request failed: {0}")]
    Catalog(String),
}
