//! Error types for VELLUM cache operations.

use thiserror::Error;

use crate::document::{DocumentState, Reference};
use crate::event::{Modification, OperationEvent};
use crate::{DocumentId, Timestamp};

/// A write was attempted against a cache snapshot that is provably
/// older than the document's current state.
///
/// This is an optimistic check only: nothing is locked and the write is
/// not prevented, the conflict is surfaced so a retry-with-reread
/// strategy can be layered above.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error(
    "Concurrent modification of document {id}: cache snapshot {snapshot_time}, \
     operation started {started_at}, document modified {modified_at}"
)]
pub struct ConcurrencyConflict {
    /// The document about to be acted on.
    pub id: DocumentId,
    /// Timestamp the caller's data was read from.
    pub snapshot_time: Timestamp,
    /// Wall-clock time the current operation began.
    pub started_at: Timestamp,
    /// Last-modification time of the document as known by the store.
    pub modified_at: Timestamp,
}

/// A single modification that failed to apply, with context for
/// diagnostics.
#[derive(Debug, Clone)]
pub struct ModificationFailure {
    /// The offending modification.
    pub modification: Modification,
    /// Snapshot of the cached document at failure time, if it was cached.
    pub snapshot: Option<DocumentState>,
    /// The underlying failure.
    pub error: CacheError,
}

/// One or more modifications in a delivered event failed to apply.
///
/// All other modifications in the event were still attempted; the error
/// carries the full batch so diagnostics show the complete picture. It
/// must never crash the event-delivery loop.
#[derive(Debug, Clone, Error)]
#[error(
    "{} of {} modifications failed to apply in event batch",
    .failures.len(),
    .event.modifications.len()
)]
pub struct InvalidationBatchError {
    /// The event that was being processed.
    pub event: OperationEvent,
    /// The modifications that failed, in processing order.
    pub failures: Vec<ModificationFailure>,
}

/// Master error type for cache operations.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The reference resolves to nothing in the remote store. Surfaced
    /// to the caller, never retried by the cache.
    #[error("Document not found: {reference}")]
    NotFound {
        /// The reference that failed to resolve.
        reference: Reference,
    },

    /// The Source failed during a fetch or refresh. Surfaced, not
    /// retried, and never cached.
    #[error("Source failure during {operation}: {reason}")]
    Source {
        /// The fetch/refresh operation that was in flight.
        operation: String,
        /// Source-defined failure description.
        reason: String,
    },

    /// Optimistic concurrency check failed.
    #[error(transparent)]
    Conflict(#[from] ConcurrencyConflict),

    /// A delivered event batch partially failed to apply.
    #[error(transparent)]
    InvalidationBatch(#[from] InvalidationBatchError),
}

impl CacheError {
    /// Build a Source error from a failing operation name and cause.
    pub fn source(operation: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Source {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this is the distinct, catchable concurrency kind.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Whether the reference simply resolved to nothing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

// =============================================================================
// TESTS
// =============================================================================
