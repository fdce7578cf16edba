//! VELLUM Cache - Client-side Document Cache
//!
//! A cache that sits between a caller and a remote, hierarchical,
//! versioned document store. It stays consistent as other threads and
//! processes mutate that store, and detects when a caller is about to
//! act on stale data.
//!
//! # Architecture
//!
//! - [`DocumentCache`]: dual-indexed (id + path) concurrent maps plus a
//!   children cache, pure data with no I/O.
//! - [`CachingFetcher`]: read path; wraps a [`Source`] and populates the
//!   cache on miss.
//! - [`DocumentView`]: lazy collection view that passes every listed
//!   element through the cache, so independent listings converge on
//!   identical document handles.
//! - [`InvalidationProcessor`]: write-side; consumes [`OperationEvent`]
//!   batches from the store's change feed, applies minimal cache
//!   surgery, and fans out [`CacheListener`] notifications.
//! - [`DirtyUpdateGuard`]: optimistic pre-flight check that rejects
//!   operations working from a provably stale snapshot.
//!
//! # Consistency model
//!
//! The id, path and children maps are each independently safe for
//! concurrent access; cross-map invariants are maintained best-effort.
//! A reader may transiently observe a path entry pointing at an id that
//! is no longer cached, and that always reads as a cache miss, never an
//! error. [`DocumentCache::flush`] is the only operation with a stronger
//! barrier (a generation counter drops pre-flush in-flight writes).
//!
//! [`OperationEvent`]: vellum_core::OperationEvent

pub mod config;
pub mod dirty;
pub mod document_cache;
pub mod fetcher;
pub mod invalidation;
pub mod listener;
pub mod source;
pub mod views;

pub use config::CacheConfig;
pub use dirty::{DirtyContext, DirtyUpdateGuard};
pub use document_cache::{CacheStats, DocumentCache};
pub use fetcher::CachingFetcher;
pub use invalidation::InvalidationProcessor;
pub use listener::CacheListener;
pub use source::Source;
pub use views::DocumentView;

// Re-export core types for convenience
pub use vellum_core::{
    CacheError, CacheResult, ConcurrencyConflict, Document, DocumentId, DocumentState,
    InvalidationBatchError, Modification, ModificationFailure, ModificationKind, OperationEvent,
    Reference, Timestamp, TreePath,
};
