//! VELLUM Core - Document Model Types
//!
//! Pure data structures shared by the cache and its collaborators.
//! This crate contains the document model (documents, paths, references),
//! the remote modification records the invalidation pipeline consumes,
//! and the error taxonomy. No I/O and no caching behavior lives here.

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub mod document;
pub mod error;
pub mod event;

pub use document::{Document, DocumentState, Reference, TreePath};
pub use error::{
    CacheError, CacheResult, ConcurrencyConflict, InvalidationBatchError, ModificationFailure,
};
pub use event::{Modification, ModificationKind, OperationEvent};

/// Stable document identifier, assigned by the remote store.
///
/// Never reused for a different document while the document exists.
/// Tests use `Uuid::now_v7()` so generated ids sort by creation time.
pub type DocumentId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new UUIDv7 DocumentId (timestamp-sortable).
pub fn new_document_id() -> DocumentId {
    Uuid::now_v7()
}
