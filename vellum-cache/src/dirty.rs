//! Optimistic dirty-update detection.
//!
//! A per-operation context records the timestamp the caller's data was
//! read from ("as of") and when the operation began. Before a mutation
//! is attempted, [`DirtyUpdateGuard::check`] compares those against the
//! document's last-modification time and rejects the operation if the
//! document changed underneath the snapshot. Nothing is locked and the
//! underlying write is not prevented; this only surfaces the conflict
//! early, as a distinct error kind a retry-with-reread strategy can
//! catch.
//!
//! The context is an explicit value threaded through the operation's
//! call chain rather than hidden thread-local state, so it carries no
//! thread affinity.

use chrono::Utc;

use vellum_core::{CacheResult, ConcurrencyConflict, Document, Timestamp};

/// Operation-scoped dirty-update context. Never shared across
/// operations; created per logical operation and discarded at its end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyContext {
    snapshot_time: Timestamp,
    started_at: Timestamp,
}

impl DirtyContext {
    /// Begin a context for an operation working from data read as of
    /// `snapshot_time`. The operation start is stamped now.
    pub fn begin(snapshot_time: Timestamp) -> Self {
        Self {
            snapshot_time,
            started_at: Utc::now(),
        }
    }

    /// Begin with an explicit operation start, for deterministic tests
    /// and for callers that stamp the start themselves.
    pub fn begin_at(snapshot_time: Timestamp, started_at: Timestamp) -> Self {
        Self {
            snapshot_time,
            started_at,
        }
    }

    /// The timestamp the caller's data was read from.
    pub fn snapshot_time(&self) -> Timestamp {
        self.snapshot_time
    }

    /// When the current operation began.
    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    /// Merge another snapshot into this context, keeping the later of
    /// the two snapshot times.
    ///
    /// The timestamp resolution of the store is coarser than ideal:
    /// concurrent writes within the same clock tick are a known
    /// ambiguity this rule does not resolve.
    pub fn merge_snapshot(&mut self, snapshot_time: Timestamp) {
        if snapshot_time > self.snapshot_time {
            self.snapshot_time = snapshot_time;
        }
    }

    /// Check a document about to be acted on.
    ///
    /// Passes when the snapshot is at least as fresh as the document,
    /// or when the modification happened at or after the operation
    /// started (a self-modification is not a conflict). Drafts and
    /// documents without a known modification time always pass.
    pub fn check(&self, document: &Document) -> CacheResult<()> {
        let Some(id) = document.id() else {
            return Ok(());
        };
        let Some(modified_at) = document.modified_at() else {
            return Ok(());
        };
        if self.snapshot_time >= modified_at {
            return Ok(());
        }
        if self.started_at <= modified_at {
            return Ok(());
        }
        Err(ConcurrencyConflict {
            id,
            snapshot_time: self.snapshot_time,
            started_at: self.started_at,
            modified_at,
        }
        .into())
    }
}

/// Holder for the optional per-operation [`DirtyContext`].
///
/// Outside a guarded operation (no context installed) every check is a
/// no-op. `end` removes the context; dropping the guard discards it
/// too, so the context cannot leak across operations on error paths.
#[derive(Debug, Default)]
pub struct DirtyUpdateGuard {
    context: Option<DirtyContext>,
}

impl DirtyUpdateGuard {
    /// Create a guard with no context installed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a context with the given snapshot time, starting now.
    pub fn begin(&mut self, snapshot_time: Timestamp) {
        self.context = Some(DirtyContext::begin(snapshot_time));
    }

    /// Install a fully explicit context.
    pub fn begin_at(&mut self, snapshot_time: Timestamp, started_at: Timestamp) {
        self.context = Some(DirtyContext::begin_at(snapshot_time, started_at));
    }

    /// Remove and return the installed context, if any.
    pub fn end(&mut self) -> Option<DirtyContext> {
        self.context.take()
    }

    /// The installed context, if any.
    pub fn context(&self) -> Option<&DirtyContext> {
        self.context.as_ref()
    }

    /// Whether a guarded operation is in progress.
    pub fn is_active(&self) -> bool {
        self.context.is_some()
    }

    /// Merge a later snapshot into the installed context, if any.
    pub fn merge_snapshot(&mut self, snapshot_time: Timestamp) {
        if let Some(context) = self.context.as_mut() {
            context.merge_snapshot(snapshot_time);
        }
    }

    /// Check a document against the installed context; no-op when no
    /// context is installed.
    pub fn check(&self, document: &Document) -> CacheResult<()> {
        match &self.context {
            Some(context) => context.check(document),
            None => Ok(()),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;
    use vellum_core::{CacheError, DocumentState};

    fn doc_modified_at(at: Timestamp) -> Document {
        Document::new(Uuid::now_v7(), DocumentState::new().with_modified_at(at))
    }

    #[test]
    fn test_fresh_snapshot_passes() {
        let t0 = Utc::now();
        let document = doc_modified_at(t0);

        let mut guard = DirtyUpdateGuard::new();
        guard.begin(t0);
        assert!(guard.check(&document).is_ok());
    }

    #[test]
    fn test_stale_snapshot_conflicts() {
        let t0 = Utc::now();
        let t1 = t0 + Duration::seconds(2);
        let started = t0 + Duration::seconds(10);
        let document = doc_modified_at(t1);

        let mut guard = DirtyUpdateGuard::new();
        guard.begin_at(t0, started);
        let err = guard.check(&document).unwrap_err();
        assert!(err.is_conflict());
        match err {
            CacheError::Conflict(conflict) => {
                assert_eq!(conflict.id, document.id().unwrap());
                assert_eq!(conflict.snapshot_time, t0);
                assert_eq!(conflict.started_at, started);
                assert_eq!(conflict.modified_at, t1);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_self_modification_passes() {
        let t0 = Utc::now();
        let started = t0 + Duration::seconds(1);
        let modified = t0 + Duration::seconds(5);
        let document = doc_modified_at(modified);

        // The modification postdates the operation start, so it was made
        // by the very operation now checking.
        let mut guard = DirtyUpdateGuard::new();
        guard.begin_at(t0, started);
        assert!(guard.check(&document).is_ok());
    }

    #[test]
    fn test_no_context_is_noop() {
        let guard = DirtyUpdateGuard::new();
        let document = doc_modified_at(Utc::now() + Duration::seconds(60));
        assert!(!guard.is_active());
        assert!(guard.check(&document).is_ok());
    }

    #[test]
    fn test_unknown_modification_time_passes() {
        let t0 = Utc::now();
        let mut guard = DirtyUpdateGuard::new();
        guard.begin_at(t0 - Duration::seconds(60), t0);

        let no_timestamp = Document::new(Uuid::now_v7(), DocumentState::new());
        assert!(guard.check(&no_timestamp).is_ok());

        let draft = Document::draft(DocumentState::new().with_modified_at(t0));
        assert!(guard.check(&draft).is_ok());
    }

    #[test]
    fn test_end_removes_context() {
        let t0 = Utc::now();
        let mut guard = DirtyUpdateGuard::new();
        guard.begin(t0);
        assert!(guard.is_active());

        let context = guard.end().unwrap();
        assert_eq!(context.snapshot_time(), t0);
        assert!(!guard.is_active());
        assert!(guard.end().is_none());
    }

    #[test]
    fn test_merge_keeps_later_snapshot() {
        let t0 = Utc::now();
        let later = t0 + Duration::seconds(3);

        let mut context = DirtyContext::begin_at(t0, t0);
        context.merge_snapshot(later);
        assert_eq!(context.snapshot_time(), later);

        // Merging an earlier snapshot is a no-op.
        context.merge_snapshot(t0);
        assert_eq!(context.snapshot_time(), later);
    }

    #[test]
    fn test_merged_snapshot_defuses_conflict() {
        let t0 = Utc::now();
        let t1 = t0 + Duration::seconds(2);
        let started = t0 + Duration::seconds(10);
        let document = doc_modified_at(t1);

        let mut guard = DirtyUpdateGuard::new();
        guard.begin_at(t0, started);
        assert!(guard.check(&document).is_err());

        guard.merge_snapshot(t1);
        assert!(guard.check(&document).is_ok());
    }
}
