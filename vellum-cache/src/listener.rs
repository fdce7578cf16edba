//! Listener callbacks for cache change notifications.

use vellum_core::{CacheResult, DocumentId};

/// Receives higher-level change notifications from the invalidation
/// pipeline.
///
/// Listeners are invoked at the end of each processed event, after the
/// cache surgery for that event is complete. A failing listener is
/// logged and must not prevent other listeners from being notified, nor
/// abort processing of subsequent events.
pub trait CacheListener: Send + Sync {
    /// Cached documents whose content changed during the event.
    fn documents_changed(&self, ids: &[DocumentId], urgent: bool) -> CacheResult<()>;

    /// Containers whose child lists changed during the event.
    fn subtree_changed(&self, ids: &[DocumentId], urgent: bool) -> CacheResult<()>;
}
