//! Write side: applies remote modification batches to the cache.
//!
//! The processor consumes one [`OperationEvent`] at a time, in delivery
//! order; within an event, modifications are applied in the order
//! supplied. It performs the minimal cache surgery needed to keep the
//! cache consistent and fans out `documents_changed` /
//! `subtree_changed` notifications to registered listeners.
//!
//! A failure while applying one modification never aborts the rest of
//! the event: failures are accumulated (with the cached document
//! snapshot when available) and surfaced as one
//! [`InvalidationBatchError`] after the whole batch was attempted, so
//! diagnostics always show the complete picture.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;

use vellum_core::{
    CacheResult, DocumentId, InvalidationBatchError, Modification, ModificationFailure,
    ModificationKind, OperationEvent, Reference,
};

use crate::config::CacheConfig;
use crate::document_cache::DocumentCache;
use crate::listener::CacheListener;
use crate::source::Source;

/// Per-event working state.
#[derive(Default)]
struct EventContext {
    /// Reference left by the latest Created/Removed record, consumed by
    /// a subsequent child modification in the same event.
    pending_child: Option<Reference>,
    /// Documents already refreshed during this event; a second update
    /// for the same id within one event is a no-op.
    refreshed: HashSet<DocumentId>,
    /// Cached documents whose content changed, in first-touch order.
    updated: Vec<DocumentId>,
    /// Containers whose child lists changed, in first-touch order.
    subtrees: Vec<DocumentId>,
    /// Modifications that failed to apply.
    failures: Vec<ModificationFailure>,
}

fn push_unique(ids: &mut Vec<DocumentId>, id: DocumentId) {
    if !ids.contains(&id) {
        ids.push(id);
    }
}

/// Keeps a [`DocumentCache`] synchronized with the remote store's
/// change feed.
///
/// Owns no threads: [`process_event`] runs on whatever task delivers
/// the event, and [`run`] drains a channel the surrounding system feeds
/// from its dispatch thread. Urgent events can bypass the channel by
/// calling [`process_event`] directly.
///
/// [`process_event`]: InvalidationProcessor::process_event
/// [`run`]: InvalidationProcessor::run
pub struct InvalidationProcessor<S> {
    cache: Arc<DocumentCache>,
    source: Arc<S>,
    config: CacheConfig,
    listeners: RwLock<Vec<Arc<dyn CacheListener>>>,
}

impl<S: Source> InvalidationProcessor<S> {
    /// Create a processor over a shared cache and Source.
    pub fn new(cache: Arc<DocumentCache>, source: Arc<S>, config: CacheConfig) -> Self {
        Self {
            cache,
            source,
            config,
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Create a processor with default configuration.
    pub fn with_defaults(cache: Arc<DocumentCache>, source: Arc<S>) -> Self {
        Self::new(cache, source, CacheConfig::default())
    }

    /// The processor configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Register a listener for change notifications.
    pub fn register_listener(&self, listener: Arc<dyn CacheListener>) {
        self.listeners.write().unwrap().push(listener);
    }

    /// Remove a previously registered listener (by pointer identity).
    pub fn unregister_listener(&self, listener: &Arc<dyn CacheListener>) {
        self.listeners
            .write()
            .unwrap()
            .retain(|registered| !Arc::ptr_eq(registered, listener));
    }

    /// Build an event channel sized by the configuration, for wiring
    /// the store's change feed to [`run`].
    ///
    /// [`run`]: InvalidationProcessor::run
    pub fn channel(&self) -> (mpsc::Sender<OperationEvent>, mpsc::Receiver<OperationEvent>) {
        mpsc::channel(self.config.event_queue_capacity)
    }

    /// Drain the event channel, applying events in delivery order.
    ///
    /// A partially failed batch is logged and never stops the loop; the
    /// next event is still processed. Returns when the channel closes.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<OperationEvent>) {
        while let Some(event) = events.recv().await {
            if let Err(error) = self.process_event(&event).await {
                tracing::error!(%error, "invalidation event batch partially failed");
            }
        }
    }

    /// Apply one event's modifications in order, then notify listeners.
    ///
    /// Errors from individual modifications are accumulated and raised
    /// together only after the whole batch was attempted.
    pub async fn process_event(
        &self,
        event: &OperationEvent,
    ) -> Result<(), InvalidationBatchError> {
        let mut ctx = EventContext::default();
        for modification in &event.modifications {
            if let Err(error) = self.apply(modification, &mut ctx).await {
                let snapshot = self
                    .cache
                    .get(&modification.target)
                    .map(|document| document.state());
                tracing::warn!(
                    %error,
                    target = %modification.target,
                    kind = ?modification.kind,
                    "modification failed to apply, continuing with batch"
                );
                ctx.failures.push(ModificationFailure {
                    modification: modification.clone(),
                    snapshot,
                    error,
                });
            }
        }
        self.notify(&ctx, event.urgent);
        if ctx.failures.is_empty() {
            Ok(())
        } else {
            Err(InvalidationBatchError {
                event: event.clone(),
                failures: ctx.failures,
            })
        }
    }

    async fn apply(&self, modification: &Modification, ctx: &mut EventContext) -> CacheResult<()> {
        let target = &modification.target;
        match modification.kind {
            ModificationKind::Created => {
                // Nothing cached to invalidate; remember the reference
                // for a possible add-child later in this event.
                ctx.pending_child = Some(target.clone());
                Ok(())
            }
            ModificationKind::Removed => {
                match self.cache.uncache(target) {
                    Some(removed) => {
                        // Prefer the id over the (possibly stale) path so
                        // a following remove-child can still resolve it.
                        if let Some(id) = removed.id() {
                            self.cache.uncache_children(id);
                            ctx.pending_child = Some(Reference::ById(id));
                        } else {
                            ctx.pending_child = Some(target.clone());
                        }
                    }
                    None => {
                        if let Some(id) = target.id() {
                            self.cache.uncache_children(id);
                        }
                        ctx.pending_child = Some(target.clone());
                    }
                }
                Ok(())
            }
            ModificationKind::Updated => self.apply_update(target, ctx).await,
            ModificationKind::ChildAdded => self.apply_child_added(target, ctx).await,
            ModificationKind::ChildRemoved => {
                let Some(parent_id) = self.cached_id(target) else {
                    return Ok(());
                };
                push_unique(&mut ctx.subtrees, parent_id);
                match ctx.pending_child.take() {
                    Some(child_ref) => {
                        let child_id = child_ref
                            .id()
                            .or_else(|| self.cache.get(&child_ref).and_then(|d| d.id()));
                        self.cache.uncache(&child_ref);
                        if let Some(child_id) = child_id {
                            self.cache.uncache_child(parent_id, child_id);
                        } else {
                            // No way to name the child in the tracked
                            // list; drop the whole list instead.
                            self.cache.uncache_children(parent_id);
                        }
                    }
                    None => {
                        self.cache.uncache_children(parent_id);
                    }
                }
                Ok(())
            }
            ModificationKind::ChildrenReordered => {
                let Some(parent_id) = self.cached_id(target) else {
                    return Ok(());
                };
                // Conservative invalidation: force a full re-fetch of
                // the list on next access.
                if self.cache.uncache_children(parent_id).is_some() {
                    push_unique(&mut ctx.subtrees, parent_id);
                }
                Ok(())
            }
        }
    }

    /// Refresh (or evict, per configuration) a cached document whose
    /// content changed remotely.
    async fn apply_update(&self, target: &Reference, ctx: &mut EventContext) -> CacheResult<()> {
        let Some(document) = self.cache.get(target) else {
            // Never cached: nothing to invalidate.
            return Ok(());
        };
        let Some(id) = document.id() else {
            return Ok(());
        };
        if ctx.refreshed.contains(&id) {
            return Ok(());
        }
        if self.config.refresh_on_update {
            let fresh = self.source.fetch(&Reference::ById(id)).await?;
            document.replace_state(fresh.state());
        } else {
            self.cache.uncache(&Reference::ById(id));
        }
        ctx.refreshed.insert(id);
        push_unique(&mut ctx.updated, id);
        Ok(())
    }

    /// Reconcile a tracked parent with a newly added child.
    async fn apply_child_added(
        &self,
        target: &Reference,
        ctx: &mut EventContext,
    ) -> CacheResult<()> {
        let Some(parent) = self.cache.get(target) else {
            return Ok(());
        };
        let Some(parent_id) = parent.id() else {
            return Ok(());
        };
        // Parents whose children were never cached are never touched.
        if !self.cache.has_children_cached(parent_id) {
            return Ok(());
        }
        push_unique(&mut ctx.subtrees, parent_id);

        let Some(child_ref) = ctx.pending_child.take() else {
            // No specific child reference: conservative invalidation.
            self.cache.uncache_children(parent_id);
            return Ok(());
        };
        let child = match self.source.fetch(&child_ref).await {
            Ok(child) => child,
            Err(error) => {
                // Cheap reconciliation failed; fall back to a full
                // re-fetch on next access before surfacing the error.
                self.cache.uncache_children(parent_id);
                return Err(error);
            }
        };
        let child = self.cache.cache(child);
        // An add-child racing a subsequent move can name a child that no
        // longer lives under this parent; only link it when its resolved
        // parent actually matches.
        let resolved_parent = child.path().and_then(|path| path.parent());
        if resolved_parent.is_some() && resolved_parent == parent.path() {
            if let Some(child_id) = child.id() {
                self.cache.cache_child(parent_id, child_id);
            }
        }
        Ok(())
    }

    fn cached_id(&self, target: &Reference) -> Option<DocumentId> {
        self.cache.get(target).and_then(|document| document.id())
    }

    /// Fan out end-of-event notifications; a failing listener is logged
    /// and never blocks the others.
    fn notify(&self, ctx: &EventContext, urgent: bool) {
        if ctx.updated.is_empty() && ctx.subtrees.is_empty() {
            return;
        }
        let listeners = self.listeners.read().unwrap().clone();
        for listener in listeners {
            if !ctx.updated.is_empty() {
                if let Err(error) = listener.documents_changed(&ctx.updated, urgent) {
                    tracing::warn!(%error, "listener failed on documents_changed");
                }
            }
            if !ctx.subtrees.is_empty() {
                if let Err(error) = listener.subtree_changed(&ctx.subtrees, urgent) {
                    tracing::warn!(%error, "listener failed on subtree_changed");
                }
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
