//! Dual-indexed concurrent document cache.
//!
//! Two concurrent mappings (id -> document, path -> id) plus a children
//! cache keyed by parent id. Pure data and accessors; no I/O ever
//! happens here. The id, path and children maps are each independently
//! safe for concurrent access; cross-map invariants are best-effort and
//! a transient mismatch always reads as a cache miss.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use vellum_core::{Document, DocumentId, Reference, TreePath};

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of documents currently cached by id.
    pub documents: u64,
    /// Number of path entries currently held.
    pub paths: u64,
    /// Number of parents whose children are being tracked.
    pub tracked_parents: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// A cached document tagged with the flush generation it was inserted
/// under. Late-arriving inserts from before a flush are dropped rather
/// than resurrected.
struct CachedSlot {
    document: Document,
    generation: u64,
}

/// The client-side document cache.
///
/// One instance is owned by whatever connection/session object
/// represents a single client's view of the remote store, and is shared
/// (by `Arc`) with the [`CachingFetcher`] on the read path and the
/// [`InvalidationProcessor`] on the write path. There is no process-wide
/// singleton.
///
/// # Contract
///
/// - Drafts (documents with no id) are never cached: [`cache`] returns
///   them unchanged.
/// - At most one live document handle per id: caching an id that is
///   already present returns the *existing* handle and discards the new
///   one. Callers must use the returned value.
/// - A path entry pointing at an id that is no longer cached is a miss,
///   never an error.
///
/// [`cache`]: DocumentCache::cache
/// [`CachingFetcher`]: crate::CachingFetcher
/// [`InvalidationProcessor`]: crate::InvalidationProcessor
#[derive(Default)]
pub struct DocumentCache {
    by_id: DashMap<DocumentId, CachedSlot>,
    by_path: DashMap<TreePath, DocumentId>,
    children: DashMap<DocumentId, Vec<DocumentId>>,
    /// Bumped by flush; entries tagged with an older generation are
    /// dead on arrival.
    generation: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DocumentCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a document, returning the canonical cached handle.
    ///
    /// If the document has no id it is returned unchanged and nothing is
    /// inserted. Otherwise this is an atomic insert-if-absent: when
    /// another thread cached the same id first, that thread's handle is
    /// returned and `document` is discarded (first writer wins). On a
    /// successful first insert the document's path, if any, is recorded
    /// in the path index.
    pub fn cache(&self, document: Document) -> Document {
        let generation = self.generation.load(Ordering::Acquire);
        self.cache_at_generation(document, generation)
    }

    fn cache_at_generation(&self, document: Document, generation: u64) -> Document {
        let Some(id) = document.id() else {
            return document;
        };
        let path = document.path();
        let (canonical, inserted) = match self.by_id.entry(id) {
            Entry::Occupied(slot) => (slot.get().document.clone(), false),
            Entry::Vacant(slot) => {
                slot.insert(CachedSlot {
                    document: document.clone(),
                    generation,
                });
                (document, true)
            }
        };
        if inserted {
            if let Some(path) = path.clone() {
                self.by_path.insert(path, id);
            }
            // A flush that raced this insert wins: drop our own entry so
            // a caller that saw the empty cache never sees it reappear.
            if self.generation.load(Ordering::Acquire) != generation {
                self.by_id
                    .remove_if(&id, |_, slot| slot.generation == generation);
                if let Some(path) = path {
                    self.by_path.remove_if(&path, |_, mapped| *mapped == id);
                }
            }
        }
        canonical
    }

    /// Pure lookup; no Source access, no mutation.
    pub fn get(&self, reference: &Reference) -> Option<Document> {
        let found = match reference {
            Reference::ById(id) => self.by_id.get(id).map(|slot| slot.document.clone()),
            Reference::ByPath(path) => {
                // Copy the id out so no path-map guard is held while the
                // id map is locked.
                let id = self.by_path.get(path).map(|mapped| *mapped);
                id.and_then(|id| self.by_id.get(&id).map(|slot| slot.document.clone()))
            }
        };
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Remove a document, returning it if it was cached.
    ///
    /// Path-index cleanup is best-effort: only entries still pointing at
    /// the removed id are dropped, a mismatch is not an error.
    pub fn uncache(&self, reference: &Reference) -> Option<Document> {
        let id = match reference {
            Reference::ById(id) => Some(*id),
            Reference::ByPath(path) => self.by_path.get(path).map(|mapped| *mapped),
        }?;
        let removed = self.by_id.remove(&id).map(|(_, slot)| slot.document);
        if let Some(removed) = &removed {
            if let Some(path) = removed.path() {
                self.by_path.remove_if(&path, |_, mapped| *mapped == id);
            }
        }
        // The lookup path may be stale (document moved since it was
        // recorded); drop it regardless so it cannot shadow the id.
        if let Reference::ByPath(path) = reference {
            self.by_path.remove_if(path, |_, mapped| *mapped == id);
        }
        removed
    }

    /// Clear every index.
    ///
    /// Safe to call concurrently with ongoing [`cache`]/[`uncache`]
    /// calls: the generation bump happens first, so an in-flight write
    /// that started before the flush is dropped rather than resurrected.
    ///
    /// [`cache`]: DocumentCache::cache
    /// [`uncache`]: DocumentCache::uncache
    pub fn flush(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.by_id.clear();
        self.by_path.clear();
        self.children.clear();
    }

    /// Number of documents cached by id.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether the id index is empty.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    // ------------------------------------------------------------------
    // Children cache
    // ------------------------------------------------------------------

    /// Start tracking a parent's children as the given ordered id list.
    ///
    /// Presence of this entry is what makes the invalidation pipeline
    /// keep the parent's children synchronized; parents never tracked
    /// here are never touched by child events.
    pub fn cache_children(&self, parent: DocumentId, children: Vec<DocumentId>) {
        self.children.insert(parent, children);
    }

    /// Stop tracking a parent's children, returning the tracked list.
    pub fn uncache_children(&self, parent: DocumentId) -> Option<Vec<DocumentId>> {
        self.children.remove(&parent).map(|(_, children)| children)
    }

    /// The tracked ordered child ids, if the parent is tracked.
    pub fn get_children(&self, parent: DocumentId) -> Option<Vec<DocumentId>> {
        self.children.get(&parent).map(|children| children.clone())
    }

    /// Whether the parent's children are being tracked.
    pub fn has_children_cached(&self, parent: DocumentId) -> bool {
        self.children.contains_key(&parent)
    }

    /// Append a child to a tracked parent. No-op if the parent is not
    /// tracked or the child is already listed.
    pub fn cache_child(&self, parent: DocumentId, child: DocumentId) {
        if let Some(mut children) = self.children.get_mut(&parent) {
            if !children.contains(&child) {
                children.push(child);
            }
        }
    }

    /// Remove a child from a tracked parent. No-op if the parent is not
    /// tracked.
    pub fn uncache_child(&self, parent: DocumentId, child: DocumentId) {
        if let Some(mut children) = self.children.get_mut(&parent) {
            children.retain(|c| *c != child);
        }
    }

    /// Snapshot of cache usage counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            documents: self.by_id.len() as u64,
            paths: self.by_path.len() as u64,
            tracked_parents: self.children.len() as u64,
        }
    }
}

impl std::fmt::Debug for DocumentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentCache")
            .field("documents", &self.by_id.len())
            .field("paths", &self.by_path.len())
            .field("tracked_parents", &self.children.len())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
