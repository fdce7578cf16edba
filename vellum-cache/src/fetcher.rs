//! Read path: cache-through access to the Source.

use std::sync::Arc;

use vellum_core::{CacheResult, Document, Reference};

use crate::document_cache::DocumentCache;
use crate::source::Source;
use crate::views::DocumentView;

/// Wraps a [`Source`] with the document cache.
///
/// On a miss the Source is consulted (with no internal lock held) and
/// the result inserted; on a hit the cached entry is returned. The
/// canonical handle returned by [`DocumentCache::cache`] is always the
/// one handed back, so callers racing on the same id converge on a
/// single live document object.
pub struct CachingFetcher<S> {
    cache: Arc<DocumentCache>,
    source: Arc<S>,
}

impl<S> Clone for CachingFetcher<S> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            source: Arc::clone(&self.source),
        }
    }
}

impl<S: Source> CachingFetcher<S> {
    /// Create a fetcher over a shared cache and Source.
    pub fn new(cache: Arc<DocumentCache>, source: Arc<S>) -> Self {
        Self { cache, source }
    }

    /// The underlying cache.
    pub fn cache(&self) -> &Arc<DocumentCache> {
        &self.cache
    }

    /// The wrapped Source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Cached entry on hit; otherwise fetch, cache, and return the
    /// canonical handle (which may belong to a racing caller).
    pub async fn get_or_fetch(&self, reference: &Reference) -> CacheResult<Document> {
        if let Some(document) = self.cache.get(reference) {
            return Ok(document);
        }
        tracing::debug!(%reference, "cache miss, fetching from source");
        let fetched = self.source.fetch(reference).await?;
        Ok(self.cache.cache(fetched))
    }

    /// Force a full-content refresh of a cached document in place,
    /// preserving handle identity. Used by the dirty-checking read path.
    /// Behaves like [`get_or_fetch`] when the document is not cached.
    ///
    /// [`get_or_fetch`]: CachingFetcher::get_or_fetch
    pub async fn fetch_and_refresh(&self, reference: &Reference) -> CacheResult<Document> {
        let Some(cached) = self.cache.get(reference) else {
            return self.get_or_fetch(reference).await;
        };
        let lookup = cached
            .id()
            .map(Reference::ById)
            .unwrap_or_else(|| reference.clone());
        let fresh = self.source.fetch(&lookup).await?;
        cached.replace_state(fresh.state());
        Ok(cached)
    }

    /// Fetch the hierarchy root through the cache.
    pub async fn get_root(&self) -> CacheResult<Document> {
        let root = self.source.fetch_root().await?;
        Ok(self.cache.cache(root))
    }

    /// Fetch a named child of a container through the cache.
    pub async fn get_child(&self, parent: &Reference, name: &str) -> CacheResult<Document> {
        let child = self.source.fetch_child(parent, name).await?;
        Ok(self.cache.cache(child))
    }

    /// List a container's children.
    ///
    /// The list itself is never memoized; each element passes through
    /// the cache lazily as the returned view is traversed.
    pub async fn get_children(&self, parent: &Reference) -> CacheResult<DocumentView> {
        let children = self.source.fetch_children(parent).await?;
        Ok(DocumentView::new(Arc::clone(&self.cache), children))
    }

    /// Run a Source query; results pass through the cache on traversal.
    pub async fn query(&self, query: &str) -> CacheResult<DocumentView> {
        let results = self.source.query(query).await?;
        Ok(DocumentView::new(Arc::clone(&self.cache), results))
    }

    /// Fetch a container's children and start tracking them in the
    /// children cache, so the invalidation pipeline keeps the list
    /// synchronized from here on. Returns the canonical child handles.
    pub async fn track_children(&self, parent: &Reference) -> CacheResult<Vec<Document>> {
        let parent_doc = self.get_or_fetch(parent).await?;
        let children = self.source.fetch_children(parent).await?;
        let children: Vec<Document> = children
            .into_iter()
            .map(|child| self.cache.cache(child))
            .collect();
        if let Some(parent_id) = parent_doc.id() {
            let child_ids = children.iter().filter_map(Document::id).collect();
            self.cache.cache_children(parent_id, child_ids);
        }
        Ok(children)
    }
}

// =============================================================================
// TESTS
// =============================================================================
