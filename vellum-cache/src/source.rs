//! The remote store abstraction the cache wraps.

use async_trait::async_trait;

use vellum_core::{CacheResult, Document, Reference};

/// Fetch/query primitives of the authoritative remote store.
///
/// Any hierarchical store with stable ids and optional paths fits.
/// Calls may be slow (network); the cache never holds an internal lock
/// while a Source call is in flight, and imposes no timeout of its own:
/// a call either completes or raises a Source-defined error.
///
/// Implementations should return [`CacheError::NotFound`] when a
/// reference resolves to nothing and wrap everything else as
/// [`CacheError::Source`]; the cache surfaces both without retrying.
///
/// [`CacheError::NotFound`]: vellum_core::CacheError::NotFound
/// [`CacheError::Source`]: vellum_core::CacheError::Source
#[async_trait]
pub trait Source: Send + Sync {
    /// Resolve a reference to a document.
    async fn fetch(&self, reference: &Reference) -> CacheResult<Document>;

    /// Resolve a named child of a container.
    async fn fetch_child(&self, parent: &Reference, name: &str) -> CacheResult<Document>;

    /// List a container's children in store order.
    async fn fetch_children(&self, parent: &Reference) -> CacheResult<Vec<Document>>;

    /// The root of the hierarchy.
    async fn fetch_root(&self) -> CacheResult<Document>;

    /// Run a store-defined query, returning matching documents.
    async fn query(&self, query: &str) -> CacheResult<Vec<Document>>;
}
