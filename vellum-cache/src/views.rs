//! Lazy collection views over Source result lists.

use std::sync::Arc;

use vellum_core::Document;

use crate::document_cache::DocumentCache;

/// A lazy view over a list of documents returned by the Source.
///
/// Every element passes through [`DocumentCache::cache`] as it is
/// yielded, so any collection traversal populates and dedupes against
/// the same cache: two independent listings of the same parent converge
/// on reference-identical [`Document`] handles for matching ids without
/// the listing itself being memoized.
pub struct DocumentView {
    cache: Arc<DocumentCache>,
    items: std::vec::IntoIter<Document>,
}

impl DocumentView {
    /// Wrap raw Source results in a caching view.
    pub fn new(cache: Arc<DocumentCache>, documents: Vec<Document>) -> Self {
        Self {
            cache,
            items: documents.into_iter(),
        }
    }

    /// Elements not yet yielded.
    pub fn remaining(&self) -> usize {
        self.items.len()
    }

    /// Drain the view, caching every element.
    pub fn into_cached_vec(self) -> Vec<Document> {
        self.collect()
    }
}

impl Iterator for DocumentView {
    type Item = Document;

    fn next(&mut self) -> Option<Document> {
        self.items.next().map(|document| self.cache.cache(document))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.items.size_hint()
    }
}

impl ExactSizeIterator for DocumentView {}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use vellum_core::{DocumentState, Reference, TreePath};

    fn raw(id: Uuid, path: &str) -> Document {
        Document::new(id, DocumentState::new().with_path(TreePath::new(path)))
    }

    #[test]
    fn test_elements_cache_lazily_on_traversal() {
        let cache = Arc::new(DocumentCache::new());
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        let mut view = DocumentView::new(
            Arc::clone(&cache),
            vec![raw(a, "/a"), raw(b, "/b")],
        );

        assert!(cache.is_empty());
        assert_eq!(view.remaining(), 2);

        let first = view.next().unwrap();
        assert_eq!(first.id(), Some(a));
        assert_eq!(cache.len(), 1);
        assert_eq!(view.remaining(), 1);

        let second = view.next().unwrap();
        assert_eq!(second.id(), Some(b));
        assert_eq!(cache.len(), 2);
        assert!(view.next().is_none());
    }

    #[test]
    fn test_two_views_converge_on_cached_handles() {
        let cache = Arc::new(DocumentCache::new());
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());

        // Independent listings, as a remote store would return them:
        // fresh handles every time, same ids.
        let first: Vec<Document> =
            DocumentView::new(Arc::clone(&cache), vec![raw(a, "/a"), raw(b, "/b")])
                .into_cached_vec();
        let second: Vec<Document> =
            DocumentView::new(Arc::clone(&cache), vec![raw(a, "/a"), raw(b, "/b")])
                .into_cached_vec();

        for (x, y) in first.iter().zip(second.iter()) {
            assert_eq!(x.id(), y.id());
            assert!(x.same_instance(y));
        }
    }

    #[test]
    fn test_view_yields_canonical_handle_over_duplicate() {
        let cache = Arc::new(DocumentCache::new());
        let id = Uuid::now_v7();
        let canonical = cache.cache(raw(id, "/a"));

        let duplicate = raw(id, "/a");
        let yielded = DocumentView::new(Arc::clone(&cache), vec![duplicate])
            .next()
            .unwrap();
        assert!(yielded.same_instance(&canonical));
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&Reference::ById(id)).unwrap().same_instance(&canonical));
    }

    #[test]
    fn test_drafts_pass_through_unchanged() {
        let cache = Arc::new(DocumentCache::new());
        let draft = Document::draft(DocumentState::new());
        let yielded = DocumentView::new(Arc::clone(&cache), vec![draft.clone()])
            .next()
            .unwrap();
        assert!(yielded.same_instance(&draft));
        assert!(cache.is_empty());
    }
}
