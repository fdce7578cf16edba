//! End-to-end flow: read path, invalidation, and dirty-update checks
//! wired together over one shared cache, the way a connection/session
//! object would assemble them.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use vellum_cache::{
    CacheError, CacheResult, CachingFetcher, DirtyUpdateGuard, Document, DocumentCache,
    DocumentId, DocumentState, InvalidationProcessor, Modification, ModificationKind,
    OperationEvent, Reference, Source, TreePath,
};

/// In-memory hierarchical store standing in for the remote repository.
#[derive(Default)]
struct InMemoryStore {
    documents: RwLock<HashMap<DocumentId, DocumentState>>,
}

impl InMemoryStore {
    fn insert(&self, state: DocumentState) -> DocumentId {
        let id = Uuid::now_v7();
        self.documents.write().unwrap().insert(id, state);
        id
    }

    fn update(&self, id: DocumentId, state: DocumentState) {
        self.documents.write().unwrap().insert(id, state);
    }

    fn resolve(&self, reference: &Reference) -> Option<(DocumentId, DocumentState)> {
        let documents = self.documents.read().unwrap();
        match reference {
            Reference::ById(id) => documents.get(id).map(|s| (*id, s.clone())),
            Reference::ByPath(path) => documents
                .iter()
                .find(|(_, s)| s.path.as_ref() == Some(path))
                .map(|(id, s)| (*id, s.clone())),
        }
    }
}

#[async_trait]
impl Source for InMemoryStore {
    async fn fetch(&self, reference: &Reference) -> CacheResult<Document> {
        self.resolve(reference)
            .map(|(id, state)| Document::new(id, state))
            .ok_or_else(|| CacheError::NotFound {
                reference: reference.clone(),
            })
    }

    async fn fetch_child(&self, parent: &Reference, name: &str) -> CacheResult<Document> {
        let (_, parent_state) = self.resolve(parent).ok_or_else(|| CacheError::NotFound {
            reference: parent.clone(),
        })?;
        let path = parent_state
            .path
            .map(|p| p.join(name))
            .unwrap_or_else(|| TreePath::new(name));
        self.fetch(&Reference::ByPath(path)).await
    }

    async fn fetch_children(&self, parent: &Reference) -> CacheResult<Vec<Document>> {
        let (_, parent_state) = self.resolve(parent).ok_or_else(|| CacheError::NotFound {
            reference: parent.clone(),
        })?;
        let documents = self.documents.read().unwrap();
        let mut children: Vec<Document> = documents
            .iter()
            .filter(|(_, s)| {
                s.path.as_ref().and_then(|p| p.parent()).as_ref() == parent_state.path.as_ref()
            })
            .map(|(id, s)| Document::new(*id, s.clone()))
            .collect();
        children.sort_by_key(|d| d.path());
        Ok(children)
    }

    async fn fetch_root(&self) -> CacheResult<Document> {
        self.fetch(&Reference::ByPath(TreePath::root())).await
    }

    async fn query(&self, _query: &str) -> CacheResult<Vec<Document>> {
        let documents = self.documents.read().unwrap();
        Ok(documents
            .iter()
            .map(|(id, s)| Document::new(*id, s.clone()))
            .collect())
    }
}

struct Session {
    store: Arc<InMemoryStore>,
    cache: Arc<DocumentCache>,
    fetcher: CachingFetcher<InMemoryStore>,
    processor: InvalidationProcessor<InMemoryStore>,
}

fn session() -> Session {
    let store = Arc::new(InMemoryStore::default());
    let cache = Arc::new(DocumentCache::new());
    let fetcher = CachingFetcher::new(Arc::clone(&cache), Arc::clone(&store));
    let processor = InvalidationProcessor::with_defaults(Arc::clone(&cache), Arc::clone(&store));
    Session {
        store,
        cache,
        fetcher,
        processor,
    }
}

#[tokio::test]
async fn clean_snapshot_passes_dirty_check() {
    let session = session();
    let t0 = Utc::now();
    let id = session.store.insert(
        DocumentState::new()
            .with_path(TreePath::new("/a"))
            .with_modified_at(t0),
    );

    let document = session
        .fetcher
        .get_or_fetch(&Reference::ById(id))
        .await
        .unwrap();

    let mut guard = DirtyUpdateGuard::new();
    guard.begin(t0);
    // No events delivered: the snapshot is as fresh as the document.
    guard.check(&document).unwrap();
    guard.end();
}

#[tokio::test]
async fn remote_update_trips_dirty_check_after_refresh() {
    let session = session();
    let t0 = Utc::now();
    let t1 = t0 + Duration::seconds(2);
    let started = t0 + Duration::seconds(10);
    let id = session.store.insert(
        DocumentState::new()
            .with_path(TreePath::new("/a"))
            .with_modified_at(t0),
    );

    let document = session
        .fetcher
        .get_or_fetch(&Reference::ById(id))
        .await
        .unwrap();

    let mut guard = DirtyUpdateGuard::new();
    guard.begin_at(t0, started);
    guard.check(&document).unwrap();

    // Another process mutates the document and the change feed reports it.
    session.store.update(
        id,
        DocumentState::new()
            .with_path(TreePath::new("/a"))
            .with_modified_at(t1),
    );
    session
        .processor
        .process_event(&OperationEvent::new(vec![Modification::new(
            ModificationKind::Updated,
            Reference::ById(id),
        )]))
        .await
        .unwrap();

    // The cached handle was refreshed in place and now fails the check.
    let refreshed = session
        .fetcher
        .fetch_and_refresh(&Reference::ById(id))
        .await
        .unwrap();
    assert!(refreshed.same_instance(&document));
    let err = guard.check(&refreshed).unwrap_err();
    assert!(err.is_conflict());
    guard.end();
}

#[tokio::test]
async fn independent_queries_share_cached_handles() {
    let session = session();
    session
        .store
        .insert(DocumentState::new().with_path(TreePath::new("/x")));
    session
        .store
        .insert(DocumentState::new().with_path(TreePath::new("/y")));

    let mut first: Vec<Document> = session.fetcher.query("*").await.unwrap().collect();
    let mut second: Vec<Document> = session.fetcher.query("*").await.unwrap().collect();
    first.sort_by_key(|d| d.id());
    second.sort_by_key(|d| d.id());

    assert_eq!(first.len(), 2);
    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!(a.id(), b.id());
        assert!(a.same_instance(b));
    }
}

#[tokio::test]
async fn tracked_children_follow_the_change_feed() {
    let session = session();
    let parent_id = session
        .store
        .insert(DocumentState::new().with_path(TreePath::new("/p")));
    let c1 = session
        .store
        .insert(DocumentState::new().with_path(TreePath::new("/p/c1")));
    let c2 = session
        .store
        .insert(DocumentState::new().with_path(TreePath::new("/p/c2")));

    session
        .fetcher
        .track_children(&Reference::ById(parent_id))
        .await
        .unwrap();
    assert_eq!(session.cache.get_children(parent_id), Some(vec![c1, c2]));

    // The store removes c2 and reports it through the feed.
    session.store.documents.write().unwrap().remove(&c2);
    session
        .processor
        .process_event(&OperationEvent::new(vec![
            Modification::new(ModificationKind::Removed, Reference::ById(c2)),
            Modification::new(ModificationKind::ChildRemoved, Reference::ById(parent_id)),
        ]))
        .await
        .unwrap();

    assert_eq!(session.cache.get_children(parent_id), Some(vec![c1]));
    assert!(session.cache.get(&Reference::ById(c2)).is_none());
}
