//! Document, path and reference types.
//!
//! A [`Document`] is a shared handle to an opaque payload keyed by a
//! stable id and an optional hierarchical path. The cache never inspects
//! or diffs the payload; on refresh the whole [`DocumentState`] is
//! replaced in place, preserving handle identity so every holder of the
//! same cached document observes the refresh.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::{DocumentId, Timestamp};

// ============================================================================
// TREE PATH
// ============================================================================

/// Normalized absolute path inside the document hierarchy.
///
/// Paths are always absolute ("/", "/a", "/a/b"); the constructor
/// normalizes leading/trailing slashes and empty segments, so two paths
/// naming the same location compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TreePath(String);

impl TreePath {
    /// Create a normalized path. Empty input becomes the root path.
    pub fn new(path: impl AsRef<str>) -> Self {
        let segments: Vec<&str> = path
            .as_ref()
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        if segments.is_empty() {
            Self("/".to_string())
        } else {
            Self(format!("/{}", segments.join("/")))
        }
    }

    /// The root path "/".
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Whether this is the root path.
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Path string, always absolute.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment, empty for the root.
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or("")
    }

    /// Parent path, or None for the root.
    pub fn parent(&self) -> Option<TreePath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => None,
        }
    }

    /// Append a child segment.
    pub fn join(&self, name: &str) -> TreePath {
        Self::new(format!("{}/{}", self.0, name))
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TreePath {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

// ============================================================================
// REFERENCE
// ============================================================================

/// Handle used to address a document: by stable id or by path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reference {
    /// Address by the store-assigned identifier.
    ById(DocumentId),
    /// Address by hierarchical location.
    ByPath(TreePath),
}

impl Reference {
    /// The identifier, if this is an id reference.
    pub fn id(&self) -> Option<DocumentId> {
        match self {
            Reference::ById(id) => Some(*id),
            Reference::ByPath(_) => None,
        }
    }

    /// The path, if this is a path reference.
    pub fn path(&self) -> Option<&TreePath> {
        match self {
            Reference::ById(_) => None,
            Reference::ByPath(path) => Some(path),
        }
    }
}

impl From<DocumentId> for Reference {
    fn from(id: DocumentId) -> Self {
        Reference::ById(id)
    }
}

impl From<TreePath> for Reference {
    fn from(path: TreePath) -> Self {
        Reference::ByPath(path)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::ById(id) => write!(f, "id:{id}"),
            Reference::ByPath(path) => write!(f, "path:{path}"),
        }
    }
}

// ============================================================================
// DOCUMENT
// ============================================================================

/// Mutable document content as known by the store.
///
/// Replaced wholesale on refresh; the cache never reads into `properties`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentState {
    /// Hierarchical location; absent for proxies/versions that are not
    /// addressable by path.
    pub path: Option<TreePath>,
    /// Opaque content fields.
    pub properties: serde_json::Map<String, serde_json::Value>,
    /// Last-modification time as known by the store. Consumed only by
    /// the dirty-update check, never by the cache itself.
    pub modified_at: Option<Timestamp>,
}

impl DocumentState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the path.
    pub fn with_path(mut self, path: TreePath) -> Self {
        self.path = Some(path);
        self
    }

    /// Set the last-modification time.
    pub fn with_modified_at(mut self, at: Timestamp) -> Self {
        self.modified_at = Some(at);
        self
    }

    /// Set a content property.
    pub fn with_property(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(name.into(), value);
        self
    }
}

#[derive(Debug)]
struct DocumentInner {
    /// Absent while the document is a local, not-yet-persisted draft.
    id: Option<DocumentId>,
    state: RwLock<DocumentState>,
}

/// Shared handle to a document.
///
/// Cloning copies the handle, not the content: two clones observe the
/// same state, and [`Document::replace_state`] refreshes every holder.
/// Identity (`same_instance`) is the shared allocation, which is what
/// the cache's "at most one live document per id" invariant is about.
#[derive(Clone)]
pub struct Document {
    inner: Arc<DocumentInner>,
}

impl Document {
    /// Create a persisted document with a store-assigned id.
    pub fn new(id: DocumentId, state: DocumentState) -> Self {
        Self {
            inner: Arc::new(DocumentInner {
                id: Some(id),
                state: RwLock::new(state),
            }),
        }
    }

    /// Create a local draft with no id yet. Drafts are never cached.
    pub fn draft(state: DocumentState) -> Self {
        Self {
            inner: Arc::new(DocumentInner {
                id: None,
                state: RwLock::new(state),
            }),
        }
    }

    /// Store-assigned identifier, None for drafts.
    pub fn id(&self) -> Option<DocumentId> {
        self.inner.id
    }

    /// Current path, if the document is addressable by path.
    pub fn path(&self) -> Option<TreePath> {
        self.inner.state.read().unwrap().path.clone()
    }

    /// Last-modification time as known by the store.
    pub fn modified_at(&self) -> Option<Timestamp> {
        self.inner.state.read().unwrap().modified_at
    }

    /// Read a single content property.
    pub fn property(&self, name: &str) -> Option<serde_json::Value> {
        self.inner.state.read().unwrap().properties.get(name).cloned()
    }

    /// Snapshot of the full state.
    pub fn state(&self) -> DocumentState {
        self.inner.state.read().unwrap().clone()
    }

    /// Replace the full state in place, preserving handle identity.
    ///
    /// This is the refresh primitive: every holder of this document sees
    /// the new content without re-fetching from the cache.
    pub fn replace_state(&self, state: DocumentState) {
        *self.inner.state.write().unwrap() = state;
    }

    /// Whether two handles refer to the same live document object.
    pub fn same_instance(&self, other: &Document) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read().unwrap();
        f.debug_struct("Document")
            .field("id", &self.inner.id)
            .field("path", &state.path)
            .field("modified_at", &state.modified_at)
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
