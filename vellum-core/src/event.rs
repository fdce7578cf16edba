//! Remote modification records consumed by the invalidation pipeline.
//!
//! The remote store reports mutations as ordered batches
//! ([`OperationEvent`]) of single change records ([`Modification`]).
//! The protocol assumes at-least-once, in-order delivery; records carry
//! no sequence numbers, so out-of-order channels are not supported.

use serde::{Deserialize, Serialize};

use crate::document::Reference;

/// Kind of a single remote change.
///
/// Exhaustive matching over this enum is how the processor dispatches;
/// there are deliberately no boolean predicate methods beyond the two
/// groupings below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModificationKind {
    /// A document came into existence.
    Created,
    /// A document's content changed.
    Updated,
    /// A document was removed.
    Removed,
    /// A child was added under the target container.
    ChildAdded,
    /// A child was removed from under the target container.
    ChildRemoved,
    /// The target container's children were reordered.
    ChildrenReordered,
}

impl ModificationKind {
    /// Created/Removed: the target itself appeared or disappeared.
    pub fn is_existence_change(&self) -> bool {
        matches!(self, Self::Created | Self::Removed)
    }

    /// Child add/remove/reorder: the target is the affected container.
    pub fn is_container_change(&self) -> bool {
        matches!(
            self,
            Self::ChildAdded | Self::ChildRemoved | Self::ChildrenReordered
        )
    }
}

/// Single change record from the remote store.
///
/// For container kinds the target names the *parent*; the affected
/// child is resolved from the pending reference left by the preceding
/// Created/Removed record in the same event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modification {
    /// What happened.
    pub kind: ModificationKind,
    /// The document (or container) the change applies to.
    pub target: Reference,
}

impl Modification {
    /// Create a modification record.
    pub fn new(kind: ModificationKind, target: impl Into<Reference>) -> Self {
        Self {
            kind,
            target: target.into(),
        }
    }
}

/// Ordered batch of modifications delivered together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationEvent {
    /// Changes in the order the store applied them.
    pub modifications: Vec<Modification>,
    /// Urgent events are delivered synchronously/high-priority to
    /// listeners instead of waiting behind the queue.
    pub urgent: bool,
}

impl OperationEvent {
    /// Create a non-urgent event.
    pub fn new(modifications: Vec<Modification>) -> Self {
        Self {
            modifications,
            urgent: false,
        }
    }

    /// Mark the event urgent.
    pub fn urgent(mut self) -> Self {
        self.urgent = true;
        self
    }

    /// Whether the batch carries no modifications.
    pub fn is_empty(&self) -> bool {
        self.modifications.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::TreePath;

    #[test]
    fn test_kind_groupings() {
        assert!(ModificationKind::Created.is_existence_change());
        assert!(ModificationKind::Removed.is_existence_change());
        assert!(!ModificationKind::Updated.is_existence_change());

        assert!(ModificationKind::ChildAdded.is_container_change());
        assert!(ModificationKind::ChildRemoved.is_container_change());
        assert!(ModificationKind::ChildrenReordered.is_container_change());
        assert!(!ModificationKind::Created.is_container_change());
    }

    #[test]
    fn test_event_urgency() {
        let event = OperationEvent::new(vec![Modification::new(
            ModificationKind::Updated,
            TreePath::new("/a"),
        )]);
        assert!(!event.urgent);
        assert!(event.clone().urgent().urgent);
        assert!(!event.is_empty());
        assert!(OperationEvent::new(vec![]).is_empty());
    }
}
