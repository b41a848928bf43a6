//! Parent/child baseline pairs and undo snapshots

use crate::baseline::Baseline;
use crate::record::{Record, RecordType};

/// Which baseline of a pair an operation targets
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Side {
    /// The containing ("why") level
    Parent,
    /// The contained ("how") level
    Child,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::Parent => Side::Child,
            Side::Child => Side::Parent,
        }
    }
}

/// A parent baseline and the child baseline that decomposes one of its items
///
/// Child records may carry a `trace` to a parent record. Stale traces are
/// allowed; finding them is the consistency engine's job.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BaselinePair {
    parent: Baseline,
    child: Baseline,
}

impl BaselinePair {
    pub fn new(parent: Baseline, child: Baseline) -> Self {
        Self { parent, child }
    }

    pub fn parent(&self) -> &Baseline {
        &self.parent
    }

    pub fn child(&self) -> &Baseline {
        &self.child
    }

    pub fn get(&self, side: Side) -> &Baseline {
        match side {
            Side::Parent => &self.parent,
            Side::Child => &self.child,
        }
    }

    /// Replace one side, keeping the other
    pub fn with(&self, side: Side, baseline: Baseline) -> Self {
        match side {
            Side::Parent => Self::new(baseline, self.child.clone()),
            Side::Child => Self::new(self.parent.clone(), baseline),
        }
    }

    pub fn with_parent(&self, parent: Baseline) -> Self {
        self.with(Side::Parent, parent)
    }

    pub fn with_child(&self, child: Baseline) -> Self {
        self.with(Side::Child, child)
    }

    /// Apply `f` to one side
    pub fn update(&self, side: Side, f: impl FnOnce(&Baseline) -> Baseline) -> Self {
        self.with(side, f(self.get(side)))
    }

    /// The child baseline's identity record, if any
    pub fn child_identity(&self) -> Option<&Record> {
        self.child.find_by_type(RecordType::Identity).next()
    }

    /// The parent item this child level decomposes
    pub fn system_item(&self) -> Option<&Record> {
        self.child_identity()
            .and_then(Record::trace)
            .and_then(|id| self.parent.get_typed(id, RecordType::Item))
    }

    /// Digest over both sides
    pub fn content_digest(&self) -> String {
        format!(
            "{}:{}",
            self.parent.content_digest(),
            self.child.content_digest()
        )
    }
}

/// An immutable snapshot the editor keeps on its undo stack
///
/// Carries the digest of the last saved state so the caller can tell a
/// modified snapshot from one matching what is on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UndoState {
    pair: BaselinePair,
    saved_digest: Option<String>,
}

impl UndoState {
    /// Snapshot of a freshly loaded pair; counts as saved
    pub fn loaded(pair: BaselinePair) -> Self {
        let saved_digest = Some(pair.content_digest());
        Self { pair, saved_digest }
    }

    /// Snapshot of a pair that has never been saved
    pub fn unsaved(pair: BaselinePair) -> Self {
        Self {
            pair,
            saved_digest: None,
        }
    }

    pub fn pair(&self) -> &BaselinePair {
        &self.pair
    }

    /// Next snapshot after an edit
    pub fn with_change(&self, pair: BaselinePair) -> Self {
        Self {
            pair,
            saved_digest: self.saved_digest.clone(),
        }
    }

    pub fn mark_saved(&self) -> Self {
        Self::loaded(self.pair.clone())
    }

    pub fn is_dirty(&self) -> bool {
        self.saved_digest.as_deref() != Some(self.pair.content_digest().as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_system_item_resolves_through_identity() {
        let parent_item = Record::create(RecordType::Item, [("name", "Engine")]);
        let identity = Record::builder(RecordType::Identity)
            .set("name", "Engine")
            .trace(Some(parent_item.id()))
            .build(Utc::now());
        let pair = BaselinePair::new(
            Baseline::new().add(parent_item.clone()),
            Baseline::new().add(identity),
        );
        assert_eq!(pair.system_item(), Some(&parent_item));
        assert!(BaselinePair::default().system_item().is_none());
    }

    #[test]
    fn test_undo_state_dirty_tracking() {
        let pair = BaselinePair::default();
        let loaded = UndoState::loaded(pair.clone());
        assert!(!loaded.is_dirty());

        let item = Record::create(RecordType::Item, [("name", "Pump")]);
        let edited = loaded.with_change(pair.with_child(Baseline::new().add(item)));
        assert!(edited.is_dirty());

        // Undoing back to the saved content is clean again
        assert!(!edited.with_change(pair).is_dirty());
        assert!(!edited.mark_saved().is_dirty());
        assert!(UndoState::unsaved(BaselinePair::default()).is_dirty());
    }
}
