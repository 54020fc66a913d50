//! Collapses child changes raised while applying one operation.

use livetree_snapshot::PRIORITY_KEY;
use livetree_sync_protocol::{Change, EventType};
use std::collections::BTreeMap;

/// Child changes keyed by child name, at most one per child.
#[derive(Debug, Default)]
pub struct ChildChangeAccumulator {
    changes: BTreeMap<String, Change>,
}

impl ChildChangeAccumulator {
    /// An empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a child change, merging it with an earlier change to the same
    /// child.
    ///
    /// # Panics
    ///
    /// Panics on a value or move change, a change to the priority pseudo
    /// child, or a sequence that cannot happen (such as added after added).
    pub fn track_child_change(&mut self, change: Change) {
        assert!(
            matches!(
                change.event_type,
                EventType::ChildAdded | EventType::ChildChanged | EventType::ChildRemoved
            ),
            "only child changes can be tracked"
        );
        let key = change.child_key().to_string();
        assert!(key != PRIORITY_KEY, "priority changes are not child changes");

        let Some(old) = self.changes.remove(&key) else {
            self.changes.insert(key, change);
            return;
        };
        let merged = match (change.event_type, old.event_type) {
            (EventType::ChildAdded, EventType::ChildRemoved) => {
                Some(Change::child_changed(key.clone(), change.node, old.node))
            }
            (EventType::ChildRemoved, EventType::ChildAdded) => None,
            (EventType::ChildRemoved, EventType::ChildChanged) => Some(Change::child_removed(
                key.clone(),
                old.old_node.unwrap_or(old.node),
            )),
            (EventType::ChildChanged, EventType::ChildAdded) => {
                Some(Change::child_added(key.clone(), change.node))
            }
            (EventType::ChildChanged, EventType::ChildChanged) => Some(Change::child_changed(
                key.clone(),
                change.node,
                old.old_node.unwrap_or(old.node),
            )),
            (new, previous) => {
                panic!("illegal combination of changes for {key}: {new} after {previous}")
            }
        };
        if let Some(merged) = merged {
            self.changes.insert(key, merged);
        }
    }

    /// Whether nothing was tracked.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// The collapsed changes.
    pub fn into_changes(self) -> Vec<Change> {
        self.changes.into_values().collect()
    }
}
