//! View changes.
//!
//! A [`Change`] describes how one view's event cache moved: a child was
//! added, removed, changed or moved, or the whole value changed. Changes are
//! turned into events for registrations that asked for them.

use livetree_snapshot::Node;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of change or event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A child disappeared.
    ChildRemoved,
    /// A child appeared.
    ChildAdded,
    /// A child changed position in the query ordering.
    ChildMoved,
    /// A child's content changed.
    ChildChanged,
    /// The whole value changed.
    Value,
}

impl EventType {
    /// Every event type, in the order events are raised.
    pub const ALL: [EventType; 5] = [
        EventType::ChildRemoved,
        EventType::ChildAdded,
        EventType::ChildMoved,
        EventType::ChildChanged,
        EventType::Value,
    ];

    /// Wire name, such as `child_added`.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ChildRemoved => "child_removed",
            EventType::ChildAdded => "child_added",
            EventType::ChildMoved => "child_moved",
            EventType::ChildChanged => "child_changed",
            EventType::Value => "value",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change to a view's event cache.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    /// Kind of change.
    pub event_type: EventType,
    /// New value (old value for removals).
    pub node: Node,
    /// Affected child, absent for value changes.
    pub child_name: Option<String>,
    /// Previous value of a changed child.
    pub old_node: Option<Node>,
    /// Name of the preceding sibling in query order, filled in when events
    /// are generated.
    pub prev_name: Option<String>,
}

impl Change {
    /// The view's value is now `node`.
    pub fn value(node: Node) -> Self {
        Self {
            event_type: EventType::Value,
            node,
            child_name: None,
            old_node: None,
            prev_name: None,
        }
    }

    /// Child `name` was added with `node`.
    pub fn child_added(name: impl Into<String>, node: Node) -> Self {
        Self::child(EventType::ChildAdded, name, node, None)
    }

    /// Child `name`, which held `node`, was removed.
    pub fn child_removed(name: impl Into<String>, node: Node) -> Self {
        Self::child(EventType::ChildRemoved, name, node, None)
    }

    /// Child `name` changed from `old` to `node`.
    pub fn child_changed(name: impl Into<String>, node: Node, old: Node) -> Self {
        Self::child(EventType::ChildChanged, name, node, Some(old))
    }

    /// Child `name` moved in the ordering.
    pub fn child_moved(name: impl Into<String>, node: Node) -> Self {
        Self::child(EventType::ChildMoved, name, node, None)
    }

    fn child(event_type: EventType, name: impl Into<String>, node: Node, old_node: Option<Node>) -> Self {
        Self {
            event_type,
            node,
            child_name: Some(name.into()),
            old_node,
            prev_name: None,
        }
    }

    /// Same change with the preceding sibling's name attached.
    pub fn with_prev_name(mut self, prev_name: Option<String>) -> Self {
        self.prev_name = prev_name;
        self
    }

    /// Name of the affected child, or an empty string for value changes.
    pub fn child_key(&self) -> &str {
        self.child_name.as_deref().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_order() {
        let mut types = vec![
            EventType::Value,
            EventType::ChildChanged,
            EventType::ChildAdded,
            EventType::ChildMoved,
            EventType::ChildRemoved,
        ];
        types.sort();
        assert_eq!(types, EventType::ALL.to_vec());
    }

    #[test]
    fn test_event_type_names() {
        assert_eq!(EventType::ChildAdded.to_string(), "child_added");
        assert_eq!(
            serde_json::to_value(EventType::ChildMoved).unwrap(),
            serde_json::json!("child_moved")
        );
    }

    #[test]
    fn test_constructors() {
        let changed = Change::child_changed("a", Node::leaf(2), Node::leaf(1));
        assert_eq!(changed.child_key(), "a");
        assert_eq!(changed.old_node, Some(Node::leaf(1)));
        let value = Change::value(Node::empty());
        assert_eq!(value.child_key(), "");
        assert_eq!(value.event_type, EventType::Value);
    }
}
