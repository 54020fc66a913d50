//! Turns view changes into application events.

use crate::event::{DataEvent, Event};
use livetree_snapshot::{Index, NamedNode, Node, Path};
use livetree_sync_protocol::{Change, EventRegistration, EventType};
use std::cmp::Ordering;

/// Generates events for one query.
#[derive(Debug, Clone)]
pub struct EventGenerator {
    path: Path,
    index: Index,
}

impl EventGenerator {
    /// A generator for the query at `path` ordered by `index`.
    pub fn new(path: Path, index: Index) -> Self {
        Self { path, index }
    }

    /// Build events for `changes` against the new `event_cache`.
    ///
    /// Events come out grouped by type: removals, additions, moves, changes
    /// and finally the value event. Within a group they follow query order.
    /// A changed child whose indexed value changed also produces a move.
    pub fn generate_events_for_changes(
        &self,
        changes: &[Change],
        event_cache: &Node,
        registrations: &[EventRegistration],
    ) -> Vec<Event> {
        let mut moves = Vec::new();
        for change in changes {
            if change.event_type == EventType::ChildChanged {
                if let Some(old) = &change.old_node {
                    if self.index.indexed_value_changed(old, &change.node) {
                        moves.push(Change::child_moved(change.child_key(), change.node.clone()));
                    }
                }
            }
        }

        let mut events = Vec::new();
        for event_type in EventType::ALL {
            let group = if event_type == EventType::ChildMoved {
                &moves[..]
            } else {
                changes
            };
            let mut filtered: Vec<&Change> = group
                .iter()
                .filter(|change| change.event_type == event_type)
                .collect();
            filtered.sort_by(|a, b| self.compare_changes(a, b));
            for change in filtered {
                let change = self.materialize(change, event_cache);
                for registration in registrations.iter().filter(|r| r.responds_to(event_type)) {
                    events.push(self.event_for(&change, registration));
                }
            }
        }
        events
    }

    fn compare_changes(&self, a: &Change, b: &Change) -> Ordering {
        match (&a.child_name, &b.child_name) {
            (Some(a_name), Some(b_name)) => self.index.compare(
                &NamedNode::new(a_name.clone(), a.node.clone()),
                &NamedNode::new(b_name.clone(), b.node.clone()),
            ),
            _ => Ordering::Equal,
        }
    }

    fn materialize(&self, change: &Change, event_cache: &Node) -> Change {
        match change.event_type {
            EventType::Value | EventType::ChildRemoved => change.clone(),
            _ => {
                let prev_name =
                    event_cache.predecessor_child_name(change.child_key(), &change.node, &self.index);
                change.clone().with_prev_name(prev_name)
            }
        }
    }

    fn event_for(&self, change: &Change, registration: &EventRegistration) -> Event {
        let path = match &change.child_name {
            Some(name) => self.path.child(name),
            None => self.path.clone(),
        };
        Event::Data(DataEvent {
            event_type: change.event_type,
            registration: registration.clone(),
            path,
            node: change.node.clone(),
            index: self.index.clone(),
            prev_name: change.prev_name.clone(),
        })
    }
}
