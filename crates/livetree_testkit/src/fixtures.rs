//! Test fixtures and sync tree helpers.
//!
//! Provides node and query builders plus [`TreeDriver`], a sync tree over a
//! recording listen provider that hands out write ids.

use livetree_core::{MergeChildren, WriteId};
use livetree_snapshot::{Index, Node, Path};
use livetree_sync_engine::{Event, ListenRequest, ListenStatus, MockListenProvider, SyncTree, SyncTreeConfig};
use livetree_sync_protocol::{EventRegistration, EventType, QueryParams, QuerySpec};
use serde_json::Value;

/// Build a node from JSON.
///
/// # Panics
///
/// Panics if the JSON has invalid keys.
pub fn node(json: Value) -> Node {
    Node::from_json(&json).expect("Invalid node JSON")
}

/// Build merge children from `(path, json)` pairs.
pub fn merge(children: &[(&str, Value)]) -> MergeChildren {
    children
        .iter()
        .map(|(path, json)| (Path::new(path), node(json.clone())))
        .collect()
}

/// Query parameters ordered by `index`.
pub fn ordered_by(index: Index) -> QueryParams {
    QueryParams::new().order_by(index).expect("order_by on fresh params")
}

/// A key-ordered query at `path` limited to the first `limit` children.
pub fn limit_first(path: &str, limit: usize) -> QuerySpec {
    let params = ordered_by(Index::Key)
        .limit_to_first(limit)
        .expect("Invalid limit");
    QuerySpec::new(Path::new(path), params)
}

/// A key-ordered query at `path` limited to the last `limit` children.
pub fn limit_last(path: &str, limit: usize) -> QuerySpec {
    let params = ordered_by(Index::Key)
        .limit_to_last(limit)
        .expect("Invalid limit");
    QuerySpec::new(Path::new(path), params)
}

/// A registration with id `id` for every child event type.
pub fn all_child_events(id: u64) -> EventRegistration {
    EventRegistration::child(
        id,
        &[
            EventType::ChildAdded,
            EventType::ChildRemoved,
            EventType::ChildChanged,
            EventType::ChildMoved,
        ],
    )
}

/// `(type, path)` for every data event, in order.
pub fn summarize(events: &[Event]) -> Vec<(EventType, String)> {
    events
        .iter()
        .filter_map(Event::as_data)
        .map(|e| (e.event_type, e.path.to_string()))
        .collect()
}

/// Like [`summarize`], restricted to registration `id`.
pub fn summarize_for(events: &[Event], id: u64) -> Vec<(EventType, String)> {
    let mine: Vec<Event> = events
        .iter()
        .filter(|e| e.registration().id() == Some(id))
        .cloned()
        .collect();
    summarize(&mine)
}

/// A sync tree with a recording provider and a write id counter.
#[derive(Debug)]
pub struct TreeDriver {
    /// The tree under test.
    pub tree: SyncTree<MockListenProvider>,
    next_write_id: WriteId,
}

impl Default for TreeDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeDriver {
    /// A driver with the default configuration.
    pub fn new() -> Self {
        Self::with_config(SyncTreeConfig::default())
    }

    /// A driver with `config`.
    pub fn with_config(config: SyncTreeConfig) -> Self {
        Self {
            tree: SyncTree::with_config(MockListenProvider::new(), config),
            next_write_id: 1,
        }
    }

    /// Register a listener.
    pub fn listen(&mut self, query: &QuerySpec, registration: EventRegistration) -> Vec<Event> {
        self.tree.add_event_registration(query, registration)
    }

    /// Remove every listener on `query`.
    pub fn unlisten(&mut self, query: &QuerySpec) -> Vec<Event> {
        self.tree.remove_event_registration(query, None, None)
    }

    /// Server data at `path`.
    pub fn server_set(&mut self, path: &str, json: Value) -> Vec<Event> {
        self.tree.apply_server_overwrite(&Path::new(path), node(json))
    }

    /// Server merge at `path`.
    pub fn server_merge(&mut self, path: &str, children: &[(&str, Value)]) -> Vec<Event> {
        self.tree
            .apply_server_merge(&Path::new(path), &merge(children))
    }

    /// A visible user overwrite. Returns the write id and the events.
    pub fn user_set(&mut self, path: &str, json: Value) -> (WriteId, Vec<Event>) {
        let id = self.take_write_id();
        let events = self
            .tree
            .apply_user_overwrite(&Path::new(path), node(json), id, true);
        (id, events)
    }

    /// A user merge. Returns the write id and the events.
    pub fn user_merge(&mut self, path: &str, children: &[(&str, Value)]) -> (WriteId, Vec<Event>) {
        let id = self.take_write_id();
        let events = self
            .tree
            .apply_user_merge(&Path::new(path), &merge(children), id);
        (id, events)
    }

    /// Acknowledge write `id`.
    pub fn ack(&mut self, id: WriteId) -> Vec<Event> {
        self.tree.ack_user_write(id, false)
    }

    /// Reject write `id`.
    pub fn revert(&mut self, id: WriteId) -> Vec<Event> {
        self.tree.ack_user_write(id, true)
    }

    /// Complete the most recently started listen with `status`.
    pub fn complete_last_listen(&mut self, status: ListenStatus) -> Vec<Event> {
        let Some(request) = self.last_listen() else {
            return Vec::new();
        };
        self.tree.on_listen_complete(&request, status)
    }

    /// The most recently started listen.
    pub fn last_listen(&self) -> Option<ListenRequest> {
        self.tree.provider().last_started().cloned()
    }

    /// The event cache of `query`'s view as JSON.
    pub fn event_json(&self, query: &QuerySpec) -> Option<Value> {
        self.tree.event_cache(query).map(|n| n.to_json(false))
    }

    fn take_write_id(&mut self) -> WriteId {
        let id = self.next_write_id;
        self.next_write_id += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_driver_round() {
        let mut driver = TreeDriver::new();
        let query = QuerySpec::default_at(Path::root());
        driver.listen(&query, EventRegistration::value(1));
        assert!(driver.last_listen().is_some());

        let events = driver.server_set("", json!({"a": 1}));
        assert_eq!(summarize(&events), vec![(EventType::Value, "/".to_string())]);

        let (id, events) = driver.user_set("b", json!(2));
        assert_eq!(id, 1);
        assert_eq!(summarize_for(&events, 1).len(), 1);
        assert_eq!(driver.event_json(&query), Some(json!({"a": 1, "b": 2})));

        let events = driver.revert(id);
        assert_eq!(summarize(&events).len(), 1);
        assert_eq!(driver.event_json(&query), Some(json!({"a": 1})));
    }

    #[test]
    fn test_merge_builder() {
        let children = merge(&[("a", json!(1)), ("b/c", json!(true))]);
        assert_eq!(children.len(), 2);
        assert_eq!(children.get(&Path::new("b/c")), Some(&Node::leaf(true)));
    }
}
