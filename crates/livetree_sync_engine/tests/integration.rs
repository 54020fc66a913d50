//! Integration tests for the sync tree.

use livetree_core::MergeChildren;
use livetree_snapshot::{Index, Node, Path};
use livetree_sync_engine::{
    Event, ListenCall, ListenStatus, MockListenProvider, SyncTree, SyncTreeConfig,
};
use livetree_sync_protocol::{EventRegistration, EventType, QueryParams, QuerySpec};
use serde_json::json;

fn node(value: serde_json::Value) -> Node {
    Node::from_json(&value).unwrap()
}

fn new_tree() -> SyncTree<MockListenProvider> {
    SyncTree::new(MockListenProvider::new())
}

/// `(type, path)` pairs for the data events addressed to registration `id`.
fn events_for(events: &[Event], id: u64) -> Vec<(EventType, String)> {
    events
        .iter()
        .filter(|e| e.registration().id() == Some(id))
        .filter_map(|e| e.as_data())
        .map(|e| (e.event_type, e.path.to_string()))
        .collect()
}

fn by_key() -> QueryParams {
    QueryParams::new().order_by(Index::Key).unwrap()
}

fn limit_first(path: &str, limit: usize) -> QuerySpec {
    QuerySpec::new(Path::new(path), by_key().limit_to_first(limit).unwrap())
}

fn limit_last(path: &str, limit: usize) -> QuerySpec {
    QuerySpec::new(Path::new(path), by_key().limit_to_last(limit).unwrap())
}

fn all_types() -> EventRegistration {
    EventRegistration::child(
        2,
        &[
            EventType::ChildAdded,
            EventType::ChildRemoved,
            EventType::ChildChanged,
            EventType::ChildMoved,
        ],
    )
}

#[test]
fn test_deep_write_on_empty_location() {
    let mut tree = new_tree();
    let root = QuerySpec::default_at(Path::root());
    tree.add_event_registration(&root, EventRegistration::value(1));
    tree.apply_server_overwrite(&Path::root(), Node::empty());

    let events = tree.apply_user_overwrite(&Path::new("a/b"), Node::leaf(5), 1, true);
    assert_eq!(events_for(&events, 1), vec![(EventType::Value, "/".to_string())]);
    assert_eq!(tree.event_cache(&root), Some(&node(json!({"a": {"b": 5}}))));
    assert_eq!(tree.server_cache(&root), Some(&Node::empty()));
}

#[test]
fn test_range_query_ignores_out_of_range_server_change() {
    let mut tree = new_tree();
    let params = by_key()
        .start_at(Node::leaf("b"), None)
        .unwrap();
    let query = QuerySpec::new(Path::root(), params);
    tree.add_event_registration(&query, all_types());
    tree.add_event_registration(&query, EventRegistration::value(1));
    let tag = tree.tag_for_query(&query).unwrap();

    let events =
        tree.apply_tagged_query_overwrite(&Path::root(), node(json!({"a": 1, "b": 2, "c": 3})), tag);
    assert_eq!(
        events_for(&events, 2),
        vec![
            (EventType::ChildAdded, "/b".to_string()),
            (EventType::ChildAdded, "/c".to_string()),
        ]
    );
    assert_eq!(events_for(&events, 1), vec![(EventType::Value, "/".to_string())]);
    assert_eq!(tree.event_cache(&query), Some(&node(json!({"b": 2, "c": 3}))));

    let events = tree.apply_tagged_query_overwrite(&Path::new("a"), Node::leaf(9), tag);
    assert!(events.is_empty());
    let events = tree.apply_server_overwrite(&Path::new("a"), Node::leaf(9));
    assert!(events.is_empty());
    assert_eq!(tree.event_cache(&query), Some(&node(json!({"b": 2, "c": 3}))));
}

#[test]
fn test_limit_window_backfills_from_server_data() {
    let mut tree = new_tree();
    let query = limit_first("", 2);
    tree.add_event_registration(&QuerySpec::default_at(Path::root()), EventRegistration::value(1));
    tree.add_event_registration(&query, all_types());
    tree.apply_server_overwrite(&Path::root(), node(json!({"a": 1, "b": 2, "c": 3})));
    assert_eq!(tree.event_cache(&query), Some(&node(json!({"a": 1, "b": 2}))));

    let events = tree.apply_user_overwrite(&Path::new("a"), Node::empty(), 1, true);
    assert_eq!(
        events_for(&events, 2),
        vec![
            (EventType::ChildRemoved, "/a".to_string()),
            (EventType::ChildAdded, "/c".to_string()),
        ]
    );
    assert_eq!(tree.event_cache(&query), Some(&node(json!({"b": 2, "c": 3}))));
}

#[test]
fn test_limit_window_evicts_boundary_child() {
    let mut tree = new_tree();
    let query = limit_first("", 2);
    tree.add_event_registration(&QuerySpec::default_at(Path::root()), EventRegistration::value(1));
    tree.add_event_registration(&query, all_types());
    tree.apply_server_overwrite(&Path::root(), node(json!({"a": 1, "b": 2, "c": 3})));

    // Integer-like keys sort before every other key.
    let events = tree.apply_user_overwrite(&Path::new("0"), Node::leaf(0), 1, true);
    assert_eq!(
        events_for(&events, 2),
        vec![
            (EventType::ChildRemoved, "/b".to_string()),
            (EventType::ChildAdded, "/0".to_string()),
        ]
    );
    let added = events
        .iter()
        .filter_map(Event::as_data)
        .find(|e| e.event_type == EventType::ChildAdded)
        .unwrap();
    assert_eq!(added.prev_name, None);
    assert_eq!(tree.event_cache(&query).unwrap().num_children(), 2);
}

#[test]
fn test_limit_to_last_backfills_and_accepts_merge() {
    let mut tree = new_tree();
    let query = limit_last("", 2);
    tree.add_event_registration(&QuerySpec::default_at(Path::root()), EventRegistration::value(1));
    tree.add_event_registration(&query, all_types());
    tree.apply_server_overwrite(&Path::root(), node(json!({"a": 1, "b": 2, "c": 3})));
    assert_eq!(tree.event_cache(&query), Some(&node(json!({"b": 2, "c": 3}))));

    let events = tree.apply_user_overwrite(&Path::new("c"), Node::empty(), 1, true);
    assert_eq!(
        events_for(&events, 2),
        vec![
            (EventType::ChildRemoved, "/c".to_string()),
            (EventType::ChildAdded, "/a".to_string()),
        ]
    );
    assert_eq!(tree.event_cache(&query), Some(&node(json!({"a": 1, "b": 2}))));

    let mut children = MergeChildren::new();
    children.insert(Path::new("z"), Node::leaf(26));
    let events = tree.apply_user_merge(&Path::root(), &children, 2);
    assert_eq!(
        events_for(&events, 2),
        vec![
            (EventType::ChildRemoved, "/a".to_string()),
            (EventType::ChildAdded, "/z".to_string()),
        ]
    );
    assert_eq!(tree.event_cache(&query), Some(&node(json!({"b": 2, "z": 26}))));
}

#[test]
fn test_revert_restores_identical_view() {
    let mut tree = new_tree();
    let root = QuerySpec::default_at(Path::root());
    tree.add_event_registration(&root, EventRegistration::value(1));
    tree.add_event_registration(&root, all_types());
    tree.apply_server_overwrite(&Path::root(), node(json!({"a": 1, "b": {"c": 2}})));
    let before = tree.event_cache(&root).unwrap().clone();

    let events = tree.apply_user_overwrite(&Path::new("b/c"), Node::leaf(3), 1, true);
    assert_eq!(
        events_for(&events, 2),
        vec![(EventType::ChildChanged, "/b".to_string())]
    );

    let events = tree.ack_user_write(1, true);
    assert_eq!(
        events_for(&events, 2),
        vec![(EventType::ChildChanged, "/b".to_string())]
    );
    assert_eq!(events_for(&events, 1), vec![(EventType::Value, "/".to_string())]);
    let after = tree.event_cache(&root).unwrap();
    assert_eq!(after, &before);
    assert_eq!(after.content_hash(), before.content_hash());
    assert_eq!(tree.pending_write_count(), 0);
}

#[test]
fn test_default_listen_shadows_constrained_listen() {
    let mut tree = new_tree();
    let constrained = limit_first("a/b", 1);
    tree.add_event_registration(&constrained, EventRegistration::value(1));
    let tag = tree.tag_for_query(&constrained);
    assert!(tag.is_some());

    let default = QuerySpec::default_at(Path::new("a"));
    tree.add_event_registration(&default, EventRegistration::value(2));
    assert_eq!(
        tree.provider().calls(),
        &[
            ListenCall::Start(tree.provider().started()[0].clone()),
            ListenCall::Start(tree.provider().started()[1].clone()),
            ListenCall::Stop {
                query: constrained.clone(),
                tag,
            },
        ]
    );
    assert_eq!(tree.provider().started()[1].query, default);

    // A listen below a default listen is covered.
    tree.provider_mut().clear();
    tree.add_event_registration(&QuerySpec::default_at(Path::new("a/x")), EventRegistration::value(3));
    assert!(tree.provider().calls().is_empty());

    // Removing the default listen restarts the shadowed one.
    tree.remove_event_registration(&default, None, None);
    let started = tree.provider().started();
    assert_eq!(started.len(), 2);
    assert!(started.iter().any(|r| r.query == constrained && r.tag == tag));
    assert!(started
        .iter()
        .any(|r| r.query == QuerySpec::default_at(Path::new("a/x")) && r.tag.is_none()));
    assert_eq!(tree.provider().stopped(), vec![(&default, None)]);
}

#[test]
fn test_new_view_seeded_from_ancestor() {
    let mut tree = new_tree();
    tree.add_event_registration(&QuerySpec::default_at(Path::root()), EventRegistration::value(1));
    tree.apply_server_overwrite(&Path::root(), node(json!({"a": {"x": 1}})));

    let events = tree.add_event_registration(
        &QuerySpec::default_at(Path::new("a")),
        EventRegistration::value(2),
    );
    assert_eq!(events_for(&events, 2), vec![(EventType::Value, "/a".to_string())]);
    assert_eq!(
        events[0].as_data().unwrap().node,
        node(json!({"x": 1}))
    );
    assert!(tree.has_complete_view(&Path::new("a")));
}

#[test]
fn test_tagged_data_reaches_only_its_query() {
    let mut tree = SyncTree::with_config(MockListenProvider::new(), SyncTreeConfig::new().with_first_tag(10));
    let first = limit_first("list", 1);
    let last = QuerySpec::new(
        Path::new("list"),
        by_key().limit_to_last(1).unwrap(),
    );
    tree.add_event_registration(&first, EventRegistration::value(1));
    tree.add_event_registration(&last, EventRegistration::value(2));
    assert_eq!(tree.tag_for_query(&first), Some(10));
    assert_eq!(tree.tag_for_query(&last), Some(11));

    let events = tree.apply_tagged_query_overwrite(&Path::new("list"), node(json!({"z": 26})), 11);
    assert_eq!(events_for(&events, 2), vec![(EventType::Value, "/list".to_string())]);
    assert!(events_for(&events, 1).is_empty());

    let events = tree.apply_tagged_listen_complete(&Path::new("list"), 10);
    assert_eq!(events_for(&events, 1), vec![(EventType::Value, "/list".to_string())]);

    assert!(tree
        .apply_tagged_query_overwrite(&Path::new("list"), Node::leaf(1), 99)
        .is_empty());
}

#[test]
fn test_failed_listen_cancels_without_unlisten() {
    let mut tree = new_tree();
    let query = limit_first("private", 5);
    tree.add_event_registration(&query, EventRegistration::value(1).with_cancel_callback());
    tree.add_event_registration(&query, EventRegistration::any_child());
    let request = tree.provider().last_started().unwrap().clone();
    assert_eq!(request.view_query, query);

    let events = tree.on_listen_complete(&request, ListenStatus::parse("permission_denied"));
    assert_eq!(events.len(), 1);
    let Event::Cancel(cancel) = &events[0] else {
        panic!("expected a cancel event");
    };
    assert_eq!(cancel.path, Path::new("private"));
    assert!(cancel.error.is_permission_denied());

    assert_eq!(tree.tag_for_query(&query), None);
    assert!(tree.provider().stopped().is_empty());
    assert!(tree.event_cache(&query).is_none());
}

#[test]
fn test_successful_listen_completes_view() {
    let mut tree = new_tree();
    let query = QuerySpec::default_at(Path::new("empty"));
    tree.add_event_registration(&query, EventRegistration::value(1));
    let request = tree.provider().last_started().unwrap().clone();
    assert_eq!(request.hash, "");

    let events = tree.on_listen_complete(&request, ListenStatus::Ok);
    assert_eq!(events_for(&events, 1), vec![(EventType::Value, "/empty".to_string())]);
    assert!(events[0].as_data().unwrap().node.is_empty());
}

#[test]
fn test_hidden_write_raises_no_events() {
    let mut tree = new_tree();
    let root = QuerySpec::default_at(Path::root());
    tree.add_event_registration(&root, EventRegistration::value(1));
    tree.apply_server_overwrite(&Path::root(), node(json!({"n": 1})));

    assert!(tree
        .apply_user_overwrite(&Path::new("n"), Node::leaf(2), 1, false)
        .is_empty());
    assert_eq!(tree.event_cache(&root), Some(&node(json!({"n": 1}))));
    assert_eq!(
        tree.calc_complete_event_cache(&Path::new("n"), &[]),
        Some(Node::leaf(2))
    );

    // Acking a hidden write leaves the views alone.
    assert!(tree.ack_user_write(1, false).is_empty());
    assert_eq!(tree.pending_write_count(), 0);
}

#[test]
fn test_server_merge_orders_events() {
    let mut tree = new_tree();
    let root = QuerySpec::default_at(Path::root());
    tree.add_event_registration(&root, all_types());
    tree.add_event_registration(&root, EventRegistration::value(1));
    tree.apply_server_overwrite(&Path::root(), node(json!({"a": 1, "b": 2})));

    let mut children = MergeChildren::new();
    children.insert(Path::new("a"), Node::leaf(10));
    children.insert(Path::new("c"), Node::leaf(3));
    children.insert(Path::new("b"), Node::empty());
    let events = tree.apply_server_merge(&Path::root(), &children);
    let types: Vec<EventType> = events.iter().filter_map(Event::event_type).collect();
    assert_eq!(
        types,
        vec![
            EventType::ChildRemoved,
            EventType::ChildAdded,
            EventType::ChildChanged,
            EventType::Value,
        ]
    );
    assert_eq!(tree.event_cache(&root), Some(&node(json!({"a": 10, "c": 3}))));
}

#[test]
fn test_user_merge_then_ack() {
    let mut tree = new_tree();
    let root = QuerySpec::default_at(Path::root());
    tree.add_event_registration(&root, all_types());
    tree.apply_server_overwrite(&Path::root(), node(json!({"a": 1, "b": {"x": 0}})));

    let mut children = MergeChildren::new();
    children.insert(Path::new("x"), Node::leaf(5));
    children.insert(Path::new("y"), Node::leaf(6));
    let events = tree.apply_user_merge(&Path::new("b"), &children, 1);
    assert_eq!(
        events_for(&events, 2),
        vec![(EventType::ChildChanged, "/b".to_string())]
    );

    tree.apply_server_overwrite(&Path::new("b"), node(json!({"x": 5, "y": 6})));
    let events = tree.ack_user_write(1, false);
    assert!(events.is_empty());
    assert_eq!(
        tree.event_cache(&root),
        Some(&node(json!({"a": 1, "b": {"x": 5, "y": 6}})))
    );
}

#[test]
fn test_value_ordered_query_moves_child() {
    let mut tree = new_tree();
    let params = QueryParams::new().order_by(Index::Value).unwrap();
    let query = QuerySpec::new(Path::new("scores"), params);
    tree.add_event_registration(&query, all_types());
    tree.apply_server_overwrite(&Path::new("scores"), node(json!({"ann": 1, "bob": 2})));

    let events = tree.apply_server_overwrite(&Path::new("scores/ann"), Node::leaf(3));
    let moved = events
        .iter()
        .filter_map(Event::as_data)
        .find(|e| e.event_type == EventType::ChildMoved)
        .unwrap();
    assert_eq!(moved.path, Path::new("scores/ann"));
    assert_eq!(moved.prev_name.as_deref(), Some("bob"));
    assert_eq!(
        events_for(&events, 2),
        vec![
            (EventType::ChildMoved, "/scores/ann".to_string()),
            (EventType::ChildChanged, "/scores/ann".to_string()),
        ]
    );
}
