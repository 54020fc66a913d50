//! Property tests for the snapshot model, compound writes and views.

use livetree_core::CompoundWrite;
use livetree_snapshot::{Index, Node, Path};
use livetree_sync_protocol::{EventRegistration, EventType, QuerySpec};
use livetree_testkit::prelude::*;
use proptest::prelude::*;
use std::collections::{BTreeMap, HashSet};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_update_shares_untouched_children(
        base in object_node_strategy(),
        path in non_root_path_strategy(3),
        value in node_strategy(),
    ) {
        let before = base.to_json(true);
        let updated = base.update_child(&path, value.clone());

        prop_assert_eq!(base.to_json(true), before);
        prop_assert_eq!(updated.child(&path), value);
        let front = path.front().unwrap();
        for child in base.children().filter(|c| c.name != front) {
            prop_assert!(updated.immediate_child(&child.name).ptr_eq(&child.node));
        }
    }

    #[test]
    fn prop_compound_write_is_idempotent(
        base in node_strategy(),
        first in (path_strategy(2), node_strategy()),
        second in (path_strategy(2), node_strategy()),
    ) {
        let once = CompoundWrite::new()
            .add_write(&first.0, first.1.clone())
            .add_write(&second.0, second.1.clone());
        let twice = once.add_write(&second.0, second.1.clone());
        prop_assert_eq!(once.apply(&base), twice.apply(&base));
    }

    #[test]
    fn prop_compound_write_reads_back(
        base in node_strategy(),
        path in path_strategy(3),
        value in node_strategy(),
    ) {
        let write = CompoundWrite::new().add_write(&path, value.clone());
        prop_assert_eq!(write.apply(&base).child(&path), value.clone());
        prop_assert_eq!(write.complete_node(&path), Some(value));
        prop_assert!(write.has_complete_write(&path));
        prop_assert!(write.remove_write(&path).is_empty());
    }

    #[test]
    fn prop_child_events_are_coherent(ops in prop::collection::vec(child_op_strategy(), 1..24)) {
        init_tracing();
        let mut driver = TreeDriver::new();
        let query = QuerySpec::default_at(Path::root());
        driver.listen(&query, all_child_events(2));
        driver.server_set("", serde_json::json!({}));

        let mut server = Node::empty();
        let mut user: Vec<(String, Node)> = Vec::new();
        let mut next_id = 1;
        for op in &ops {
            let events = match op {
                ChildOp::ServerSet(key, value) => {
                    server = server.update_immediate_child(key, value.clone());
                    driver.tree.apply_server_overwrite(&Path::new(key), value.clone())
                }
                ChildOp::UserSet(key, value) => {
                    user.retain(|(k, _)| k != key);
                    user.push((key.clone(), value.clone()));
                    next_id += 1;
                    driver.tree.apply_user_overwrite(&Path::new(key), value.clone(), next_id, true)
                }
            };

            let mut added = HashSet::new();
            let mut removed = HashSet::new();
            let mut seen = HashSet::new();
            for event in events.iter().filter_map(|e| e.as_data()) {
                let key = event.path.back().unwrap_or_default().to_string();
                prop_assert_eq!(key.as_str(), op.key());
                prop_assert!(seen.insert((event.event_type, key.clone())));
                match event.event_type {
                    EventType::ChildAdded => { added.insert(key); }
                    EventType::ChildRemoved => { removed.insert(key); }
                    _ => {}
                }
            }
            prop_assert!(added.is_disjoint(&removed));
        }

        let mut expected = server;
        for (key, value) in user {
            expected = expected.update_immediate_child(&key, value);
        }
        prop_assert_eq!(driver.tree.event_cache(&query), Some(&expected));
    }

    #[test]
    fn prop_limit_window_holds_edge_children(
        initial in object_node_strategy(),
        ops in window_ops_strategy(16),
        limit in 1usize..4,
        from_end in any::<bool>(),
    ) {
        init_tracing();
        let mut driver = TreeDriver::new();
        let query = if from_end { limit_last("", limit) } else { limit_first("", limit) };
        driver.listen(&QuerySpec::default_at(Path::root()), EventRegistration::value(1));
        driver.listen(&query, all_child_events(2));

        let mut server = initial.clone();
        let mut user: BTreeMap<String, Node> = BTreeMap::new();
        let mut next_id = 0;
        driver.tree.apply_server_overwrite(&Path::root(), initial);
        for op in ops {
            let events = match op {
                WindowOp::Server(key, value) => {
                    server = server.update_immediate_child(&key, value.clone());
                    driver.tree.apply_server_overwrite(&Path::new(&key), value)
                }
                WindowOp::UserSet(key, value) => {
                    user.insert(key.clone(), value.clone());
                    next_id += 1;
                    driver.tree.apply_user_overwrite(&Path::new(&key), value, next_id, true)
                }
                WindowOp::UserMerge(children) => {
                    user.extend(children.iter().cloned());
                    next_id += 1;
                    let merge = WindowOp::merge_children(&children);
                    driver.tree.apply_user_merge(&Path::root(), &merge, next_id)
                }
            };

            let mut visible = server.clone();
            for (key, value) in &user {
                visible = visible.update_immediate_child(key, value.clone());
            }
            let edge = if from_end {
                visible.reverse_iter_by(&Index::Key)
            } else {
                visible.iter_by(&Index::Key)
            };
            let mut expected: Vec<String> = edge.take(limit).map(|c| c.name).collect();
            expected.sort();

            let window = driver.tree.event_cache(&query).cloned().unwrap_or_default();
            let actual: Vec<String> = window.iter_by(&Index::Key).map(|c| c.name).collect();
            prop_assert_eq!(&actual, &expected);
            prop_assert!(window.num_children() <= limit);
            for name in &expected {
                prop_assert_eq!(window.immediate_child(name), visible.immediate_child(name));
            }

            for event in events.iter().filter_map(|e| e.as_data()) {
                if event.event_type == EventType::ChildAdded {
                    let name = event.path.back().unwrap_or_default();
                    prop_assert!(expected.iter().any(|k| k == name));
                }
            }
        }
    }
}
