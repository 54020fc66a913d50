//! Property-based test generators using proptest.
//!
//! Keys are drawn from a small alphabet so that generated writes collide
//! with each other and with generated trees often.

use livetree_core::MergeChildren;
use livetree_snapshot::{Node, Path};
use proptest::prelude::*;
use serde_json::{Map, Value};

/// Strategy for child keys: short letter keys and integer-like keys, which
/// sort before every other key.
pub fn key_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        3 => prop::string::string_regex("[a-f]{1,2}").expect("Invalid regex"),
        1 => (0u32..20).prop_map(|n| n.to_string()),
    ]
}

/// Strategy for paths of at most `max_depth` segments, root included.
pub fn path_strategy(max_depth: usize) -> impl Strategy<Value = Path> {
    prop::collection::vec(key_strategy(), 0..=max_depth).prop_map(Path::from_segments)
}

/// Strategy for paths of one to `max_depth` segments.
pub fn non_root_path_strategy(max_depth: usize) -> impl Strategy<Value = Path> {
    prop::collection::vec(key_strategy(), 1..=max_depth.max(1)).prop_map(Path::from_segments)
}

/// Strategy for JSON scalars.
pub fn leaf_json_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        (-100i64..100).prop_map(Value::from),
        prop::string::string_regex("[a-z]{0,4}")
            .expect("Invalid regex")
            .prop_map(Value::String),
    ]
}

/// Strategy for JSON trees up to three levels deep.
pub fn json_tree_strategy() -> impl Strategy<Value = Value> {
    leaf_json_strategy().prop_recursive(3, 32, 4, |inner| {
        prop::collection::btree_map(key_strategy(), inner, 0..4)
            .prop_map(|children| Value::Object(children.into_iter().collect::<Map<_, _>>()))
    })
}

/// Strategy for nodes built from [`json_tree_strategy`].
pub fn node_strategy() -> impl Strategy<Value = Node> {
    json_tree_strategy().prop_filter_map("JSON must convert to a node", |json| {
        Node::from_json(&json).ok()
    })
}

/// Strategy for nodes with children, never leaves or empty.
pub fn object_node_strategy() -> impl Strategy<Value = Node> {
    prop::collection::btree_map(key_strategy(), json_tree_strategy(), 1..6).prop_filter_map(
        "object must convert to a non-empty node",
        |children| {
            let json = Value::Object(children.into_iter().collect());
            Node::from_json(&json).ok().filter(|node| !node.is_empty())
        },
    )
}

/// Strategy for merge children addressed by single keys.
pub fn merge_strategy() -> impl Strategy<Value = MergeChildren> {
    prop::collection::btree_map(key_strategy(), node_strategy(), 1..4).prop_map(|children| {
        children
            .into_iter()
            .map(|(key, node)| (Path::new(&key), node))
            .collect()
    })
}

/// One write against a direct child of the root.
#[derive(Debug, Clone)]
pub enum ChildOp {
    /// Server data for the child. Empty removes it.
    ServerSet(String, Node),
    /// A visible user overwrite of the child. Empty deletes it.
    UserSet(String, Node),
}

impl ChildOp {
    /// The child key written.
    pub fn key(&self) -> &str {
        match self {
            ChildOp::ServerSet(key, _) | ChildOp::UserSet(key, _) => key,
        }
    }
}

/// Strategy for a value written to a child: usually a scalar, sometimes a
/// small tree, sometimes a removal.
pub fn child_value_strategy() -> impl Strategy<Value = Node> {
    prop_oneof![
        4 => leaf_json_strategy().prop_filter_map("scalar must convert", |json| Node::from_json(&json).ok()),
        1 => node_strategy(),
        1 => Just(Node::empty()),
    ]
}

/// Strategy for a single [`ChildOp`].
pub fn child_op_strategy() -> impl Strategy<Value = ChildOp> {
    prop_oneof![
        2 => (key_strategy(), child_value_strategy()).prop_map(|(k, v)| ChildOp::ServerSet(k, v)),
        1 => (key_strategy(), child_value_strategy()).prop_map(|(k, v)| ChildOp::UserSet(k, v)),
    ]
}

/// One write that can move a limit window: server data for a child, a user
/// overwrite of a child, or a user merge over several children.
#[derive(Debug, Clone)]
pub enum WindowOp {
    /// Server data for the child. Empty removes it.
    Server(String, Node),
    /// A visible user overwrite of the child.
    UserSet(String, Node),
    /// A user merge at the root over the listed children.
    UserMerge(Vec<(String, Node)>),
}

impl WindowOp {
    /// The merge children of a [`WindowOp::UserMerge`], keyed by path.
    pub fn merge_children(children: &[(String, Node)]) -> MergeChildren {
        children
            .iter()
            .map(|(key, node)| (Path::new(key), node.clone()))
            .collect()
    }
}

/// Strategy for a sequence of [`WindowOp`]s, server writes most common.
pub fn window_ops_strategy(max_len: usize) -> impl Strategy<Value = Vec<WindowOp>> {
    let op = prop_oneof![
        3 => (key_strategy(), child_value_strategy()).prop_map(|(k, v)| WindowOp::Server(k, v)),
        1 => (key_strategy(), child_value_strategy()).prop_map(|(k, v)| WindowOp::UserSet(k, v)),
        1 => prop::collection::btree_map(key_strategy(), child_value_strategy(), 1..3)
            .prop_map(|children| WindowOp::UserMerge(children.into_iter().collect())),
    ];
    prop::collection::vec(op, 1..=max_len.max(1))
}
