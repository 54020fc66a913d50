//! Immutable tree snapshots.
//!
//! A [`Node`] is either a leaf (boolean, number, string or deferred server
//! value), a children node mapping names to non-empty child nodes, or the
//! internal maximum sentinel used as an upper bound for range queries. Nodes
//! are reference counted; updates share every untouched subtree with the
//! original.

use crate::index::{Index, NameOrder, NamedNode};
use crate::path::{Path, PRIORITY_KEY};
use crate::sorted_map::{SortedMap, SortedMapIter};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fmt;
use std::sync::{Arc, LazyLock, OnceLock};

/// Scalar payload of a leaf node.
#[derive(Debug, Clone)]
pub enum LeafValue {
    /// A boolean.
    Bool(bool),
    /// A finite number.
    Number(f64),
    /// A string.
    String(String),
    /// An unresolved server value such as `{".sv": "timestamp"}`.
    Deferred(Map<String, Value>),
}

impl LeafValue {
    fn type_rank(&self) -> u8 {
        match self {
            LeafValue::Deferred(_) => 0,
            LeafValue::Bool(_) => 1,
            LeafValue::Number(_) => 2,
            LeafValue::String(_) => 3,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            LeafValue::Deferred(_) => "object",
            LeafValue::Bool(_) => "boolean",
            LeafValue::Number(_) => "number",
            LeafValue::String(_) => "string",
        }
    }

    /// The number held by this value, if any.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            LeafValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The string held by this value, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            LeafValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub(crate) fn to_json(&self) -> Value {
        match self {
            LeafValue::Bool(b) => Value::Bool(*b),
            LeafValue::Number(n) => number_to_json(*n),
            LeafValue::String(s) => Value::String(s.clone()),
            LeafValue::Deferred(map) => Value::Object(map.clone()),
        }
    }

    fn compare(&self, other: &LeafValue) -> Ordering {
        match (self, other) {
            (LeafValue::Bool(a), LeafValue::Bool(b)) => a.cmp(b),
            (LeafValue::Number(a), LeafValue::Number(b)) => {
                a.partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (LeafValue::String(a), LeafValue::String(b)) => a.cmp(b),
            (LeafValue::Deferred(_), LeafValue::Deferred(_)) => Ordering::Equal,
            (a, b) => a.type_rank().cmp(&b.type_rank()),
        }
    }

    fn hash_text(&self) -> String {
        match self {
            LeafValue::Number(n) => format!("{:016x}", n.to_bits()),
            LeafValue::Bool(b) => b.to_string(),
            LeafValue::String(s) => s.clone(),
            LeafValue::Deferred(map) => Value::Object(map.clone()).to_string(),
        }
    }
}

impl PartialEq for LeafValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (LeafValue::Bool(a), LeafValue::Bool(b)) => a == b,
            (LeafValue::Number(a), LeafValue::Number(b)) => a == b,
            (LeafValue::String(a), LeafValue::String(b)) => a == b,
            (LeafValue::Deferred(a), LeafValue::Deferred(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for LeafValue {
    fn from(value: bool) -> Self {
        LeafValue::Bool(value)
    }
}

impl From<f64> for LeafValue {
    fn from(value: f64) -> Self {
        LeafValue::Number(value)
    }
}

impl From<i64> for LeafValue {
    fn from(value: i64) -> Self {
        LeafValue::Number(value as f64)
    }
}

impl From<i32> for LeafValue {
    fn from(value: i32) -> Self {
        LeafValue::Number(f64::from(value))
    }
}

impl From<&str> for LeafValue {
    fn from(value: &str) -> Self {
        LeafValue::String(value.to_string())
    }
}

impl From<String> for LeafValue {
    fn from(value: String) -> Self {
        LeafValue::String(value)
    }
}

pub(crate) fn number_to_json(n: f64) -> Value {
    const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

type ChildMap = SortedMap<String, Node, NameOrder>;
type IndexedChildren = SortedMap<NamedNode, (), Index>;

/// Secondary orderings of a children node, built on demand.
#[derive(Clone, Default)]
struct IndexMap {
    entries: Vec<(Index, IndexedChildren)>,
}

impl IndexMap {
    fn get(&self, index: &Index) -> Option<&IndexedChildren> {
        self.entries
            .iter()
            .find_map(|(i, sorted)| (i == index).then_some(sorted))
    }

    fn with_index(&self, index: &Index, children: &ChildMap) -> Self {
        let sorted = children.iter().fold(IndexedChildren::new(index.clone()), |acc, (name, node)| {
            acc.insert(NamedNode::new(name.clone(), node.clone()), ())
        });
        let mut entries = self.entries.clone();
        entries.push((index.clone(), sorted));
        Self { entries }
    }

    fn with_child(&self, name: &str, child: &Node, existing: &ChildMap) -> Self {
        let previous = existing.get(&name.to_string()).cloned();
        let entries = self
            .entries
            .iter()
            .map(|(index, sorted)| {
                let sorted = match &previous {
                    Some(old) => sorted.remove(&NamedNode::new(name, old.clone())),
                    None => sorted.clone(),
                };
                let sorted = if child.is_empty() {
                    sorted
                } else {
                    sorted.insert(NamedNode::new(name, child.clone()), ())
                };
                (index.clone(), sorted)
            })
            .collect();
        Self { entries }
    }
}

enum NodeData {
    Leaf {
        value: LeafValue,
        priority: Option<Node>,
        hash: OnceLock<String>,
    },
    Children {
        children: ChildMap,
        priority: Option<Node>,
        indexes: IndexMap,
        hash: OnceLock<String>,
    },
    Max,
}

static EMPTY_NODE: LazyLock<Node> = LazyLock::new(|| {
    Node(Arc::new(NodeData::Children {
        children: ChildMap::new(NameOrder),
        priority: None,
        indexes: IndexMap::default(),
        hash: OnceLock::new(),
    }))
});

static MAX_NODE: LazyLock<Node> = LazyLock::new(|| Node(Arc::new(NodeData::Max)));

/// An immutable snapshot of a JSON-like tree.
#[derive(Clone)]
pub struct Node(Arc<NodeData>);

impl Node {
    /// The empty node, used for absent data.
    pub fn empty() -> Node {
        EMPTY_NODE.clone()
    }

    /// The maximum sentinel. Sorts after every other node.
    pub fn max() -> Node {
        MAX_NODE.clone()
    }

    /// A leaf without priority.
    pub fn leaf(value: impl Into<LeafValue>) -> Node {
        Self::make_leaf(value.into(), None)
    }

    fn make_leaf(value: LeafValue, priority: Option<Node>) -> Node {
        Node(Arc::new(NodeData::Leaf {
            value,
            priority,
            hash: OnceLock::new(),
        }))
    }

    fn make_children(children: ChildMap, priority: Option<Node>, indexes: IndexMap) -> Node {
        Node(Arc::new(NodeData::Children {
            children,
            priority,
            indexes,
            hash: OnceLock::new(),
        }))
    }

    /// Whether this is a leaf.
    pub fn is_leaf(&self) -> bool {
        matches!(*self.0, NodeData::Leaf { .. })
    }

    /// Whether this node holds no data.
    pub fn is_empty(&self) -> bool {
        matches!(&*self.0, NodeData::Children { children, .. } if children.is_empty())
    }

    /// Whether this is the maximum sentinel.
    pub fn is_max(&self) -> bool {
        matches!(*self.0, NodeData::Max)
    }

    /// The scalar payload of a leaf.
    pub fn leaf_value(&self) -> Option<&LeafValue> {
        match &*self.0 {
            NodeData::Leaf { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Whether both handles point at the same allocation.
    pub fn ptr_eq(&self, other: &Node) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// This node's priority, or the empty node.
    pub fn priority(&self) -> Node {
        match &*self.0 {
            NodeData::Leaf { priority, .. } | NodeData::Children { priority, .. } => {
                priority.clone().unwrap_or_else(Node::empty)
            }
            NodeData::Max => Node::empty(),
        }
    }

    /// Return this node with a different priority.
    ///
    /// Empty children nodes never carry a priority.
    ///
    /// # Panics
    ///
    /// Panics if `priority` is not empty, a number, a string, a server value
    /// or the maximum sentinel.
    pub fn update_priority(&self, priority: Node) -> Node {
        let priority = normalize_priority(priority);
        match &*self.0 {
            NodeData::Leaf { value, .. } => Self::make_leaf(value.clone(), priority),
            NodeData::Children {
                children, indexes, ..
            } => {
                if children.is_empty() {
                    Node::empty()
                } else {
                    Self::make_children(children.clone(), priority, indexes.clone())
                }
            }
            NodeData::Max => self.clone(),
        }
    }

    /// The direct child named `name`, or the empty node.
    pub fn immediate_child(&self, name: &str) -> Node {
        if name == PRIORITY_KEY {
            return self.priority();
        }
        match &*self.0 {
            NodeData::Children { children, .. } => children
                .get(&name.to_string())
                .cloned()
                .unwrap_or_else(Node::empty),
            _ => Node::empty(),
        }
    }

    /// The descendant at `path`, or the empty node.
    pub fn child(&self, path: &Path) -> Node {
        path.segments()
            .iter()
            .fold(self.clone(), |node, segment| node.immediate_child(segment))
    }

    /// Whether a direct child named `name` exists.
    pub fn has_child(&self, name: &str) -> bool {
        if name == PRIORITY_KEY {
            return !self.priority().is_empty();
        }
        match &*self.0 {
            NodeData::Children { children, .. } => children.contains_key(&name.to_string()),
            _ => false,
        }
    }

    /// Number of direct children.
    pub fn num_children(&self) -> usize {
        match &*self.0 {
            NodeData::Children { children, .. } => children.len(),
            _ => 0,
        }
    }

    /// Replace (or remove, when `child` is empty) the direct child `name`.
    ///
    /// Removing the last child also drops the priority. Setting a child on a
    /// leaf turns it into a children node that keeps the leaf's priority.
    pub fn update_immediate_child(&self, name: &str, child: Node) -> Node {
        if name == PRIORITY_KEY {
            return self.update_priority(child);
        }
        match &*self.0 {
            NodeData::Leaf { priority, .. } => {
                if child.is_empty() {
                    return self.clone();
                }
                let priority = priority.clone().unwrap_or_else(Node::empty);
                Node::empty()
                    .update_immediate_child(name, child)
                    .update_priority(priority)
            }
            NodeData::Children {
                children,
                priority,
                indexes,
                ..
            } => {
                let key = name.to_string();
                if child.is_empty() && !children.contains_key(&key) {
                    return self.clone();
                }
                let new_indexes = indexes.with_child(name, &child, children);
                let new_children = if child.is_empty() {
                    children.remove(&key)
                } else {
                    children.insert(key, child)
                };
                let priority = if new_children.is_empty() {
                    None
                } else {
                    priority.clone()
                };
                Self::make_children(new_children, priority, new_indexes)
            }
            NodeData::Max => self.clone(),
        }
    }

    /// Replace the descendant at `path`. An empty path replaces the node.
    pub fn update_child(&self, path: &Path, child: Node) -> Node {
        let Some(front) = path.front() else {
            return child;
        };
        if self.is_leaf() && child.is_empty() && front != PRIORITY_KEY {
            return self.clone();
        }
        let current = self.immediate_child(front);
        let updated = current.update_child(&path.pop_front(), child);
        if updated.ptr_eq(&current) {
            return self.clone();
        }
        self.update_immediate_child(front, updated)
    }

    /// Return this node with an ordering for `index` built ahead of time.
    pub fn with_index(&self, index: &Index) -> Node {
        match &*self.0 {
            NodeData::Children {
                children,
                priority,
                indexes,
                ..
            } if *index != Index::Key && indexes.get(index).is_none() => Self::make_children(
                children.clone(),
                priority.clone(),
                indexes.with_index(index, children),
            ),
            _ => self.clone(),
        }
    }

    /// Whether iterating by `index` needs no sorting.
    pub fn is_indexed(&self, index: &Index) -> bool {
        match &*self.0 {
            NodeData::Children { indexes, .. } => {
                *index == Index::Key || indexes.get(index).is_some()
            }
            _ => true,
        }
    }

    /// Children in name order.
    pub fn children(&self) -> ChildIter<'_> {
        self.iter_by(&Index::Key)
    }

    /// Children ordered by `index`.
    pub fn iter_by(&self, index: &Index) -> ChildIter<'_> {
        self.child_iter(index, None, false)
    }

    /// Children ordered by `index`, largest first.
    pub fn reverse_iter_by(&self, index: &Index) -> ChildIter<'_> {
        self.child_iter(index, None, true)
    }

    /// Children ordered by `index`, starting at the first one `>= start`.
    pub fn iter_from(&self, start: &NamedNode, index: &Index) -> ChildIter<'_> {
        self.child_iter(index, Some(start), false)
    }

    /// Children ordered by `index` descending, starting at the last one `<= start`.
    pub fn reverse_iter_from(&self, start: &NamedNode, index: &Index) -> ChildIter<'_> {
        self.child_iter(index, Some(start), true)
    }

    fn child_iter(&self, index: &Index, start: Option<&NamedNode>, reverse: bool) -> ChildIter<'_> {
        let NodeData::Children {
            children, indexes, ..
        } = &*self.0
        else {
            return ChildIter::Empty;
        };
        if *index == Index::Key {
            let start = start.map(|s| s.name.clone());
            let iter = match (start, reverse) {
                (None, false) => children.iter(),
                (None, true) => children.reverse_iter(),
                (Some(s), false) => children.iter_from(&s),
                (Some(s), true) => children.reverse_iter_from(&s),
            };
            return ChildIter::ByName(iter);
        }
        if let Some(sorted) = indexes.get(index) {
            let iter = match (start, reverse) {
                (None, false) => sorted.iter(),
                (None, true) => sorted.reverse_iter(),
                (Some(s), false) => sorted.iter_from(s),
                (Some(s), true) => sorted.reverse_iter_from(s),
            };
            return ChildIter::Indexed(iter);
        }
        let mut sorted: Vec<NamedNode> = children
            .iter()
            .map(|(name, node)| NamedNode::new(name.clone(), node.clone()))
            .collect();
        sorted.sort_by(|a, b| index.compare(a, b));
        if reverse {
            sorted.reverse();
        }
        if let Some(start) = start {
            sorted.retain(|child| {
                let ord = index.compare(child, start);
                if reverse {
                    ord != Ordering::Greater
                } else {
                    ord != Ordering::Less
                }
            });
        }
        ChildIter::Sorted(sorted.into_iter())
    }

    /// The first child under `index`.
    pub fn first_child(&self, index: &Index) -> Option<NamedNode> {
        self.iter_by(index).next()
    }

    /// The last child under `index`.
    pub fn last_child(&self, index: &Index) -> Option<NamedNode> {
        self.reverse_iter_by(index).next()
    }

    /// Name of the child that precedes `name` (holding `child`) under `index`.
    pub fn predecessor_child_name(&self, name: &str, child: &Node, index: &Index) -> Option<String> {
        let NodeData::Children {
            children, indexes, ..
        } = &*self.0
        else {
            return None;
        };
        if *index == Index::Key {
            return children.predecessor_key(&name.to_string()).cloned();
        }
        let target = NamedNode::new(name, child.clone());
        if let Some(sorted) = indexes.get(index) {
            return sorted.predecessor_key(&target).map(|n| n.name.clone());
        }
        children
            .iter()
            .map(|(n, c)| NamedNode::new(n.clone(), c.clone()))
            .filter(|candidate| index.compare(candidate, &target) == Ordering::Less)
            .max_by(|a, b| index.compare(a, b))
            .map(|n| n.name)
    }

    /// Total order across nodes: empty < leaves < children nodes < max.
    ///
    /// Leaves compare by type (server value, boolean, number, string) and then
    /// by value. Any two non-empty children nodes compare equal.
    pub fn compare_to(&self, other: &Node) -> Ordering {
        match (&*self.0, &*other.0) {
            (NodeData::Max, NodeData::Max) => Ordering::Equal,
            (NodeData::Max, _) => Ordering::Greater,
            (_, NodeData::Max) => Ordering::Less,
            _ if self.is_empty() && other.is_empty() => Ordering::Equal,
            _ if self.is_empty() => Ordering::Less,
            _ if other.is_empty() => Ordering::Greater,
            (NodeData::Leaf { value: a, .. }, NodeData::Leaf { value: b, .. }) => a.compare(b),
            (NodeData::Leaf { .. }, _) => Ordering::Less,
            (_, NodeData::Leaf { .. }) => Ordering::Greater,
            _ => Ordering::Equal,
        }
    }

    /// Content hash of this node, empty for the empty node.
    ///
    /// Equal trees always produce equal hashes. The hash is SHA-256 rendered
    /// as 64 lowercase hex digits, stable across processes. It is only
    /// comparable with hashes from this crate: servers that hash with SHA-1
    /// and base64 will never match it, so it must not be sent as a listen
    /// hash to such a server.
    pub fn content_hash(&self) -> String {
        match &*self.0 {
            NodeData::Leaf {
                value,
                priority,
                hash,
            } => hash
                .get_or_init(|| {
                    let mut text = priority_hash_prefix(priority.as_ref());
                    text.push_str(value.type_name());
                    text.push(':');
                    text.push_str(&value.hash_text());
                    sha256_hex(&text)
                })
                .clone(),
            NodeData::Children {
                children,
                priority,
                hash,
                ..
            } => hash
                .get_or_init(|| {
                    let mut text = priority_hash_prefix(priority.as_ref());
                    for child in self.iter_by(&Index::Priority) {
                        let child_hash = child.node.content_hash();
                        if !child_hash.is_empty() {
                            text.push(':');
                            text.push_str(&child.name);
                            text.push(':');
                            text.push_str(&child_hash);
                        }
                    }
                    debug_assert!(!children.is_empty() || text.is_empty());
                    if text.is_empty() {
                        String::new()
                    } else {
                        sha256_hex(&text)
                    }
                })
                .clone(),
            NodeData::Max => String::new(),
        }
    }
}

fn normalize_priority(priority: Node) -> Option<Node> {
    if priority.is_empty() {
        return None;
    }
    match &*priority.0 {
        NodeData::Max => Some(priority),
        NodeData::Leaf {
            value: LeafValue::Bool(_),
            ..
        } => panic!("priority must be a string, number or server value"),
        NodeData::Leaf {
            value,
            priority: Some(_),
            ..
        } => Some(Node::make_leaf(value.clone(), None)),
        NodeData::Leaf { .. } => Some(priority),
        NodeData::Children { .. } => panic!("priority must be a string, number or server value"),
    }
}

fn priority_hash_prefix(priority: Option<&Node>) -> String {
    match priority.and_then(Node::leaf_value) {
        Some(LeafValue::Number(n)) => format!("priority:number:{:016x}:", n.to_bits()),
        Some(value) => format!("priority:string:{}:", value.hash_text()),
        None => String::new(),
    }
}

fn sha256_hex(text: &str) -> String {
    Sha256::digest(text.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        match (&*self.0, &*other.0) {
            (
                NodeData::Leaf {
                    value: a,
                    priority: pa,
                    ..
                },
                NodeData::Leaf {
                    value: b,
                    priority: pb,
                    ..
                },
            ) => a == b && pa == pb,
            (
                NodeData::Children {
                    children: a,
                    priority: pa,
                    ..
                },
                NodeData::Children {
                    children: b,
                    priority: pb,
                    ..
                },
            ) => {
                pa == pb
                    && a.len() == b.len()
                    && a
                        .iter()
                        .zip(b.iter())
                        .all(|((na, ca), (nb, cb))| na == nb && ca == cb)
            }
            (NodeData::Max, NodeData::Max) => true,
            _ => false,
        }
    }
}

impl Default for Node {
    fn default() -> Self {
        Node::empty()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_max() {
            return f.write_str("Node(MAX)");
        }
        write!(f, "Node({})", self.to_json(true))
    }
}

/// Iterator over the children of a [`Node`].
pub enum ChildIter<'a> {
    /// Walks the name-ordered child map.
    ByName(SortedMapIter<'a, String, Node>),
    /// Walks a prebuilt secondary index.
    Indexed(SortedMapIter<'a, NamedNode, ()>),
    /// Walks a temporary sorted copy.
    Sorted(std::vec::IntoIter<NamedNode>),
    /// No children.
    Empty,
}

impl Iterator for ChildIter<'_> {
    type Item = NamedNode;

    fn next(&mut self) -> Option<NamedNode> {
        match self {
            ChildIter::ByName(iter) => iter
                .next()
                .map(|(name, node)| NamedNode::new(name.clone(), node.clone())),
            ChildIter::Indexed(iter) => iter.next().map(|(named, ())| named.clone()),
            ChildIter::Sorted(iter) => iter.next(),
            ChildIter::Empty => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(value: Value) -> Node {
        Node::from_json(&value).unwrap()
    }

    fn names(iter: ChildIter<'_>) -> Vec<String> {
        iter.map(|c| c.name).collect()
    }

    #[test]
    fn test_empty_node() {
        let empty = Node::empty();
        assert!(empty.is_empty());
        assert!(!empty.is_leaf());
        assert_eq!(empty.num_children(), 0);
        assert_eq!(empty.content_hash(), "");
        assert!(empty.immediate_child("x").is_empty());
    }

    #[test]
    fn test_update_child_creates_intermediates() {
        let root = Node::empty().update_child(&Path::new("a/b/c"), Node::leaf(1));
        assert_eq!(root.child(&Path::new("a/b/c")), Node::leaf(1));
        assert_eq!(root.num_children(), 1);
    }

    #[test]
    fn test_removing_last_child_prunes_and_drops_priority() {
        let root = node(json!({"a": {"b": 1}, ".priority": 3}));
        let pruned = root.update_child(&Path::new("a/b"), Node::empty());
        assert!(pruned.is_empty());
        assert!(pruned.priority().is_empty());
    }

    #[test]
    fn test_leaf_gains_child() {
        let leaf = Node::leaf("x").update_priority(Node::leaf(5));
        let updated = leaf.update_immediate_child("k", Node::leaf(true));
        assert!(!updated.is_leaf());
        assert_eq!(updated.immediate_child("k"), Node::leaf(true));
        assert_eq!(updated.priority(), Node::leaf(5));
        assert_eq!(leaf.update_immediate_child("k", Node::empty()), leaf);
    }

    #[test]
    fn test_priority_pseudo_child() {
        let root = node(json!({"a": 1}));
        let with_priority = root.update_immediate_child(PRIORITY_KEY, Node::leaf("p"));
        assert_eq!(with_priority.child(&Path::new(".priority")), Node::leaf("p"));
        assert!(with_priority.has_child(PRIORITY_KEY));
        assert!(Node::empty()
            .update_priority(Node::leaf(1))
            .priority()
            .is_empty());
    }

    #[test]
    #[should_panic(expected = "priority must be")]
    fn test_boolean_priority_panics() {
        let _ = Node::leaf(1).update_priority(Node::leaf(true));
    }

    #[test]
    fn test_compare_to_type_order() {
        let ordered = [
            Node::empty(),
            Node::leaf(false),
            Node::leaf(true),
            Node::leaf(-1),
            Node::leaf(10),
            Node::leaf("a"),
            node(json!({"x": 1})),
            Node::max(),
        ];
        for pair in ordered.windows(2) {
            assert_eq!(pair[0].compare_to(&pair[1]), Ordering::Less, "{pair:?}");
        }
        assert_eq!(
            node(json!({"x": 1})).compare_to(&node(json!({"y": 2}))),
            Ordering::Equal
        );
    }

    #[test]
    fn test_iteration_by_index() {
        let root = node(json!({
            "a": {".value": 1, ".priority": 3},
            "b": {".value": 2, ".priority": 1},
            "c": {".value": 0, ".priority": 2},
        }));
        assert_eq!(names(root.children()), vec!["a", "b", "c"]);
        assert_eq!(names(root.iter_by(&Index::Priority)), vec!["b", "c", "a"]);
        assert_eq!(names(root.iter_by(&Index::Value)), vec!["c", "a", "b"]);
        let indexed = root.with_index(&Index::Value);
        assert!(indexed.is_indexed(&Index::Value));
        assert!(!root.is_indexed(&Index::Value));
        assert_eq!(names(indexed.reverse_iter_by(&Index::Value)), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_index_survives_updates() {
        let root = node(json!({"a": 3, "b": 1})).with_index(&Index::Value);
        let updated = root
            .update_immediate_child("c", Node::leaf(2))
            .update_immediate_child("a", Node::empty());
        assert!(updated.is_indexed(&Index::Value));
        assert_eq!(names(updated.iter_by(&Index::Value)), vec!["b", "c"]);
    }

    #[test]
    fn test_iter_from_start_post() {
        let root = node(json!({"a": 1, "b": 2, "c": 3, "d": 4}));
        let start = Index::Value.make_post(&Node::leaf(2), crate::index::MIN_NAME);
        assert_eq!(names(root.iter_from(&start, &Index::Value)), vec!["b", "c", "d"]);
        let indexed = root.with_index(&Index::Value);
        assert_eq!(
            names(indexed.reverse_iter_from(&Index::Value.make_post(&Node::leaf(3), crate::index::MAX_NAME), &Index::Value)),
            vec!["c", "b", "a"]
        );
    }

    #[test]
    fn test_predecessor_child_name() {
        let root = node(json!({"a": 3, "b": 1, "c": 2}));
        assert_eq!(root.predecessor_child_name("b", &Node::leaf(1), &Index::Key), Some("a".into()));
        assert_eq!(root.predecessor_child_name("a", &Node::leaf(3), &Index::Value), Some("c".into()));
        let indexed = root.with_index(&Index::Value);
        assert_eq!(indexed.predecessor_child_name("b", &Node::leaf(1), &Index::Value), None);
        assert_eq!(indexed.first_child(&Index::Value).map(|c| c.name), Some("b".into()));
        assert_eq!(indexed.last_child(&Index::Value).map(|c| c.name), Some("a".into()));
    }

    #[test]
    fn test_structural_equality() {
        let a = node(json!({"x": {"y": 1}, "z": "s"}));
        let b = Node::empty()
            .update_child(&Path::new("z"), Node::leaf("s"))
            .update_child(&Path::new("x/y"), Node::leaf(1));
        assert_eq!(a, b);
        assert_ne!(a, a.update_priority(Node::leaf(1)));
        assert_eq!(Node::leaf(1), Node::leaf(1.0));
    }

    #[test]
    fn test_content_hash() {
        let a = node(json!({"x": 1, "y": "two"}));
        let b = node(json!({"y": "two", "x": 1}));
        assert_eq!(a.content_hash(), b.content_hash());
        assert_eq!(a.content_hash().len(), 64);
        assert_ne!(a.content_hash(), node(json!({"x": 2, "y": "two"})).content_hash());
        assert_ne!(
            Node::leaf(1).content_hash(),
            Node::leaf(1).update_priority(Node::leaf(1)).content_hash()
        );
    }

    #[test]
    fn test_content_hash_format_is_stable() {
        let hash = Node::leaf("abc").content_hash();
        assert_eq!(hash, "f646a8d0c76172e357c85a1fc8f96a55326fe4515eac25d70354ae6f94fa45ce");
        let tree = node(json!({"a": [1, 2], "b": {"c": true}})).content_hash();
        assert_eq!(tree.len(), 64);
        assert!(tree.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
        assert_eq!(tree, node(json!({"b": {"c": true}, "a": [1, 2]})).content_hash());
    }

    #[test]
    fn test_updates_share_untouched_subtrees() {
        let root = node(json!({"a": {"deep": 1}, "b": 2}));
        let updated = root.update_child(&Path::new("b"), Node::leaf(3));
        assert!(root.immediate_child("a").ptr_eq(&updated.immediate_child("a")));
        assert!(root.update_child(&Path::new("missing"), Node::empty()).ptr_eq(&root));
    }
}
