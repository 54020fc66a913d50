//! Child orderings.
//!
//! Children of a node can be ordered by key, by priority, by their own value
//! or by the value of a descendant. Each ordering is an [`Index`]. Indexes
//! compare [`NamedNode`]s and always fall back to [`name_compare`] so the
//! order is total.

use crate::node::{LeafValue, Node};
use crate::path::Path;
use crate::sorted_map::KeyComparator;
use std::cmp::Ordering;
use std::fmt;

/// Sentinel name sorting before every real key.
pub const MIN_NAME: &str = "[MIN_NAME]";

/// Sentinel name sorting after every real key.
pub const MAX_NAME: &str = "[MAX_NAME]";

/// Leaf value used for the priority index upper bound.
const PRIORITY_POST: &str = "[PRIORITY-POST]";

fn parse_int_key(key: &str) -> Option<i64> {
    let digits = key.strip_prefix('-').unwrap_or(key);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if digits.trim_start_matches('0').len() > 10 {
        return None;
    }
    let value: i64 = key.parse().ok()?;
    (i64::from(i32::MIN)..=i64::from(i32::MAX))
        .contains(&value)
        .then_some(value)
}

/// Compare two child names.
///
/// The sentinels sort first and last. Names that look like 32-bit integers
/// sort numerically before all other names; equal integers are tie-broken by
/// string length. Everything else compares lexicographically.
pub fn name_compare(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    if a == MIN_NAME || b == MAX_NAME {
        return Ordering::Less;
    }
    if b == MIN_NAME || a == MAX_NAME {
        return Ordering::Greater;
    }
    match (parse_int_key(a), parse_int_key(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.len().cmp(&b.len())),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Orders child names with [`name_compare`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NameOrder;

impl KeyComparator<String> for NameOrder {
    fn compare(&self, a: &String, b: &String) -> Ordering {
        name_compare(a, b)
    }
}

/// A child name paired with its node.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedNode {
    /// Child key.
    pub name: String,
    /// Child value.
    pub node: Node,
}

impl NamedNode {
    /// Pair a name with a node.
    pub fn new(name: impl Into<String>, node: Node) -> Self {
        Self {
            name: name.into(),
            node,
        }
    }

    /// Sorts before every child under every index.
    pub fn min() -> Self {
        Self::new(MIN_NAME, Node::empty())
    }

    /// Sorts after every child under every index.
    pub fn max() -> Self {
        Self::new(MAX_NAME, Node::max())
    }
}

/// An ordering over children.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Index {
    /// Order by priority, then by name.
    #[default]
    Priority,
    /// Order by name only.
    Key,
    /// Order by the child's own value, then by name.
    Value,
    /// Order by the value at a path below each child, then by name.
    Child(Path),
}

impl Index {
    /// Order by the value at `path` below each child.
    pub fn child(path: impl Into<Path>) -> Self {
        Index::Child(path.into())
    }

    /// Compare two named children under this index.
    pub fn compare(&self, a: &NamedNode, b: &NamedNode) -> Ordering {
        let by_value = match self {
            Index::Key => Ordering::Equal,
            Index::Priority => a.node.priority().compare_to(&b.node.priority()),
            Index::Value => a.node.compare_to(&b.node),
            Index::Child(path) => a.node.child(path).compare_to(&b.node.child(path)),
        };
        by_value.then_with(|| name_compare(&a.name, &b.name))
    }

    /// Whether `node` carries a value this index sorts by.
    pub fn is_defined_on(&self, node: &Node) -> bool {
        match self {
            Index::Key | Index::Value => true,
            Index::Priority => !node.priority().is_empty(),
            Index::Child(path) => !node.child(path).is_empty(),
        }
    }

    /// Whether replacing `old` with `new` changes the child's indexed value.
    pub fn indexed_value_changed(&self, old: &Node, new: &Node) -> bool {
        match self {
            Index::Key => false,
            Index::Priority => old.priority() != new.priority(),
            Index::Value => old != new,
            Index::Child(path) => old.child(path) != new.child(path),
        }
    }

    /// Lower bound for this index.
    pub fn min_post(&self) -> NamedNode {
        NamedNode::min()
    }

    /// Upper bound for this index.
    pub fn max_post(&self) -> NamedNode {
        match self {
            Index::Key => NamedNode::new(MAX_NAME, Node::empty()),
            Index::Priority => NamedNode::new(
                MAX_NAME,
                Node::leaf(PRIORITY_POST).update_priority(Node::max()),
            ),
            Index::Value => NamedNode::max(),
            Index::Child(path) => {
                NamedNode::new(MAX_NAME, Node::empty().update_child(path, Node::max()))
            }
        }
    }

    /// Build a bound for a query endpoint with the given indexed value.
    pub fn make_post(&self, index_value: &Node, name: &str) -> NamedNode {
        match self {
            Index::Key => match index_value.leaf_value() {
                Some(LeafValue::String(key)) => NamedNode::new(key.clone(), Node::empty()),
                _ => NamedNode::new(name, Node::empty()),
            },
            Index::Priority => {
                NamedNode::new(name, Node::leaf(PRIORITY_POST).update_priority(index_value.clone()))
            }
            Index::Value => NamedNode::new(name, index_value.clone()),
            Index::Child(path) => {
                NamedNode::new(name, Node::empty().update_child(path, index_value.clone()))
            }
        }
    }

    /// Wire name of this index.
    pub fn query_definition(&self) -> String {
        match self {
            Index::Priority => ".priority".to_string(),
            Index::Key => ".key".to_string(),
            Index::Value => ".value".to_string(),
            Index::Child(path) => path.segments().join("/"),
        }
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.query_definition())
    }
}

impl KeyComparator<NamedNode> for Index {
    fn compare(&self, a: &NamedNode, b: &NamedNode) -> Ordering {
        Index::compare(self, a, b)
    }
}
