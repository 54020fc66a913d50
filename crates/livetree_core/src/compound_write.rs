//! Layered set of overwrites.
//!
//! A [`CompoundWrite`] keeps at most one node per path and never stores a
//! write below another write: a deeper write is folded into the shallower
//! node instead. Applying it to a base node overlays every write.

use crate::immutable_tree::ImmutableTree;
use livetree_snapshot::{Index, NamedNode, Node, Path, PRIORITY_KEY};
use std::collections::BTreeMap;

/// Children of a merge, keyed by path relative to the merge location.
pub type MergeChildren = BTreeMap<Path, Node>;

/// A set of overwrites at various paths.
#[derive(Debug, Clone, Default)]
pub struct CompoundWrite {
    writes: ImmutableTree<Node>,
}

impl CompoundWrite {
    /// No writes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the children of a merge.
    pub fn from_merge(children: &MergeChildren) -> Self {
        Self::new().add_writes(&Path::root(), children)
    }

    /// Whether there are no writes.
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Add an overwrite of `node` at `path`.
    pub fn add_write(&self, path: &Path, node: Node) -> Self {
        if path.is_empty() {
            return Self {
                writes: ImmutableTree::leaf(node),
            };
        }
        if let Some((rootmost_path, value)) = self.writes.find_rootmost_value_and_path(path) {
            let relative = Path::relative(&rootmost_path, path);
            if relative.back() == Some(PRIORITY_KEY) {
                let owner = relative.parent().unwrap_or_default();
                if value.child(&owner).is_empty() {
                    return self.clone();
                }
            }
            let value = value.update_child(&relative, node);
            return Self {
                writes: self.writes.set(&rootmost_path, value),
            };
        }
        Self {
            writes: self.writes.set_tree(path, ImmutableTree::leaf(node)),
        }
    }

    /// Add every child of a merge at `path`.
    pub fn add_writes(&self, path: &Path, children: &MergeChildren) -> Self {
        children.iter().fold(self.clone(), |write, (child_path, node)| {
            write.add_write(&path.join(child_path), node.clone())
        })
    }

    /// Drop the write at `path` and everything beneath it.
    ///
    /// A write above `path` is left untouched.
    pub fn remove_write(&self, path: &Path) -> Self {
        if path.is_empty() {
            return Self::new();
        }
        Self {
            writes: self.writes.set_tree(path, ImmutableTree::new()),
        }
    }

    /// Whether a write fully determines the data at `path`.
    pub fn has_complete_write(&self, path: &Path) -> bool {
        self.complete_node(path).is_some()
    }

    /// The write stored at the root, if any.
    pub fn root_write(&self) -> Option<&Node> {
        self.writes.value()
    }

    /// The data at `path` if a write fully determines it.
    pub fn complete_node(&self, path: &Path) -> Option<Node> {
        self.writes
            .find_rootmost_value_and_path(path)
            .map(|(rootmost_path, value)| value.child(&Path::relative(&rootmost_path, path)))
    }

    /// Immediate children fully determined by writes.
    pub fn complete_children(&self) -> Vec<NamedNode> {
        match self.writes.value() {
            Some(node) => node.iter_by(&Index::Priority).collect(),
            None => self
                .writes
                .children()
                .filter_map(|(name, child)| {
                    child
                        .value()
                        .map(|node| NamedNode::new(name.clone(), node.clone()))
                })
                .collect(),
        }
    }

    /// The writes affecting `path`, relative to it.
    pub fn child_compound_write(&self, path: &Path) -> Self {
        if path.is_empty() {
            return self.clone();
        }
        match self.complete_node(path) {
            Some(shadowing) => Self {
                writes: ImmutableTree::leaf(shadowing),
            },
            None => Self {
                writes: self.writes.subtree(path),
            },
        }
    }

    /// Overlay every write onto `node`.
    pub fn apply(&self, node: &Node) -> Node {
        apply_subtree_write(&Path::root(), &self.writes, node.clone())
    }
}

fn apply_subtree_write(relative: &Path, writes: &ImmutableTree<Node>, node: Node) -> Node {
    if let Some(value) = writes.value() {
        return node.update_child(relative, value.clone());
    }
    let mut node = node;
    let mut priority_write = None;
    for (name, child) in writes.children() {
        if name == PRIORITY_KEY {
            assert!(
                child.value().is_some(),
                "priority writes must always be leaf nodes"
            );
            priority_write = child.value().cloned();
        } else {
            node = apply_subtree_write(&relative.child(name), child, node);
        }
    }
    if let Some(priority) = priority_write {
        if !node.child(relative).is_empty() {
            node = node.update_child(&relative.child(PRIORITY_KEY), priority);
        }
    }
    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(value: serde_json::Value) -> Node {
        Node::from_json(&value).unwrap()
    }

    #[test]
    fn test_empty_apply_is_identity() {
        let base = node(json!({"a": 1}));
        assert_eq!(CompoundWrite::new().apply(&base), base);
    }

    #[test]
    fn test_deeper_write_folds_into_shallower() {
        let write = CompoundWrite::new()
            .add_write(&Path::new("a"), node(json!({"x": 1})))
            .add_write(&Path::new("a/y"), Node::leaf(2));
        assert_eq!(write.complete_node(&Path::new("a")), Some(node(json!({"x": 1, "y": 2}))));
        assert_eq!(write.complete_node(&Path::new("a/x")), Some(Node::leaf(1)));
        assert_eq!(write.complete_node(&Path::new("b")), None);
    }

    #[test]
    fn test_shallow_write_replaces_deeper() {
        let write = CompoundWrite::new()
            .add_write(&Path::new("a/b"), Node::leaf(1))
            .add_write(&Path::new("a"), Node::leaf("flat"));
        assert_eq!(write.apply(&Node::empty()), node(json!({"a": "flat"})));
    }

    #[test]
    fn test_apply_overlays_base() {
        let base = node(json!({"a": {"x": 1, "y": 2}, "b": 3}));
        let write = CompoundWrite::new()
            .add_write(&Path::new("a/x"), Node::leaf(10))
            .add_write(&Path::new("c"), Node::leaf(4));
        assert_eq!(
            write.apply(&base),
            node(json!({"a": {"x": 10, "y": 2}, "b": 3, "c": 4}))
        );
    }

    #[test]
    fn test_priority_write_applied_last() {
        let write = CompoundWrite::new()
            .add_write(&Path::new("a/.priority"), Node::leaf(5))
            .add_write(&Path::new("a/v"), Node::leaf(1));
        let applied = write.apply(&Node::empty());
        assert_eq!(applied.immediate_child("a").priority(), Node::leaf(5));

        let only_priority = CompoundWrite::new().add_write(&Path::new("a/.priority"), Node::leaf(5));
        assert!(only_priority.apply(&Node::empty()).is_empty());
    }

    #[test]
    fn test_priority_on_empty_write_ignored() {
        let write = CompoundWrite::new()
            .add_write(&Path::new("a"), node(json!({"x": 1})))
            .add_write(&Path::new("a/missing/.priority"), Node::leaf(1));
        assert_eq!(write.complete_node(&Path::new("a")), Some(node(json!({"x": 1}))));
    }

    #[test]
    fn test_remove_write() {
        let write = CompoundWrite::new()
            .add_write(&Path::new("a/b"), Node::leaf(1))
            .add_write(&Path::new("c"), Node::leaf(2));
        let removed = write.remove_write(&Path::new("a"));
        assert!(!removed.has_complete_write(&Path::new("a/b")));
        assert!(removed.has_complete_write(&Path::new("c")));
        assert!(write.remove_write(&Path::root()).is_empty());
    }

    #[test]
    fn test_child_compound_write() {
        let write = CompoundWrite::new()
            .add_write(&Path::new("a"), node(json!({"b": {"c": 1}})))
            .add_write(&Path::new("x/y"), Node::leaf(2));
        let shadowed = write.child_compound_write(&Path::new("a/b"));
        assert_eq!(shadowed.root_write(), Some(&node(json!({"c": 1}))));
        let partial = write.child_compound_write(&Path::new("x"));
        assert!(partial.root_write().is_none());
        assert!(partial.has_complete_write(&Path::new("y")));
    }

    #[test]
    fn test_complete_children() {
        let write = CompoundWrite::new()
            .add_write(&Path::new("a"), Node::leaf(1))
            .add_write(&Path::new("b/c"), Node::leaf(2));
        let names: Vec<String> = write.complete_children().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["a"]);

        let root = CompoundWrite::new().add_write(&Path::root(), node(json!({"x": 1, "y": 2})));
        assert_eq!(root.complete_children().len(), 2);
    }

    #[test]
    fn test_from_merge_with_deep_keys() {
        let mut children = MergeChildren::new();
        children.insert(Path::new("a/b"), Node::leaf(1));
        children.insert(Path::new("c"), Node::leaf(2));
        let write = CompoundWrite::from_merge(&children);
        let base = node(json!({"a": {"z": 0}}));
        assert_eq!(write.apply(&base), node(json!({"a": {"b": 1, "z": 0}, "c": 2})));
    }
}
