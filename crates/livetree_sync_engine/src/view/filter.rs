//! Query filters.
//!
//! A filter turns incoming data into the data a query shows and reports the
//! child changes it made. There are three strategies:
//!
//! - [`IndexedFilter`]: keeps every child, maintaining the query's ordering.
//! - [`RangedFilter`]: drops children outside the start/end bounds.
//! - [`LimitedFilter`]: additionally keeps only the first or last `limit`
//!   children in range.

use crate::view::accumulator::ChildChangeAccumulator;
use crate::view::child_source::CompleteChildSource;
use livetree_snapshot::{Index, NamedNode, Node, Path};
use livetree_sync_protocol::{Change, QueryParams};
use std::cmp::Ordering;

/// The filter strategy of one query.
#[derive(Debug, Clone)]
pub enum NodeFilter {
    /// No filtering.
    Indexed(IndexedFilter),
    /// Start/end bounds.
    Ranged(RangedFilter),
    /// Bounds plus a limit.
    Limited(LimitedFilter),
}

impl NodeFilter {
    /// The filter for `params`: limited when a limit is set, ranged when a
    /// bound is set, indexed otherwise.
    pub fn for_params(params: &QueryParams, limit_rebuild_factor: usize) -> Self {
        if params.loads_all_data() {
            NodeFilter::Indexed(IndexedFilter::new(params.index().clone()))
        } else if let Some(limit) = params.limit() {
            NodeFilter::Limited(LimitedFilter::new(params, limit, limit_rebuild_factor))
        } else {
            NodeFilter::Ranged(RangedFilter::new(params))
        }
    }

    /// Replace child `key` of `snap` with `new_child`. `affected_path` is the
    /// part of the child the triggering operation touched.
    pub fn update_child(
        &self,
        snap: &Node,
        key: &str,
        new_child: Node,
        affected_path: &Path,
        source: &dyn CompleteChildSource,
        acc: Option<&mut ChildChangeAccumulator>,
    ) -> Node {
        match self {
            NodeFilter::Indexed(f) => f.update_child(snap, key, new_child, affected_path, acc),
            NodeFilter::Ranged(f) => f.update_child(snap, key, new_child, affected_path, acc),
            NodeFilter::Limited(f) => {
                f.update_child(snap, key, new_child, affected_path, source, acc)
            }
        }
    }

    /// Replace `old_snap` with the filtered form of `new_snap`.
    pub fn update_full_node(
        &self,
        old_snap: &Node,
        new_snap: &Node,
        acc: Option<&mut ChildChangeAccumulator>,
    ) -> Node {
        match self {
            NodeFilter::Indexed(f) => f.update_full_node(old_snap, new_snap, acc),
            NodeFilter::Ranged(f) => f.update_full_node(old_snap, new_snap, acc),
            NodeFilter::Limited(f) => f.update_full_node(old_snap, new_snap, acc),
        }
    }

    /// Apply a priority change. Filtered queries ignore priorities.
    pub fn update_priority(&self, old_snap: &Node, new_priority: Node) -> Node {
        match self {
            NodeFilter::Indexed(f) => f.update_priority(old_snap, new_priority),
            NodeFilter::Ranged(_) | NodeFilter::Limited(_) => old_snap.clone(),
        }
    }

    /// Whether the filter can drop children.
    pub fn filters_nodes(&self) -> bool {
        !matches!(self, NodeFilter::Indexed(_))
    }

    /// The unfiltered strategy over the same index.
    pub fn indexed_filter(&self) -> NodeFilter {
        NodeFilter::Indexed(IndexedFilter::new(self.index().clone()))
    }

    /// The query ordering.
    pub fn index(&self) -> &Index {
        match self {
            NodeFilter::Indexed(f) => &f.index,
            NodeFilter::Ranged(f) => &f.indexed.index,
            NodeFilter::Limited(f) => &f.ranged.indexed.index,
        }
    }
}

/// Keeps every child and maintains the index.
#[derive(Debug, Clone)]
pub struct IndexedFilter {
    index: Index,
}

impl IndexedFilter {
    /// A filter maintaining `index`.
    pub fn new(index: Index) -> Self {
        Self { index }
    }

    fn update_child(
        &self,
        snap: &Node,
        key: &str,
        new_child: Node,
        affected_path: &Path,
        acc: Option<&mut ChildChangeAccumulator>,
    ) -> Node {
        let old_child = snap.immediate_child(key);
        // A child can enter or leave while the affected path reads empty in
        // both versions, so emptiness has to match too.
        if old_child.child(affected_path) == new_child.child(affected_path)
            && old_child.is_empty() == new_child.is_empty()
        {
            return snap.clone();
        }

        if let Some(acc) = acc {
            if new_child.is_empty() {
                if snap.has_child(key) {
                    acc.track_child_change(Change::child_removed(key, old_child));
                } else {
                    assert!(
                        snap.is_leaf(),
                        "a child remove without an old child only makes sense on a leaf"
                    );
                }
            } else if old_child.is_empty() {
                acc.track_child_change(Change::child_added(key, new_child.clone()));
            } else {
                acc.track_child_change(Change::child_changed(key, new_child.clone(), old_child));
            }
        }

        if snap.is_leaf() && new_child.is_empty() {
            snap.clone()
        } else {
            snap.update_immediate_child(key, new_child).with_index(&self.index)
        }
    }

    fn update_full_node(
        &self,
        old_snap: &Node,
        new_snap: &Node,
        acc: Option<&mut ChildChangeAccumulator>,
    ) -> Node {
        if let Some(acc) = acc {
            for old in old_snap.children() {
                if !new_snap.has_child(&old.name) {
                    acc.track_child_change(Change::child_removed(old.name, old.node));
                }
            }
            for new in new_snap.children() {
                if old_snap.has_child(&new.name) {
                    let old_child = old_snap.immediate_child(&new.name);
                    if old_child != new.node {
                        acc.track_child_change(Change::child_changed(new.name, new.node, old_child));
                    }
                } else {
                    acc.track_child_change(Change::child_added(new.name, new.node));
                }
            }
        }
        new_snap.with_index(&self.index)
    }

    fn update_priority(&self, old_snap: &Node, new_priority: Node) -> Node {
        if old_snap.is_empty() {
            Node::empty()
        } else {
            old_snap.update_priority(new_priority)
        }
    }
}

/// Drops children outside inclusive start and end bounds.
#[derive(Debug, Clone)]
pub struct RangedFilter {
    indexed: IndexedFilter,
    start_post: NamedNode,
    end_post: NamedNode,
}

impl RangedFilter {
    /// A filter for the bounds in `params`.
    pub fn new(params: &QueryParams) -> Self {
        let index = params.index();
        let start_post = match params.index_start_value() {
            Some(value) => index.make_post(value, params.index_start_name()),
            None => index.min_post(),
        };
        let end_post = match params.index_end_value() {
            Some(value) => index.make_post(value, params.index_end_name()),
            None => index.max_post(),
        };
        Self {
            indexed: IndexedFilter::new(index.clone()),
            start_post,
            end_post,
        }
    }

    /// Lower bound.
    pub fn start_post(&self) -> &NamedNode {
        &self.start_post
    }

    /// Upper bound.
    pub fn end_post(&self) -> &NamedNode {
        &self.end_post
    }

    /// Whether `node` lies within the bounds.
    pub fn matches(&self, node: &NamedNode) -> bool {
        let index = &self.indexed.index;
        index.compare(&self.start_post, node) != Ordering::Greater
            && index.compare(node, &self.end_post) != Ordering::Greater
    }

    fn update_child(
        &self,
        snap: &Node,
        key: &str,
        new_child: Node,
        affected_path: &Path,
        acc: Option<&mut ChildChangeAccumulator>,
    ) -> Node {
        let new_child = if self.matches(&NamedNode::new(key, new_child.clone())) {
            new_child
        } else {
            Node::empty()
        };
        self.indexed
            .update_child(snap, key, new_child, affected_path, acc)
    }

    fn update_full_node(
        &self,
        old_snap: &Node,
        new_snap: &Node,
        acc: Option<&mut ChildChangeAccumulator>,
    ) -> Node {
        let new_snap = if new_snap.is_leaf() {
            Node::empty()
        } else {
            new_snap.clone()
        };
        let mut filtered = new_snap
            .with_index(&self.indexed.index)
            .update_priority(Node::empty());
        for child in new_snap.children() {
            if !self.matches(&child) {
                filtered = filtered.update_immediate_child(&child.name, Node::empty());
            }
        }
        self.indexed.update_full_node(old_snap, &filtered, acc)
    }
}

/// Keeps at most `limit` children in range, anchored at the start or end.
#[derive(Debug, Clone)]
pub struct LimitedFilter {
    ranged: RangedFilter,
    limit: usize,
    reverse: bool,
    rebuild_factor: usize,
}

impl LimitedFilter {
    /// A filter keeping `limit` children of the range in `params`.
    pub fn new(params: &QueryParams, limit: usize, rebuild_factor: usize) -> Self {
        Self {
            ranged: RangedFilter::new(params),
            limit,
            reverse: !params.is_view_from_left(),
            rebuild_factor,
        }
    }

    /// Maximum number of children.
    pub fn limit(&self) -> usize {
        self.limit
    }

    fn index(&self) -> &Index {
        &self.ranged.indexed.index
    }

    /// Index comparison, flipped when the window is anchored at the end.
    fn directional_compare(&self, a: &NamedNode, b: &NamedNode) -> Ordering {
        if self.reverse {
            self.index().compare(b, a)
        } else {
            self.index().compare(a, b)
        }
    }

    fn update_child(
        &self,
        snap: &Node,
        key: &str,
        new_child: Node,
        affected_path: &Path,
        source: &dyn CompleteChildSource,
        acc: Option<&mut ChildChangeAccumulator>,
    ) -> Node {
        let new_child = if self.ranged.matches(&NamedNode::new(key, new_child.clone())) {
            new_child
        } else {
            Node::empty()
        };
        if snap.immediate_child(key) == new_child {
            snap.clone()
        } else if snap.num_children() < self.limit {
            self.ranged
                .indexed
                .update_child(snap, key, new_child, affected_path, acc)
        } else {
            self.full_limit_update_child(snap, key, new_child, source, acc)
        }
    }

    fn full_limit_update_child(
        &self,
        old_event_cache: &Node,
        key: &str,
        child_snap: Node,
        source: &dyn CompleteChildSource,
        acc: Option<&mut ChildChangeAccumulator>,
    ) -> Node {
        assert_eq!(
            old_event_cache.num_children(),
            self.limit,
            "a full limit update needs a full window"
        );
        let index = self.index();
        let new_child = NamedNode::new(key, child_snap.clone());
        let boundary = if self.reverse {
            old_event_cache.first_child(index)
        } else {
            old_event_cache.last_child(index)
        };
        let Some(boundary) = boundary else {
            return old_event_cache.clone();
        };
        let in_range = self.ranged.matches(&new_child);

        if old_event_cache.has_child(key) {
            let old_child = old_event_cache.immediate_child(key);
            // Skip candidates already in the window; a merge may not have
            // reached them yet.
            let mut next = source.child_after_child(index, &boundary, self.reverse);
            while let Some(candidate) = &next {
                if candidate.name != key && !old_event_cache.has_child(&candidate.name) {
                    break;
                }
                next = source.child_after_child(index, candidate, self.reverse);
            }
            let compare_next = next
                .as_ref()
                .map_or(Ordering::Greater, |n| self.directional_compare(n, &new_child));
            let remains_in_window =
                in_range && !child_snap.is_empty() && compare_next != Ordering::Less;
            if remains_in_window {
                if let Some(acc) = acc {
                    acc.track_child_change(Change::child_changed(key, child_snap.clone(), old_child));
                }
                return old_event_cache.update_immediate_child(key, child_snap);
            }

            let mut acc = acc;
            if let Some(acc) = acc.as_deref_mut() {
                acc.track_child_change(Change::child_removed(key, old_child));
            }
            let new_event_cache = old_event_cache.update_immediate_child(key, Node::empty());
            match next {
                Some(next) if self.ranged.matches(&next) => {
                    if let Some(acc) = acc {
                        acc.track_child_change(Change::child_added(next.name.clone(), next.node.clone()));
                    }
                    new_event_cache.update_immediate_child(&next.name, next.node)
                }
                _ => new_event_cache,
            }
        } else if child_snap.is_empty() {
            // Deleting a child outside the window.
            old_event_cache.clone()
        } else if in_range && self.directional_compare(&boundary, &new_child) != Ordering::Less {
            if let Some(acc) = acc {
                acc.track_child_change(Change::child_removed(
                    boundary.name.clone(),
                    boundary.node.clone(),
                ));
                acc.track_child_change(Change::child_added(key, child_snap.clone()));
            }
            old_event_cache
                .update_immediate_child(key, child_snap)
                .update_immediate_child(&boundary.name, Node::empty())
        } else {
            old_event_cache.clone()
        }
    }

    fn update_full_node(
        &self,
        old_snap: &Node,
        new_snap: &Node,
        acc: Option<&mut ChildChangeAccumulator>,
    ) -> Node {
        let index = self.index();
        let filtered = if new_snap.is_leaf() || new_snap.is_empty() {
            Node::empty().with_index(index)
        } else if self.limit.saturating_mul(self.rebuild_factor) < new_snap.num_children() {
            self.rebuild_window(new_snap)
        } else {
            self.trim_window(new_snap)
        };
        self.ranged.indexed.update_full_node(old_snap, &filtered, acc)
    }

    /// Build the window by walking from the anchor bound.
    fn rebuild_window(&self, new_snap: &Node) -> Node {
        let index = self.index();
        let (start, end) = self.directional_bounds();
        let iter = if self.reverse {
            new_snap.reverse_iter_from(start, index)
        } else {
            new_snap.iter_from(start, index)
        };
        let mut filtered = Node::empty().with_index(index);
        for next in iter
            .take_while(|next| self.directional_compare(next, end) != Ordering::Greater)
            .take(self.limit)
        {
            filtered = filtered.update_immediate_child(&next.name, next.node);
        }
        filtered
    }

    /// Start from the whole node and delete everything outside the window.
    fn trim_window(&self, new_snap: &Node) -> Node {
        let index = self.index();
        let mut filtered = new_snap.with_index(index).update_priority(Node::empty());
        let ordered: Vec<NamedNode> = if self.reverse {
            filtered.reverse_iter_by(index).collect()
        } else {
            filtered.iter_by(index).collect()
        };
        let (start, end) = self.directional_bounds();
        let mut count = 0;
        let mut found_start = false;
        for next in ordered {
            if !found_start && self.directional_compare(start, &next) != Ordering::Greater {
                found_start = true;
            }
            let in_range = found_start
                && count < self.limit
                && self.directional_compare(&next, end) != Ordering::Greater;
            if in_range {
                count += 1;
            } else {
                filtered = filtered.update_immediate_child(&next.name, Node::empty());
            }
        }
        filtered
    }

    /// The bound the window is anchored at, then the far bound.
    fn directional_bounds(&self) -> (&NamedNode, &NamedNode) {
        if self.reverse {
            (self.ranged.end_post(), self.ranged.start_post())
        } else {
            (self.ranged.start_post(), self.ranged.end_post())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::child_source::NoCompleteChildSource;
    use livetree_sync_protocol::EventType;
    use serde_json::json;

    fn node(value: serde_json::Value) -> Node {
        Node::from_json(&value).unwrap()
    }

    fn names(snap: &Node, index: &Index) -> Vec<String> {
        snap.iter_by(index).map(|c| c.name).collect()
    }

    #[test]
    fn test_filter_selection() {
        let all = QueryParams::new();
        assert!(matches!(NodeFilter::for_params(&all, 2), NodeFilter::Indexed(_)));
        let ranged = QueryParams::new().start_at(Node::leaf(1), None).unwrap();
        assert!(matches!(NodeFilter::for_params(&ranged, 2), NodeFilter::Ranged(_)));
        let limited = QueryParams::new().limit_to_first(2).unwrap();
        let filter = NodeFilter::for_params(&limited, 2);
        assert!(matches!(filter, NodeFilter::Limited(_)));
        assert!(filter.filters_nodes());
        assert!(!filter.indexed_filter().filters_nodes());
    }

    #[test]
    fn test_indexed_full_node_changes() {
        let filter = IndexedFilter::new(Index::Priority);
        let mut acc = ChildChangeAccumulator::new();
        let old = node(json!({"a": 1, "b": 2}));
        let new = node(json!({"b": 3, "c": 4}));
        let result = filter.update_full_node(&old, &new, Some(&mut acc));
        assert_eq!(result, new);
        let mut kinds: Vec<_> = acc
            .into_changes()
            .into_iter()
            .map(|c| (c.event_type, c.child_key().to_string()))
            .collect();
        kinds.sort();
        assert_eq!(
            kinds,
            vec![
                (EventType::ChildRemoved, "a".to_string()),
                (EventType::ChildAdded, "c".to_string()),
                (EventType::ChildChanged, "b".to_string()),
            ]
        );
    }

    #[test]
    fn test_indexed_update_child_no_change() {
        let filter = IndexedFilter::new(Index::Priority);
        let snap = node(json!({"a": 1}));
        let mut acc = ChildChangeAccumulator::new();
        let result = filter.update_child(&snap, "a", Node::leaf(1), &Path::root(), Some(&mut acc));
        assert!(result.ptr_eq(&snap));
        assert!(acc.is_empty());
    }

    #[test]
    fn test_ranged_drops_out_of_range() {
        let params = QueryParams::new()
            .order_by(Index::Key)
            .unwrap()
            .start_at(Node::leaf("b"), None)
            .unwrap();
        let filter = NodeFilter::for_params(&params, 2);
        let result = filter.update_full_node(&Node::empty(), &node(json!({"a": 1, "b": 2, "c": 3})), None);
        assert_eq!(result, node(json!({"b": 2, "c": 3})));

        let mut acc = ChildChangeAccumulator::new();
        let same = filter.update_child(
            &result,
            "a",
            Node::leaf(9),
            &Path::root(),
            &NoCompleteChildSource,
            Some(&mut acc),
        );
        assert_eq!(same, result);
        assert!(acc.is_empty());
    }

    #[test]
    fn test_limit_full_node_both_strategies() {
        let params = QueryParams::new()
            .order_by(Index::Key)
            .unwrap()
            .limit_to_first(2)
            .unwrap();
        let data = node(json!({"a": 1, "b": 2, "c": 3, "d": 4, "e": 5}));
        for factor in [1, 10] {
            let filter = NodeFilter::for_params(&params, factor);
            let result = filter.update_full_node(&Node::empty(), &data, None);
            assert_eq!(names(&result, &Index::Key), vec!["a", "b"], "factor {factor}");
        }

        let last = QueryParams::new()
            .order_by(Index::Key)
            .unwrap()
            .limit_to_last(2)
            .unwrap();
        for factor in [1, 10] {
            let filter = NodeFilter::for_params(&last, factor);
            let result = filter.update_full_node(&Node::empty(), &data, None);
            assert_eq!(names(&result, &Index::Key), vec!["d", "e"], "factor {factor}");
        }
    }

    #[test]
    fn test_limit_new_child_evicts_boundary() {
        let params = QueryParams::new()
            .order_by(Index::Key)
            .unwrap()
            .limit_to_first(2)
            .unwrap();
        let filter = NodeFilter::for_params(&params, 2);
        let snap = filter.update_full_node(&Node::empty(), &node(json!({"b": 2, "c": 3})), None);
        let mut acc = ChildChangeAccumulator::new();
        let result = filter.update_child(
            &snap,
            "a",
            Node::leaf(1),
            &Path::root(),
            &NoCompleteChildSource,
            Some(&mut acc),
        );
        assert_eq!(names(&result, &Index::Key), vec!["a", "b"]);
        let changes = acc.into_changes();
        assert_eq!(changes.len(), 2);
        assert!(changes
            .iter()
            .any(|c| c.event_type == EventType::ChildRemoved && c.child_key() == "c"));
    }

    #[test]
    fn test_limit_change_outside_window_ignored() {
        let params = QueryParams::new()
            .order_by(Index::Key)
            .unwrap()
            .limit_to_first(1)
            .unwrap();
        let filter = NodeFilter::for_params(&params, 2);
        let snap = node(json!({"a": 1}));
        let result = filter.update_child(
            &snap,
            "z",
            Node::leaf(1),
            &Path::root(),
            &NoCompleteChildSource,
            None,
        );
        assert_eq!(result, snap);
    }

    #[test]
    fn test_filtered_queries_ignore_priority() {
        let params = QueryParams::new().limit_to_first(1).unwrap();
        let filter = NodeFilter::for_params(&params, 2);
        let snap = node(json!({"a": 1}));
        assert_eq!(filter.update_priority(&snap, Node::leaf(5)), snap);
        let unfiltered = filter.indexed_filter();
        assert_eq!(unfiltered.update_priority(&snap, Node::leaf(5)).priority(), Node::leaf(5));
        assert!(unfiltered.update_priority(&Node::empty(), Node::leaf(5)).is_empty());
    }
}
