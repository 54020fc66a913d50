//! Pending local writes.
//!
//! The [`WriteTree`] holds every user write that the server has not yet
//! acknowledged, in the order the writes were made. Visible writes are also
//! kept layered in a [`CompoundWrite`] so the optimistic view of any path can
//! be computed without replaying the whole list.

use crate::compound_write::{CompoundWrite, MergeChildren};
use livetree_snapshot::{Index, NamedNode, Node, Path};
use std::cmp::Ordering;
use tracing::{debug, trace};

/// Identifier of a user write. Ids increase monotonically.
pub type WriteId = u64;

/// Payload of a pending write.
#[derive(Debug, Clone)]
pub enum WriteData {
    /// Replace the data at the write path.
    Overwrite(Node),
    /// Replace several children below the write path.
    Merge(MergeChildren),
}

/// One pending user write.
#[derive(Debug, Clone)]
pub struct WriteRecord {
    /// Write identifier.
    pub write_id: WriteId,
    /// Location of the write.
    pub path: Path,
    /// What was written.
    pub data: WriteData,
    /// Whether the write participates in event caches.
    pub visible: bool,
}

impl WriteRecord {
    /// Absolute paths replaced by this write.
    pub fn affected_paths(&self) -> Vec<Path> {
        match &self.data {
            WriteData::Overwrite(_) => vec![self.path.clone()],
            WriteData::Merge(children) => children.keys().map(|p| self.path.join(p)).collect(),
        }
    }

    fn contains_path(&self, path: &Path) -> bool {
        self.affected_paths().iter().any(|p| p.contains(path))
    }
}

/// Ordered list of pending writes plus their visible layering.
#[derive(Debug, Clone, Default)]
pub struct WriteTree {
    visible_writes: CompoundWrite,
    all_writes: Vec<WriteRecord>,
    last_write_id: Option<WriteId>,
}

impl WriteTree {
    /// An empty write tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pending writes.
    pub fn len(&self) -> usize {
        self.all_writes.len()
    }

    /// Whether no writes are pending.
    pub fn is_empty(&self) -> bool {
        self.all_writes.is_empty()
    }

    /// Pending writes in the order they were made.
    pub fn writes(&self) -> &[WriteRecord] {
        &self.all_writes
    }

    /// A view of this tree scoped to `path`.
    pub fn child_writes(&self, path: &Path) -> WriteTreeRef<'_> {
        WriteTreeRef {
            tree_path: path.clone(),
            write_tree: self,
        }
    }

    fn assert_newer(&self, write_id: WriteId) {
        if let Some(last) = self.last_write_id {
            assert!(
                write_id > last,
                "stacking write {write_id} on top of newer write {last}"
            );
        }
    }

    /// Record an overwrite.
    ///
    /// # Panics
    ///
    /// Panics if `write_id` is not greater than every previous id.
    pub fn add_overwrite(&mut self, path: Path, node: Node, write_id: WriteId, visible: bool) {
        self.assert_newer(write_id);
        trace!(write_id, %path, visible, "adding overwrite");
        if visible {
            self.visible_writes = self.visible_writes.add_write(&path, node.clone());
        }
        self.all_writes.push(WriteRecord {
            write_id,
            path,
            data: WriteData::Overwrite(node),
            visible,
        });
        self.last_write_id = Some(write_id);
    }

    /// Record a merge. Merges are always visible.
    ///
    /// # Panics
    ///
    /// Panics if `write_id` is not greater than every previous id.
    pub fn add_merge(&mut self, path: Path, children: MergeChildren, write_id: WriteId) {
        self.assert_newer(write_id);
        trace!(write_id, %path, children = children.len(), "adding merge");
        self.visible_writes = self.visible_writes.add_writes(&path, &children);
        self.all_writes.push(WriteRecord {
            write_id,
            path,
            data: WriteData::Merge(children),
            visible: true,
        });
        self.last_write_id = Some(write_id);
    }

    /// Look up a pending write.
    pub fn get_write(&self, write_id: WriteId) -> Option<&WriteRecord> {
        self.all_writes.iter().find(|w| w.write_id == write_id)
    }

    /// Remove a write. Returns whether the visible data may have changed.
    ///
    /// # Panics
    ///
    /// Panics if no write with `write_id` is pending.
    pub fn remove_write(&mut self, write_id: WriteId) -> bool {
        let Some(idx) = self.all_writes.iter().position(|w| w.write_id == write_id) else {
            panic!("remove_write called with unknown write id {write_id}");
        };
        let removed = self.all_writes.remove(idx);
        let mut was_visible = removed.visible;
        let mut overlaps = false;
        for (i, current) in self.all_writes.iter().enumerate().rev() {
            if !was_visible {
                break;
            }
            if !current.visible {
                continue;
            }
            if i >= idx && current.contains_path(&removed.path) {
                was_visible = false;
            } else if removed.path.contains(&current.path) || current.contains_path(&removed.path) {
                overlaps = true;
            }
        }

        if !was_visible {
            trace!(write_id, "removed write was shadowed");
            return false;
        }
        if overlaps {
            debug!(write_id, "removed write overlaps others, relayering");
            self.reset_tree();
            return true;
        }
        for path in removed.affected_paths() {
            self.visible_writes = self.visible_writes.remove_write(&path);
        }
        true
    }

    fn reset_tree(&mut self) {
        self.visible_writes = layer_tree(&self.all_writes, |w| w.visible, &Path::root());
        self.last_write_id = self.all_writes.last().map(|w| w.write_id);
    }

    /// Visible data at `path` if a write fully determines it.
    pub fn shadowing_write(&self, path: &Path) -> Option<Node> {
        self.visible_writes.complete_node(path)
    }

    /// The optimistic value at `tree_path`: server data with pending writes
    /// layered on top. Returns `None` when the result is not complete.
    ///
    /// Writes listed in `exclude` are skipped; hidden writes are included
    /// when `include_hidden` is set.
    pub fn calc_complete_event_cache(
        &self,
        tree_path: &Path,
        complete_server_cache: Option<&Node>,
        exclude: &[WriteId],
        include_hidden: bool,
    ) -> Option<Node> {
        if exclude.is_empty() && !include_hidden {
            if let Some(shadowing) = self.visible_writes.complete_node(tree_path) {
                return Some(shadowing);
            }
            let sub_merge = self.visible_writes.child_compound_write(tree_path);
            if sub_merge.is_empty() {
                return complete_server_cache.cloned();
            }
            if complete_server_cache.is_none() && !sub_merge.has_complete_write(&Path::root()) {
                return None;
            }
            let base = complete_server_cache.cloned().unwrap_or_else(Node::empty);
            return Some(sub_merge.apply(&base));
        }

        let merge = self.visible_writes.child_compound_write(tree_path);
        if !include_hidden && merge.is_empty() {
            return complete_server_cache.cloned();
        }
        if !include_hidden
            && complete_server_cache.is_none()
            && !merge.has_complete_write(&Path::root())
        {
            return None;
        }
        let merge_at_path = layer_tree(
            &self.all_writes,
            |w| {
                (w.visible || include_hidden)
                    && !exclude.contains(&w.write_id)
                    && (w.path.contains(tree_path) || tree_path.contains(&w.path))
            },
            tree_path,
        );
        let base = complete_server_cache.cloned().unwrap_or_else(Node::empty);
        Some(merge_at_path.apply(&base))
    }

    /// Children at `tree_path` that are complete given the server children
    /// and the pending writes.
    pub fn calc_complete_event_children(
        &self,
        tree_path: &Path,
        complete_server_children: Option<&Node>,
    ) -> Node {
        if let Some(top_level) = self.visible_writes.complete_node(tree_path) {
            return top_level
                .children()
                .fold(Node::empty(), |acc, c| acc.update_immediate_child(&c.name, c.node));
        }
        let merge = self.visible_writes.child_compound_write(tree_path);
        let mut complete = Node::empty();
        if let Some(server_children) = complete_server_children {
            for child in server_children.children() {
                let node = merge
                    .child_compound_write(&Path::new(&child.name))
                    .apply(&child.node);
                complete = complete.update_immediate_child(&child.name, node);
            }
        }
        for child in merge.complete_children() {
            complete = complete.update_immediate_child(&child.name, child.node);
        }
        complete
    }

    /// The event cache value at `tree_path/child_path` after the server
    /// overwrote it, or `None` if a pending write shadows the change.
    pub fn calc_event_cache_after_server_overwrite(
        &self,
        tree_path: &Path,
        child_path: &Path,
        existing_server_snap: &Node,
    ) -> Option<Node> {
        let path = tree_path.join(child_path);
        if self.visible_writes.has_complete_write(&path) {
            return None;
        }
        let child_merge = self.visible_writes.child_compound_write(&path);
        let server_child = existing_server_snap.child(child_path);
        if child_merge.is_empty() {
            Some(server_child)
        } else {
            Some(child_merge.apply(&server_child))
        }
    }

    /// The complete value of one child, from writes or from server data that
    /// is known to be complete for that child.
    pub fn calc_complete_child(
        &self,
        tree_path: &Path,
        child_key: &str,
        server_node: &Node,
        server_complete_for_child: bool,
    ) -> Option<Node> {
        let path = tree_path.child(child_key);
        if let Some(shadowing) = self.visible_writes.complete_node(&path) {
            return Some(shadowing);
        }
        if !server_complete_for_child {
            return None;
        }
        let child_merge = self.visible_writes.child_compound_write(&path);
        Some(child_merge.apply(&server_node.immediate_child(child_key)))
    }

    /// Up to `count` children after `start_post` (exclusive) in `index`
    /// order, with pending writes applied.
    pub fn calc_indexed_slice(
        &self,
        tree_path: &Path,
        complete_server_data: Option<&Node>,
        start_post: &NamedNode,
        count: usize,
        reverse: bool,
        index: &Index,
    ) -> Vec<NamedNode> {
        let merge = self.visible_writes.child_compound_write(tree_path);
        let to_iterate = match (merge.complete_node(&Path::root()), complete_server_data) {
            (Some(shadowing), _) => shadowing,
            (None, Some(server)) => merge.apply(server),
            (None, None) => return Vec::new(),
        };
        let to_iterate = to_iterate.with_index(index);
        if to_iterate.is_empty() || to_iterate.is_leaf() {
            return Vec::new();
        }
        let iter = if reverse {
            to_iterate.reverse_iter_from(start_post, index)
        } else {
            to_iterate.iter_from(start_post, index)
        };
        iter.filter(|child| index.compare(child, start_post) != Ordering::Equal)
            .take(count)
            .collect()
    }
}

/// Layer the writes accepted by `filter` into a compound write rooted at
/// `tree_root`.
fn layer_tree(
    writes: &[WriteRecord],
    filter: impl Fn(&WriteRecord) -> bool,
    tree_root: &Path,
) -> CompoundWrite {
    let mut layered = CompoundWrite::new();
    for write in writes.iter().filter(|w| filter(w)) {
        let overwrites: Vec<(Path, &Node)> = match &write.data {
            WriteData::Overwrite(node) => vec![(write.path.clone(), node)],
            WriteData::Merge(children) => children
                .iter()
                .map(|(child_path, node)| (write.path.join(child_path), node))
                .collect(),
        };
        for (path, node) in overwrites {
            if tree_root.contains(&path) {
                layered = layered.add_write(&Path::relative(tree_root, &path), node.clone());
            } else if path.contains(tree_root) {
                let relative = Path::relative(&path, tree_root);
                layered = layered.add_write(&Path::root(), node.child(&relative));
            }
        }
    }
    layered
}

/// A [`WriteTree`] seen from a fixed path.
#[derive(Debug, Clone)]
pub struct WriteTreeRef<'a> {
    tree_path: Path,
    write_tree: &'a WriteTree,
}

impl<'a> WriteTreeRef<'a> {
    /// The path this view is scoped to.
    pub fn path(&self) -> &Path {
        &self.tree_path
    }

    /// A view scoped one level deeper.
    pub fn child(&self, name: &str) -> WriteTreeRef<'a> {
        WriteTreeRef {
            tree_path: self.tree_path.child(name),
            write_tree: self.write_tree,
        }
    }

    /// See [`WriteTree::calc_complete_event_cache`].
    pub fn calc_complete_event_cache(&self, complete_server_cache: Option<&Node>) -> Option<Node> {
        self.write_tree
            .calc_complete_event_cache(&self.tree_path, complete_server_cache, &[], false)
    }

    /// See [`WriteTree::calc_complete_event_children`].
    pub fn calc_complete_event_children(&self, complete_server_children: Option<&Node>) -> Node {
        self.write_tree
            .calc_complete_event_children(&self.tree_path, complete_server_children)
    }

    /// See [`WriteTree::calc_event_cache_after_server_overwrite`].
    pub fn calc_event_cache_after_server_overwrite(
        &self,
        child_path: &Path,
        existing_server_snap: &Node,
    ) -> Option<Node> {
        self.write_tree.calc_event_cache_after_server_overwrite(
            &self.tree_path,
            child_path,
            existing_server_snap,
        )
    }

    /// See [`WriteTree::shadowing_write`].
    pub fn shadowing_write(&self, path: &Path) -> Option<Node> {
        self.write_tree.shadowing_write(&self.tree_path.join(path))
    }

    /// See [`WriteTree::calc_indexed_slice`].
    pub fn calc_indexed_slice(
        &self,
        complete_server_data: Option<&Node>,
        start_post: &NamedNode,
        count: usize,
        reverse: bool,
        index: &Index,
    ) -> Vec<NamedNode> {
        self.write_tree.calc_indexed_slice(
            &self.tree_path,
            complete_server_data,
            start_post,
            count,
            reverse,
            index,
        )
    }

    /// See [`WriteTree::calc_complete_child`].
    pub fn calc_complete_child(
        &self,
        child_key: &str,
        server_node: &Node,
        server_complete_for_child: bool,
    ) -> Option<Node> {
        self.write_tree.calc_complete_child(
            &self.tree_path,
            child_key,
            server_node,
            server_complete_for_child,
        )
    }
}
