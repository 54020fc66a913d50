//! Applies operations to a view cache.
//!
//! [`ViewProcessor::apply_operation`] is a pure function of the old cache,
//! the operation, the pending writes and any complete server data found
//! elsewhere in the sync tree. It returns the new cache and the changes the
//! application should hear about.

use crate::view::accumulator::ChildChangeAccumulator;
use crate::view::cache::{CacheNode, ViewCache};
use crate::view::child_source::{CompleteChildSource, NoCompleteChildSource, WriteTreeCompleteChildSource};
use crate::view::filter::NodeFilter;
use livetree_core::{ImmutableTree, WriteTreeRef};
use livetree_snapshot::{Node, Path, PRIORITY_KEY};
use livetree_sync_protocol::{Change, Operation, OperationKind};

/// Output of [`ViewProcessor::apply_operation`].
#[derive(Debug, Clone)]
pub struct ProcessorResult {
    /// The updated cache.
    pub view_cache: ViewCache,
    /// Changes to the event cache.
    pub changes: Vec<Change>,
}

/// Applies operations through one query's filter.
#[derive(Debug, Clone)]
pub struct ViewProcessor {
    filter: NodeFilter,
}

impl ViewProcessor {
    /// A processor using `filter`.
    pub fn new(filter: NodeFilter) -> Self {
        Self { filter }
    }

    /// The query filter.
    pub fn filter(&self) -> &NodeFilter {
        &self.filter
    }

    /// Apply `operation` to `old`.
    pub fn apply_operation(
        &self,
        old: &ViewCache,
        operation: &Operation,
        writes: &WriteTreeRef<'_>,
        complete_cache: Option<&Node>,
    ) -> ProcessorResult {
        let mut acc = ChildChangeAccumulator::new();
        let path = &operation.path;
        let source = &operation.source;
        let view_cache = match &operation.kind {
            OperationKind::Overwrite(snap) if source.from_user() => {
                self.apply_user_overwrite(old, path, snap, writes, complete_cache, &mut acc)
            }
            OperationKind::Overwrite(snap) => {
                // Tagged data is filtered. So is data below a filtered cache,
                // while a root overwrite may make the cache unfiltered again.
                let filter_server_node =
                    source.is_tagged() || (old.server_cache().is_filtered() && !path.is_empty());
                self.apply_server_overwrite(
                    old,
                    path,
                    snap,
                    writes,
                    complete_cache,
                    filter_server_node,
                    &mut acc,
                )
            }
            OperationKind::Merge(children) if source.from_user() => {
                self.apply_user_merge(old, path, children, writes, complete_cache, &mut acc)
            }
            OperationKind::Merge(children) => {
                let filter_server_node = source.is_tagged() || old.server_cache().is_filtered();
                self.apply_server_merge(
                    old,
                    path,
                    children,
                    writes,
                    complete_cache,
                    filter_server_node,
                    &mut acc,
                )
            }
            OperationKind::AckUserWrite {
                affected_tree,
                revert: false,
            } => self.ack_user_write(old, path, affected_tree, writes, complete_cache, &mut acc),
            OperationKind::AckUserWrite { revert: true, .. } => {
                self.revert_user_write(old, path, writes, complete_cache, &mut acc)
            }
            OperationKind::ListenComplete => self.listen_complete(old, path, writes, &mut acc),
        };
        let mut changes = acc.into_changes();
        maybe_add_value_event(old, &view_cache, &mut changes);
        ProcessorResult {
            view_cache,
            changes,
        }
    }

    fn generate_event_cache_after_server_event(
        &self,
        view_cache: &ViewCache,
        change_path: &Path,
        writes: &WriteTreeRef<'_>,
        source: &dyn CompleteChildSource,
        acc: &mut ChildChangeAccumulator,
    ) -> ViewCache {
        if writes.shadowing_write(change_path).is_some() {
            return view_cache.clone();
        }
        let old_event_snap = view_cache.event_cache();
        let server_cache = view_cache.server_cache();

        let new_event_cache = match change_path.front() {
            None => {
                assert!(
                    server_cache.is_fully_initialized(),
                    "an empty change path needs complete server data"
                );
                let server_node = server_cache.node();
                let complete = if server_cache.is_filtered() {
                    // Deep writes may belong to children the filter dropped,
                    // so only complete children are layered.
                    let complete_children = if server_node.is_leaf() {
                        Node::empty()
                    } else {
                        server_node.clone()
                    };
                    writes.calc_complete_event_children(Some(&complete_children))
                } else {
                    writes
                        .calc_complete_event_cache(Some(server_node))
                        .unwrap_or_else(Node::empty)
                };
                self.filter
                    .update_full_node(old_event_snap.node(), &complete, Some(acc))
            }
            Some(PRIORITY_KEY) => {
                assert_eq!(change_path.len(), 1, "a priority path cannot go deeper");
                match writes.calc_event_cache_after_server_overwrite(change_path, server_cache.node()) {
                    Some(priority) => self.filter.update_priority(old_event_snap.node(), priority),
                    None => old_event_snap.node().clone(),
                }
            }
            Some(child_key) => {
                let child_change_path = change_path.pop_front();
                let new_event_child = if old_event_snap.is_complete_for_child(child_key) {
                    let old_child = old_event_snap.node().immediate_child(child_key);
                    Some(
                        match writes
                            .calc_event_cache_after_server_overwrite(change_path, server_cache.node())
                        {
                            Some(update) => old_child.update_child(&child_change_path, update),
                            None => old_child,
                        },
                    )
                } else {
                    writes.calc_complete_child(
                        child_key,
                        server_cache.node(),
                        server_cache.is_complete_for_child(child_key),
                    )
                };
                match new_event_child {
                    Some(child) => self.filter.update_child(
                        old_event_snap.node(),
                        child_key,
                        child,
                        &child_change_path,
                        source,
                        Some(acc),
                    ),
                    None => old_event_snap.node().clone(),
                }
            }
        };
        view_cache.update_event_snap(
            new_event_cache,
            old_event_snap.is_fully_initialized() || change_path.is_empty(),
            self.filter.filters_nodes(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_server_overwrite(
        &self,
        old: &ViewCache,
        change_path: &Path,
        changed_snap: &Node,
        writes: &WriteTreeRef<'_>,
        complete_cache: Option<&Node>,
        filter_server_node: bool,
        acc: &mut ChildChangeAccumulator,
    ) -> ViewCache {
        let old_server_snap = old.server_cache();
        let unfiltered;
        let server_filter = if filter_server_node {
            &self.filter
        } else {
            unfiltered = self.filter.indexed_filter();
            &unfiltered
        };

        let new_server_cache = match change_path.front() {
            None => server_filter.update_full_node(old_server_snap.node(), changed_snap, None),
            Some(_) if server_filter.filters_nodes() && !old_server_snap.is_filtered() => {
                // The cache was never filtered, so filter it as a whole.
                let new_server_node = old_server_snap
                    .node()
                    .update_child(change_path, changed_snap.clone());
                server_filter.update_full_node(old_server_snap.node(), &new_server_node, None)
            }
            Some(child_key) => {
                if !old_server_snap.is_complete_for_path(change_path) && change_path.len() > 1 {
                    // Deep data for a child this view does not hold belongs
                    // to another listener.
                    return old.clone();
                }
                let child_change_path = change_path.pop_front();
                let new_child_node = old_server_snap
                    .node()
                    .immediate_child(child_key)
                    .update_child(&child_change_path, changed_snap.clone());
                if child_key == PRIORITY_KEY {
                    server_filter.update_priority(old_server_snap.node(), new_child_node)
                } else {
                    server_filter.update_child(
                        old_server_snap.node(),
                        child_key,
                        new_child_node,
                        &child_change_path,
                        &NoCompleteChildSource,
                        None,
                    )
                }
            }
        };

        let new_view_cache = old.update_server_snap(
            new_server_cache,
            old_server_snap.is_fully_initialized() || change_path.is_empty(),
            server_filter.filters_nodes(),
        );
        let source = WriteTreeCompleteChildSource::new(writes, &new_view_cache, complete_cache);
        self.generate_event_cache_after_server_event(&new_view_cache, change_path, writes, &source, acc)
    }

    fn apply_user_overwrite(
        &self,
        old: &ViewCache,
        change_path: &Path,
        changed_snap: &Node,
        writes: &WriteTreeRef<'_>,
        complete_cache: Option<&Node>,
        acc: &mut ChildChangeAccumulator,
    ) -> ViewCache {
        let old_event_snap = old.event_cache();
        let source = WriteTreeCompleteChildSource::new(writes, old, complete_cache);

        match change_path.front() {
            None => {
                let new_event_cache =
                    self.filter
                        .update_full_node(old_event_snap.node(), changed_snap, Some(acc));
                old.update_event_snap(new_event_cache, true, self.filter.filters_nodes())
            }
            Some(PRIORITY_KEY) => {
                let new_event_cache = self
                    .filter
                    .update_priority(old_event_snap.node(), changed_snap.clone());
                old.update_event_snap(
                    new_event_cache,
                    old_event_snap.is_fully_initialized(),
                    old_event_snap.is_filtered(),
                )
            }
            Some(child_key) => {
                let child_change_path = change_path.pop_front();
                let old_child = old_event_snap.node().immediate_child(child_key);
                let new_child = if child_change_path.is_empty() {
                    changed_snap.clone()
                } else {
                    match source.complete_child(child_key) {
                        Some(child_node) => {
                            // A priority on an absent node arrives with the
                            // server data if the node exists there.
                            let priority_on_empty = child_change_path.back() == Some(PRIORITY_KEY)
                                && child_change_path
                                    .parent()
                                    .is_some_and(|parent| child_node.child(&parent).is_empty());
                            if priority_on_empty {
                                child_node
                            } else {
                                child_node.update_child(&child_change_path, changed_snap.clone())
                            }
                        }
                        None => Node::empty(),
                    }
                };
                if old_child == new_child {
                    return old.clone();
                }
                let new_event_snap = self.filter.update_child(
                    old_event_snap.node(),
                    child_key,
                    new_child,
                    &child_change_path,
                    &source,
                    Some(acc),
                );
                old.update_event_snap(
                    new_event_snap,
                    old_event_snap.is_fully_initialized(),
                    self.filter.filters_nodes(),
                )
            }
        }
    }

    fn apply_user_merge(
        &self,
        view_cache: &ViewCache,
        path: &Path,
        changed_children: &ImmutableTree<Node>,
        writes: &WriteTreeRef<'_>,
        complete_cache: Option<&Node>,
        acc: &mut ChildChangeAccumulator,
    ) -> ViewCache {
        let mut entries = Vec::new();
        changed_children.foreach(|relative, node| entries.push((path.join(relative), node.clone())));

        // Children already in view go first: a limit window may drop some of
        // them and make room for the rest.
        let mut current = view_cache.clone();
        for in_view in [true, false] {
            for (write_path, node) in &entries {
                let has_child = write_path
                    .front()
                    .is_some_and(|front| view_cache.event_cache().is_complete_for_child(front));
                if has_child == in_view {
                    current =
                        self.apply_user_overwrite(&current, write_path, node, writes, complete_cache, acc);
                }
            }
        }
        current
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_server_merge(
        &self,
        view_cache: &ViewCache,
        path: &Path,
        changed_children: &ImmutableTree<Node>,
        writes: &WriteTreeRef<'_>,
        complete_cache: Option<&Node>,
        filter_server_node: bool,
        acc: &mut ChildChangeAccumulator,
    ) -> ViewCache {
        let server_cache = view_cache.server_cache();
        // Without any server data the merge was meant for an earlier listen
        // at this location; full data follows.
        if server_cache.node().is_empty() && !server_cache.is_fully_initialized() {
            return view_cache.clone();
        }

        let merge_tree = if path.is_empty() {
            changed_children.clone()
        } else {
            ImmutableTree::new().set_tree(path, changed_children.clone())
        };
        let server_node = server_cache.node();
        let mut current = view_cache.clone();

        for (child_key, child_tree) in merge_tree.children() {
            if server_node.has_child(child_key) {
                let new_child = apply_merge(&server_node.immediate_child(child_key), child_tree);
                current = self.apply_server_overwrite(
                    &current,
                    &Path::new(child_key),
                    &new_child,
                    writes,
                    complete_cache,
                    filter_server_node,
                    acc,
                );
            }
        }
        for (child_key, child_tree) in merge_tree.children() {
            let unknown_deep_merge =
                !server_cache.is_complete_for_child(child_key) && child_tree.value().is_none();
            if !server_node.has_child(child_key) && !unknown_deep_merge {
                let new_child = apply_merge(&server_node.immediate_child(child_key), child_tree);
                current = self.apply_server_overwrite(
                    &current,
                    &Path::new(child_key),
                    &new_child,
                    writes,
                    complete_cache,
                    filter_server_node,
                    acc,
                );
            }
        }
        current
    }

    fn ack_user_write(
        &self,
        view_cache: &ViewCache,
        ack_path: &Path,
        affected_tree: &ImmutableTree<bool>,
        writes: &WriteTreeRef<'_>,
        complete_cache: Option<&Node>,
        acc: &mut ChildChangeAccumulator,
    ) -> ViewCache {
        if writes.shadowing_write(ack_path).is_some() {
            return view_cache.clone();
        }
        let filter_server_node = view_cache.server_cache().is_filtered();
        let server_cache = view_cache.server_cache();

        // Re-apply the cached server data for the acked paths now that the
        // write no longer shadows it.
        if affected_tree.value().is_some() {
            if (ack_path.is_empty() && server_cache.is_fully_initialized())
                || server_cache.is_complete_for_path(ack_path)
            {
                self.apply_server_overwrite(
                    view_cache,
                    ack_path,
                    &server_cache.node().child(ack_path),
                    writes,
                    complete_cache,
                    filter_server_node,
                    acc,
                )
            } else if ack_path.is_empty() {
                // Acking the root without full data: replay what we have.
                let changed_children = server_cache
                    .node()
                    .children()
                    .fold(ImmutableTree::new(), |tree, child| {
                        tree.set(&Path::new(&child.name), child.node)
                    });
                self.apply_server_merge(
                    view_cache,
                    ack_path,
                    &changed_children,
                    writes,
                    complete_cache,
                    filter_server_node,
                    acc,
                )
            } else {
                view_cache.clone()
            }
        } else {
            let mut changed_children = ImmutableTree::new();
            affected_tree.foreach(|merge_path, _| {
                let server_cache_path = ack_path.join(merge_path);
                if server_cache.is_complete_for_path(&server_cache_path) {
                    changed_children =
                        changed_children.set(merge_path, server_cache.node().child(&server_cache_path));
                }
            });
            self.apply_server_merge(
                view_cache,
                ack_path,
                &changed_children,
                writes,
                complete_cache,
                filter_server_node,
                acc,
            )
        }
    }

    fn revert_user_write(
        &self,
        view_cache: &ViewCache,
        path: &Path,
        writes: &WriteTreeRef<'_>,
        complete_server_cache: Option<&Node>,
        acc: &mut ChildChangeAccumulator,
    ) -> ViewCache {
        if writes.shadowing_write(path).is_some() {
            return view_cache.clone();
        }
        let source = WriteTreeCompleteChildSource::new(writes, view_cache, complete_server_cache);
        let old_event_cache = view_cache.event_cache().node();
        let server_cache = view_cache.server_cache();

        let new_event_cache = match path.front() {
            None | Some(PRIORITY_KEY) => {
                let new_node = if server_cache.is_fully_initialized() {
                    writes
                        .calc_complete_event_cache(view_cache.complete_server_snap())
                        .unwrap_or_else(Node::empty)
                } else {
                    assert!(
                        !server_cache.node().is_leaf(),
                        "a leaf server cache is always complete"
                    );
                    writes.calc_complete_event_children(Some(server_cache.node()))
                };
                self.filter
                    .update_full_node(old_event_cache, &new_node, Some(&mut *acc))
            }
            Some(child_key) => {
                let child_path = path.pop_front();
                let complete_for_child = server_cache.is_complete_for_child(child_key);
                let new_child = writes
                    .calc_complete_child(child_key, server_cache.node(), complete_for_child)
                    .or_else(|| complete_for_child.then(|| old_event_cache.immediate_child(child_key)));
                let mut new_event_cache = match new_child {
                    Some(child) => self.filter.update_child(
                        old_event_cache,
                        child_key,
                        child,
                        &child_path,
                        &source,
                        Some(&mut *acc),
                    ),
                    // No complete child is available; drop what is shown.
                    None if old_event_cache.has_child(child_key) => self.filter.update_child(
                        old_event_cache,
                        child_key,
                        Node::empty(),
                        &child_path,
                        &source,
                        Some(&mut *acc),
                    ),
                    None => old_event_cache.clone(),
                };
                if new_event_cache.is_empty() && server_cache.is_fully_initialized() {
                    // Every child write may be gone while the server holds a leaf.
                    let complete = writes
                        .calc_complete_event_cache(view_cache.complete_server_snap())
                        .unwrap_or_else(Node::empty);
                    if complete.is_leaf() {
                        new_event_cache =
                            self.filter
                                .update_full_node(&new_event_cache, &complete, Some(&mut *acc));
                    }
                }
                new_event_cache
            }
        };
        let complete = server_cache.is_fully_initialized()
            || writes.shadowing_write(&Path::root()).is_some();
        view_cache.update_event_snap(new_event_cache, complete, self.filter.filters_nodes())
    }

    fn listen_complete(
        &self,
        view_cache: &ViewCache,
        path: &Path,
        writes: &WriteTreeRef<'_>,
        acc: &mut ChildChangeAccumulator,
    ) -> ViewCache {
        let old_server = view_cache.server_cache();
        let new_view_cache = view_cache.update_server_snap(
            old_server.node().clone(),
            old_server.is_fully_initialized() || path.is_empty(),
            old_server.is_filtered(),
        );
        self.generate_event_cache_after_server_event(
            &new_view_cache,
            path,
            writes,
            &NoCompleteChildSource,
            acc,
        )
    }
}

fn apply_merge(node: &Node, merge: &ImmutableTree<Node>) -> Node {
    let mut result = node.clone();
    merge.foreach(|relative, child| result = result.update_child(relative, child.clone()));
    result
}

/// Append a value change when the event cache became complete or changed.
fn maybe_add_value_event(old: &ViewCache, new: &ViewCache, changes: &mut Vec<Change>) {
    let Some(node) = new.complete_event_snap() else {
        return;
    };
    let changed = match old.complete_event_snap() {
        None => true,
        Some(old_node) => {
            let leaf_or_empty = node.is_leaf() || node.is_empty();
            !changes.is_empty()
                || (leaf_or_empty && node != old_node)
                || node.priority() != old_node.priority()
        }
    };
    if changed {
        changes.push(Change::value(node.clone()));
    }
}

/// A view cache with nothing known yet.
pub fn empty_view_cache() -> ViewCache {
    ViewCache::new(
        CacheNode::new(Node::empty(), false, false),
        CacheNode::new(Node::empty(), false, false),
    )
}
