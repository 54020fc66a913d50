//! Sources of complete child data for filters.
//!
//! When a limit window loses a child, the filter needs the next child in
//! query order to backfill the slot. That child may live in pending writes or
//! in server data the view's own cache does not hold.

use crate::view::cache::{CacheNode, ViewCache};
use livetree_core::WriteTreeRef;
use livetree_snapshot::{Index, NamedNode, Node};

/// Answers questions about complete children outside a view's cache.
pub trait CompleteChildSource {
    /// The complete value of child `key`, if known.
    fn complete_child(&self, key: &str) -> Option<Node>;

    /// The first complete child after `child` in `index` order, or before it
    /// when `reverse` is set.
    fn child_after_child(&self, index: &Index, child: &NamedNode, reverse: bool) -> Option<NamedNode>;
}

/// A source that knows nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCompleteChildSource;

impl CompleteChildSource for NoCompleteChildSource {
    fn complete_child(&self, _key: &str) -> Option<Node> {
        None
    }

    fn child_after_child(&self, _index: &Index, _child: &NamedNode, _reverse: bool) -> Option<NamedNode> {
        None
    }
}

/// Complete children from a view cache, pending writes and an optional
/// complete server cache found elsewhere in the sync tree.
pub struct WriteTreeCompleteChildSource<'a> {
    writes: &'a WriteTreeRef<'a>,
    view_cache: &'a ViewCache,
    complete_server_cache: Option<&'a Node>,
}

impl<'a> WriteTreeCompleteChildSource<'a> {
    /// Create a source over `writes` and `view_cache`.
    pub fn new(
        writes: &'a WriteTreeRef<'a>,
        view_cache: &'a ViewCache,
        complete_server_cache: Option<&'a Node>,
    ) -> Self {
        Self {
            writes,
            view_cache,
            complete_server_cache,
        }
    }
}

impl CompleteChildSource for WriteTreeCompleteChildSource<'_> {
    fn complete_child(&self, key: &str) -> Option<Node> {
        let event_cache = self.view_cache.event_cache();
        if event_cache.is_complete_for_child(key) {
            return Some(event_cache.node().immediate_child(key));
        }
        let server = match self.complete_server_cache {
            Some(node) => CacheNode::new(node.clone(), true, false),
            None => self.view_cache.server_cache().clone(),
        };
        self.writes
            .calc_complete_child(key, server.node(), server.is_complete_for_child(key))
    }

    fn child_after_child(&self, index: &Index, child: &NamedNode, reverse: bool) -> Option<NamedNode> {
        let server = self
            .complete_server_cache
            .or_else(|| self.view_cache.complete_server_snap());
        self.writes
            .calc_indexed_slice(server, child, 1, reverse, index)
            .into_iter()
            .next()
    }
}
