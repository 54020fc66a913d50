//! Cached snapshots held by a view.

use livetree_snapshot::{Node, Path};

/// A node plus what is known about its completeness.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheNode {
    node: Node,
    fully_initialized: bool,
    filtered: bool,
}

impl CacheNode {
    /// Wrap `node`.
    pub fn new(node: Node, fully_initialized: bool, filtered: bool) -> Self {
        Self {
            node,
            fully_initialized,
            filtered,
        }
    }

    /// The cached node.
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Whether the node holds all data the query asked for.
    pub fn is_fully_initialized(&self) -> bool {
        self.fully_initialized
    }

    /// Whether a query filter removed children from the node.
    pub fn is_filtered(&self) -> bool {
        self.filtered
    }

    /// Whether the data at `path` below the node is known completely.
    pub fn is_complete_for_path(&self, path: &Path) -> bool {
        match path.front() {
            None => self.fully_initialized && !self.filtered,
            Some(front) => self.is_complete_for_child(front),
        }
    }

    /// Whether the child `key` is known completely. A filtered or partial
    /// cache still knows the children it holds.
    pub fn is_complete_for_child(&self, key: &str) -> bool {
        (self.fully_initialized && !self.filtered) || self.node.has_child(key)
    }
}

/// Server data and the optimistic data shown to the application.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewCache {
    event_cache: CacheNode,
    server_cache: CacheNode,
}

impl ViewCache {
    /// Pair an event cache with a server cache.
    pub fn new(event_cache: CacheNode, server_cache: CacheNode) -> Self {
        Self {
            event_cache,
            server_cache,
        }
    }

    /// Server data with local writes applied.
    pub fn event_cache(&self) -> &CacheNode {
        &self.event_cache
    }

    /// Last known server data.
    pub fn server_cache(&self) -> &CacheNode {
        &self.server_cache
    }

    /// Replace the event cache.
    pub fn update_event_snap(&self, node: Node, complete: bool, filtered: bool) -> ViewCache {
        ViewCache {
            event_cache: CacheNode::new(node, complete, filtered),
            server_cache: self.server_cache.clone(),
        }
    }

    /// Replace the server cache.
    pub fn update_server_snap(&self, node: Node, complete: bool, filtered: bool) -> ViewCache {
        ViewCache {
            event_cache: self.event_cache.clone(),
            server_cache: CacheNode::new(node, complete, filtered),
        }
    }

    /// The event cache node, if fully initialized.
    pub fn complete_event_snap(&self) -> Option<&Node> {
        self.event_cache
            .is_fully_initialized()
            .then(|| self.event_cache.node())
    }

    /// The server cache node, if fully initialized.
    pub fn complete_server_snap(&self) -> Option<&Node> {
        self.server_cache
            .is_fully_initialized()
            .then(|| self.server_cache.node())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(value: serde_json::Value) -> Node {
        Node::from_json(&value).unwrap()
    }

    #[test]
    fn test_completeness() {
        let partial = CacheNode::new(node(json!({"a": 1})), false, false);
        assert!(partial.is_complete_for_child("a"));
        assert!(!partial.is_complete_for_child("b"));
        assert!(!partial.is_complete_for_path(&Path::root()));

        let filtered = CacheNode::new(node(json!({"a": 1})), true, true);
        assert!(!filtered.is_complete_for_child("b"));
        assert!(filtered.is_complete_for_path(&Path::new("a/x")));

        let complete = CacheNode::new(Node::empty(), true, false);
        assert!(complete.is_complete_for_child("anything"));
        assert!(complete.is_complete_for_path(&Path::root()));
    }

    #[test]
    fn test_view_cache_updates() {
        let cache = ViewCache::new(
            CacheNode::new(Node::empty(), false, false),
            CacheNode::new(Node::empty(), false, false),
        );
        assert!(cache.complete_event_snap().is_none());
        let cache = cache.update_server_snap(Node::leaf(1), true, false);
        assert_eq!(cache.complete_server_snap(), Some(&Node::leaf(1)));
        assert!(cache.complete_event_snap().is_none());
        let cache = cache.update_event_snap(Node::leaf(2), true, false);
        assert_eq!(cache.complete_event_snap(), Some(&Node::leaf(2)));
    }
}
