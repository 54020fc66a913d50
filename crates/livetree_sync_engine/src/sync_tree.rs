//! The sync tree coordinator.
//!
//! [`SyncTree`] is the single entry point of the engine. It owns:
//!
//! - a path trie of [`SyncPoint`]s, one per listened location
//! - the [`WriteTree`] of every pending user write
//! - the tag maps routing tagged server pushes to constrained queries
//! - the [`ListenProvider`] it asks to start and stop server listens
//!
//! Every operation is applied along its path with children before parents,
//! so events for deeper locations come first. State is persistent: a new sync
//! point trie is built and swapped in only once an operation has been fully
//! applied.

use crate::config::SyncTreeConfig;
use crate::error::SyncError;
use crate::event::Event;
use crate::listen::{ListenProvider, ListenRequest, ListenStatus, Tag};
use crate::sync_point::SyncPoint;
use crate::view::View;
use livetree_core::{
    resolve_deferred_value_snapshot, ImmutableTree, MergeChildren, ServerValues, WriteData, WriteId,
    WriteTree, WriteTreeRef,
};
use livetree_snapshot::{Node, Path};
use livetree_sync_protocol::{EventRegistration, Operation, OperationSource, QuerySpec};
use std::collections::HashMap;
use tracing::{debug, trace, warn};

/// Coordinates views, pending writes and server listens.
#[derive(Debug)]
pub struct SyncTree<P: ListenProvider> {
    sync_point_tree: ImmutableTree<SyncPoint>,
    pending_write_tree: WriteTree,
    tag_to_query: HashMap<Tag, QuerySpec>,
    query_to_tag: HashMap<String, Tag>,
    next_tag: Tag,
    config: SyncTreeConfig,
    provider: P,
}

impl<P: ListenProvider> SyncTree<P> {
    /// Creates a sync tree with default configuration.
    pub fn new(provider: P) -> Self {
        Self::with_config(provider, SyncTreeConfig::default())
    }

    /// Creates a sync tree with the given configuration.
    pub fn with_config(provider: P, config: SyncTreeConfig) -> Self {
        Self {
            sync_point_tree: ImmutableTree::new(),
            pending_write_tree: WriteTree::new(),
            tag_to_query: HashMap::new(),
            query_to_tag: HashMap::new(),
            next_tag: config.first_tag,
            config,
            provider,
        }
    }

    /// Gets the configuration.
    pub fn config(&self) -> &SyncTreeConfig {
        &self.config
    }

    /// The listen provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// The listen provider, mutably.
    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    // ---- user writes ----

    /// Record a user overwrite and apply it to the views. Hidden writes are
    /// recorded but raise no events.
    pub fn apply_user_overwrite(
        &mut self,
        path: &Path,
        node: Node,
        write_id: WriteId,
        visible: bool,
    ) -> Vec<Event> {
        self.pending_write_tree
            .add_overwrite(path.clone(), node.clone(), write_id, visible);
        if !visible {
            trace!(write_id, %path, "recorded hidden write");
            return Vec::new();
        }
        self.apply_operation_to_sync_points(&Operation::overwrite(
            OperationSource::User,
            path.clone(),
            node,
        ))
    }

    /// Record a user merge and apply it to the views.
    pub fn apply_user_merge(
        &mut self,
        path: &Path,
        children: &MergeChildren,
        write_id: WriteId,
    ) -> Vec<Event> {
        self.pending_write_tree
            .add_merge(path.clone(), children.clone(), write_id);
        self.apply_operation_to_sync_points(&Operation::merge(
            OperationSource::User,
            path.clone(),
            children,
        ))
    }

    /// The server acknowledged (or, with `revert`, rejected) a user write.
    ///
    /// # Panics
    ///
    /// Panics if `write_id` is not pending.
    pub fn ack_user_write(&mut self, write_id: WriteId, revert: bool) -> Vec<Event> {
        let Some(write) = self.pending_write_tree.get_write(write_id).cloned() else {
            panic!("ack for unknown write {write_id}");
        };
        debug!(write_id, revert, path = %write.path, "acknowledging user write");
        if !self.pending_write_tree.remove_write(write_id) {
            return Vec::new();
        }
        let affected_tree = match &write.data {
            WriteData::Overwrite(_) => ImmutableTree::leaf(true),
            WriteData::Merge(children) => children
                .keys()
                .fold(ImmutableTree::new(), |tree, child| tree.set(child, true)),
        };
        self.apply_operation_to_sync_points(&Operation::ack_user_write(
            write.path,
            affected_tree,
            revert,
        ))
    }

    // ---- server data ----

    /// Untagged server data replaced `path`.
    pub fn apply_server_overwrite(&mut self, path: &Path, node: Node) -> Vec<Event> {
        self.apply_operation_to_sync_points(&Operation::overwrite(
            OperationSource::Server,
            path.clone(),
            node,
        ))
    }

    /// Untagged server data replaced the listed children of `path`.
    pub fn apply_server_merge(&mut self, path: &Path, children: &MergeChildren) -> Vec<Event> {
        self.apply_operation_to_sync_points(&Operation::merge(
            OperationSource::Server,
            path.clone(),
            children,
        ))
    }

    /// The server finished the initial data of the listen at `path`.
    pub fn apply_listen_complete(&mut self, path: &Path) -> Vec<Event> {
        self.apply_operation_to_sync_points(&Operation::listen_complete(
            OperationSource::Server,
            path.clone(),
        ))
    }

    /// Server data for the query tagged `tag` replaced `path`. Unknown tags
    /// are ignored.
    pub fn apply_tagged_query_overwrite(&mut self, path: &Path, node: Node, tag: Tag) -> Vec<Event> {
        let Some((query, source)) = self.tagged_source(tag) else {
            return Vec::new();
        };
        let operation = Operation::overwrite(source, Path::relative(&query.path, path), node);
        self.apply_tagged_operation(&query, &operation)
    }

    /// Server data for the query tagged `tag` replaced children of `path`.
    pub fn apply_tagged_query_merge(
        &mut self,
        path: &Path,
        children: &MergeChildren,
        tag: Tag,
    ) -> Vec<Event> {
        let Some((query, source)) = self.tagged_source(tag) else {
            return Vec::new();
        };
        let operation = Operation::merge(source, Path::relative(&query.path, path), children);
        self.apply_tagged_operation(&query, &operation)
    }

    /// The server finished the initial data of the listen tagged `tag`.
    pub fn apply_tagged_listen_complete(&mut self, path: &Path, tag: Tag) -> Vec<Event> {
        let Some((query, source)) = self.tagged_source(tag) else {
            return Vec::new();
        };
        let operation = Operation::listen_complete(source, Path::relative(&query.path, path));
        self.apply_tagged_operation(&query, &operation)
    }

    fn tagged_source(&self, tag: Tag) -> Option<(QuerySpec, OperationSource)> {
        let Some(query) = self.tag_to_query.get(&tag) else {
            trace!(tag, "dropping server data for unknown tag");
            return None;
        };
        let source = OperationSource::ServerTaggedQuery(query.query_identifier());
        Some((query.clone(), source))
    }

    fn apply_tagged_operation(&mut self, query: &QuerySpec, operation: &Operation) -> Vec<Event> {
        let query_path = &query.path;
        let Some(point) = self.sync_point_tree.get(query_path) else {
            panic!("missing sync point for tagged query {}", query.query_key());
        };
        assert!(
            point.view_exists_for_query(query),
            "no view for tagged query {}",
            query.query_key()
        );
        trace!(path = %query_path, op_path = %operation.path, "applying tagged operation");
        let mut point = point.clone();
        let writes = self.pending_write_tree.child_writes(query_path);
        let events = point.apply_operation(operation, &writes, None);
        self.sync_point_tree = self.sync_point_tree.set(query_path, point);
        events
    }

    fn apply_operation_to_sync_points(&mut self, operation: &Operation) -> Vec<Event> {
        trace!(path = %operation.path, source = ?operation.source, "applying operation");
        let writes = self.pending_write_tree.child_writes(&Path::root());
        let (tree, events) = apply_operation_helper(operation, &self.sync_point_tree, None, &writes);
        self.sync_point_tree = tree;
        events
    }

    // ---- registrations ----

    /// Add a registration for `query` and return its initial events, plus
    /// any events the provider returns for a new listen.
    pub fn add_event_registration(
        &mut self,
        query: &QuerySpec,
        registration: EventRegistration,
    ) -> Vec<Event> {
        let path = &query.path;
        let mut server_cache: Option<Node> = None;
        let mut found_ancestor_default_view = false;
        self.sync_point_tree.foreach_on_path(path, |point_path, point| {
            if server_cache.is_none() {
                server_cache = point.complete_server_cache(&Path::relative(point_path, path));
            }
            found_ancestor_default_view |= point.has_complete_view();
        });

        let mut point = match self.sync_point_tree.get(path) {
            Some(existing) => {
                found_ancestor_default_view |= existing.has_complete_view();
                if server_cache.is_none() {
                    server_cache = existing.complete_server_cache(&Path::root());
                }
                existing.clone()
            }
            None => SyncPoint::new(),
        };

        let (server_cache, server_cache_complete) = match server_cache {
            Some(node) => (node, true),
            None => {
                // Complete data of child locations still seeds the view.
                let mut partial = Node::empty();
                self.sync_point_tree
                    .subtree(path)
                    .foreach_child(|name, child_point| {
                        if let Some(complete) = child_point.complete_server_cache(&Path::root()) {
                            partial = partial.update_immediate_child(name, complete);
                        }
                    });
                (partial, false)
            }
        };

        let view_already_exists = point.view_exists_for_query(query);
        if !view_already_exists && !query.loads_all_data() {
            let key = query.query_key();
            assert!(
                !self.query_to_tag.contains_key(&key),
                "a tag exists for {key} without a view"
            );
            let tag = self.next_tag;
            self.next_tag += 1;
            debug!(tag, query = %key, "allocated query tag");
            self.query_to_tag.insert(key, tag);
            self.tag_to_query.insert(tag, query.clone());
        }

        let writes = self.pending_write_tree.child_writes(path);
        let mut events = point.add_event_registration(
            query,
            registration,
            &writes,
            server_cache,
            server_cache_complete,
            self.config.limit_rebuild_factor,
        );
        self.sync_point_tree = self.sync_point_tree.set(path, point);

        if !view_already_exists && !found_ancestor_default_view {
            events.extend(self.setup_listener(query));
        }
        events
    }

    /// Remove registrations from `query`.
    ///
    /// `registration` selects what to remove (see
    /// [`View::remove_event_registration`]); `None` removes all. With a
    /// `cancel_error`, every registration at the location is removed, cancel
    /// events are returned and no listen is stopped.
    pub fn remove_event_registration(
        &mut self,
        query: &QuerySpec,
        registration: Option<&EventRegistration>,
        cancel_error: Option<SyncError>,
    ) -> Vec<Event> {
        let path = &query.path;
        let Some(existing) = self.sync_point_tree.get(path) else {
            return Vec::new();
        };
        if !query.is_default() && !existing.view_exists_for_query(query) {
            return Vec::new();
        }

        let mut point = existing.clone();
        let (removed, mut events) =
            point.remove_event_registration(query, registration, cancel_error.as_ref());
        self.sync_point_tree = if point.is_empty() {
            self.sync_point_tree.remove(path)
        } else {
            self.sync_point_tree.set(path, point)
        };

        let removing_default = removed.iter().any(QuerySpec::loads_all_data);
        let covered = self
            .sync_point_tree
            .find_on_path(path, |_, point| point.has_complete_view().then_some(()))
            .is_some();

        if removing_default && !covered {
            // Queries below were shadowed by the removed default listen.
            let subtree = self.sync_point_tree.subtree(path);
            let requests: Vec<ListenRequest> = collect_distinct_views(&subtree)
                .into_iter()
                .map(|view| self.listen_request(view))
                .collect();
            for request in requests {
                debug!(query = %request.query.query_key(), tag = ?request.tag, "restarting shadowed listen");
                events.extend(self.provider.start_listening(&request));
            }
        }

        if !covered && !removed.is_empty() && cancel_error.is_none() {
            if removing_default {
                let listen_query = query.for_listening();
                debug!(query = %listen_query.query_key(), "stop listening");
                self.provider.stop_listening(&listen_query, None);
            } else {
                for removed_query in &removed {
                    let tag = self.tag_for_query(removed_query);
                    debug!(query = %removed_query.query_key(), ?tag, "stop listening");
                    self.provider
                        .stop_listening(&removed_query.for_listening(), tag);
                }
            }
        }

        self.remove_tags(&removed);
        events
    }

    /// The provider reported the outcome of `request`.
    ///
    /// A failed listen cancels every registration of the request's view
    /// query.
    pub fn on_listen_complete(&mut self, request: &ListenRequest, status: ListenStatus) -> Vec<Event> {
        let path = &request.view_query.path;
        if status.is_ok() {
            return match request.tag {
                Some(tag) => self.apply_tagged_listen_complete(path, tag),
                None => self.apply_listen_complete(path),
            };
        }
        warn!(query = %request.view_query.query_key(), %status, "listen rejected");
        let error = SyncError::from_listen_status(status, path.clone());
        self.remove_event_registration(&request.view_query, None, Some(error))
    }

    fn setup_listener(&mut self, query: &QuerySpec) -> Vec<Event> {
        let path = &query.path;
        let Some(request) = self
            .sync_point_tree
            .get(path)
            .and_then(|point| point.view_for_query(query))
            .map(|view| self.listen_request(view))
        else {
            panic!("no view for {} after registration", query.query_key());
        };
        debug!(query = %request.query.query_key(), tag = ?request.tag, "start listening");
        let events = self.provider.start_listening(&request);

        let subtree = self.sync_point_tree.subtree(path);
        if request.tag.is_some() {
            assert!(
                !subtree.value().is_some_and(SyncPoint::has_complete_view),
                "a tagged listen is never shadowed by a complete view"
            );
            return events;
        }

        // The new default listen covers every listen below it.
        let queries_to_stop = subtree.fold(|relative, point, child_queries: Vec<(String, Vec<QuerySpec>)>| {
            if let Some(view) = point
                .filter(|_| !relative.is_empty())
                .and_then(SyncPoint::complete_view)
            {
                return vec![view.query().clone()];
            }
            let mut queries: Vec<QuerySpec> = point
                .map(|p| p.query_views().map(|view| view.query().clone()).collect())
                .unwrap_or_default();
            for (_, below) in child_queries {
                queries.extend(below);
            }
            queries
        });
        for query_to_stop in queries_to_stop {
            let tag = self.tag_for_query(&query_to_stop);
            debug!(query = %query_to_stop.query_key(), ?tag, "stop shadowed listen");
            self.provider
                .stop_listening(&query_to_stop.for_listening(), tag);
        }
        events
    }

    fn listen_request(&self, view: &View) -> ListenRequest {
        let query = view.query();
        ListenRequest {
            query: query.for_listening(),
            view_query: query.clone(),
            tag: self.tag_for_query(query),
            hash: view.server_cache().content_hash(),
        }
    }

    fn remove_tags(&mut self, queries: &[QuerySpec]) {
        for query in queries.iter().filter(|q| !q.loads_all_data()) {
            if let Some(tag) = self.query_to_tag.remove(&query.query_key()) {
                debug!(tag, query = %query.query_key(), "released query tag");
                self.tag_to_query.remove(&tag);
            }
        }
    }

    // ---- reads ----

    /// Content hash of the server cache of `query`'s view, or an empty
    /// string when no view exists.
    pub fn listen_hash(&self, query: &QuerySpec) -> String {
        self.view(query)
            .map(|view| view.server_cache().content_hash())
            .unwrap_or_default()
    }

    /// Best known value at `path` with every pending write applied, hidden
    /// ones included, except those in `exclude`.
    pub fn calc_complete_event_cache(&self, path: &Path, exclude: &[WriteId]) -> Option<Node> {
        let server_cache = self.sync_point_tree.find_on_path(path, |point_path, point| {
            point.complete_server_cache(&Path::relative(point_path, path))
        });
        self.pending_write_tree
            .calc_complete_event_cache(path, server_cache.as_ref(), exclude, true)
    }

    /// Replace deferred server values in `node`, a write about to be made at
    /// `path`, using the best known current value there.
    pub fn resolve_deferred_value(&self, path: &Path, node: &Node, server_values: &ServerValues) -> Node {
        let existing = self
            .calc_complete_event_cache(path, &[])
            .unwrap_or_else(Node::empty);
        resolve_deferred_value_snapshot(node, &existing, server_values)
    }

    /// Tag of a constrained query.
    pub fn tag_for_query(&self, query: &QuerySpec) -> Option<Tag> {
        self.query_to_tag.get(&query.query_key()).copied()
    }

    /// Query a tag was issued to.
    pub fn query_for_tag(&self, tag: Tag) -> Option<&QuerySpec> {
        self.tag_to_query.get(&tag)
    }

    /// Server cache of `query`'s view.
    pub fn server_cache(&self, query: &QuerySpec) -> Option<&Node> {
        self.view(query).map(View::server_cache)
    }

    /// Event cache of `query`'s view, complete or not.
    pub fn event_cache(&self, query: &QuerySpec) -> Option<&Node> {
        self.view(query).map(|view| view.view_cache().event_cache().node())
    }

    /// Whether a view that loads all data exists exactly at `path`.
    pub fn has_complete_view(&self, path: &Path) -> bool {
        self.sync_point_tree
            .get(path)
            .is_some_and(SyncPoint::has_complete_view)
    }

    /// Number of writes not yet acknowledged.
    pub fn pending_write_count(&self) -> usize {
        self.pending_write_tree.len()
    }

    fn view(&self, query: &QuerySpec) -> Option<&View> {
        self.sync_point_tree.get(&query.path)?.view_for_query(query)
    }
}

/// Apply `operation` below and at the root of `tree`, deepest sync points
/// first.
fn apply_operation_helper(
    operation: &Operation,
    tree: &ImmutableTree<SyncPoint>,
    server_cache: Option<Node>,
    writes: &WriteTreeRef<'_>,
) -> (ImmutableTree<SyncPoint>, Vec<Event>) {
    let Some(child_name) = operation.path.front() else {
        return apply_operation_descendants(operation, tree, server_cache, writes);
    };
    let server_cache = server_cache.or_else(|| {
        tree.value()
            .and_then(|point| point.complete_server_cache(&Path::root()))
    });
    let mut new_tree = tree.clone();
    let mut events = Vec::new();

    if let (Some(child_tree), Some(child_operation)) =
        (tree.child(child_name), operation.operation_for_child(child_name))
    {
        let child_server_cache = server_cache
            .as_ref()
            .map(|node| node.immediate_child(child_name));
        let (child, child_events) = apply_operation_helper(
            &child_operation,
            child_tree,
            child_server_cache,
            &writes.child(child_name),
        );
        new_tree = new_tree.set_child(child_name, child);
        events.extend(child_events);
    }

    if let Some(point) = tree.value() {
        let mut point = point.clone();
        events.extend(point.apply_operation(operation, writes, server_cache.as_ref()));
        new_tree = new_tree.with_value(Some(point));
    }
    (new_tree, events)
}

/// Apply an operation whose path is exhausted to every sync point in
/// `tree`, children first.
fn apply_operation_descendants(
    operation: &Operation,
    tree: &ImmutableTree<SyncPoint>,
    server_cache: Option<Node>,
    writes: &WriteTreeRef<'_>,
) -> (ImmutableTree<SyncPoint>, Vec<Event>) {
    let server_cache = server_cache.or_else(|| {
        tree.value()
            .and_then(|point| point.complete_server_cache(&Path::root()))
    });
    let mut new_tree = tree.clone();
    let mut events = Vec::new();

    for (child_name, child_tree) in tree.children() {
        let Some(child_operation) = operation.operation_for_child(child_name) else {
            continue;
        };
        let child_server_cache = server_cache
            .as_ref()
            .map(|node| node.immediate_child(child_name));
        let (child, child_events) = apply_operation_descendants(
            &child_operation,
            child_tree,
            child_server_cache,
            &writes.child(child_name),
        );
        new_tree = new_tree.set_child(child_name, child);
        events.extend(child_events);
    }

    if let Some(point) = tree.value() {
        let mut point = point.clone();
        events.extend(point.apply_operation(operation, writes, server_cache.as_ref()));
        new_tree = new_tree.with_value(Some(point));
    }
    (new_tree, events)
}

/// The minimal set of views whose listens cover `subtree`: a complete view
/// covers everything below it.
fn collect_distinct_views(subtree: &ImmutableTree<SyncPoint>) -> Vec<&View> {
    subtree.fold(|_, point, child_views| {
        if let Some(view) = point.and_then(SyncPoint::complete_view) {
            return vec![view];
        }
        let mut views: Vec<&View> = point
            .map(|p| p.query_views().collect())
            .unwrap_or_default();
        for (_, below) in child_views {
            views.extend(below);
        }
        views
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listen::{ListenCall, MockListenProvider};
    use livetree_snapshot::Index;
    use livetree_sync_protocol::{EventType, QueryParams};
    use serde_json::json;

    fn node(value: serde_json::Value) -> Node {
        Node::from_json(&value).unwrap()
    }

    fn tree() -> SyncTree<MockListenProvider> {
        SyncTree::new(MockListenProvider::new())
    }

    fn by_key_first(path: &str, limit: usize) -> QuerySpec {
        let params = QueryParams::new()
            .order_by(Index::Key)
            .unwrap()
            .limit_to_first(limit)
            .unwrap();
        QuerySpec::new(Path::new(path), params)
    }

    fn types(events: &[Event]) -> Vec<EventType> {
        events.iter().filter_map(Event::event_type).collect()
    }

    #[test]
    fn test_default_listen_started_once() {
        let mut sync = tree();
        let query = QuerySpec::default_at(Path::new("a"));
        sync.add_event_registration(&query, EventRegistration::value(1));
        sync.add_event_registration(&query, EventRegistration::value(2));
        let started = sync.provider().started();
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].query, query);
        assert_eq!(started[0].tag, None);
    }

    #[test]
    #[should_panic(expected = "no view for tagged query /a$")]
    fn test_tagged_data_without_view_panics() {
        let mut sync = tree();
        sync.add_event_registration(&QuerySpec::default_at(Path::new("a")), EventRegistration::value(1));
        sync.tag_to_query.insert(40, by_key_first("a", 1));
        sync.apply_tagged_query_overwrite(&Path::new("a"), Node::leaf(1), 40);
    }

    #[test]
    fn test_constrained_query_gets_tag() {
        let mut sync = SyncTree::with_config(
            MockListenProvider::new(),
            SyncTreeConfig::new().with_first_tag(7),
        );
        let query = by_key_first("list", 2);
        sync.add_event_registration(&query, EventRegistration::any_child());
        assert_eq!(sync.tag_for_query(&query), Some(7));
        assert_eq!(sync.query_for_tag(7), Some(&query));
        assert_eq!(sync.provider().last_started().unwrap().tag, Some(7));

        sync.remove_event_registration(&query, None, None);
        assert_eq!(sync.tag_for_query(&query), None);
        assert_eq!(sync.provider().stopped(), vec![(&query, Some(7))]);
    }

    #[test]
    fn test_server_overwrite_raises_events_after_listen() {
        let mut sync = tree();
        let query = QuerySpec::default_at(Path::new("a"));
        let events = sync.add_event_registration(&query, EventRegistration::any_value());
        assert!(events.is_empty());

        let events = sync.apply_server_overwrite(&Path::new("a"), node(json!({"x": 1})));
        assert_eq!(types(&events), vec![EventType::Value]);
        assert_eq!(sync.server_cache(&query), Some(&node(json!({"x": 1}))));
    }

    #[test]
    fn test_deeper_events_come_first() {
        let mut sync = tree();
        sync.add_event_registration(&QuerySpec::default_at(Path::root()), EventRegistration::any_value());
        sync.add_event_registration(&QuerySpec::default_at(Path::new("a")), EventRegistration::any_value());
        sync.apply_server_overwrite(&Path::root(), node(json!({"a": {"b": 1}})));

        let events = sync.apply_server_overwrite(&Path::new("a/b"), Node::leaf(2));
        let paths: Vec<String> = events.iter().map(|e| e.path().to_string()).collect();
        assert_eq!(paths, vec!["/a".to_string(), "/".to_string()]);
    }

    #[test]
    fn test_ack_removes_pending_write() {
        let mut sync = tree();
        let query = QuerySpec::default_at(Path::root());
        sync.add_event_registration(&query, EventRegistration::any_value());
        sync.apply_server_overwrite(&Path::root(), node(json!({"a": 1})));

        let events = sync.apply_user_overwrite(&Path::new("a"), Node::leaf(2), 1, true);
        assert_eq!(types(&events), vec![EventType::Value]);
        assert_eq!(sync.pending_write_count(), 1);

        sync.apply_server_overwrite(&Path::new("a"), Node::leaf(2));
        let events = sync.ack_user_write(1, false);
        assert!(events.is_empty());
        assert_eq!(sync.pending_write_count(), 0);
        assert_eq!(sync.event_cache(&query), Some(&node(json!({"a": 2}))));
    }

    #[test]
    #[should_panic(expected = "unknown write")]
    fn test_ack_unknown_write_panics() {
        tree().ack_user_write(42, false);
    }

    #[test]
    fn test_calc_complete_event_cache_includes_hidden_writes() {
        let mut sync = tree();
        sync.add_event_registration(&QuerySpec::default_at(Path::root()), EventRegistration::any_value());
        sync.apply_server_overwrite(&Path::root(), node(json!({"a": 1, "b": 2})));
        let events = sync.apply_user_overwrite(&Path::new("a"), Node::leaf(5), 1, false);
        assert!(events.is_empty());

        assert_eq!(
            sync.calc_complete_event_cache(&Path::root(), &[]),
            Some(node(json!({"a": 5, "b": 2})))
        );
        assert_eq!(
            sync.calc_complete_event_cache(&Path::root(), &[1]),
            Some(node(json!({"a": 1, "b": 2})))
        );
    }

    #[test]
    fn test_resolve_deferred_value_uses_current_value() {
        let mut sync = tree();
        sync.add_event_registration(&QuerySpec::default_at(Path::root()), EventRegistration::any_value());
        sync.apply_server_overwrite(&Path::root(), node(json!({"count": 3})));
        let write = node(json!({".sv": {"increment": 2}}));
        let resolved =
            sync.resolve_deferred_value(&Path::new("count"), &write, &ServerValues::with_timestamp(0.0));
        assert_eq!(resolved, Node::leaf(5));
    }

    #[test]
    fn test_listen_hash_tracks_server_cache() {
        let mut sync = tree();
        let query = QuerySpec::default_at(Path::new("h"));
        assert_eq!(sync.listen_hash(&query), "");
        sync.add_event_registration(&query, EventRegistration::any_value());
        sync.apply_server_overwrite(&Path::new("h"), Node::leaf("v"));
        assert_eq!(sync.listen_hash(&query), Node::leaf("v").content_hash());
    }

    #[test]
    fn test_rejected_listen_cancels_registrations() {
        let mut sync = tree();
        let query = QuerySpec::default_at(Path::new("secret"));
        sync.add_event_registration(&query, EventRegistration::value(1).with_cancel_callback());
        let request = sync.provider().last_started().unwrap().clone();

        let events = sync.on_listen_complete(&request, ListenStatus::PermissionDenied);
        assert_eq!(events.len(), 1);
        assert!(events[0].is_cancel());
        assert!(!sync.has_complete_view(&Path::new("secret")));
        // The provider already dropped the listen.
        assert!(sync
            .provider()
            .calls()
            .iter()
            .all(|call| matches!(call, ListenCall::Start(_))));
    }
}
