//! The views listening at one location.

use crate::error::SyncError;
use crate::event::Event;
use crate::view::cache::{CacheNode, ViewCache};
use crate::view::View;
use livetree_core::WriteTreeRef;
use livetree_snapshot::{Node, Path};
use livetree_sync_protocol::{EventRegistration, Operation, QuerySpec};
use std::collections::BTreeMap;

/// Every view at one path, keyed by query identifier.
///
/// A sync point with no views is removed from the sync tree.
#[derive(Debug, Clone, Default)]
pub struct SyncPoint {
    views: BTreeMap<String, View>,
}

impl SyncPoint {
    /// A sync point without views.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no views remain.
    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// Apply `operation` to the targeted view, or to every view for
    /// untagged operations.
    ///
    /// # Panics
    ///
    /// Panics if a tagged operation names a view this point does not have.
    pub fn apply_operation(
        &mut self,
        operation: &Operation,
        writes: &WriteTreeRef<'_>,
        complete_server_cache: Option<&Node>,
    ) -> Vec<Event> {
        match operation.source.query_id() {
            Some(query_id) => {
                let Some(view) = self.views.get_mut(query_id) else {
                    panic!(
                        "tagged operation at {} for missing view {query_id}",
                        operation.path
                    );
                };
                view.apply_operation(operation, writes, complete_server_cache)
            }
            None => self
                .views
                .values_mut()
                .flat_map(|view| view.apply_operation(operation, writes, complete_server_cache))
                .collect(),
        }
    }

    /// Attach `registration` to the view for `query`, creating the view if
    /// needed, and return the registration's initial events.
    pub fn add_event_registration(
        &mut self,
        query: &QuerySpec,
        registration: EventRegistration,
        writes: &WriteTreeRef<'_>,
        server_cache: Node,
        server_cache_complete: bool,
        limit_rebuild_factor: usize,
    ) -> Vec<Event> {
        let view = self
            .views
            .entry(query.query_identifier())
            .or_insert_with(|| {
                let event_seed = writes
                    .calc_complete_event_cache(server_cache_complete.then_some(&server_cache));
                let event_cache = match event_seed {
                    Some(node) => CacheNode::new(node, true, false),
                    None if !server_cache.is_leaf() => {
                        CacheNode::new(writes.calc_complete_event_children(Some(&server_cache)), false, false)
                    }
                    None => CacheNode::new(Node::empty(), false, false),
                };
                let cache = ViewCache::new(
                    event_cache,
                    CacheNode::new(server_cache, server_cache_complete, false),
                );
                View::new(query.clone(), cache, limit_rebuild_factor)
            });
        view.add_event_registration(registration.clone());
        view.initial_events(&registration)
    }

    /// Detach registrations from `query`'s view. The default query detaches
    /// from every view.
    ///
    /// Returns the constrained queries whose views went away, plus the
    /// default query at `query.path` if the last complete view went away,
    /// along with any cancel events.
    pub fn remove_event_registration(
        &mut self,
        query: &QuerySpec,
        registration: Option<&EventRegistration>,
        cancel_error: Option<&SyncError>,
    ) -> (Vec<QuerySpec>, Vec<Event>) {
        let had_complete_view = self.has_complete_view();
        let mut removed = Vec::new();
        let mut events = Vec::new();

        let targets: Vec<String> = if query.is_default() {
            self.views.keys().cloned().collect()
        } else {
            let id = query.query_identifier();
            self.views.contains_key(&id).then_some(id).into_iter().collect()
        };
        for id in targets {
            let Some(view) = self.views.get_mut(&id) else {
                continue;
            };
            events.extend(view.remove_event_registration(registration, cancel_error));
            if view.is_empty() {
                if let Some(view) = self.views.remove(&id) {
                    if !view.query().loads_all_data() {
                        removed.push(view.query().clone());
                    }
                }
            }
        }

        if had_complete_view && !self.has_complete_view() {
            removed.push(QuerySpec::default_at(query.path.clone()));
        }
        (removed, events)
    }

    /// Views of constrained queries.
    pub fn query_views(&self) -> impl Iterator<Item = &View> {
        self.views.values().filter(|view| !view.query().loads_all_data())
    }

    /// Complete server data at `path` below this point, from any view.
    pub fn complete_server_cache(&self, path: &Path) -> Option<Node> {
        self.views
            .values()
            .find_map(|view| view.complete_server_cache(path))
    }

    /// The view serving `query`. Queries that load all data are served by
    /// any complete view.
    pub fn view_for_query(&self, query: &QuerySpec) -> Option<&View> {
        if query.loads_all_data() {
            self.complete_view()
        } else {
            self.views.get(&query.query_identifier())
        }
    }

    /// Whether a view serves `query`.
    pub fn view_exists_for_query(&self, query: &QuerySpec) -> bool {
        self.view_for_query(query).is_some()
    }

    /// Whether a view loads all data here.
    pub fn has_complete_view(&self) -> bool {
        self.complete_view().is_some()
    }

    /// A view that loads all data here.
    pub fn complete_view(&self) -> Option<&View> {
        self.views.values().find(|view| view.query().loads_all_data())
    }
}
