//! Views: one query's cached data and registrations.
//!
//! A [`View`] owns a [`ViewCache`] and the event registrations listening to
//! its query. Operations go through the [`ViewProcessor`], and the resulting
//! changes are turned into events by the [`EventGenerator`].

pub mod accumulator;
pub mod cache;
pub mod child_source;
pub mod event_generator;
pub mod filter;
pub mod processor;

use crate::error::SyncError;
use crate::event::{CancelEvent, Event};
use cache::{CacheNode, ViewCache};
use event_generator::EventGenerator;
use filter::NodeFilter;
use livetree_core::WriteTreeRef;
use livetree_snapshot::{Node, Path};
use livetree_sync_protocol::{Change, EventRegistration, Operation, QuerySpec};
use processor::ViewProcessor;

/// Cached data and registrations for one query.
#[derive(Debug, Clone)]
pub struct View {
    query: QuerySpec,
    processor: ViewProcessor,
    view_cache: ViewCache,
    registrations: Vec<EventRegistration>,
    generator: EventGenerator,
}

impl View {
    /// Create a view for `query` seeded with `initial`.
    ///
    /// The server cache is re-indexed but never filtered here. The event
    /// cache goes through the query filter.
    pub fn new(query: QuerySpec, initial: ViewCache, limit_rebuild_factor: usize) -> Self {
        let filter = NodeFilter::for_params(&query.params, limit_rebuild_factor);
        let index_filter = filter.indexed_filter();

        let initial_server = initial.server_cache();
        let initial_event = initial.event_cache();
        let server_snap = index_filter.update_full_node(&Node::empty(), initial_server.node(), None);
        let event_snap = filter.update_full_node(&Node::empty(), initial_event.node(), None);
        let view_cache = ViewCache::new(
            CacheNode::new(
                event_snap,
                initial_event.is_fully_initialized(),
                filter.filters_nodes(),
            ),
            CacheNode::new(
                server_snap,
                initial_server.is_fully_initialized(),
                index_filter.filters_nodes(),
            ),
        );
        let generator = EventGenerator::new(query.path.clone(), filter.index().clone());
        Self {
            query,
            processor: ViewProcessor::new(filter),
            view_cache,
            registrations: Vec::new(),
            generator,
        }
    }

    /// The query this view serves.
    pub fn query(&self) -> &QuerySpec {
        &self.query
    }

    /// The current cache.
    pub fn view_cache(&self) -> &ViewCache {
        &self.view_cache
    }

    /// Last known server data.
    pub fn server_cache(&self) -> &Node {
        self.view_cache.server_cache().node()
    }

    /// The event cache, if complete.
    pub fn complete_node(&self) -> Option<&Node> {
        self.view_cache.complete_event_snap()
    }

    /// Complete server data at `path` below the query location.
    ///
    /// A filtered view only answers for children it actually holds.
    pub fn complete_server_cache(&self, path: &Path) -> Option<Node> {
        let cache = self.view_cache.complete_server_snap()?;
        let answers = self.query.loads_all_data()
            || path
                .front()
                .is_some_and(|front| !cache.immediate_child(front).is_empty());
        answers.then(|| cache.child(path))
    }

    /// Whether no registration listens here.
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Registrations attached to this view.
    pub fn registrations(&self) -> &[EventRegistration] {
        &self.registrations
    }

    /// Attach a registration.
    pub fn add_event_registration(&mut self, registration: EventRegistration) {
        self.registrations.push(registration);
    }

    /// Detach registrations.
    ///
    /// With a registration carrying an id, only its first match goes; a
    /// registration without an id removes all of its kind; `None` removes
    /// everything. When `cancel_error` is given, every registration with a
    /// cancel callback gets a cancel event.
    ///
    /// # Panics
    ///
    /// Panics if both a registration and a cancel error are given.
    pub fn remove_event_registration(
        &mut self,
        registration: Option<&EventRegistration>,
        cancel_error: Option<&SyncError>,
    ) -> Vec<Event> {
        let mut cancel_events = Vec::new();
        if let Some(error) = cancel_error {
            assert!(
                registration.is_none(),
                "a cancel removes every registration: {}",
                self.query.query_key()
            );
            cancel_events.extend(
                self.registrations
                    .iter()
                    .filter(|r| r.has_cancel_callback())
                    .map(|r| {
                        Event::Cancel(CancelEvent {
                            registration: r.clone(),
                            path: self.query.path.clone(),
                            error: error.clone(),
                        })
                    }),
            );
        }

        match registration {
            Some(target) if target.has_any_callback() => {
                if let Some(idx) = self.registrations.iter().position(|r| r.matches(target)) {
                    self.registrations.remove(idx);
                }
            }
            Some(target) => self.registrations.retain(|r| !r.matches(target)),
            None => self.registrations.clear(),
        }
        cancel_events
    }

    /// Apply `operation` and return events for every registration.
    ///
    /// # Panics
    ///
    /// Panics if the operation would make a complete server cache
    /// incomplete again.
    pub fn apply_operation(
        &mut self,
        operation: &Operation,
        writes: &WriteTreeRef<'_>,
        complete_server_cache: Option<&Node>,
    ) -> Vec<Event> {
        let result =
            self.processor
                .apply_operation(&self.view_cache, operation, writes, complete_server_cache);
        assert!(
            result.view_cache.server_cache().is_fully_initialized()
                || !self.view_cache.server_cache().is_fully_initialized(),
            "a complete server cache never becomes incomplete: {}",
            self.query.query_key()
        );
        self.view_cache = result.view_cache;
        self.generator.generate_events_for_changes(
            &result.changes,
            self.view_cache.event_cache().node(),
            &self.registrations,
        )
    }

    /// Events that bring a new registration up to date with the cache.
    pub fn initial_events(&self, registration: &EventRegistration) -> Vec<Event> {
        let event_snap = self.view_cache.event_cache();
        let mut changes: Vec<Change> = if event_snap.node().is_leaf() {
            Vec::new()
        } else {
            event_snap
                .node()
                .children()
                .map(|child| Change::child_added(child.name, child.node))
                .collect()
        };
        if event_snap.is_fully_initialized() {
            changes.push(Change::value(event_snap.node().clone()));
        }
        self.generator.generate_events_for_changes(
            &changes,
            event_snap.node(),
            std::slice::from_ref(registration),
        )
    }
}
