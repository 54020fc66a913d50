//! A sync tree shared between threads.

use crate::error::{SyncError, SyncResult};
use crate::event::Event;
use crate::listen::{ListenProvider, ListenRequest, ListenStatus, Tag};
use crate::sync_tree::SyncTree;
use livetree_core::{MergeChildren, WriteId};
use livetree_snapshot::{Node, Path};
use livetree_sync_protocol::{EventRegistration, QuerySpec};
use parking_lot::{Mutex, MutexGuard};
use serde_json::{Map, Value};
use std::sync::Arc;

/// A [`SyncTree`] behind a mutex.
///
/// Network callbacks may arrive on any thread. Each call takes the lock for
/// the whole operation, so operations are applied one at a time and no view
/// is read mid-update.
pub struct SharedSyncTree<P: ListenProvider> {
    inner: Arc<Mutex<SyncTree<P>>>,
}

impl<P: ListenProvider> Clone for SharedSyncTree<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: ListenProvider> SharedSyncTree<P> {
    /// Share `tree`.
    pub fn new(tree: SyncTree<P>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(tree)),
        }
    }

    /// Lock the tree for several calls in a row.
    pub fn lock(&self) -> MutexGuard<'_, SyncTree<P>> {
        self.inner.lock()
    }

    /// Run `f` with the tree locked.
    pub fn with<R>(&self, f: impl FnOnce(&mut SyncTree<P>) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// See [`SyncTree::apply_user_overwrite`].
    pub fn apply_user_overwrite(&self, path: &Path, node: Node, write_id: WriteId, visible: bool) -> Vec<Event> {
        self.inner
            .lock()
            .apply_user_overwrite(path, node, write_id, visible)
    }

    /// See [`SyncTree::apply_user_merge`].
    pub fn apply_user_merge(&self, path: &Path, children: &MergeChildren, write_id: WriteId) -> Vec<Event> {
        self.inner.lock().apply_user_merge(path, children, write_id)
    }

    /// See [`SyncTree::ack_user_write`].
    pub fn ack_user_write(&self, write_id: WriteId, revert: bool) -> Vec<Event> {
        self.inner.lock().ack_user_write(write_id, revert)
    }

    /// See [`SyncTree::apply_server_overwrite`].
    pub fn apply_server_overwrite(&self, path: &Path, node: Node) -> Vec<Event> {
        self.inner.lock().apply_server_overwrite(path, node)
    }

    /// See [`SyncTree::apply_server_merge`].
    pub fn apply_server_merge(&self, path: &Path, children: &MergeChildren) -> Vec<Event> {
        self.inner.lock().apply_server_merge(path, children)
    }

    /// See [`SyncTree::apply_tagged_query_overwrite`].
    pub fn apply_tagged_query_overwrite(&self, path: &Path, node: Node, tag: Tag) -> Vec<Event> {
        self.inner.lock().apply_tagged_query_overwrite(path, node, tag)
    }

    /// See [`SyncTree::apply_tagged_query_merge`].
    pub fn apply_tagged_query_merge(&self, path: &Path, children: &MergeChildren, tag: Tag) -> Vec<Event> {
        self.inner.lock().apply_tagged_query_merge(path, children, tag)
    }

    /// See [`SyncTree::apply_server_json`].
    pub fn apply_server_json(&self, path: &str, data: &Value, tag: Option<Tag>) -> SyncResult<Vec<Event>> {
        self.inner.lock().apply_server_json(path, data, tag)
    }

    /// See [`SyncTree::apply_server_json_merge`].
    pub fn apply_server_json_merge(
        &self,
        path: &str,
        children: &Map<String, Value>,
        tag: Option<Tag>,
    ) -> SyncResult<Vec<Event>> {
        self.inner.lock().apply_server_json_merge(path, children, tag)
    }

    /// See [`SyncTree::on_listen_complete`].
    pub fn on_listen_complete(&self, request: &ListenRequest, status: ListenStatus) -> Vec<Event> {
        self.inner.lock().on_listen_complete(request, status)
    }

    /// See [`SyncTree::add_event_registration`].
    pub fn add_event_registration(&self, query: &QuerySpec, registration: EventRegistration) -> Vec<Event> {
        self.inner.lock().add_event_registration(query, registration)
    }

    /// See [`SyncTree::remove_event_registration`].
    pub fn remove_event_registration(
        &self,
        query: &QuerySpec,
        registration: Option<&EventRegistration>,
        cancel_error: Option<SyncError>,
    ) -> Vec<Event> {
        self.inner
            .lock()
            .remove_event_registration(query, registration, cancel_error)
    }
}
