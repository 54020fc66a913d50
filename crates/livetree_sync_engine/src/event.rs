//! Events returned to the application.

use crate::error::SyncError;
use livetree_snapshot::{Index, Node, Path};
use livetree_sync_protocol::{EventRegistration, EventType};

/// A data change delivered to one registration.
#[derive(Debug, Clone, PartialEq)]
pub struct DataEvent {
    /// Kind of event.
    pub event_type: EventType,
    /// Registration the event is for.
    pub registration: EventRegistration,
    /// Location of `node`: the query path for value events, the child's
    /// path for child events.
    pub path: Path,
    /// The new value (the old value for removals).
    pub node: Node,
    /// Ordering of the query that raised the event.
    pub index: Index,
    /// Preceding sibling in query order, for added, changed and moved events.
    pub prev_name: Option<String>,
}

/// A registration was cancelled by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct CancelEvent {
    /// The cancelled registration.
    pub registration: EventRegistration,
    /// Location of the cancelled query.
    pub path: Path,
    /// Why the registration was cancelled.
    pub error: SyncError,
}

/// An event for the application.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Data changed.
    Data(DataEvent),
    /// A listen failed.
    Cancel(CancelEvent),
}

impl Event {
    /// Event type of a data event.
    pub fn event_type(&self) -> Option<EventType> {
        match self {
            Event::Data(data) => Some(data.event_type),
            Event::Cancel(_) => None,
        }
    }

    /// Location the event refers to.
    pub fn path(&self) -> &Path {
        match self {
            Event::Data(data) => &data.path,
            Event::Cancel(cancel) => &cancel.path,
        }
    }

    /// Registration the event is for.
    pub fn registration(&self) -> &EventRegistration {
        match self {
            Event::Data(data) => &data.registration,
            Event::Cancel(cancel) => &cancel.registration,
        }
    }

    /// The data event, if this is one.
    pub fn as_data(&self) -> Option<&DataEvent> {
        match self {
            Event::Data(data) => Some(data),
            Event::Cancel(_) => None,
        }
    }

    /// Whether this is a cancel event.
    pub fn is_cancel(&self) -> bool {
        matches!(self, Event::Cancel(_))
    }
}
