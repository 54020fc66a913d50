//! Event registrations.

use crate::change::EventType;

/// Caller-assigned identifier of a registration.
pub type RegistrationId = u64;

/// Which events a registration receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationKind {
    /// `value` events.
    Value,
    /// The listed child events.
    Child(Vec<EventType>),
}

/// A listener attached to a query.
///
/// A registration without an id acts as a wildcard when removing: it matches
/// every registration of the same kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRegistration {
    id: Option<RegistrationId>,
    kind: RegistrationKind,
    cancellable: bool,
}

impl EventRegistration {
    /// A `value` listener.
    pub fn value(id: RegistrationId) -> Self {
        Self {
            id: Some(id),
            kind: RegistrationKind::Value,
            cancellable: false,
        }
    }

    /// A listener for the given child events.
    pub fn child(id: RegistrationId, event_types: &[EventType]) -> Self {
        Self {
            id: Some(id),
            kind: RegistrationKind::Child(
                event_types
                    .iter()
                    .copied()
                    .filter(|t| *t != EventType::Value)
                    .collect(),
            ),
            cancellable: false,
        }
    }

    /// Wildcard matching every `value` listener.
    pub fn any_value() -> Self {
        Self {
            id: None,
            kind: RegistrationKind::Value,
            cancellable: false,
        }
    }

    /// Wildcard matching every child listener.
    pub fn any_child() -> Self {
        Self {
            id: None,
            kind: RegistrationKind::Child(Vec::new()),
            cancellable: false,
        }
    }

    /// Also receive cancel events.
    pub fn with_cancel_callback(mut self) -> Self {
        self.cancellable = true;
        self
    }

    /// The registration id.
    pub fn id(&self) -> Option<RegistrationId> {
        self.id
    }

    /// The registration kind.
    pub fn kind(&self) -> &RegistrationKind {
        &self.kind
    }

    /// Whether a cancel callback is attached.
    pub fn has_cancel_callback(&self) -> bool {
        self.cancellable
    }

    /// Whether this registration identifies a single listener.
    pub fn has_any_callback(&self) -> bool {
        self.id.is_some()
    }

    /// Whether events of `event_type` are delivered to this registration.
    pub fn responds_to(&self, event_type: EventType) -> bool {
        match &self.kind {
            RegistrationKind::Value => event_type == EventType::Value,
            RegistrationKind::Child(types) => types.contains(&event_type),
        }
    }

    /// Whether `other` refers to this registration.
    pub fn matches(&self, other: &EventRegistration) -> bool {
        let same_kind = matches!(
            (&self.kind, &other.kind),
            (RegistrationKind::Value, RegistrationKind::Value)
                | (RegistrationKind::Child(_), RegistrationKind::Child(_))
        );
        same_kind && (self.id.is_none() || other.id.is_none() || self.id == other.id)
    }
}
