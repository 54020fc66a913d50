//! # Livetree Sync Protocol
//!
//! Value types exchanged inside the livetree sync engine.
//!
//! This crate provides:
//! - [`QueryParams`] and [`QuerySpec`] with stable query identifiers
//! - [`Operation`]s: overwrites, merges, write acknowledgements and listen
//!   completions, each tagged with an [`OperationSource`]
//! - [`Change`]s produced by views and the [`EventType`]s they map to
//! - [`EventRegistration`]s describing listeners
//!
//! This is a pure data crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change;
mod error;
mod operation;
mod query;
mod registration;

pub use change::{Change, EventType};
pub use error::{ProtocolError, ProtocolResult};
pub use operation::{Operation, OperationKind, OperationSource};
pub use query::{QueryParams, QuerySpec, ViewFrom, DEFAULT_QUERY_ID};
pub use registration::{EventRegistration, RegistrationId, RegistrationKind};
