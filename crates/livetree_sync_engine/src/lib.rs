//! # Livetree Sync Engine
//!
//! Live, query-filtered views of a remote tree with local writes layered on
//! top.
//!
//! This crate provides:
//! - Views that cache server data and optimistic data per query
//! - Query filters: unfiltered, ranged and limit-windowed
//! - Change accumulation and event generation
//! - The [`SyncTree`] coordinator for writes, server data and listens
//! - The [`ListenProvider`] boundary to the network layer, plus JSON entry
//!   points that validate server payloads
//!
//! ## Architecture
//!
//! Every call into the [`SyncTree`] becomes an [`Operation`] that is pushed
//! through the path trie of [`SyncPoint`]s:
//! 1. The operation is narrowed to each child location it touches
//! 2. Deeper sync points apply it before shallower ones
//! 3. Each view runs it through its processor and filter
//! 4. The resulting changes become events for the view's registrations
//!
//! ## Key Invariants
//!
//! - Operations are applied one at a time
//! - A complete server cache never becomes incomplete
//! - Each registration hears at most one event per child per operation
//! - A location covered by a complete view needs no listen of its own
//! - Listen failures become cancel events, never errors
//!
//! [`Operation`]: livetree_sync_protocol::Operation

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod event;
mod listen;
mod shared;
mod sync_point;
mod sync_tree;
pub mod view;
mod wire;

pub use config::SyncTreeConfig;
pub use error::{SyncError, SyncResult};
pub use event::{CancelEvent, DataEvent, Event};
pub use listen::{ListenCall, ListenProvider, ListenRequest, ListenStatus, MockListenProvider, Tag};
pub use shared::SharedSyncTree;
pub use sync_point::SyncPoint;
pub use sync_tree::SyncTree;
pub use view::View;
pub use wire::{parse_merge, parse_query};
