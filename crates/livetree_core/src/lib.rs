//! # Livetree Core
//!
//! Write bookkeeping shared by the sync engine.
//!
//! This crate provides:
//! - [`ImmutableTree`]: a persistent trie of values keyed by path
//! - [`CompoundWrite`]: a layered set of overwrites
//! - [`WriteTree`]: the ordered list of unacknowledged user writes, and
//!   [`WriteTreeRef`], a view of it scoped to one location
//! - Deferred server value resolution
//!
//! ## Key Invariants
//!
//! - Write ids are strictly increasing
//! - A compound write never stores a write beneath another write
//! - Removing a write that a later write fully shadows changes nothing

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod compound_write;
mod immutable_tree;
mod server_values;
mod write_tree;

pub use compound_write::{CompoundWrite, MergeChildren};
pub use immutable_tree::ImmutableTree;
pub use server_values::{resolve_deferred_value_snapshot, ServerValues};
pub use write_tree::{WriteData, WriteId, WriteRecord, WriteTree, WriteTreeRef};
