//! # Livetree Snapshot
//!
//! Immutable snapshot model for the livetree realtime database client.
//!
//! This crate provides:
//! - [`Node`]: persistent JSON-like trees with priorities and content hashes
//! - [`Path`]: cheap-to-slice hierarchical locations
//! - [`Index`]: child orderings (key, priority, value, child path)
//! - [`SortedMap`]: the persistent red-black tree underneath it all
//!
//! ## Usage
//!
//! ```
//! use livetree_snapshot::{Index, Node, Path};
//! use serde_json::json;
//!
//! let scores = Node::from_json(&json!({"ada": 7, "bob": 3})).unwrap();
//! let updated = scores.update_child(&Path::new("cy"), Node::leaf(5));
//!
//! let by_value: Vec<String> = updated.iter_by(&Index::Value).map(|c| c.name).collect();
//! assert_eq!(by_value, vec!["bob", "cy", "ada"]);
//! assert_eq!(scores.num_children(), 2);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod index;
mod json;
mod node;
mod path;
mod sorted_map;

pub use error::{SnapshotError, SnapshotResult};
pub use index::{name_compare, Index, NameOrder, NamedNode, MAX_NAME, MIN_NAME};
pub use json::{SERVER_VALUE_KEY, VALUE_KEY};
pub use node::{ChildIter, LeafValue, Node};
pub use path::{validate_key, Path, MAX_KEY_BYTES, PRIORITY_KEY};
pub use sorted_map::{KeyComparator, LexicalOrder, SortedMap, SortedMapIter};
