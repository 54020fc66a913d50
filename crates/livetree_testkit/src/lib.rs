//! # Livetree Testkit
//!
//! Test utilities for livetree.
//!
//! This crate provides:
//! - Fixtures: JSON node builders, query builders and a sync tree driver
//! - Property-based test generators using proptest
//! - Tracing setup for tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use livetree_testkit::prelude::*;
//!
//! #[test]
//! fn test_server_data_reaches_listener() {
//!     let mut driver = TreeDriver::new();
//!     let query = QuerySpec::default_at(Path::root());
//!     driver.listen(&query, EventRegistration::value(1));
//!     let events = driver.server_set("", json!({"a": 1}));
//!     assert_eq!(summarize(&events), vec![(EventType::Value, String::new())]);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

use tracing_subscriber::EnvFilter;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::init_tracing;
    pub use livetree_snapshot::{Index, Node, Path};
    pub use livetree_sync_protocol::{EventRegistration, EventType, QueryParams, QuerySpec};
    pub use serde_json::json;
}

pub use fixtures::*;
pub use generators::*;

/// Install a fmt subscriber filtered by `RUST_LOG` (default `warn`).
///
/// Output goes through the test writer, so it is captured per test. Calling
/// this more than once is fine; only the first call installs anything.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
