//! Error types for the snapshot crate.

use thiserror::Error;

/// Result type for snapshot operations.
pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Errors that can occur while building snapshots from untrusted input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    /// A child key contains forbidden characters or is too long.
    #[error("invalid key {key:?}: {reason}")]
    InvalidKey {
        /// The offending key.
        key: String,
        /// Why the key was rejected.
        reason: String,
    },

    /// A path string could not be parsed.
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath {
        /// The offending path.
        path: String,
        /// Why the path was rejected.
        reason: String,
    },

    /// A priority value is not a string, number, null or server value.
    #[error("invalid priority: {message}")]
    InvalidPriority {
        /// Description of the priority error.
        message: String,
    },

    /// A JSON value cannot be represented as a snapshot.
    #[error("invalid JSON: {message}")]
    InvalidJson {
        /// Description of the JSON error.
        message: String,
    },
}

impl SnapshotError {
    /// Create an invalid key error.
    pub fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid path error.
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid priority error.
    pub fn invalid_priority(message: impl Into<String>) -> Self {
        Self::InvalidPriority {
            message: message.into(),
        }
    }

    /// Create an invalid JSON error.
    pub fn invalid_json(message: impl Into<String>) -> Self {
        Self::InvalidJson {
            message: message.into(),
        }
    }
}
