//! Error types for the sync engine.

use crate::listen::ListenStatus;
use livetree_snapshot::{Path, SnapshotError};
use livetree_sync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for sync engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Recoverable errors surfaced by the sync engine.
///
/// Listen failures never cross the coordinator boundary as `Err`; they are
/// delivered inside cancel events, one clone per cancelled registration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// The server refused or dropped a listen.
    #[error("listen at {path} rejected: {status}")]
    ListenRejected {
        /// Status reported by the listen provider.
        status: ListenStatus,
        /// Location of the rejected listen.
        path: Path,
    },

    /// Snapshot error.
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// Query or protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl SyncError {
    /// Error value for a listen that completed with a non-ok status.
    pub fn from_listen_status(status: ListenStatus, path: Path) -> Self {
        SyncError::ListenRejected { status, path }
    }

    /// Whether the server denied access.
    pub fn is_permission_denied(&self) -> bool {
        matches!(
            self,
            SyncError::ListenRejected {
                status: ListenStatus::PermissionDenied,
                ..
            }
        )
    }
}
