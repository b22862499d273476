//! Error types for the sync engines.

use diffsync_protocol::{ProtocolError, SyncKey};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while synchronizing a replica pair.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Diff, patch or message codec failure.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The peer asked for a rollback the backup cannot satisfy.
    #[error("divergence for {key}: backup version {backup_version} does not match edit version {edit_version}")]
    Divergence {
        /// Replica pair.
        key: SyncKey,
        /// Version recorded in the backup shadow.
        backup_version: u64,
        /// Version claimed by the edit.
        edit_version: i64,
    },

    /// No authoritative document with this id.
    #[error("unknown document: {0}")]
    UnknownDocument(String),

    /// No shadow for this replica pair; the document was never added.
    #[error("no shadow for {0}")]
    UnknownShadow(SyncKey),

    /// No backup shadow for this replica pair.
    #[error("no backup shadow for {0}")]
    MissingBackup(SyncKey),

    /// No client document for this replica pair.
    #[error("no client document for {0}")]
    MissingDocument(SyncKey),

    /// An edit was computed against different content than our shadow.
    #[error("checksum mismatch for {key} at client version {client_version}, server version {server_version}")]
    ChecksumMismatch {
        /// Replica pair.
        key: SyncKey,
        /// Client version of the edit.
        client_version: i64,
        /// Server version of the edit.
        server_version: u64,
    },

    /// Backend failure in a data store.
    #[error("store error: {0}")]
    Store(String),
}

impl SyncError {
    /// Creates a store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// Returns true if the replica pair cannot continue without being re-added.
    pub fn is_fatal(&self) -> bool {
        match self {
            SyncError::Divergence { .. } | SyncError::ChecksumMismatch { .. } => true,
            SyncError::Protocol(e) => e.is_fatal(),
            _ => false,
        }
    }

    /// Returns true if the error is about state that was never created.
    pub fn is_missing_state(&self) -> bool {
        matches!(
            self,
            SyncError::UnknownDocument(_)
                | SyncError::UnknownShadow(_)
                | SyncError::MissingBackup(_)
                | SyncError::MissingDocument(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors() {
        let key = SyncKey::new("doc", "a");
        assert!(SyncError::Divergence {
            key: key.clone(),
            backup_version: 2,
            edit_version: 1,
        }
        .is_fatal());
        assert!(SyncError::Protocol(ProtocolError::patch_failed("x")).is_fatal());
        assert!(!SyncError::Protocol(ProtocolError::MissingField("id")).is_fatal());
        assert!(!SyncError::UnknownShadow(key).is_fatal());
        assert!(!SyncError::store("disk full").is_fatal());
    }

    #[test]
    fn missing_state() {
        assert!(SyncError::UnknownDocument("doc".into()).is_missing_state());
        assert!(SyncError::MissingBackup(SyncKey::new("doc", "a")).is_missing_state());
        assert!(!SyncError::store("x").is_missing_state());
    }

    #[test]
    fn error_display() {
        let err = SyncError::Divergence {
            key: SyncKey::new("doc", "a"),
            backup_version: 3,
            edit_version: 1,
        };
        assert_eq!(
            err.to_string(),
            "divergence for doc/a: backup version 3 does not match edit version 1"
        );
        assert_eq!(
            SyncError::UnknownShadow(SyncKey::new("doc", "b")).to_string(),
            "no shadow for doc/b"
        );
    }
}
