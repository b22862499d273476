//! Error types for the server request handler.

use diffsync_engine::SyncError;
use diffsync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur while handling a request.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Request violates a limit or is missing required values.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The `msgType` is not one the server handles.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// The message could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(ProtocolError),

    /// The engine refused or failed the request.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),
}

impl From<ProtocolError> for ServerError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::UnknownMessageType(msg_type) => ServerError::UnknownMessageType(msg_type),
            other => ServerError::Protocol(other),
        }
    }
}

impl ServerError {
    /// Returns true if the client sent something the server cannot accept.
    pub fn is_client_error(&self) -> bool {
        match self {
            ServerError::InvalidRequest(_)
            | ServerError::UnknownMessageType(_)
            | ServerError::Protocol(_) => true,
            ServerError::Sync(err) => {
                err.is_missing_state() || matches!(err, SyncError::ChecksumMismatch { .. })
            }
        }
    }

    /// Returns true if the failure lies with the server or its store.
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }

    /// Returns true if the client's session cannot continue without re-adding the document.
    pub fn is_fatal(&self) -> bool {
        match self {
            ServerError::Protocol(err) => err.is_fatal(),
            ServerError::Sync(err) => err.is_fatal(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diffsync_protocol::SyncKey;

    #[test]
    fn error_classification() {
        assert!(ServerError::InvalidRequest("bad".into()).is_client_error());
        assert!(ServerError::UnknownMessageType("poke".into()).is_client_error());
        assert!(ServerError::Sync(SyncError::UnknownShadow(SyncKey::new("doc", "a"))).is_client_error());
        assert!(ServerError::Sync(SyncError::store("disk full")).is_server_error());
        assert!(!ServerError::InvalidRequest("bad".into()).is_server_error());
    }

    #[test]
    fn unknown_message_type_is_lifted() {
        let err = ServerError::from(ProtocolError::UnknownMessageType("poke".into()));
        assert!(matches!(err, ServerError::UnknownMessageType(t) if t == "poke"));

        let err = ServerError::from(ProtocolError::MissingField("msgType"));
        assert!(matches!(err, ServerError::Protocol(_)));
    }

    #[test]
    fn fatal_errors() {
        let divergence = SyncError::Divergence {
            key: SyncKey::new("doc", "a"),
            backup_version: 2,
            edit_version: 1,
        };
        assert!(ServerError::Sync(divergence).is_fatal());
        assert!(ServerError::from(ProtocolError::patch_failed("x")).is_fatal());
        assert!(!ServerError::InvalidRequest("bad".into()).is_fatal());
    }

    #[test]
    fn error_display() {
        let err = ServerError::UnknownMessageType("poke".into());
        assert_eq!(err.to_string(), "unknown message type: poke");
    }
}
