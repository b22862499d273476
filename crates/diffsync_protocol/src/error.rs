//! Error types for protocol values and diff/patch primitives.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding, decoding or applying protocol values.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Malformed JSON or a JSON shape that does not match the message.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A diff carried an operation the patch primitive does not know.
    #[error("unsupported diff operation: {0}")]
    UnsupportedOperation(String),

    /// A diff did not apply cleanly to the content it was given.
    #[error("patch failed: {0}")]
    PatchFailed(String),

    /// The `msgType` of an inbound message is not one we handle.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// A required field was absent from an inbound message.
    #[error("missing field: {0}")]
    MissingField(&'static str),
}

impl ProtocolError {
    /// Creates a patch failure.
    pub fn patch_failed(message: impl Into<String>) -> Self {
        Self::PatchFailed(message.into())
    }

    /// Returns true if this error means the diff itself cannot be trusted.
    ///
    /// Fatal errors indicate a synchronizer bug or a peer speaking a different
    /// protocol revision. Retrying the same edit will fail again.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProtocolError::UnsupportedOperation(_) | ProtocolError::PatchFailed(_)
        )
    }
}
