//! Error types for the protocol

use thiserror::Error;

/// Protocol error
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unexpected response action: expected {expected}, got {actual}")]
    UnexpectedAction {
        expected: &'static str,
        actual: String,
    },

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Response nonce does not answer the request nonce")]
    NonceMismatch,

    #[error("Peer did not report success for {0}")]
    Unsuccessful(&'static str),
}

/// Result type alias for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;
