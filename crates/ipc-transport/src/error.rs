//! Transport error types

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection to {} failed: {source}", path.display())]
    ConnectionFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Connection closed by peer")]
    Disconnected,

    #[error("Timed out after {0:?} waiting for the peer")]
    Timeout(std::time::Duration),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Cannot determine socket location: {0}")]
    SocketPath(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type TransportResult<T> = Result<T, TransportError>;
