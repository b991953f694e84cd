//! Store error types

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read association store {}: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Association store {} is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write association store {}: {source}", path.display())]
    Save {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize association store: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Cannot determine config directory")]
    NoConfigDir,
}

pub type StoreResult<T> = Result<T, StoreError>;
