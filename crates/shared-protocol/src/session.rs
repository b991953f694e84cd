//! Session states and association outcomes

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ErrorCode;

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Initial state, no keys exchanged
    Disconnected,
    /// Public keys exchanged, shared secret derived
    KeyExchanged,
    /// Peer issued a new identity that has not been confirmed yet
    Associated,
    /// Identity confirmed, commands may be sent
    Ready,
    /// Session failed with error, not resumable
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::KeyExchanged => "key-exchanged",
            Self::Associated => "associated",
            Self::Ready => "ready",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of checking a stored identity against the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssociationCheck {
    /// The peer still knows the identity
    Valid,
    /// The peer rejected the identity
    Invalid {
        code: Option<ErrorCode>,
        reason: String,
    },
    /// No identity is stored for this database, so nothing was checked
    Unknown,
}

impl AssociationCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}
