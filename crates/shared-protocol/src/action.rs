//! Action names used on the wire

use std::fmt;

use serde::{Deserialize, Serialize};

/// Protocol action carried in every envelope's `action` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Public key exchange, the only unencrypted request
    #[serde(rename = "change-public-keys")]
    ChangePublicKeys,
    #[serde(rename = "get-databasehash")]
    GetDatabaseHash,
    #[serde(rename = "associate")]
    Associate,
    #[serde(rename = "test-associate")]
    TestAssociate,
    #[serde(rename = "get-logins")]
    GetLogins,
    /// Broadcast by the peer when the active database locks
    #[serde(rename = "database-locked")]
    DatabaseLocked,
    /// Broadcast by the peer when a database unlocks
    #[serde(rename = "database-unlocked")]
    DatabaseUnlocked,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChangePublicKeys => "change-public-keys",
            Self::GetDatabaseHash => "get-databasehash",
            Self::Associate => "associate",
            Self::TestAssociate => "test-associate",
            Self::GetLogins => "get-logins",
            Self::DatabaseLocked => "database-locked",
            Self::DatabaseUnlocked => "database-unlocked",
        }
    }

    /// Parse a wire name, `None` for actions this client does not know
    pub fn from_wire(name: &str) -> Option<Self> {
        [
            Self::ChangePublicKeys,
            Self::GetDatabaseHash,
            Self::Associate,
            Self::TestAssociate,
            Self::GetLogins,
            Self::DatabaseLocked,
            Self::DatabaseUnlocked,
        ]
        .into_iter()
        .find(|action| action.as_str() == name)
    }

    /// Unsolicited messages the peer may interleave with responses
    pub fn is_notification(&self) -> bool {
        matches!(self, Self::DatabaseLocked | Self::DatabaseUnlocked)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
