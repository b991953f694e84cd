//! Loosely typed scalar fields
//!
//! The peer sends `success` and `errorCode` as strings in some releases and
//! as JSON booleans/numbers in others, so both forms are accepted.

use std::fmt;

use serde::{Deserialize, Deserializer, de::Error as _};

#[derive(Deserialize)]
#[serde(untagged)]
enum RawScalar {
    Bool(bool),
    Number(u64),
    Text(String),
}

/// Boolean flag accepting `true` or `"true"`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flag(pub bool);

impl Flag {
    pub fn is_set(&self) -> bool {
        self.0
    }
}

impl<'de> Deserialize<'de> for Flag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawScalar::deserialize(deserializer)? {
            RawScalar::Bool(value) => Ok(Self(value)),
            RawScalar::Number(value) => Ok(Self(value != 0)),
            RawScalar::Text(text) => Ok(Self(text.trim().eq_ignore_ascii_case("true"))),
        }
    }
}

/// Error code reported by the peer in an error reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(pub u32);

impl ErrorCode {
    pub const DATABASE_NOT_OPENED: Self = Self(1);
    pub const DATABASE_HASH_NOT_RECEIVED: Self = Self(2);
    pub const CLIENT_PUBLIC_KEY_NOT_RECEIVED: Self = Self(3);
    pub const CANNOT_DECRYPT_MESSAGE: Self = Self(4);
    pub const TIMEOUT_OR_NOT_CONNECTED: Self = Self(5);
    pub const ACTION_CANCELLED_OR_DENIED: Self = Self(6);
    pub const CANNOT_ENCRYPT_MESSAGE: Self = Self(7);
    pub const ASSOCIATION_FAILED: Self = Self(8);
    pub const KEY_CHANGE_FAILED: Self = Self(9);
    pub const ENCRYPTION_KEY_UNRECOGNIZED: Self = Self(10);
    pub const NO_SAVED_DATABASES_FOUND: Self = Self(11);
    pub const INCORRECT_ACTION: Self = Self(12);
    pub const EMPTY_MESSAGE_RECEIVED: Self = Self(13);
    pub const NO_URL_PROVIDED: Self = Self(14);
    pub const NO_LOGINS_FOUND: Self = Self(15);
    pub const NO_GROUPS_FOUND: Self = Self(16);
    pub const CANNOT_CREATE_NEW_GROUP: Self = Self(17);
    pub const NO_VALID_UUID_PROVIDED: Self = Self(18);
    pub const ACCESS_TO_ALL_ENTRIES_DENIED: Self = Self(19);

    pub fn description(&self) -> &'static str {
        match self.0 {
            1 => "database not opened",
            2 => "database hash not available",
            3 => "client public key not received",
            4 => "cannot decrypt message",
            5 => "timeout or not connected",
            6 => "action cancelled or denied",
            7 => "message encryption failed",
            8 => "association failed",
            9 => "key change was not successful",
            10 => "encryption key is not recognized",
            11 => "no saved databases found",
            12 => "incorrect action",
            13 => "empty message received",
            14 => "no URL provided",
            15 => "no logins found",
            16 => "no groups found",
            17 => "cannot create new group",
            18 => "no valid UUID provided",
            19 => "access to all entries is denied",
            _ => "unknown error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.description())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = match RawScalar::deserialize(deserializer)? {
            RawScalar::Number(value) => value,
            RawScalar::Text(text) => text
                .trim()
                .parse::<u64>()
                .map_err(|_| D::Error::custom(format!("invalid error code: {text}")))?,
            RawScalar::Bool(_) => return Err(D::Error::custom("error code must be a number")),
        };
        u32::try_from(value)
            .map(Self)
            .map_err(|_| D::Error::custom(format!("error code out of range: {value}")))
    }
}
