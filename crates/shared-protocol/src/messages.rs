//! Envelope and payload definitions

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{Action, ErrorCode, Flag, ProtocolError, ProtocolResult};

/// Key exchange request, sent in the clear
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyExchangeRequest {
    pub action: Action,
    pub public_key: String,
    pub nonce: String,
    #[serde(rename = "clientID")]
    pub client_id: String,
}

impl KeyExchangeRequest {
    pub fn new(public_key: String, nonce: String, client_id: String) -> Self {
        Self {
            action: Action::ChangePublicKeys,
            public_key,
            nonce,
            client_id,
        }
    }
}

/// Envelope around a boxed payload
#[derive(Debug, Clone, Serialize)]
pub struct EncryptedRequest {
    pub action: Action,
    /// Base64 ciphertext of the JSON payload
    pub message: String,
    pub nonce: String,
    #[serde(rename = "clientID")]
    pub client_id: String,
}

/// Any message received from the peer, before decryption
///
/// Successful key exchange replies carry `publicKey`; encrypted replies carry
/// `message`; error replies carry `errorCode` and `error` in the clear.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub action: Option<String>,
    pub message: Option<String>,
    pub nonce: Option<String>,
    pub public_key: Option<String>,
    pub version: Option<String>,
    pub success: Option<Flag>,
    pub error: Option<String>,
    pub error_code: Option<ErrorCode>,
}

impl ResponseEnvelope {
    pub fn from_slice(data: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    /// The error the peer reported, if this is an error reply
    pub fn peer_error(&self) -> Option<PeerError> {
        self.error_code.map(|code| PeerError {
            code,
            message: self
                .error
                .clone()
                .unwrap_or_else(|| code.description().to_string()),
        })
    }

    pub fn require_nonce(&self) -> ProtocolResult<&str> {
        self.nonce
            .as_deref()
            .ok_or(ProtocolError::MissingField("nonce"))
    }

    pub fn require_message(&self) -> ProtocolResult<&str> {
        self.message
            .as_deref()
            .ok_or(ProtocolError::MissingField("message"))
    }
}

/// Error reply from the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerError {
    pub code: ErrorCode,
    pub message: String,
}

impl fmt::Display for PeerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [code {}]", self.message, self.code.0)
    }
}

/// Payload of `get-databasehash`
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseHashRequest {
    pub action: Action,
}

impl Default for DatabaseHashRequest {
    fn default() -> Self {
        Self {
            action: Action::GetDatabaseHash,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseHashResponse {
    pub hash: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub success: Flag,
}

/// Payload of `associate`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociateRequest {
    pub action: Action,
    /// The session public key
    pub key: String,
    /// Public half of the long-lived identity key being registered
    pub id_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssociateResponse {
    /// Name the peer assigned to this client
    pub id: String,
    pub hash: String,
    #[serde(default)]
    pub success: Flag,
}

/// Payload of `test-associate`
#[derive(Debug, Clone, Serialize)]
pub struct TestAssociateRequest {
    pub action: Action,
    pub id: String,
    pub key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TestAssociateResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub success: Flag,
}

/// Association identity as listed in `get-logins`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationKey {
    pub id: String,
    pub key: String,
}

/// Payload of `get-logins`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetLoginsRequest {
    pub action: Action,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submit_url: Option<String>,
    pub keys: Vec<AssociationKey>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetLoginsResponse {
    /// Matches in the peer's order, best match first
    #[serde(default)]
    pub entries: Vec<CredentialEntry>,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub success: Flag,
}

/// One stored login returned for a URL
///
/// Field memory is wiped on drop and the password never shows up in `Debug`.
#[derive(Clone, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct CredentialEntry {
    pub login: String,
    pub password: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub uuid: String,
}

impl CredentialEntry {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
            name: String::new(),
            uuid: String::new(),
        }
    }
}

impl fmt::Debug for CredentialEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialEntry")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .field("name", &self.name)
            .field("uuid", &self.uuid)
            .finish()
    }
}
