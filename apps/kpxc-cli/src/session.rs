//! Session state machine - the protocol core
//!
//! Drives one connection to the password manager through key exchange,
//! association and encrypted commands. Requests go out strictly one at a
//! time; every response is matched to its request by action and by the
//! incremented request nonce.

use std::time::Duration;

use association_store::{AssociationRecord, AssociationStore};
use crypto_session::{
    BoxNonce, CryptoError, CryptoSession, HandshakeBuilder, KeyPair, PublicKey, decode_bytes,
    decode_public_key, encode_bytes, encode_key, random_client_id,
};
use ipc_transport::{JsonChannel, TransportError};
use serde::{Serialize, de::DeserializeOwned};
use shared_protocol::{
    Action, AssociateRequest, AssociateResponse, AssociationCheck, AssociationKey,
    CredentialEntry, DatabaseHashRequest, DatabaseHashResponse, EncryptedRequest, ErrorCode,
    GetLoginsRequest, GetLoginsResponse, KeyExchangeRequest, PeerError, ProtocolError,
    ResponseEnvelope, SessionState, TestAssociateRequest, TestAssociateResponse,
};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

/// How long the user gets to confirm a new association in the password manager
pub const DEFAULT_ASSOCIATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Session error
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Association failed: {0}")]
    Association(String),

    #[error("Authentication failure: a response could not be verified")]
    AuthenticationFailure,

    #[error("Crypto error: {0}")]
    Crypto(CryptoError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("{action} rejected by the password manager: {error}")]
    Peer { action: Action, error: PeerError },

    #[error("Cannot {operation} while the session is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("Session failed earlier and cannot be reused")]
    Failed,
}

impl From<CryptoError> for SessionError {
    fn from(error: CryptoError) -> Self {
        match error {
            CryptoError::AuthenticationFailure => Self::AuthenticationFailure,
            other => Self::Crypto(other),
        }
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Identity freshly registered by [`Session::associate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAssociation {
    /// Hash of the database the identity belongs to
    pub database: String,
    pub record: AssociationRecord,
}

/// How [`authenticate`] got the session to `Ready`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The stored identity was still valid
    Reused,
    /// No identity was stored, a new one was registered
    Created,
    /// The stored identity was rejected and replaced
    Replaced,
}

/// One connection's worth of protocol state
pub struct Session<S> {
    channel: JsonChannel<S>,
    state: SessionState,
    client_id: String,
    public_key: Option<PublicKey>,
    crypto: Option<CryptoSession>,
    association: Option<AssociationKey>,
    peer_version: Option<String>,
    association_timeout: Duration,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a session over an open channel
    pub fn new(channel: JsonChannel<S>) -> Self {
        Self {
            channel,
            state: SessionState::Disconnected,
            client_id: random_client_id(),
            public_key: None,
            crypto: None,
            association: None,
            peer_version: None,
            association_timeout: DEFAULT_ASSOCIATION_TIMEOUT,
        }
    }

    /// Wait this long for the user to approve an association
    pub fn with_association_timeout(mut self, timeout: Duration) -> Self {
        self.association_timeout = timeout;
        self
    }

    /// Get current session state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Version string the peer reported during the handshake
    pub fn peer_version(&self) -> Option<&str> {
        self.peer_version.as_deref()
    }

    /// Exchange public keys and derive the shared secret
    pub async fn handshake(&mut self) -> SessionResult<()> {
        self.guard("exchange keys", &[SessionState::Disconnected])?;
        let result = self.exchange_keys().await;
        self.fail_on_error(result)
    }

    /// Ask the peer which database it is serving
    pub async fn database_hash(&mut self) -> SessionResult<String> {
        self.guard(
            "query the database hash",
            &[
                SessionState::KeyExchanged,
                SessionState::Associated,
                SessionState::Ready,
            ],
        )?;
        let result = self.query_database_hash().await;
        self.fail_on_error(result)
    }

    /// Check a stored identity; `Valid` moves the session to `Ready`
    ///
    /// A rejected identity is reported as `Invalid`, not as an error, and the
    /// session stays usable for [`Session::associate`].
    pub async fn test_associate(
        &mut self,
        record: &AssociationRecord,
    ) -> SessionResult<AssociationCheck> {
        self.guard("test an association", &[SessionState::KeyExchanged])?;

        let key = AssociationKey {
            id: record.id.clone(),
            key: record.id_key.clone(),
        };
        let result = self.check_identity(&key).await;
        let check = self.fail_on_error(result)?;

        if check.is_valid() {
            info!("Association '{}' accepted", key.id);
            self.association = Some(key);
            self.state = SessionState::Ready;
        }

        Ok(check)
    }

    /// Register a new identity with the open database
    ///
    /// The password manager asks its user to approve and name the client, so
    /// this waits up to the association timeout for the answer.
    pub async fn associate(&mut self) -> SessionResult<NewAssociation> {
        self.guard("associate", &[SessionState::KeyExchanged])?;
        let result = self.register_identity().await;
        self.fail_on_error(result)
    }

    /// Fetch the logins stored for `url`, best match first
    ///
    /// No match is an empty vector, not an error.
    pub async fn get_logins(&mut self, url: &str) -> SessionResult<Vec<CredentialEntry>> {
        self.guard("fetch logins", &[SessionState::Ready])?;
        let result = self.fetch_logins(url).await;
        self.fail_on_error(result)
    }

    /// Close the underlying channel
    pub async fn close(self) {
        match &self.crypto {
            Some(crypto) => debug!(
                "Closing session in state {} ({} sealed, {} opened)",
                self.state,
                crypto.send_count(),
                crypto.recv_count()
            ),
            None => debug!("Closing session in state {}", self.state),
        }
        self.channel.close().await;
    }

    fn guard(&self, operation: &'static str, allowed: &[SessionState]) -> SessionResult<()> {
        if self.state == SessionState::Failed {
            return Err(SessionError::Failed);
        }
        if !allowed.contains(&self.state) {
            return Err(SessionError::InvalidState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    fn fail_on_error<T>(&mut self, result: SessionResult<T>) -> SessionResult<T> {
        if let Err(e) = &result {
            warn!("Session failed in state {}: {}", self.state, e);
            self.state = SessionState::Failed;
            self.crypto = None;
        }
        result
    }

    async fn exchange_keys(&mut self) -> SessionResult<()> {
        let handshake = HandshakeBuilder::new();
        let nonce = BoxNonce::random();
        let request = KeyExchangeRequest::new(
            encode_key(handshake.public_key()),
            nonce.to_base64(),
            self.client_id.clone(),
        );

        let response = self
            .round_trip(Action::ChangePublicKeys, &request)
            .await
            .map_err(|e| match e {
                SessionError::Transport(e) => SessionError::Handshake(e.to_string()),
                other => other,
            })?;

        if let Some(error) = response.peer_error() {
            return Err(SessionError::Handshake(error.to_string()));
        }
        if !response.success.unwrap_or_default().is_set() {
            return Err(SessionError::Handshake(
                "peer did not accept the key exchange".to_string(),
            ));
        }
        check_reply_nonce(&response, &nonce)
            .map_err(|e| SessionError::Handshake(e.to_string()))?;

        let peer_key = response
            .public_key
            .as_deref()
            .ok_or_else(|| SessionError::Handshake("reply carries no public key".to_string()))?;
        let peer_key = decode_public_key(peer_key)
            .map_err(|e| SessionError::Handshake(format!("invalid peer public key: {e}")))?;

        self.public_key = Some(handshake.public_key().clone());
        self.crypto = Some(handshake.complete(&peer_key));
        self.peer_version = response.version;
        self.state = SessionState::KeyExchanged;

        info!(
            "Key exchange complete (peer version {})",
            self.peer_version.as_deref().unwrap_or("unknown")
        );
        Ok(())
    }

    async fn query_database_hash(&mut self) -> SessionResult<String> {
        let reply = self
            .request::<_, DatabaseHashResponse>(
                Action::GetDatabaseHash,
                &DatabaseHashRequest::default(),
            )
            .await?;

        match reply {
            Ok(response) if response.success.is_set() && !response.hash.is_empty() => {
                debug!("Peer is serving database {}", response.hash);
                Ok(response.hash)
            }
            Ok(_) => Err(ProtocolError::Unsuccessful(Action::GetDatabaseHash.as_str()).into()),
            Err(error) => Err(SessionError::Peer {
                action: Action::GetDatabaseHash,
                error,
            }),
        }
    }

    async fn check_identity(&mut self, key: &AssociationKey) -> SessionResult<AssociationCheck> {
        let request = TestAssociateRequest {
            action: Action::TestAssociate,
            id: key.id.clone(),
            key: key.key.clone(),
        };

        let reply = self
            .request::<_, TestAssociateResponse>(Action::TestAssociate, &request)
            .await?;

        Ok(match reply {
            Ok(response) if response.success.is_set() && response.id == key.id => {
                AssociationCheck::Valid
            }
            Ok(response) if response.success.is_set() => AssociationCheck::Invalid {
                code: None,
                reason: format!("peer confirmed '{}' instead of '{}'", response.id, key.id),
            },
            Ok(_) => AssociationCheck::Invalid {
                code: None,
                reason: "peer did not confirm the identity".to_string(),
            },
            Err(error) => AssociationCheck::Invalid {
                code: Some(error.code),
                reason: error.message,
            },
        })
    }

    async fn register_identity(&mut self) -> SessionResult<NewAssociation> {
        let database = self.query_database_hash().await?;

        let session_key = self
            .public_key
            .as_ref()
            .map(encode_key)
            .ok_or(SessionError::InvalidState {
                operation: "associate",
                state: self.state,
            })?;
        let identity = KeyPair::generate();
        let request = AssociateRequest {
            action: Action::Associate,
            key: session_key,
            id_key: encode_key(identity.public_key()),
        };

        info!("Requesting association, approve it in the password manager");
        let previous_timeout = self.channel.timeout();
        self.channel.set_timeout(self.association_timeout);
        let reply = self
            .request::<_, AssociateResponse>(Action::Associate, &request)
            .await;
        self.channel.set_timeout(previous_timeout);

        let response = match reply? {
            Ok(response) if response.success.is_set() && !response.id.is_empty() => response,
            Ok(_) => {
                return Err(SessionError::Association(
                    "peer did not issue an identity".to_string(),
                ));
            }
            Err(error) => return Err(SessionError::Association(error.to_string())),
        };

        let database = if response.hash.is_empty() || response.hash == database {
            database
        } else {
            warn!(
                "Association answered for database {} instead of {}",
                response.hash, database
            );
            response.hash
        };

        let key = AssociationKey {
            id: response.id,
            key: request.id_key,
        };
        self.state = SessionState::Associated;
        debug!("Peer issued identity '{}', confirming", key.id);

        match self.check_identity(&key).await? {
            AssociationCheck::Valid => {}
            other => {
                return Err(SessionError::Association(format!(
                    "new identity '{}' was not confirmed: {:?}",
                    key.id, other
                )));
            }
        }

        info!("Associated as '{}' with database {}", key.id, database);
        self.association = Some(key.clone());
        self.state = SessionState::Ready;

        Ok(NewAssociation {
            database,
            record: AssociationRecord {
                id: key.id,
                id_key: key.key,
            },
        })
    }

    async fn fetch_logins(&mut self, url: &str) -> SessionResult<Vec<CredentialEntry>> {
        let key = self.association.clone().ok_or(SessionError::InvalidState {
            operation: "fetch logins",
            state: self.state,
        })?;
        let request = GetLoginsRequest {
            action: Action::GetLogins,
            url: url.to_string(),
            submit_url: None,
            keys: vec![key],
        };

        let reply = self
            .request::<_, GetLoginsResponse>(Action::GetLogins, &request)
            .await?;

        match reply {
            Ok(response) if response.success.is_set() => {
                debug!("{} login(s) for {}", response.entries.len(), url);
                Ok(response.entries)
            }
            Ok(_) => Err(ProtocolError::Unsuccessful(Action::GetLogins.as_str()).into()),
            Err(error) if error.code == ErrorCode::NO_LOGINS_FOUND => {
                debug!("No logins for {}", url);
                Ok(Vec::new())
            }
            Err(error) => Err(SessionError::Peer {
                action: Action::GetLogins,
                error,
            }),
        }
    }

    /// Send a boxed payload and open the boxed reply
    ///
    /// An error reply from the peer is returned as the inner `Err`.
    async fn request<Req, Resp>(
        &mut self,
        action: Action,
        payload: &Req,
    ) -> SessionResult<Result<Resp, PeerError>>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let plaintext = zeroize::Zeroizing::new(
            serde_json::to_vec(payload).map_err(ProtocolError::from)?,
        );
        let (nonce, ciphertext) = self.crypto_mut(action)?.seal(&plaintext)?;

        let envelope = EncryptedRequest {
            action,
            message: encode_bytes(&ciphertext),
            nonce: nonce.to_base64(),
            client_id: self.client_id.clone(),
        };
        let response = self.round_trip(action, &envelope).await?;

        if let Some(error) = response.peer_error() {
            debug!("{} returned error {}", action, error.code);
            return Ok(Err(error));
        }

        let reply_nonce = check_reply_nonce(&response, &nonce)?;
        let ciphertext = decode_bytes(response.require_message()?)?;
        let plaintext = self.crypto_mut(action)?.open(&reply_nonce, &ciphertext)?;

        let decoded = serde_json::from_slice(&plaintext).map_err(ProtocolError::from)?;
        Ok(Ok(decoded))
    }

    /// Send one envelope and wait for the reply to it
    async fn round_trip<T: Serialize>(
        &mut self,
        action: Action,
        envelope: &T,
    ) -> SessionResult<ResponseEnvelope> {
        let bytes = serde_json::to_vec(envelope).map_err(ProtocolError::from)?;
        debug!("Sending {}", action);
        self.channel.send(&bytes).await?;

        loop {
            let frame = self.channel.receive().await?;
            let response = ResponseEnvelope::from_slice(&frame)?;

            match response.action.as_deref().and_then(Action::from_wire) {
                Some(received) if received == action => return Ok(response),
                Some(received) if received.is_notification() => {
                    debug!("Skipping {} notification", received);
                }
                _ => {
                    return Err(ProtocolError::UnexpectedAction {
                        expected: action.as_str(),
                        actual: response.action.unwrap_or_default(),
                    }
                    .into());
                }
            }
        }
    }

    fn crypto_mut(&mut self, action: Action) -> SessionResult<&mut CryptoSession> {
        let state = self.state;
        self.crypto.as_mut().ok_or(SessionError::InvalidState {
            operation: action.as_str(),
            state,
        })
    }
}

/// The reply nonce must be the request nonce plus one
fn check_reply_nonce(response: &ResponseEnvelope, sent: &BoxNonce) -> SessionResult<BoxNonce> {
    let received = BoxNonce::from_base64(response.require_nonce()?)?;
    if received != sent.increment() {
        return Err(ProtocolError::NonceMismatch.into());
    }
    Ok(received)
}

/// Bring a key-exchanged session to `Ready`, reusing a stored identity when
/// the peer still accepts it and registering a new one otherwise
///
/// A newly registered identity is written into `store` right away, so it is
/// kept even if a later command fails.
pub async fn authenticate<S>(
    session: &mut Session<S>,
    store: &mut AssociationStore,
) -> SessionResult<AuthOutcome>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let database = session.database_hash().await?;

    let check = match store.get_key(&database) {
        Some(record) => session.test_associate(record).await?,
        None => AssociationCheck::Unknown,
    };

    let outcome = match check {
        AssociationCheck::Valid => return Ok(AuthOutcome::Reused),
        AssociationCheck::Invalid { code, reason } => {
            match code {
                Some(code) => warn!(
                    "Stored association for database {} rejected with code {}: {}",
                    database, code, reason
                ),
                None => warn!(
                    "Stored association for database {} rejected: {}",
                    database, reason
                ),
            }
            AuthOutcome::Replaced
        }
        AssociationCheck::Unknown => {
            info!("No association stored for database {}", database);
            AuthOutcome::Created
        }
    };

    let association = session.associate().await?;
    store.save_key(association.database, association.record);

    Ok(outcome)
}
