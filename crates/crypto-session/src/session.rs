//! Cryptographic session management with NaCl box (X25519 + XSalsa20Poly1305)

use crypto_box::{
    SalsaBox,
    aead::{Aead, Nonce},
};
use rand::rngs::OsRng;
use tracing::trace;
use zeroize::Zeroizing;

use crate::{BoxNonce, CryptoError, CryptoResult, PublicKey, SecretKey, TAG_SIZE};

/// Key pair for the box scheme
///
/// Used both for the per-run session keys and for the long-lived identity
/// key whose public half is registered with the password manager.
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a new key pair
    pub fn generate() -> Self {
        let secret = SecretKey::generate(&mut OsRng);
        let public = secret.public_key();
        Self { secret, public }
    }

    /// Get the public key
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Get the secret key
    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }
}

fn box_nonce(nonce: &BoxNonce) -> &Nonce<SalsaBox> {
    Nonce::<SalsaBox>::from_slice(nonce.as_bytes())
}

/// Box `plaintext` for the holder of `peer_public`
pub fn encrypt(
    plaintext: &[u8],
    nonce: &BoxNonce,
    peer_public: &PublicKey,
    own_secret: &SecretKey,
) -> CryptoResult<Vec<u8>> {
    SalsaBox::new(peer_public, own_secret)
        .encrypt(box_nonce(nonce), plaintext)
        .map_err(|_| CryptoError::Encryption)
}

/// Open a box sealed by the holder of `peer_public`
pub fn decrypt(
    ciphertext: &[u8],
    nonce: &BoxNonce,
    peer_public: &PublicKey,
    own_secret: &SecretKey,
) -> CryptoResult<Zeroizing<Vec<u8>>> {
    if ciphertext.len() < TAG_SIZE {
        return Err(CryptoError::AuthenticationFailure);
    }

    SalsaBox::new(peer_public, own_secret)
        .decrypt(box_nonce(nonce), ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::AuthenticationFailure)
}

/// Established cryptographic session
///
/// Holds the shared secret precomputed from our secret key and the peer's
/// public key. Dropped at the end of the connection, never persisted.
pub struct CryptoSession {
    cipher: SalsaBox,
    send_counter: u64,
    recv_counter: u64,
}

impl CryptoSession {
    /// Derive a session from our secret key and the peer's public key
    pub fn new(peer_public: &PublicKey, own_secret: &SecretKey) -> Self {
        Self {
            cipher: SalsaBox::new(peer_public, own_secret),
            send_counter: 0,
            recv_counter: 0,
        }
    }

    /// Encrypt under a fresh random nonce
    ///
    /// Returns the nonce alongside the ciphertext so it can be sent with it.
    pub fn seal(&mut self, plaintext: &[u8]) -> CryptoResult<(BoxNonce, Vec<u8>)> {
        let nonce = BoxNonce::random();
        let ciphertext = self.encrypt_with_nonce(&nonce, plaintext)?;
        Ok((nonce, ciphertext))
    }

    /// Encrypt under a caller-chosen nonce
    ///
    /// Only the responding side uses this, answering with the incremented
    /// request nonce.
    pub fn encrypt_with_nonce(
        &mut self,
        nonce: &BoxNonce,
        plaintext: &[u8],
    ) -> CryptoResult<Vec<u8>> {
        let ciphertext = self
            .cipher
            .encrypt(box_nonce(nonce), plaintext)
            .map_err(|_| CryptoError::Encryption)?;

        self.send_counter += 1;
        trace!(count = self.send_counter, "sealed message");

        Ok(ciphertext)
    }

    /// Decrypt and verify data
    pub fn open(&mut self, nonce: &BoxNonce, ciphertext: &[u8]) -> CryptoResult<Zeroizing<Vec<u8>>> {
        if ciphertext.len() < TAG_SIZE {
            return Err(CryptoError::AuthenticationFailure);
        }

        let plaintext = self
            .cipher
            .decrypt(box_nonce(nonce), ciphertext)
            .map_err(|_| CryptoError::AuthenticationFailure)?;

        self.recv_counter += 1;

        Ok(Zeroizing::new(plaintext))
    }

    /// Get the current send counter (for debugging/stats)
    pub fn send_count(&self) -> u64 {
        self.send_counter
    }

    /// Get the current receive counter (for debugging/stats)
    pub fn recv_count(&self) -> u64 {
        self.recv_counter
    }
}

/// Builder for establishing a crypto session through the key exchange
pub struct HandshakeBuilder {
    our_keypair: KeyPair,
}

impl HandshakeBuilder {
    /// Start a new handshake with a freshly generated key pair
    pub fn new() -> Self {
        Self {
            our_keypair: KeyPair::generate(),
        }
    }

    /// Get our public key to send to the peer
    pub fn public_key(&self) -> &PublicKey {
        self.our_keypair.public_key()
    }

    /// Complete the handshake with the peer's public key
    pub fn complete(self, their_public: &PublicKey) -> CryptoSession {
        CryptoSession::new(their_public, self.our_keypair.secret_key())
    }
}

impl Default for HandshakeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
