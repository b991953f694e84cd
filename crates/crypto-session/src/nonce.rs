//! Box nonces

use base64::{Engine, engine::general_purpose::STANDARD};
use rand::{RngCore, rngs::OsRng};

use crate::{CryptoError, CryptoResult, NONCE_SIZE};

/// A 24-byte XSalsa20Poly1305 nonce
///
/// Requests carry a fresh random nonce; the peer answers with the same nonce
/// incremented by one, which ties each response to the request it answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoxNonce([u8; NONCE_SIZE]);

impl BoxNonce {
    /// Generate a random nonce
    pub fn random() -> Self {
        let mut bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }

    /// Little-endian increment with carry, wrapping at all-ones
    pub fn increment(&self) -> Self {
        let mut bytes = self.0;
        for byte in bytes.iter_mut() {
            let (value, overflow) = byte.overflowing_add(1);
            *byte = value;
            if !overflow {
                break;
            }
        }
        Self(bytes)
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub fn from_base64(text: &str) -> CryptoResult<Self> {
        let raw = STANDARD.decode(text)?;
        let bytes: [u8; NONCE_SIZE] =
            raw.as_slice()
                .try_into()
                .map_err(|_| CryptoError::InvalidNonceLength {
                    expected: NONCE_SIZE,
                    actual: raw.len(),
                })?;
        Ok(Self(bytes))
    }
}
