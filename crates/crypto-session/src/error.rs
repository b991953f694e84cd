//! Crypto session error types

use thiserror::Error;

/// Cryptographic operation error
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Encryption failed")]
    Encryption,

    /// Ciphertext was tampered with, or the nonce/keys do not match the ones
    /// it was sealed with.
    #[error("Authentication failure: message could not be verified")]
    AuthenticationFailure,

    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Invalid nonce length: expected {expected}, got {actual}")]
    InvalidNonceLength { expected: usize, actual: usize },

    #[error("Invalid base64 encoding: {0}")]
    Encoding(#[from] base64::DecodeError),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
