//! Crypto Session - NaCl box primitives for the browser-integration channel
//!
//! Provides X25519 key agreement with XSalsa20Poly1305 authenticated
//! encryption (`crypto_box`), the scheme the password manager speaks on its
//! browser socket. Keys, nonces and ciphertext travel as standard base64.

mod encoding;
mod error;
mod nonce;
mod session;

pub use encoding::*;
pub use error::*;
pub use nonce::*;
pub use session::*;

pub use crypto_box::{PublicKey, SecretKey};

/// Nonce size for XSalsa20Poly1305 (192 bits / 24 bytes)
pub const NONCE_SIZE: usize = 24;

/// Authentication tag size (128 bits / 16 bytes)
pub const TAG_SIZE: usize = 16;

/// Public key size (256 bits / 32 bytes)
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Size of the random client identifier sent with every request
pub const CLIENT_ID_SIZE: usize = 24;
