//! Base64 text encoding for keys and ciphertext

use base64::{Engine, engine::general_purpose::STANDARD};
use rand::{RngCore, rngs::OsRng};

use crate::{CLIENT_ID_SIZE, CryptoError, CryptoResult, PUBLIC_KEY_SIZE, PublicKey};

/// Encode arbitrary bytes (ciphertext) as standard base64
pub fn encode_bytes(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode standard base64 into bytes
pub fn decode_bytes(text: &str) -> CryptoResult<Vec<u8>> {
    Ok(STANDARD.decode(text)?)
}

/// Encode a public key for a JSON field
pub fn encode_key(key: &PublicKey) -> String {
    STANDARD.encode(key.as_bytes())
}

/// Decode a public key received in a JSON field
pub fn decode_public_key(text: &str) -> CryptoResult<PublicKey> {
    let raw = STANDARD.decode(text)?;
    let bytes: [u8; PUBLIC_KEY_SIZE] =
        raw.as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: PUBLIC_KEY_SIZE,
                actual: raw.len(),
            })?;
    Ok(PublicKey::from(bytes))
}

/// Generate the random identifier a client attaches to every message
pub fn random_client_id() -> String {
    let mut id = [0u8; CLIENT_ID_SIZE];
    OsRng.fill_bytes(&mut id);
    STANDARD.encode(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KeyPair;

    #[test]
    fn test_public_key_text_form() {
        let keypair = KeyPair::generate();
        let text = encode_key(keypair.public_key());

        let decoded = decode_public_key(&text).unwrap();
        assert_eq!(decoded.as_bytes(), keypair.public_key().as_bytes());
    }

    #[test]
    fn test_short_public_key_rejected() {
        let text = STANDARD.encode([7u8; 16]);
        match decode_public_key(&text) {
            Err(CryptoError::InvalidKeyLength { expected, actual }) => {
                assert_eq!(expected, PUBLIC_KEY_SIZE);
                assert_eq!(actual, 16);
            }
            other => panic!("unexpected result: {:?}", other.map(|k| *k.as_bytes())),
        }
    }

    #[test]
    fn test_garbage_base64_rejected() {
        assert!(matches!(
            decode_public_key("not base64!"),
            Err(CryptoError::Encoding(_))
        ));
    }

    #[test]
    fn test_client_ids_are_random() {
        let a = random_client_id();
        let b = random_client_id();
        assert_ne!(a, b);
        assert_eq!(decode_bytes(&a).unwrap().len(), CLIENT_ID_SIZE);
    }
}
