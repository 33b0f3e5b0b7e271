//! Message encryption using `XChaCha20-Poly1305`
//!
//! All functions are pure - random bytes must be provided by the caller.

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};
use serde::{Deserialize, Serialize};

use super::ratchet::MessageKey;
use crate::CryptoError;

/// Size of the random suffix in the nonce (20 bytes)
pub const NONCE_RANDOM_SIZE: usize = 20;

/// A chain-encrypted message with the metadata needed to decrypt it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedMessage {
    /// The chain generation (for key derivation)
    pub generation: u32,
    /// The 24-byte `XChaCha20` nonce
    pub nonce: [u8; 24],
    /// The ciphertext including 16-byte Poly1305 tag
    pub ciphertext: Vec<u8>,
}

/// Encrypt a message with a chain message key.
///
/// The nonce binds the generation; the random suffix prevents collisions if
/// the same chain is ever replayed from a restored seed.
pub fn encrypt_message(
    plaintext: &[u8],
    message_key: &MessageKey,
    random_suffix: [u8; NONCE_RANDOM_SIZE],
) -> EncryptedMessage {
    let nonce = build_nonce(message_key.generation(), random_suffix);
    let cipher = XChaCha20Poly1305::new(message_key.key().into());

    let Ok(ciphertext) = cipher.encrypt(XNonce::from_slice(&nonce), plaintext) else {
        unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };

    EncryptedMessage { generation: message_key.generation(), nonce, ciphertext }
}

/// Decrypt a message with the key for its generation.
pub fn decrypt_message(
    encrypted: &EncryptedMessage,
    message_key: &MessageKey,
) -> Result<Vec<u8>, CryptoError> {
    if message_key.generation() != encrypted.generation {
        return Err(CryptoError::DecryptionFailed {
            reason: format!(
                "generation mismatch: key is {}, message is {}",
                message_key.generation(),
                encrypted.generation
            ),
        });
    }

    let cipher = XChaCha20Poly1305::new(message_key.key().into());
    let nonce = XNonce::from_slice(&encrypted.nonce);

    cipher.decrypt(nonce, encrypted.ciphertext.as_slice()).map_err(|_| {
        CryptoError::DecryptionFailed { reason: "authentication failed".to_string() }
    })
}

/// Nonce layout: generation (4 bytes, big-endian) || random suffix (20 bytes).
fn build_nonce(generation: u32, random_suffix: [u8; NONCE_RANDOM_SIZE]) -> [u8; 24] {
    let mut nonce = [0u8; 24];
    nonce[0..4].copy_from_slice(&generation.to_be_bytes());
    nonce[4..24].copy_from_slice(&random_suffix);
    nonce
}

#[cfg(test)]
mod tests {
    use super::{super::ratchet::SymmetricRatchet, *};

    fn key_at(generation: u32) -> MessageKey {
        let mut ratchet = SymmetricRatchet::new(&[0x11; 32]);
        ratchet.advance_to(generation).unwrap()
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = key_at(0);
        let encrypted = encrypt_message(b"Hello, World!", &key, [0xAB; NONCE_RANDOM_SIZE]);

        assert_eq!(decrypt_message(&encrypted, &key).unwrap(), b"Hello, World!");
    }

    #[test]
    fn generation_is_recorded() {
        let encrypted = encrypt_message(b"test", &key_at(5), [0; NONCE_RANDOM_SIZE]);
        assert_eq!(encrypted.generation, 5);
        assert_eq!(&encrypted.nonce[0..4], &5u32.to_be_bytes());
    }

    #[test]
    fn wrong_generation_key_is_rejected() {
        let encrypted = encrypt_message(b"test", &key_at(1), [0; NONCE_RANDOM_SIZE]);
        let result = decrypt_message(&encrypted, &key_at(2));

        assert!(matches!(
            result,
            Err(CryptoError::DecryptionFailed { reason }) if reason.contains("generation")
        ));
    }

    #[test]
    fn tampered_ciphertext_fails_decryption() {
        let key = key_at(0);
        let mut encrypted = encrypt_message(b"original message", &key, [0; NONCE_RANDOM_SIZE]);
        encrypted.ciphertext[0] ^= 0xFF;

        assert!(decrypt_message(&encrypted, &key).is_err());
    }
}
