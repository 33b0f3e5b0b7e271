//! One-shot sealing under derived keys.
//!
//! Used where there is no ratchet: protecting the identity key at rest and
//! encrypting over an unsafe channel whose temporary key both sides know.

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};
use hkdf::Hkdf;
use sha2::Sha256;

use crate::CryptoError;

/// Size of the random nonce prefixed to sealed output.
pub const NONCE_SIZE: usize = 24;

/// Derive a 32-byte symmetric key from `secret` with a domain label.
pub fn derive_key(secret: &[u8], info: &[u8]) -> [u8; 32] {
    let hkdf = Hkdf::<Sha256>::new(None, secret);

    let mut key = [0u8; 32];
    let Ok(()) = hkdf.expand(info, &mut key) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };

    key
}

/// Encrypt `plaintext`, returning `nonce || ciphertext`.
///
/// Caller MUST provide a fresh random nonce for every call with the same key.
pub fn seal(key: &[u8; 32], plaintext: &[u8], nonce: [u8; NONCE_SIZE]) -> Vec<u8> {
    let cipher = XChaCha20Poly1305::new(key.into());

    let Ok(ciphertext) = cipher.encrypt(XNonce::from_slice(&nonce), plaintext) else {
        unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };

    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    sealed
}

/// Decrypt output of [`seal`].
pub fn open(key: &[u8; 32], sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < NONCE_SIZE {
        return Err(CryptoError::DecryptionFailed { reason: "truncated input".to_string() });
    }

    let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(key.into());

    cipher.decrypt(XNonce::from_slice(nonce), ciphertext).map_err(|_| {
        CryptoError::DecryptionFailed { reason: "authentication failed".to_string() }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrip() {
        let key = derive_key(b"secret", b"test");
        let sealed = seal(&key, b"payload", [1; NONCE_SIZE]);
        assert_eq!(open(&key, &sealed).unwrap(), b"payload");
    }

    #[test]
    fn open_with_other_key_fails() {
        let sealed = seal(&derive_key(b"a", b"test"), b"payload", [1; NONCE_SIZE]);
        let result = open(&derive_key(b"b", b"test"), &sealed);
        assert!(matches!(result, Err(CryptoError::DecryptionFailed { .. })));
    }

    #[test]
    fn truncated_input_is_rejected() {
        let key = derive_key(b"secret", b"test");
        assert!(open(&key, &[0; NONCE_SIZE - 1]).is_err());
    }

    #[test]
    fn labels_separate_keys() {
        assert_ne!(derive_key(b"secret", b"one"), derive_key(b"secret", b"two"));
    }
}
