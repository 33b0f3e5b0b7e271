//! Ed25519 identity keys.

use std::fmt;

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::CryptoError;

/// Length of an exported private key.
pub const PRIVATE_KEY_SIZE: usize = 32;

/// Length of a detached signature.
pub const SIGNATURE_SIZE: usize = 64;

/// Public half of an identity key pair.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    /// Wrap raw public key bytes.
    ///
    /// The bytes are checked to decode as an Ed25519 point.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        VerifyingKey::from_bytes(&bytes)
            .map_err(|e| CryptoError::InvalidPublicKey { reason: e.to_string() })?;
        Ok(Self(bytes))
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(&self.0[..8]))
    }
}

/// Ed25519 identity key pair.
///
/// Private material is zeroized when the pair is dropped.
#[derive(Clone)]
pub struct KeyPair {
    signing: SigningKey,
}

impl KeyPair {
    /// Build a key pair from a 32-byte seed.
    ///
    /// Callers supply the seed so that key generation stays deterministic
    /// under simulation.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self { signing: SigningKey::from_bytes(seed) }
    }

    /// Import a key pair from exported private key bytes.
    pub fn from_private_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let seed: [u8; PRIVATE_KEY_SIZE] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidPrivateKey { expected: PRIVATE_KEY_SIZE, actual: bytes.len() }
        })?;
        let seed = Zeroizing::new(seed);
        Ok(Self::from_seed(&seed))
    }

    /// Export the private key for persistence.
    pub fn private_bytes(&self) -> Zeroizing<[u8; PRIVATE_KEY_SIZE]> {
        Zeroizing::new(self.signing.to_bytes())
    }

    /// Public half of this pair.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing.verifying_key().to_bytes())
    }

    /// Produce a detached signature over `message`.
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_SIZE] {
        self.signing.sign(message).to_bytes()
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair").field("public", &self.public_key()).finish_non_exhaustive()
    }
}

/// Verify a detached signature produced by [`KeyPair::sign`].
pub fn verify_signature(
    public_key: &PublicKey,
    message: &[u8],
    signature: &[u8],
) -> Result<(), CryptoError> {
    let verifying = VerifyingKey::from_bytes(public_key.as_bytes())
        .map_err(|e| CryptoError::InvalidPublicKey { reason: e.to_string() })?;
    let bytes: [u8; SIGNATURE_SIZE] =
        signature.try_into().map_err(|_| CryptoError::BadSignature)?;
    verifying
        .verify_strict(message, &Signature::from_bytes(&bytes))
        .map_err(|_| CryptoError::BadSignature)
}
