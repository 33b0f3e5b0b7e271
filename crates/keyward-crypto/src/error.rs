//! Errors for keyward cryptographic operations.

use thiserror::Error;

/// Errors produced by key handling, chains and AEAD.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Private key bytes could not be parsed
    #[error("invalid private key: expected {expected} bytes, got {actual}")]
    InvalidPrivateKey {
        /// Required key length
        expected: usize,
        /// Length that was supplied
        actual: usize,
    },

    /// Public key bytes are not a valid curve point
    #[error("invalid public key: {reason}")]
    InvalidPublicKey {
        /// Parser diagnostic
        reason: String,
    },

    /// Signature did not verify against the given key
    #[error("signature verification failed")]
    BadSignature,

    /// Identifier is too short to derive a session id from
    #[error("identifier too short: {len} bytes, need more than {min}")]
    IdentifierTooShort {
        /// Supplied length
        len: usize,
        /// Exclusive minimum
        min: usize,
    },

    /// Chain generation counter would overflow
    #[error("generation overflow at {current}")]
    GenerationOverflow {
        /// Generation at which advancing failed
        current: u32,
    },

    /// Requested generation is behind the chain or too far ahead of it
    #[error("chain cannot reach generation {requested} from {current}")]
    GenerationUnreachable {
        /// Current chain generation
        current: u32,
        /// Generation the caller asked for
        requested: u32,
    },

    /// Authentication failed or the key does not match
    #[error("decryption failed: {reason}")]
    DecryptionFailed {
        /// What went wrong
        reason: String,
    },
}
