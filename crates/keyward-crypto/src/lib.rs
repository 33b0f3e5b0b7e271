//! Keyward Cryptographic Primitives
//!
//! Cryptographic building blocks for keyward. Everything here is a pure
//! function of its inputs: callers provide random bytes, which keeps the
//! simulation harness deterministic.
//!
//! # Contents
//!
//! - [`KeyPair`] / [`PublicKey`]: Ed25519 identity keys. The private half is
//!   what the local key store persists; the public half is what the identity
//!   directory publishes.
//! - [`sha512`] / [`compute_session_id`]: hashing and session id derivation.
//! - [`seal`] / [`open`] / [`derive_key`]: one-shot XChaCha20-Poly1305 under a
//!   derived key, used for at-rest key protection and unsafe channels.
//! - [`chain`]: forward-secure symmetric chains used by ratchet sessions.
//!
//! # Key Lifecycle
//!
//! ```text
//! Session root secret
//!        │
//!        ▼
//! HKDF → Chain seed (per session, per direction)
//!        │
//!        ▼
//! Symmetric Ratchet → Message Keys
//!        │
//!        ▼
//! AEAD Encryption → Ciphertext
//! ```
//!
//! Message keys are used for exactly one encryption operation and are zeroized
//! on drop, so past messages stay protected if later chain state leaks.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod aead;
pub mod chain;
mod error;
mod hash;
mod keys;

pub use aead::{NONCE_SIZE, derive_key, open, seal};
pub use chain::{EncryptedMessage, MessageKey, SymmetricRatchet, decrypt_message, encrypt_message};
pub use error::CryptoError;
pub use hash::{MIN_IDENTIFIER_LEN, SESSION_ID_SIZE, compute_session_id, sha512};
pub use keys::{KeyPair, PRIVATE_KEY_SIZE, PublicKey, SIGNATURE_SIZE, verify_signature};
