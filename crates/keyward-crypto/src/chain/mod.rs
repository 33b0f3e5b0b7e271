//! Forward-secure symmetric chains.
//!
//! A ratchet session owns one sending and one receiving chain. Each chain is
//! seeded from the session root with [`derive_chain_seed`] and then advanced
//! once per message.

mod derivation;
mod encryption;
mod ratchet;

pub use derivation::derive_chain_seed;
pub use encryption::{EncryptedMessage, NONCE_RANDOM_SIZE, decrypt_message, encrypt_message};
pub use ratchet::{MAX_SKIP, MessageKey, SymmetricRatchet};
