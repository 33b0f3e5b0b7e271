//! Keyward core
//!
//! Domain types and the contracts of every collaborator the identity
//! lifecycle orchestrator drives. Nothing here performs I/O; concrete
//! implementations live in `keyward-store` (local persistence) and
//! `keyward-harness` (simulated remote services), and the orchestrator itself
//! lives in `keyward-client`.
//!
//! # Collaborators
//!
//! - [`LocalKeyStore`]: at most one encrypted identity key pair
//! - [`RecordCache`]: local cache of identity records
//! - [`IdentityDirectory`]: publish / search / revoke identity records
//! - [`GroupStoreFactory`] / [`GroupTicketStore`]: group ticket persistence,
//!   rebuilt per identity key
//! - [`RatchetEngineFactory`] / [`RatchetEngine`] / [`RatchetSession`]:
//!   double-ratchet sessions
//! - [`TicketRelay`]: cloud relay for ratchet join tickets
//! - [`UnsafeKeyCloud`]: cloud storage for unsafe-channel temporary keys
//! - [`CryptoEngine`]: key generation, hashing and randomness
//! - [`KeyChangeObserver`]: optional, weakly held key change listener

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod channel;
mod crypto;
mod directory;
pub mod env;
mod error;
mod group;
mod identity;
mod observer;
mod ratchet;
mod store;

pub use channel::{ChannelRole, UnsafeKeyCloud};
pub use crypto::{CryptoEngine, EnvCrypto};
pub use directory::{DirectoryError, IdentityDirectory};
pub use env::Environment;
pub use error::KeywardError;
pub use group::{GroupStoreFactory, GroupTicketStore};
pub use identity::{Identity, IdentityRecord, RecordId, RecordRequest};
pub use keyward_crypto::{CryptoError, KeyPair, PublicKey};
pub use observer::{KeyChange, KeyChangeObserver};
pub use ratchet::{
    AccessToken, RatchetEngine, RatchetEngineFactory, RatchetError, RatchetSession, RelayError,
    ResetOutcome, RotationLog, Ticket, TicketRelay, TokenError, TokenSource,
};
pub use store::{
    DEFAULT_KEY_CACHE_LIFETIME, KeyCache, LocalKeyStore, RecordCache, StorageParams, StoreError,
};
