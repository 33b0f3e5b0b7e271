//! Local persistence contracts.
//!
//! Both stores are synchronous: they sit on local disk or in memory and the
//! orchestrator calls them from within its serialized lifecycle operations.

use std::{path::PathBuf, sync::Arc, time::Duration};

use keyward_crypto::KeyPair;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Identity, IdentityRecord};

/// Default lifetime of a decrypted key held by a caching key store.
pub const DEFAULT_KEY_CACHE_LIFETIME: Duration = Duration::from_secs(1800);

/// Where the local key and record cache live.
///
/// Opaque to the orchestrator; the durable store opens from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageParams {
    /// Database file. `None` keeps the database in memory.
    pub path: Option<PathBuf>,
    /// Slot name of the private key inside the store.
    pub key_name: String,
}

impl Default for StorageParams {
    fn default() -> Self {
        Self { path: None, key_name: "keyward-identity".to_string() }
    }
}

/// Errors from local persistence.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No key (or entry) is stored
    #[error("entry not found")]
    NotFound,

    /// A key is already stored and would be overwritten
    #[error("entry already exists")]
    AlreadyExists,

    /// I/O error from the backing storage
    #[error("I/O error: {0}")]
    Io(String),

    /// Encoding or decoding failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Stored data failed an integrity check
    #[error("corrupted data: {0}")]
    Corrupted(String),
}

/// Holds at most one identity key pair for the current principal.
///
/// Presence of a key is the signal for "registered locally".
pub trait LocalKeyStore: Send + Sync {
    /// Whether a key pair is stored.
    fn exists(&self) -> Result<bool, StoreError>;

    /// Persist exported private key bytes.
    ///
    /// Fails with [`StoreError::AlreadyExists`] if a key is already present.
    fn store(&self, private_key: &[u8]) -> Result<(), StoreError>;

    /// Load the stored key pair.
    ///
    /// Fails with [`StoreError::NotFound`] if no key is present.
    fn retrieve_key_pair(&self) -> Result<KeyPair, StoreError>;

    /// Remove the stored key. Deleting an absent key succeeds.
    fn delete(&self) -> Result<(), StoreError>;

    /// Caching controls, for stores that keep the key in memory between
    /// retrievals.
    fn key_cache(&self) -> Option<&dyn KeyCache> {
        None
    }
}

impl<T: LocalKeyStore + ?Sized> LocalKeyStore for Arc<T> {
    fn exists(&self) -> Result<bool, StoreError> {
        (**self).exists()
    }

    fn store(&self, private_key: &[u8]) -> Result<(), StoreError> {
        (**self).store(private_key)
    }

    fn retrieve_key_pair(&self) -> Result<KeyPair, StoreError> {
        (**self).retrieve_key_pair()
    }

    fn delete(&self) -> Result<(), StoreError> {
        (**self).delete()
    }

    fn key_cache(&self) -> Option<&dyn KeyCache> {
        (**self).key_cache()
    }
}

/// Controls for a key store that caches the decrypted key.
pub trait KeyCache: Send + Sync {
    /// Drop the cached key; the next retrieval hits the backing store.
    fn clean_cache(&self);

    /// Load the key into the cache now.
    fn load_cache(&self) -> Result<(), StoreError>;
}

/// Local cache of identity records, keyed by identity.
pub trait RecordCache: Send + Sync {
    /// Insert or replace the record for its identity.
    fn store_record(&self, record: &IdentityRecord) -> Result<(), StoreError>;

    /// Cached record for `identity`, if any.
    fn record(&self, identity: &Identity) -> Result<Option<IdentityRecord>, StoreError>;

    /// Remove every cached record.
    fn reset(&self) -> Result<(), StoreError>;
}
