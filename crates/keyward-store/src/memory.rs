//! In-memory key store and record cache.
//!
//! Both live only as long as the process. Clones share state.

#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use keyward_core::{Identity, IdentityRecord, KeyPair, LocalKeyStore, RecordCache, StoreError};
use zeroize::Zeroizing;

/// In-memory key store for testing and ephemeral sessions.
///
/// Clone shares the same slot, which lets a test keep a handle for
/// inspection while the orchestrator owns another. Panics if the lock is
/// poisoned.
#[derive(Clone, Default)]
pub struct MemoryKeyStore {
    slot: Arc<Mutex<Option<Zeroizing<Vec<u8>>>>>,
}

impl MemoryKeyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalKeyStore for MemoryKeyStore {
    #[allow(clippy::expect_used)]
    fn exists(&self) -> Result<bool, StoreError> {
        Ok(self.slot.lock().expect("Mutex poisoned").is_some())
    }

    #[allow(clippy::expect_used)]
    fn store(&self, private_key: &[u8]) -> Result<(), StoreError> {
        let mut slot = self.slot.lock().expect("Mutex poisoned");
        if slot.is_some() {
            return Err(StoreError::AlreadyExists);
        }
        *slot = Some(Zeroizing::new(private_key.to_vec()));
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn retrieve_key_pair(&self) -> Result<KeyPair, StoreError> {
        let slot = self.slot.lock().expect("Mutex poisoned");
        let bytes = slot.as_ref().ok_or(StoreError::NotFound)?;
        KeyPair::from_private_bytes(bytes).map_err(|e| StoreError::Corrupted(e.to_string()))
    }

    #[allow(clippy::expect_used)]
    fn delete(&self) -> Result<(), StoreError> {
        self.slot.lock().expect("Mutex poisoned").take();
        Ok(())
    }
}

/// In-memory identity record cache.
#[derive(Clone, Default)]
pub struct MemoryRecordCache {
    records: Arc<Mutex<HashMap<Identity, IdentityRecord>>>,
}

impl MemoryRecordCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached records.
    #[allow(clippy::expect_used)]
    pub fn len(&self) -> usize {
        self.records.lock().expect("Mutex poisoned").len()
    }

    /// Whether the cache holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordCache for MemoryRecordCache {
    #[allow(clippy::expect_used)]
    fn store_record(&self, record: &IdentityRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .expect("Mutex poisoned")
            .insert(record.identity.clone(), record.clone());
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn record(&self, identity: &Identity) -> Result<Option<IdentityRecord>, StoreError> {
        Ok(self.records.lock().expect("Mutex poisoned").get(identity).cloned())
    }

    #[allow(clippy::expect_used)]
    fn reset(&self) -> Result<(), StoreError> {
        self.records.lock().expect("Mutex poisoned").clear();
        Ok(())
    }
}
