//! Simulated group ticket store.

#![allow(clippy::disallowed_types, reason = "Synchronous in-memory state only")]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicU32, Ordering},
};

use keyward_core::{
    CryptoEngine, GroupStoreFactory, GroupTicketStore, Identity, KeyPair, PublicKey, StoreError,
};

/// Group ticket store bound to one identity key.
pub struct SimGroupStore {
    identity: Identity,
    public_key: PublicKey,
    storage_id: String,
    shared: Arc<FactoryState>,
}

impl SimGroupStore {
    /// Key the store was opened with.
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Storage location derived from the identity key.
    pub fn storage_id(&self) -> &str {
        &self.storage_id
    }
}

impl GroupTicketStore for SimGroupStore {
    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn reset(&self) -> Result<(), StoreError> {
        if self.shared.fail_reset.load(Ordering::SeqCst) {
            return Err(StoreError::Io("injected reset failure".into()));
        }
        self.shared.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct FactoryState {
    opened: Mutex<Vec<PublicKey>>,
    resets: AtomicU32,
    fail_reset: AtomicBool,
}

/// Opens [`SimGroupStore`]s and records which keys they were opened with.
#[derive(Clone, Default)]
pub struct SimGroupStoreFactory {
    shared: Arc<FactoryState>,
}

impl SimGroupStoreFactory {
    /// Factory with no stores opened yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Public keys of every store opened so far, oldest first.
    #[allow(clippy::expect_used)]
    pub fn opened_keys(&self) -> Vec<PublicKey> {
        self.shared.opened.lock().expect("Mutex poisoned").clone()
    }

    /// Number of successful resets across all stores.
    pub fn resets(&self) -> u32 {
        self.shared.resets.load(Ordering::SeqCst)
    }

    /// Make store resets fail.
    pub fn fail_resets(&self, fail: bool) {
        self.shared.fail_reset.store(fail, Ordering::SeqCst);
    }
}

impl GroupStoreFactory for SimGroupStoreFactory {
    #[allow(clippy::expect_used)]
    fn open(
        &self,
        identity: &Identity,
        crypto: Arc<dyn CryptoEngine>,
        key_pair: &KeyPair,
    ) -> Result<Arc<dyn GroupTicketStore>, StoreError> {
        let public_key = key_pair.public_key();
        let mut seed = identity.as_bytes().to_vec();
        seed.extend_from_slice(public_key.as_bytes());
        let storage_id = hex::encode(&crypto.hash(&seed)[..8]);

        self.shared.opened.lock().expect("Mutex poisoned").push(public_key);

        Ok(Arc::new(SimGroupStore {
            identity: identity.clone(),
            public_key,
            storage_id,
            shared: Arc::clone(&self.shared),
        }))
    }
}
