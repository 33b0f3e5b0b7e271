//! Group ticket store contract.
//!
//! The store's protocol is opaque here; only its construction dependency on
//! the current identity key matters to the orchestrator.

use std::sync::Arc;

use keyward_crypto::KeyPair;

use crate::{CryptoEngine, Identity, StoreError};

/// Local and cloud storage for group-session tickets, bound to one key pair.
pub trait GroupTicketStore: Send + Sync {
    /// Principal this store belongs to.
    fn identity(&self) -> &Identity;

    /// Erase persisted state.
    fn reset(&self) -> Result<(), StoreError>;
}

/// Builds a [`GroupTicketStore`] for the current identity key.
pub trait GroupStoreFactory: Send + Sync {
    /// Open a store bound to `key_pair`.
    fn open(
        &self,
        identity: &Identity,
        crypto: Arc<dyn CryptoEngine>,
        key_pair: &KeyPair,
    ) -> Result<Arc<dyn GroupTicketStore>, StoreError>;
}
