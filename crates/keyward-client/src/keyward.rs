//! The identity lifecycle orchestrator.
//!
//! [`Keyward`] owns the principal's derived state: the group ticket store,
//! the ratchet session engine with its rotation timer, and the unsafe channel
//! manager. That state is replaced wholesale whenever identity material
//! changes.
//!
//! # Concurrency
//!
//! Identity-mutating operations (register, rotate, unregister, clean up,
//! restore) serialize on one async lock, the work queue. Ratchet and unsafe
//! channel operations do not take it. They snapshot the current instance and
//! re-validate it before committing side effects, failing with
//! [`KeywardError::MissingPrivateKey`] if a mutation replaced it mid-flight.

#![allow(clippy::disallowed_types, reason = "Short critical sections, never held across await")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak},
};

use keyward_core::{
    CryptoEngine, GroupStoreFactory, GroupTicketStore, Identity, IdentityDirectory,
    IdentityRecord, KeyChange, KeyChangeObserver, KeywardError, LocalKeyStore, RatchetEngine,
    RatchetEngineFactory, RecordCache, TicketRelay, TokenSource, UnsafeKeyCloud,
};
use keyward_crypto::{CryptoError, SESSION_ID_SIZE, compute_session_id};

use crate::{KeywardConfig, scheduler::RotationScheduler, unsafe_channel::UnsafeChannelManager};

/// External services and stores a [`Keyward`] instance drives.
#[derive(Clone)]
pub struct Collaborators {
    /// Key generation, hashing and randomness
    pub crypto: Arc<dyn CryptoEngine>,
    /// Holds the principal's private key
    pub key_store: Arc<dyn LocalKeyStore>,
    /// Local cache of identity records
    pub record_cache: Arc<dyn RecordCache>,
    /// Remote identity directory
    pub directory: Arc<dyn IdentityDirectory>,
    /// Builds a group ticket store per identity key
    pub group_stores: Arc<dyn GroupStoreFactory>,
    /// Builds a ratchet session engine per identity key and record
    pub ratchet_engines: Arc<dyn RatchetEngineFactory>,
    /// Cloud relay for ratchet tickets
    pub ticket_relay: Arc<dyn TicketRelay>,
    /// Cloud store for unsafe channel temporary keys
    pub unsafe_keys: Arc<dyn UnsafeKeyCloud>,
    /// Access tokens for the ratchet service
    pub tokens: Arc<dyn TokenSource>,
}

/// Derived state rebuilt on every identity change.
#[derive(Default)]
pub(crate) struct ActiveState {
    /// Bumped on every rebuild and teardown
    pub(crate) generation: u64,
    pub(crate) group_store: Option<Arc<dyn GroupTicketStore>>,
    pub(crate) secure_chat: Option<Arc<dyn RatchetEngine>>,
    pub(crate) scheduler: Option<RotationScheduler>,
    pub(crate) unsafe_manager: Option<Arc<UnsafeChannelManager>>,
}

/// Identity lifecycle orchestrator for one principal.
///
/// Dropping the instance stops the rotation timer and releases the engine.
pub struct Keyward {
    pub(crate) identity: Identity,
    pub(crate) config: KeywardConfig,
    pub(crate) services: Collaborators,
    pub(crate) observer: Mutex<Option<Weak<dyn KeyChangeObserver>>>,
    /// Serial work queue for identity mutations
    pub(crate) lifecycle: tokio::sync::Mutex<()>,
    pub(crate) active: RwLock<ActiveState>,
}

impl Keyward {
    /// Create an orchestrator with no active identity state.
    ///
    /// Performs no I/O. Use [`open`](Self::open) to also restore state from a
    /// key already in local storage.
    pub fn new(config: KeywardConfig, services: Collaborators) -> Self {
        Self {
            identity: config.identity.clone(),
            config,
            services,
            observer: Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
            active: RwLock::new(ActiveState::default()),
        }
    }

    /// Create an orchestrator and, if a local key exists, rebuild the
    /// identity state from it.
    pub async fn open(
        config: KeywardConfig,
        services: Collaborators,
    ) -> Result<Self, KeywardError> {
        let keyward = Self::new(config, services);
        if keyward.has_local_private_key()? {
            keyward.restore().await?;
        }
        Ok(keyward)
    }

    /// Principal managed by this instance.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Active configuration.
    pub fn config(&self) -> &KeywardConfig {
        &self.config
    }

    /// Register an observer for successful key changes.
    ///
    /// Held weakly; a dropped observer is skipped.
    #[allow(clippy::expect_used)]
    pub fn set_observer(&self, observer: Weak<dyn KeyChangeObserver>) {
        *self.observer.lock().expect("Mutex poisoned") = Some(observer);
    }

    /// Whether a private key is present in local storage. No remote call.
    pub fn has_local_private_key(&self) -> Result<bool, KeywardError> {
        Ok(self.services.key_store.exists()?)
    }

    /// Current group ticket store.
    ///
    /// # Errors
    ///
    /// [`KeywardError::MissingPrivateKey`] if no identity state is loaded.
    pub fn group_manager(&self) -> Result<Arc<dyn GroupTicketStore>, KeywardError> {
        self.read_active().group_store.clone().ok_or(KeywardError::MissingPrivateKey)
    }

    /// Whether a ratchet session engine is currently active.
    pub fn has_secure_chat(&self) -> bool {
        self.read_active().secure_chat.is_some()
    }

    /// Whether a rotation timer is currently running.
    pub fn is_rotation_scheduled(&self) -> bool {
        self.read_active().scheduler.as_ref().is_some_and(RotationScheduler::is_running)
    }

    /// Derive a 32-byte session id from a group identifier.
    ///
    /// # Errors
    ///
    /// [`KeywardError::InvalidIdentityLength`] if the identifier is not longer
    /// than 10 bytes.
    pub fn compute_session_id(
        &self,
        identifier: &[u8],
    ) -> Result<[u8; SESSION_ID_SIZE], KeywardError> {
        compute_session_id(identifier).map_err(|e| match e {
            CryptoError::IdentifierTooShort { len, min } => {
                KeywardError::InvalidIdentityLength { len, min }
            },
            other => KeywardError::Crypto(other),
        })
    }

    /// Drop the decrypted key held by a caching key store.
    ///
    /// # Errors
    ///
    /// [`KeywardError::NotCachingKeyStrategy`] if the key store does not cache.
    pub fn clean_key_cache(&self) -> Result<(), KeywardError> {
        let cache =
            self.services.key_store.key_cache().ok_or(KeywardError::NotCachingKeyStrategy)?;
        cache.clean_cache();
        Ok(())
    }

    /// Load the decrypted key into a caching key store now.
    ///
    /// # Errors
    ///
    /// [`KeywardError::NotCachingKeyStrategy`] if the key store does not cache.
    pub fn load_key_cache(&self) -> Result<(), KeywardError> {
        let cache =
            self.services.key_store.key_cache().ok_or(KeywardError::NotCachingKeyStrategy)?;
        Ok(cache.load_cache()?)
    }

    /// Cached record for `identity`. Local only.
    pub fn find_cached_user(
        &self,
        identity: &Identity,
    ) -> Result<Option<IdentityRecord>, KeywardError> {
        self.services.record_cache.record(identity).map_err(KeywardError::RecordCache)
    }

    /// Record for `identity`, from the cache or else the directory.
    ///
    /// # Errors
    ///
    /// [`KeywardError::UserNotFound`] if the directory has no current record.
    pub async fn find_user(&self, identity: &Identity) -> Result<IdentityRecord, KeywardError> {
        if let Some(record) = self.find_cached_user(identity)? {
            return Ok(record);
        }

        let mut found = self.find_users(std::slice::from_ref(identity), true).await?;
        found.remove(identity).ok_or_else(|| KeywardError::UserNotFound(identity.clone()))
    }

    /// Search the directory for each identity and cache what is found.
    ///
    /// With `check_result`, a missing identity fails the whole lookup with
    /// [`KeywardError::UserNotFound`]; without it, missing identities are
    /// simply absent from the result.
    pub async fn find_users(
        &self,
        identities: &[Identity],
        check_result: bool,
    ) -> Result<HashMap<Identity, IdentityRecord>, KeywardError> {
        let mut found = HashMap::with_capacity(identities.len());

        for identity in identities {
            let records = self.services.directory.search(identity).await?;
            match records.into_iter().next() {
                Some(record) => {
                    self.services
                        .record_cache
                        .store_record(&record)
                        .map_err(KeywardError::RecordCache)?;
                    found.insert(identity.clone(), record);
                },
                None if check_result => return Err(KeywardError::UserNotFound(identity.clone())),
                None => {},
            }
        }

        Ok(found)
    }

    pub(crate) fn notify(&self, change: KeyChange) {
        let observer = self.observer_handle();
        if let Some(observer) = observer {
            observer.key_changed(&self.identity, change);
        }
    }

    #[allow(clippy::expect_used)]
    fn observer_handle(&self) -> Option<Arc<dyn KeyChangeObserver>> {
        self.observer.lock().expect("Mutex poisoned").as_ref().and_then(Weak::upgrade)
    }

    /// Current engine and the generation it belongs to.
    pub(crate) fn secure_chat(&self) -> Result<(Arc<dyn RatchetEngine>, u64), KeywardError> {
        let active = self.read_active();
        let engine = active.secure_chat.clone().ok_or(KeywardError::MissingPrivateKey)?;
        Ok((engine, active.generation))
    }

    /// Fail if identity state was rebuilt or torn down since `generation`.
    pub(crate) fn ensure_generation(&self, generation: u64) -> Result<(), KeywardError> {
        if self.read_active().generation == generation {
            Ok(())
        } else {
            Err(KeywardError::MissingPrivateKey)
        }
    }

    pub(crate) fn unsafe_manager(&self) -> Result<Arc<UnsafeChannelManager>, KeywardError> {
        self.read_active().unsafe_manager.clone().ok_or(KeywardError::MissingPrivateKey)
    }

    /// Fail unless `manager` is still the installed unsafe channel manager.
    pub(crate) fn ensure_unsafe_manager(
        &self,
        manager: &Arc<UnsafeChannelManager>,
    ) -> Result<(), KeywardError> {
        match &self.read_active().unsafe_manager {
            Some(current) if Arc::ptr_eq(current, manager) => Ok(()),
            _ => Err(KeywardError::MissingPrivateKey),
        }
    }

    #[allow(clippy::expect_used)]
    pub(crate) fn read_active(&self) -> RwLockReadGuard<'_, ActiveState> {
        self.active.read().expect("ActiveState lock poisoned")
    }

    #[allow(clippy::expect_used)]
    pub(crate) fn write_active(&self) -> RwLockWriteGuard<'_, ActiveState> {
        self.active.write().expect("ActiveState lock poisoned")
    }
}
