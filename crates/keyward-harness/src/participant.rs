//! Wiring a [`Keyward`] instance to the simulated cloud.

#![allow(clippy::disallowed_types, reason = "Synchronous in-memory state only")]

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use keyward_client::{Collaborators, Keyward, KeywardConfig};
use keyward_core::{
    EnvCrypto, Identity, IdentityRecord, KeyChange, KeyChangeObserver, KeywardError, LocalKeyStore,
    PublicKey, StorageParams, TicketRelay,
};
use keyward_store::{
    CachingKeyStore, ChaoticKeyStore, MemoryKeyStore, MemoryRecordCache, RedbStore,
};

use crate::{SimCloud, SimEnv, SimGroupStoreFactory, SimRatchetFactory};

/// Secret sealing keys in durable participant stores.
pub const STORAGE_SECRET: &[u8] = b"keyward-harness storage secret";

/// Key store wrapped by a participant's key cache.
pub type CachedKeyStore = CachingKeyStore<Arc<dyn LocalKeyStore>, SimEnv>;

/// One simulated principal: a [`Keyward`] plus handles to its stores.
pub struct Participant {
    /// The orchestrator under test
    pub keyward: Keyward,
    /// Default key store, if no custom store was supplied
    pub chaos: Option<ChaoticKeyStore<MemoryKeyStore>>,
    /// Key cache in front of the key store, if a cache lifetime was set
    pub key_cache: Option<Arc<CachedKeyStore>>,
    /// Record cache shared by every instance built from this participant
    pub record_cache: MemoryRecordCache,
    /// Group store factory, for inspecting opened stores
    pub group_stores: SimGroupStoreFactory,
    /// Ratchet engine factory, for inspecting engine lifetimes
    pub ratchet_engines: SimRatchetFactory,
    /// Observer registered on the orchestrator
    pub observer: Arc<RecordingObserver>,
    cloud: SimCloud,
    config: KeywardConfig,
    services: Collaborators,
}

impl Participant {
    /// Start building a participant named `identity`.
    pub fn builder(cloud: &SimCloud, env: &SimEnv, identity: &str) -> ParticipantBuilder {
        ParticipantBuilder {
            cloud: cloud.clone(),
            env: env.clone(),
            config: KeywardConfig::new(identity),
            key_store: None,
            chaos: None,
            ticket_relay: None,
            durable: false,
            cached: false,
        }
    }

    /// Principal identity.
    pub fn identity(&self) -> &Identity {
        self.keyward.identity()
    }

    /// The participant's current directory record.
    ///
    /// # Panics
    ///
    /// Panics if the participant has no current record.
    #[allow(clippy::panic)]
    pub fn record(&self) -> IdentityRecord {
        let mut records = self.cloud.current_records(self.identity());
        match records.len() {
            1 => records.remove(0),
            n => panic!("{} has {n} current records", self.identity()),
        }
    }

    /// Public half of the locally stored key, if one can be read.
    ///
    /// Reads past the chaotic wrapper and the key cache so that inspecting
    /// state never consumes an armed failure or fills the cache.
    pub fn local_public_key(&self) -> Option<PublicKey> {
        let key_pair = match (&self.chaos, &self.key_cache) {
            (Some(chaos), _) => chaos.inner().retrieve_key_pair(),
            (None, Some(cache)) => cache.inner().retrieve_key_pair(),
            (None, None) => self.services.key_store.retrieve_key_pair(),
        };
        key_pair.ok().map(|key_pair| key_pair.public_key())
    }

    /// Collaborators the orchestrator was built with.
    pub fn services(&self) -> &Collaborators {
        &self.services
    }

    /// Build a fresh orchestrator over the same stores, as after a restart,
    /// restoring identity state if a local key exists.
    pub async fn reopen(&self) -> Result<Keyward, KeywardError> {
        Keyward::open(self.config.clone(), self.services.clone()).await
    }

    /// Build a second orchestrator over the same stores without restoring.
    pub fn sibling(&self) -> Keyward {
        Keyward::new(self.config.clone(), self.services.clone())
    }
}

/// Builder for [`Participant`].
pub struct ParticipantBuilder {
    cloud: SimCloud,
    env: SimEnv,
    config: KeywardConfig,
    key_store: Option<Arc<dyn LocalKeyStore>>,
    chaos: Option<(f64, u64)>,
    ticket_relay: Option<Arc<dyn TicketRelay>>,
    durable: bool,
    cached: bool,
}

impl ParticipantBuilder {
    /// Enable ratchet support.
    #[must_use]
    pub fn ratchet(mut self) -> Self {
        self.config.enable_ratchet = true;
        self
    }

    /// Set the key rotation interval.
    #[must_use]
    pub fn rotation_interval(mut self, interval: Duration) -> Self {
        self.config.key_rotation_interval = interval;
        self
    }

    /// Use `store` instead of the default in-memory chaotic store.
    #[must_use]
    pub fn key_store(mut self, store: Arc<dyn LocalKeyStore>) -> Self {
        self.key_store = Some(store);
        self
    }

    /// Make the default key store fail each operation with probability
    /// `failure_rate`, seeded by `seed`.
    #[must_use]
    pub fn chaos(mut self, failure_rate: f64, seed: u64) -> Self {
        self.chaos = Some((failure_rate, seed));
        self
    }

    /// Keep the key in a Redb store opened from `storage`.
    #[must_use]
    pub fn storage(mut self, storage: StorageParams) -> Self {
        self.config.storage = storage;
        self.durable = true;
        self
    }

    /// Serve key retrievals from a cache whose entries live for `lifetime`.
    #[must_use]
    pub fn key_cache_lifetime(mut self, lifetime: Duration) -> Self {
        self.config.key_cache_lifetime = lifetime;
        self.cached = true;
        self
    }

    /// Use `relay` instead of the participant's view of the cloud relay.
    #[must_use]
    pub fn ticket_relay(mut self, relay: Arc<dyn TicketRelay>) -> Self {
        self.ticket_relay = Some(relay);
        self
    }

    /// Wire everything up.
    ///
    /// # Panics
    ///
    /// Panics if a durable store was requested and cannot be opened.
    #[allow(clippy::expect_used)]
    pub fn build(self) -> Participant {
        let identity = self.config.identity.clone();

        let (key_store, chaos) = match self.key_store {
            Some(store) => (store, None),
            None if self.durable => {
                let store =
                    RedbStore::open_with(&self.config.storage, STORAGE_SECRET, self.env.clone())
                        .expect("durable key store opens");
                (Arc::new(store) as Arc<dyn LocalKeyStore>, None)
            },
            None => {
                let chaos = match self.chaos {
                    Some((rate, seed)) => {
                        ChaoticKeyStore::with_seed(MemoryKeyStore::new(), rate, seed)
                    },
                    None => ChaoticKeyStore::new(MemoryKeyStore::new()),
                };
                (Arc::new(chaos.clone()) as Arc<dyn LocalKeyStore>, Some(chaos))
            },
        };

        let key_cache = self.cached.then(|| {
            Arc::new(CachingKeyStore::with_lifetime(
                key_store.clone(),
                self.env.clone(),
                self.config.key_cache_lifetime,
            ))
        });
        let key_store = match &key_cache {
            Some(cache) => cache.clone() as Arc<dyn LocalKeyStore>,
            None => key_store,
        };

        let record_cache = MemoryRecordCache::new();
        let group_stores = SimGroupStoreFactory::new();
        let ratchet_engines = SimRatchetFactory::new(self.cloud.clone(), self.env.clone());

        let services = Collaborators {
            crypto: Arc::new(EnvCrypto::new(self.env.clone())),
            key_store,
            record_cache: Arc::new(record_cache.clone()),
            directory: Arc::new(self.cloud.directory()),
            group_stores: Arc::new(group_stores.clone()),
            ratchet_engines: Arc::new(ratchet_engines.clone()),
            ticket_relay: self
                .ticket_relay
                .unwrap_or_else(|| Arc::new(self.cloud.ticket_relay(identity.clone()))),
            unsafe_keys: Arc::new(self.cloud.unsafe_keys()),
            tokens: Arc::new(self.cloud.tokens(identity)),
        };

        let keyward = Keyward::new(self.config.clone(), services.clone());
        let observer = Arc::new(RecordingObserver::default());
        let handle: Arc<dyn KeyChangeObserver> = observer.clone();
        keyward.set_observer(Arc::downgrade(&handle));

        Participant {
            keyward,
            chaos,
            key_cache,
            record_cache,
            group_stores,
            ratchet_engines,
            observer,
            cloud: self.cloud,
            config: self.config,
            services,
        }
    }
}

/// Observer that records every key change it sees.
#[derive(Default)]
pub struct RecordingObserver {
    changes: Mutex<Vec<(Identity, KeyChange)>>,
}

impl RecordingObserver {
    /// Changes seen so far, oldest first.
    #[allow(clippy::expect_used)]
    pub fn changes(&self) -> Vec<KeyChange> {
        self.changes.lock().expect("Mutex poisoned").iter().map(|(_, change)| *change).collect()
    }
}

impl KeyChangeObserver for RecordingObserver {
    #[allow(clippy::expect_used)]
    fn key_changed(&self, identity: &Identity, change: KeyChange) {
        self.changes.lock().expect("Mutex poisoned").push((identity.clone(), change));
    }
}
