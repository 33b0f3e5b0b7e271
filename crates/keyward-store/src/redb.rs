//! Redb-backed durable key store and record cache.
//!
//! The private key is sealed with a key derived from a caller-supplied
//! storage secret before it touches disk. Records are CBOR-encoded.

use std::{path::Path, sync::Arc};

use keyward_core::{
    Environment, Identity, IdentityRecord, KeyPair, LocalKeyStore, RecordCache, StorageParams,
    StoreError,
};
use keyward_crypto::{NONCE_SIZE, derive_key, open, seal};
use redb::{Database, ReadableTable, TableDefinition, backends::InMemoryBackend};
use zeroize::Zeroizing;

/// Table: keys
/// Key: key name
/// Value: nonce || sealed private key
const KEYS: TableDefinition<&str, &[u8]> = TableDefinition::new("keys");

/// Table: records
/// Key: identity
/// Value: CBOR-encoded IdentityRecord
const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("records");

const SEAL_LABEL: &[u8] = b"keyward key store v1";

/// Durable storage backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStore<E: Environment> {
    db: Arc<Database>,
    key_name: String,
    seal_key: Arc<Zeroizing<[u8; 32]>>,
    env: E,
}

impl<E: Environment> RedbStore<E> {
    /// Open or create a Redb database at the given path.
    ///
    /// `key_name` selects the slot holding the private key, so several
    /// principals can share one file. `storage_secret` protects the key at
    /// rest; reopening with a different secret makes the stored key
    /// unreadable.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the database cannot be opened or created.
    pub fn open(
        path: impl AsRef<Path>,
        key_name: impl Into<String>,
        storage_secret: &[u8],
        env: E,
    ) -> Result<Self, StoreError> {
        let db = Database::create(path.as_ref()).map_err(|e| StoreError::Io(e.to_string()))?;
        tracing::debug!(path = %path.as_ref().display(), "opened key store database");

        Self::init(db, key_name.into(), storage_secret, env)
    }

    /// Open the store `params` describe.
    ///
    /// Without a path the database lives in memory and is gone when the last
    /// clone is dropped.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the database cannot be opened or created.
    pub fn open_with(
        params: &StorageParams,
        storage_secret: &[u8],
        env: E,
    ) -> Result<Self, StoreError> {
        match &params.path {
            Some(path) => Self::open(path, params.key_name.clone(), storage_secret, env),
            None => {
                let db = Database::builder()
                    .create_with_backend(InMemoryBackend::new())
                    .map_err(|e| StoreError::Io(e.to_string()))?;
                Self::init(db, params.key_name.clone(), storage_secret, env)
            },
        }
    }

    fn init(
        db: Database,
        key_name: String,
        storage_secret: &[u8],
        env: E,
    ) -> Result<Self, StoreError> {
        let txn = db.begin_write().map_err(|e| StoreError::Io(e.to_string()))?;
        {
            let _ = txn.open_table(KEYS).map_err(|e| StoreError::Io(e.to_string()))?;
            let _ = txn.open_table(RECORDS).map_err(|e| StoreError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StoreError::Io(e.to_string()))?;

        let mut info = SEAL_LABEL.to_vec();
        info.extend_from_slice(key_name.as_bytes());
        let seal_key = Zeroizing::new(derive_key(storage_secret, &info));

        Ok(Self { db: Arc::new(db), key_name, seal_key: Arc::new(seal_key), env })
    }

    /// Name of the key slot this store manages.
    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    fn load_sealed(&self) -> Result<Option<Vec<u8>>, StoreError> {
        let txn = self.db.begin_read().map_err(|e| StoreError::Io(e.to_string()))?;
        let table = txn.open_table(KEYS).map_err(|e| StoreError::Io(e.to_string()))?;

        let sealed = table
            .get(self.key_name.as_str())
            .map_err(|e| StoreError::Io(e.to_string()))?
            .map(|guard| guard.value().to_vec());

        Ok(sealed)
    }
}

impl<E: Environment> LocalKeyStore for RedbStore<E> {
    fn exists(&self) -> Result<bool, StoreError> {
        Ok(self.load_sealed()?.is_some())
    }

    fn store(&self, private_key: &[u8]) -> Result<(), StoreError> {
        let mut nonce = [0u8; NONCE_SIZE];
        self.env.random_bytes(&mut nonce);
        let sealed = seal(&self.seal_key, private_key, nonce);

        let txn = self.db.begin_write().map_err(|e| StoreError::Io(e.to_string()))?;
        {
            let mut table = txn.open_table(KEYS).map_err(|e| StoreError::Io(e.to_string()))?;

            let present = table
                .get(self.key_name.as_str())
                .map_err(|e| StoreError::Io(e.to_string()))?
                .is_some();
            if present {
                return Err(StoreError::AlreadyExists);
            }

            table
                .insert(self.key_name.as_str(), sealed.as_slice())
                .map_err(|e| StoreError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StoreError::Io(e.to_string()))?;

        Ok(())
    }

    fn retrieve_key_pair(&self) -> Result<KeyPair, StoreError> {
        let sealed = self.load_sealed()?.ok_or(StoreError::NotFound)?;

        let private_key = Zeroizing::new(
            open(&self.seal_key, &sealed).map_err(|e| StoreError::Corrupted(e.to_string()))?,
        );

        KeyPair::from_private_bytes(&private_key).map_err(|e| StoreError::Corrupted(e.to_string()))
    }

    fn delete(&self) -> Result<(), StoreError> {
        let txn = self.db.begin_write().map_err(|e| StoreError::Io(e.to_string()))?;
        {
            let mut table = txn.open_table(KEYS).map_err(|e| StoreError::Io(e.to_string()))?;
            table.remove(self.key_name.as_str()).map_err(|e| StoreError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StoreError::Io(e.to_string()))?;

        Ok(())
    }
}

impl<E: Environment> RecordCache for RedbStore<E> {
    fn store_record(&self, record: &IdentityRecord) -> Result<(), StoreError> {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(record, &mut bytes)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let txn = self.db.begin_write().map_err(|e| StoreError::Io(e.to_string()))?;
        {
            let mut table = txn.open_table(RECORDS).map_err(|e| StoreError::Io(e.to_string()))?;
            table
                .insert(record.identity.as_str(), bytes.as_slice())
                .map_err(|e| StoreError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StoreError::Io(e.to_string()))?;

        Ok(())
    }

    fn record(&self, identity: &Identity) -> Result<Option<IdentityRecord>, StoreError> {
        let txn = self.db.begin_read().map_err(|e| StoreError::Io(e.to_string()))?;
        let table = txn.open_table(RECORDS).map_err(|e| StoreError::Io(e.to_string()))?;

        let Some(guard) = table.get(identity.as_str()).map_err(|e| StoreError::Io(e.to_string()))?
        else {
            return Ok(None);
        };

        let record: IdentityRecord = ciborium::de::from_reader(guard.value())
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        Ok(Some(record))
    }

    fn reset(&self) -> Result<(), StoreError> {
        let txn = self.db.begin_write().map_err(|e| StoreError::Io(e.to_string()))?;
        {
            txn.delete_table(RECORDS).map_err(|e| StoreError::Io(e.to_string()))?;
            let _ = txn.open_table(RECORDS).map_err(|e| StoreError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StoreError::Io(e.to_string()))?;

        tracing::debug!("record cache reset");
        Ok(())
    }
}
