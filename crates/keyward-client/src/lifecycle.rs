//! Register, rotate, unregister and the state rebuilds they trigger.

use std::sync::Arc;

use keyward_core::{
    IdentityRecord, KeyChange, KeyPair, KeywardError, RecordId, RecordRequest, ResetOutcome,
};

use crate::{Keyward, scheduler::RotationScheduler, unsafe_channel::UnsafeChannelManager};

impl Keyward {
    /// Register the principal with a freshly generated key pair.
    ///
    /// # Errors
    ///
    /// - [`KeywardError::PrivateKeyExists`] if a local key is present
    /// - [`KeywardError::UserAlreadyRegistered`] if the directory already has
    ///   a current record
    /// - [`KeywardError::ZeroRotationInterval`] if the configuration is
    ///   unusable; nothing is published
    pub async fn register(&self) -> Result<(), KeywardError> {
        self.register_with(None).await
    }

    /// Register the principal, publishing `key_pair` if given.
    pub async fn register_with(&self, key_pair: Option<KeyPair>) -> Result<(), KeywardError> {
        let _queue = self.lifecycle.lock().await;
        self.config.validate()?;

        if self.services.key_store.exists()? {
            return Err(KeywardError::PrivateKeyExists);
        }

        let records = self.services.directory.search(&self.identity).await?;
        if !records.is_empty() {
            return Err(KeywardError::UserAlreadyRegistered);
        }

        self.publish_then_save_local(key_pair, None).await?;

        tracing::info!(identity = %self.identity, "registered");
        self.notify(KeyChange::Registered);
        Ok(())
    }

    /// Replace a lost private key.
    ///
    /// Only valid when the directory has a record but no local key exists,
    /// e.g. after reinstalling. Publishes a record superseding the current one.
    ///
    /// # Errors
    ///
    /// - [`KeywardError::PrivateKeyExists`] if a local key is present
    /// - [`KeywardError::UserIsNotRegistered`] if the directory has no record
    pub async fn rotate_private_key(&self) -> Result<(), KeywardError> {
        let _queue = self.lifecycle.lock().await;
        self.config.validate()?;

        if self.services.key_store.exists()? {
            return Err(KeywardError::PrivateKeyExists);
        }

        let records = self.services.directory.search(&self.identity).await?;
        let Some(current) = records.into_iter().next() else {
            return Err(KeywardError::UserIsNotRegistered);
        };

        self.publish_then_save_local(None, Some(current.id)).await?;

        tracing::info!(identity = %self.identity, "private key rotated");
        self.notify(KeyChange::Rotated);
        Ok(())
    }

    /// Revoke the current record and delete the local key.
    ///
    /// No rollback: if revocation succeeds and local deletion fails, the
    /// error is returned and the principal is left revoked with a local key.
    ///
    /// # Errors
    ///
    /// [`KeywardError::UserIsNotRegistered`] if the directory has no record.
    pub async fn unregister(&self) -> Result<(), KeywardError> {
        let _queue = self.lifecycle.lock().await;

        let records = self.services.directory.search(&self.identity).await?;
        let Some(current) = records.into_iter().next() else {
            return Err(KeywardError::UserIsNotRegistered);
        };

        self.services.directory.revoke(&current.id).await?;
        self.services.key_store.delete()?;
        self.private_key_deleted()?;

        tracing::info!(identity = %self.identity, "unregistered");
        self.notify(KeyChange::Unregistered);
        Ok(())
    }

    /// Delete the local key and tear down identity state, leaving the remote
    /// record untouched. Logout without revocation.
    pub async fn clean_up(&self) -> Result<(), KeywardError> {
        let _queue = self.lifecycle.lock().await;

        self.services.key_store.delete()?;
        self.private_key_deleted()?;

        tracing::info!(identity = %self.identity, "local identity cleaned up");
        self.notify(KeyChange::CleanedUp);
        Ok(())
    }

    /// Rebuild identity state from the key already in local storage.
    ///
    /// With ratchet enabled and no cached self record, the directory is
    /// searched for the record matching the local key.
    ///
    /// # Errors
    ///
    /// - [`KeywardError::MissingPrivateKey`] if no local key exists
    /// - [`KeywardError::MissingSelfRecord`] if ratchet is enabled and no
    ///   record for the local key can be found
    pub async fn restore(&self) -> Result<(), KeywardError> {
        let _queue = self.lifecycle.lock().await;
        self.config.validate()?;

        if !self.services.key_store.exists()? {
            return Err(KeywardError::MissingPrivateKey);
        }

        let record = if self.config.enable_ratchet && self.find_cached_user(&self.identity)?.is_none()
        {
            self.fetch_self_record().await?
        } else {
            None
        };

        self.private_key_changed(record).await?;

        tracing::debug!(identity = %self.identity, "identity state restored");
        Ok(())
    }

    async fn fetch_self_record(&self) -> Result<Option<IdentityRecord>, KeywardError> {
        let public_key = self.services.key_store.retrieve_key_pair()?.public_key();
        let records = self.services.directory.search(&self.identity).await?;
        Ok(records.into_iter().find(|record| record.public_key == public_key))
    }

    async fn publish_then_save_local(
        &self,
        key_pair: Option<KeyPair>,
        previous_id: Option<RecordId>,
    ) -> Result<(), KeywardError> {
        let key_pair = key_pair.unwrap_or_else(|| self.services.crypto.generate_key_pair());

        let request = RecordRequest::signed(&key_pair, self.identity.clone(), previous_id);
        let record = self.services.directory.publish(request).await?;

        self.services.key_store.store(key_pair.private_bytes().as_slice())?;

        self.private_key_changed(Some(record)).await
    }

    /// Rebuild every piece of derived state for the key now in local storage.
    ///
    /// Replaces the group store and discards the previous engine and timer
    /// before a new engine is built. The unsafe channel manager survives.
    pub(crate) async fn private_key_changed(
        &self,
        record: Option<IdentityRecord>,
    ) -> Result<(), KeywardError> {
        if let Some(record) = &record {
            self.services.record_cache.store_record(record).map_err(KeywardError::RecordCache)?;
        }

        let key_pair = self.services.key_store.retrieve_key_pair()?;

        let group_store = self
            .services
            .group_stores
            .open(&self.identity, Arc::clone(&self.services.crypto), &key_pair)
            .map_err(KeywardError::GroupStore)?;

        {
            let mut active = self.write_active();
            active.generation += 1;
            active.scheduler = None;
            active.secure_chat = None;
            active.group_store = Some(group_store);
            if active.unsafe_manager.is_none() {
                active.unsafe_manager = Some(Arc::new(UnsafeChannelManager::new(
                    self.identity.clone(),
                    Arc::clone(&self.services.unsafe_keys),
                    Arc::clone(&self.services.crypto),
                )));
            }
        }

        if !self.config.enable_ratchet {
            return Ok(());
        }

        let self_record = match record {
            Some(record) => record,
            None => self.find_cached_user(&self.identity)?.ok_or(KeywardError::MissingSelfRecord)?,
        };

        self.setup_secure_chat(&key_pair, &self_record).await
    }

    /// Build the ratchet engine, rotate once, then start the rotation timer.
    ///
    /// The engine becomes visible only after the first rotation succeeded.
    async fn setup_secure_chat(
        &self,
        key_pair: &KeyPair,
        record: &IdentityRecord,
    ) -> Result<(), KeywardError> {
        let engine = self
            .services
            .ratchet_engines
            .create(record, key_pair, Arc::clone(&self.services.tokens))
            .await?;

        match engine.reset().await? {
            ResetOutcome::Cleared => {
                tracing::debug!(identity = %self.identity, "remote ratchet state reset");
            },
            ResetOutcome::NoKeysOnCloud => {
                tracing::debug!(identity = %self.identity, "no ratchet keys on cloud yet");
            },
        }

        tracing::debug!(identity = %self.identity, "key rotation started");
        let log = engine.rotate_keys().await?;
        tracing::debug!(identity = %self.identity, %log, "key rotation succeeded");

        let scheduler = RotationScheduler::start(
            Arc::clone(&engine),
            self.config.key_rotation_interval,
            self.identity.clone(),
        );

        let mut active = self.write_active();
        active.secure_chat = Some(engine);
        active.scheduler = Some(scheduler);
        Ok(())
    }

    /// Clear derived state, then reset the record cache and group store.
    ///
    /// References go first so that a failing reset still leaves no live
    /// engine or timer behind.
    pub(crate) fn private_key_deleted(&self) -> Result<(), KeywardError> {
        let group_store = {
            let mut active = self.write_active();
            active.generation += 1;
            active.scheduler = None;
            active.secure_chat = None;
            active.unsafe_manager = None;
            active.group_store.take()
        };

        self.services.record_cache.reset().map_err(KeywardError::RecordCache)?;
        if let Some(group_store) = group_store {
            group_store.reset().map_err(KeywardError::GroupStore)?;
        }

        Ok(())
    }
}
