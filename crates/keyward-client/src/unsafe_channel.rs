//! Unauthenticated channels with correspondents who have no identity record.
//!
//! The creator generates a temporary key and parks its private half in the
//! cloud, unencrypted, under the `(creator, participant)` slot. Both sides
//! derive the same channel key from it. Anyone who can read that slot can
//! read the channel, hence "unsafe".

#![allow(clippy::disallowed_types, reason = "Synchronous channel map access only")]

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex},
};

use keyward_core::{ChannelRole, CryptoEngine, Identity, KeywardError, UnsafeKeyCloud};
use keyward_crypto::{NONCE_SIZE, derive_key, open, seal};
use zeroize::Zeroizing;

use crate::Keyward;

const CHANNEL_LABEL: &[u8] = b"keyward unsafe channel";

/// Symmetric channel with one unregistered correspondent.
#[derive(Clone)]
pub struct UnsafeChannel {
    participant: Identity,
    role: ChannelRole,
    key: Arc<Zeroizing<[u8; 32]>>,
    crypto: Arc<dyn CryptoEngine>,
}

impl UnsafeChannel {
    fn derive(
        principal: &Identity,
        participant: Identity,
        role: ChannelRole,
        temporary_key: &[u8],
        crypto: Arc<dyn CryptoEngine>,
    ) -> Self {
        let (creator, joiner) = role.slot(principal, &participant);

        let mut info = CHANNEL_LABEL.to_vec();
        for name in [creator, joiner] {
            info.extend_from_slice(&(name.as_bytes().len() as u32).to_be_bytes());
            info.extend_from_slice(name.as_bytes());
        }
        let key = Zeroizing::new(derive_key(temporary_key, &info));

        Self { participant, role, key: Arc::new(key), crypto }
    }

    /// Correspondent on the other end.
    pub fn participant(&self) -> &Identity {
        &self.participant
    }

    /// Which side of the channel this handle is.
    pub fn role(&self) -> ChannelRole {
        self.role
    }

    /// Encrypt for the correspondent.
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let mut nonce = [0u8; NONCE_SIZE];
        self.crypto.random_bytes(&mut nonce);
        seal(&self.key, plaintext, nonce)
    }

    /// Decrypt a message from the correspondent.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, KeywardError> {
        Ok(open(&self.key, ciphertext)?)
    }
}

impl fmt::Debug for UnsafeChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnsafeChannel")
            .field("participant", &self.participant)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

/// Local unsafe channels plus their cloud key material.
pub(crate) struct UnsafeChannelManager {
    principal: Identity,
    cloud: Arc<dyn UnsafeKeyCloud>,
    crypto: Arc<dyn CryptoEngine>,
    channels: Mutex<HashMap<Identity, UnsafeChannel>>,
}

impl UnsafeChannelManager {
    pub(crate) fn new(
        principal: Identity,
        cloud: Arc<dyn UnsafeKeyCloud>,
        crypto: Arc<dyn CryptoEngine>,
    ) -> Self {
        Self { principal, cloud, crypto, channels: Mutex::new(HashMap::new()) }
    }

    async fn create(&self, participant: &Identity) -> Result<UnsafeChannel, KeywardError> {
        let temporary = self.crypto.generate_key_pair();
        let secret = temporary.private_bytes();

        self.cloud
            .store(&self.principal, participant, ChannelRole::Creator, secret.as_slice())
            .await?;

        Ok(UnsafeChannel::derive(
            &self.principal,
            participant.clone(),
            ChannelRole::Creator,
            secret.as_slice(),
            Arc::clone(&self.crypto),
        ))
    }

    async fn load_from_cloud(
        &self,
        role: ChannelRole,
        participant: &Identity,
    ) -> Result<UnsafeChannel, KeywardError> {
        let secret = self
            .cloud
            .load(&self.principal, participant, role)
            .await?
            .map(Zeroizing::new)
            .ok_or(KeywardError::MissingUnsafeKey)?;

        Ok(UnsafeChannel::derive(
            &self.principal,
            participant.clone(),
            role,
            &secret,
            Arc::clone(&self.crypto),
        ))
    }

    async fn delete_from_cloud(&self, participant: &Identity) -> Result<(), KeywardError> {
        Ok(self.cloud.delete(&self.principal, participant, ChannelRole::Creator).await?)
    }

    #[allow(clippy::expect_used)]
    fn insert(&self, channel: UnsafeChannel) {
        self.channels.lock().expect("Mutex poisoned").insert(channel.participant.clone(), channel);
    }

    #[allow(clippy::expect_used)]
    fn local(&self, participant: &Identity) -> Option<UnsafeChannel> {
        self.channels.lock().expect("Mutex poisoned").get(participant).cloned()
    }

    #[allow(clippy::expect_used)]
    fn remove(&self, participant: &Identity) {
        self.channels.lock().expect("Mutex poisoned").remove(participant);
    }
}

impl Keyward {
    /// Create a channel with a correspondent who has no identity record.
    ///
    /// The temporary key is stored unencrypted in the cloud.
    ///
    /// # Errors
    ///
    /// - [`KeywardError::SelfChannelForbidden`] for the principal itself
    /// - [`KeywardError::MissingPrivateKey`] without loaded identity state
    /// - [`KeywardError::UserIsRegistered`] if `participant` has a record
    pub async fn create_unsafe_channel(
        &self,
        participant: &Identity,
    ) -> Result<UnsafeChannel, KeywardError> {
        if *participant == self.identity {
            return Err(KeywardError::SelfChannelForbidden);
        }
        let manager = self.unsafe_manager()?;

        let found = self.find_users(std::slice::from_ref(participant), false).await?;
        if !found.is_empty() {
            return Err(KeywardError::UserIsRegistered);
        }

        let channel = manager.create(participant).await?;

        self.ensure_unsafe_manager(&manager)?;
        manager.insert(channel.clone());

        tracing::debug!(identity = %self.identity, participant = %participant, "unsafe channel created");
        Ok(channel)
    }

    /// Load a channel from the temporary key in the cloud.
    ///
    /// `as_creator` selects the slot: `true` reloads a channel this principal
    /// created, `false` joins one `participant` created.
    ///
    /// # Errors
    ///
    /// [`KeywardError::MissingUnsafeKey`] if the cloud holds no key for the
    /// slot.
    pub async fn load_unsafe_channel(
        &self,
        as_creator: bool,
        participant: &Identity,
    ) -> Result<UnsafeChannel, KeywardError> {
        let manager = self.unsafe_manager()?;
        if *participant == self.identity {
            return Err(KeywardError::SelfChannelForbidden);
        }

        let role = if as_creator { ChannelRole::Creator } else { ChannelRole::Participant };
        let channel = manager.load_from_cloud(role, participant).await?;

        self.ensure_unsafe_manager(&manager)?;
        manager.insert(channel.clone());
        Ok(channel)
    }

    /// Locally known channel with `participant`. No network call.
    pub fn get_unsafe_channel(
        &self,
        participant: &Identity,
    ) -> Result<Option<UnsafeChannel>, KeywardError> {
        Ok(self.unsafe_manager()?.local(participant))
    }

    /// Delete the channel with `participant`.
    ///
    /// Cloud key material is removed only when this principal created the
    /// channel.
    ///
    /// # Errors
    ///
    /// [`KeywardError::MissingChannel`] if no local channel exists.
    pub async fn delete_unsafe_channel(&self, participant: &Identity) -> Result<(), KeywardError> {
        let manager = self.unsafe_manager()?;
        let channel = manager.local(participant).ok_or(KeywardError::MissingChannel)?;

        if channel.role == ChannelRole::Creator {
            manager.delete_from_cloud(participant).await?;
        }

        manager.remove(participant);
        tracing::debug!(identity = %self.identity, participant = %participant, "unsafe channel deleted");
        Ok(())
    }
}
