//! Orchestrator configuration.

use std::time::Duration;

pub use keyward_core::{DEFAULT_KEY_CACHE_LIFETIME, StorageParams};
use keyward_core::{Identity, KeywardError};
use serde::{Deserialize, Serialize};

/// Default interval between scheduled ratchet key rotations.
pub const DEFAULT_KEY_ROTATION_INTERVAL: Duration = Duration::from_secs(1800);

/// Configuration for a [`Keyward`](crate::Keyward) instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywardConfig {
    /// Principal managed by this instance. Immutable once constructed.
    pub identity: Identity,
    /// Interval between scheduled ratchet key rotations
    pub key_rotation_interval: Duration,
    /// Build a ratchet session engine whenever identity material changes
    pub enable_ratchet: bool,
    /// Local storage location
    pub storage: StorageParams,
    /// Lifetime of a cached decrypted key
    pub key_cache_lifetime: Duration,
}

impl KeywardConfig {
    /// Configuration for `identity` with every other field at its default.
    pub fn new(identity: impl Into<Identity>) -> Self {
        Self {
            identity: identity.into(),
            key_rotation_interval: DEFAULT_KEY_ROTATION_INTERVAL,
            enable_ratchet: false,
            storage: StorageParams::default(),
            key_cache_lifetime: DEFAULT_KEY_CACHE_LIFETIME,
        }
    }

    /// Check the settings lifecycle operations depend on.
    ///
    /// # Errors
    ///
    /// [`KeywardError::ZeroRotationInterval`] if ratchet support is enabled
    /// with a zero rotation interval.
    pub fn validate(&self) -> Result<(), KeywardError> {
        if self.enable_ratchet && self.key_rotation_interval.is_zero() {
            return Err(KeywardError::ZeroRotationInterval);
        }
        Ok(())
    }

    /// Set the ratchet key rotation interval.
    #[must_use]
    pub fn with_key_rotation_interval(mut self, interval: Duration) -> Self {
        self.key_rotation_interval = interval;
        self
    }

    /// Enable or disable ratchet support.
    #[must_use]
    pub fn with_ratchet(mut self, enabled: bool) -> Self {
        self.enable_ratchet = enabled;
        self
    }

    /// Set the storage location.
    #[must_use]
    pub fn with_storage(mut self, storage: StorageParams) -> Self {
        self.storage = storage;
        self
    }

    /// Set the key cache lifetime.
    #[must_use]
    pub fn with_key_cache_lifetime(mut self, lifetime: Duration) -> Self {
        self.key_cache_lifetime = lifetime;
        self
    }
}
