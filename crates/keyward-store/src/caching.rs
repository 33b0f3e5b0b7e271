//! Key store that caches the decrypted key for a bounded lifetime.
//!
//! Unlocking a key can be expensive or interactive (hardware-backed stores,
//! user prompts). Within the cache lifetime, repeated retrievals are served
//! from memory.

#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use keyward_core::{
    DEFAULT_KEY_CACHE_LIFETIME, Environment, KeyCache, KeyPair, LocalKeyStore, StoreError,
};

/// Caching wrapper around another [`LocalKeyStore`].
///
/// # Invariants
///
/// - The cached key always equals the inner store's key; `store` and
///   `delete` hold the cache lock across the inner call, so no retrieval can
///   refill the cache with a key that is being replaced
/// - An expired entry is never served
pub struct CachingKeyStore<S: LocalKeyStore, E: Environment> {
    inner: S,
    env: E,
    lifetime: Duration,
    cached: Mutex<Option<(KeyPair, E::Instant)>>,
}

impl<S: LocalKeyStore, E: Environment> CachingKeyStore<S, E> {
    /// Wrap `inner` with the default cache lifetime.
    pub fn new(inner: S, env: E) -> Self {
        Self::with_lifetime(inner, env, DEFAULT_KEY_CACHE_LIFETIME)
    }

    /// Wrap `inner` with an explicit cache lifetime.
    pub fn with_lifetime(inner: S, env: E, lifetime: Duration) -> Self {
        Self { inner, env, lifetime, cached: Mutex::new(None) }
    }

    /// Underlying store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Whether a live (unexpired) key is cached.
    pub fn is_cached(&self) -> bool {
        let cached = self.lock_cache();
        cached.as_ref().is_some_and(|(_, at)| self.env.now() - *at < self.lifetime)
    }

    #[allow(clippy::expect_used)]
    fn lock_cache(&self) -> MutexGuard<'_, Option<(KeyPair, E::Instant)>> {
        self.cached.lock().expect("key cache mutex poisoned")
    }
}

impl<S: LocalKeyStore, E: Environment> LocalKeyStore for CachingKeyStore<S, E> {
    fn exists(&self) -> Result<bool, StoreError> {
        self.inner.exists()
    }

    fn store(&self, private_key: &[u8]) -> Result<(), StoreError> {
        let mut cached = self.lock_cache();
        cached.take();
        self.inner.store(private_key)
    }

    fn retrieve_key_pair(&self) -> Result<KeyPair, StoreError> {
        let mut cached = self.lock_cache();
        let now = self.env.now();

        if let Some((key_pair, at)) = cached.as_ref()
            && now - *at < self.lifetime
        {
            return Ok(key_pair.clone());
        }

        let key_pair = self.inner.retrieve_key_pair()?;
        *cached = Some((key_pair.clone(), now));
        Ok(key_pair)
    }

    fn delete(&self) -> Result<(), StoreError> {
        let mut cached = self.lock_cache();
        cached.take();
        self.inner.delete()
    }

    fn key_cache(&self) -> Option<&dyn KeyCache> {
        Some(self)
    }
}

impl<S: LocalKeyStore, E: Environment> KeyCache for CachingKeyStore<S, E> {
    fn clean_cache(&self) {
        self.lock_cache().take();
    }

    fn load_cache(&self) -> Result<(), StoreError> {
        self.retrieve_key_pair().map(|_| ())
    }
}
