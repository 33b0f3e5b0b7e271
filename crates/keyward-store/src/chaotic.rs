//! Chaotic key store wrapper for fault injection testing
//!
//! Key store wrapper that fails operations either randomly or on demand, to
//! verify that lifecycle operations surface partial failures instead of
//! silently repairing them.

#![allow(clippy::disallowed_types, reason = "Locking simple RNG state")]

use std::sync::{Arc, Mutex};

use keyward_core::{KeyPair, LocalKeyStore, StoreError};

/// Key store operation that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyStoreOp {
    /// [`LocalKeyStore::exists`]
    Exists,
    /// [`LocalKeyStore::store`]
    Store,
    /// [`LocalKeyStore::retrieve_key_pair`]
    Retrieve,
    /// [`LocalKeyStore::delete`]
    Delete,
}

/// Chaotic key store wrapper that injects failures
///
/// Delegates to an underlying store but fails operations with a configured
/// probability, or exactly once for operations armed with
/// [`fail_next`](Self::fail_next). Clone shares RNG and armed faults.
#[derive(Clone)]
pub struct ChaoticKeyStore<S: LocalKeyStore> {
    inner: S,
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    state: Arc<Mutex<ChaosState>>,
}

struct ChaosState {
    rng: ChaoticRng,
    armed: Vec<KeyStoreOp>,
    injected: usize,
}

/// Simple deterministic RNG for chaos injection
///
/// Linear congruential generator, so chaos runs are reproducible per seed.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Generate next random value [0.0, 1.0)
    fn next(&mut self) -> f64 {
        // LCG constants from Numerical Recipes
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }
}

impl<S: LocalKeyStore> ChaoticKeyStore<S> {
    /// Wrap `inner` with no random failures; use
    /// [`fail_next`](Self::fail_next) to arm specific faults.
    pub fn new(inner: S) -> Self {
        Self::with_seed(inner, 0.0, 0x1234_5678_9ABC_DEF0)
    }

    /// Wrap `inner` with a random failure rate and explicit seed.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self {
            inner,
            failure_rate,
            state: Arc::new(Mutex::new(ChaosState {
                rng: ChaoticRng::new(seed),
                armed: Vec::new(),
                injected: 0,
            })),
        }
    }

    /// Make the next call of `op` fail.
    #[allow(clippy::expect_used)]
    pub fn fail_next(&self, op: KeyStoreOp) {
        self.state.lock().expect("ChaosState mutex poisoned").armed.push(op);
    }

    /// Number of failures injected so far.
    #[allow(clippy::expect_used)]
    pub fn injected_failures(&self) -> usize {
        self.state.lock().expect("ChaosState mutex poisoned").injected
    }

    /// Underlying store (for checking state after chaos).
    pub fn inner(&self) -> &S {
        &self.inner
    }

    #[allow(clippy::expect_used)]
    fn check(&self, op: KeyStoreOp) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("ChaosState mutex poisoned");

        let armed = state.armed.iter().position(|armed| *armed == op);
        let fail = match armed {
            Some(index) => {
                state.armed.remove(index);
                true
            },
            None => state.rng.next() < self.failure_rate,
        };

        if fail {
            state.injected += 1;
            return Err(StoreError::Io(format!("injected {op:?} failure")));
        }
        Ok(())
    }
}

impl<S: LocalKeyStore> LocalKeyStore for ChaoticKeyStore<S> {
    fn exists(&self) -> Result<bool, StoreError> {
        self.check(KeyStoreOp::Exists)?;
        self.inner.exists()
    }

    fn store(&self, private_key: &[u8]) -> Result<(), StoreError> {
        self.check(KeyStoreOp::Store)?;
        self.inner.store(private_key)
    }

    fn retrieve_key_pair(&self) -> Result<KeyPair, StoreError> {
        self.check(KeyStoreOp::Retrieve)?;
        self.inner.retrieve_key_pair()
    }

    fn delete(&self) -> Result<(), StoreError> {
        self.check(KeyStoreOp::Delete)?;
        self.inner.delete()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryKeyStore;

    #[test]
    fn armed_fault_fires_once() {
        let store = ChaoticKeyStore::new(MemoryKeyStore::new());
        store.fail_next(KeyStoreOp::Store);

        assert!(matches!(store.store(&[1; 32]), Err(StoreError::Io(_))));
        assert!(!store.inner().exists().unwrap(), "failed store must not write");

        store.store(&[1; 32]).unwrap();
        assert_eq!(store.injected_failures(), 1);
    }

    #[test]
    fn armed_fault_only_affects_its_operation() {
        let store = ChaoticKeyStore::new(MemoryKeyStore::new());
        store.fail_next(KeyStoreOp::Delete);

        store.store(&[1; 32]).unwrap();
        assert!(store.exists().unwrap());
        assert!(store.delete().is_err());
        assert!(store.inner().exists().unwrap());
    }

    #[test]
    fn full_failure_rate_always_fails() {
        let store = ChaoticKeyStore::with_seed(MemoryKeyStore::new(), 1.0, 42);
        for _ in 0..10 {
            assert!(store.exists().is_err());
        }
    }

    #[test]
    fn same_seed_same_failures() {
        let a = ChaoticKeyStore::with_seed(MemoryKeyStore::new(), 0.5, 7);
        let b = ChaoticKeyStore::with_seed(MemoryKeyStore::new(), 0.5, 7);

        for _ in 0..50 {
            assert_eq!(a.exists().is_err(), b.exists().is_err());
        }
    }
}
