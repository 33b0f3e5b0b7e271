//! Chaos property tests for key store implementations.
//!
//! A chaotic wrapper must fail cleanly: an operation either takes full effect
//! on the underlying store or leaves it untouched.

use std::time::Instant;

use keyward_core::{Environment, KeyPair, LocalKeyStore, StoreError};
use keyward_store::{CachingKeyStore, ChaoticKeyStore, MemoryKeyStore, RedbStore};
use proptest::prelude::*;

#[derive(Clone)]
struct TestEnv;

impl Environment for TestEnv {
    type Instant = Instant;

    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        for (i, byte) in buffer.iter_mut().enumerate() {
            *byte = (i as u8).wrapping_mul(31);
        }
    }
}

#[derive(Debug, Clone)]
enum Op {
    Store(u8),
    Retrieve,
    Delete,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![any::<u8>().prop_map(Op::Store), Just(Op::Retrieve), Just(Op::Delete)]
}

/// Public key held by `store`, if any.
fn held_key(store: &impl LocalKeyStore) -> Option<[u8; 32]> {
    store.retrieve_key_pair().ok().map(|key_pair| *key_pair.public_key().as_bytes())
}

fn public_key(seed: u8) -> [u8; 32] {
    *KeyPair::from_seed(&[seed; 32]).public_key().as_bytes()
}

#[test]
fn prop_chaotic_operations_are_all_or_nothing() {
    proptest!(|(
        failure_rate in 0.0..0.8,
        seed in any::<u64>(),
        ops in prop::collection::vec(op(), 1..60),
    )| {
        let inner = MemoryKeyStore::new();
        let store = ChaoticKeyStore::with_seed(inner.clone(), failure_rate, seed);
        let mut model: Option<[u8; 32]> = None;

        for op in &ops {
            match op {
                Op::Store(key_seed) => match store.store(&[*key_seed; 32]) {
                    Ok(()) => {
                        prop_assert!(model.is_none());
                        model = Some(public_key(*key_seed));
                    },
                    Err(StoreError::AlreadyExists) => prop_assert!(model.is_some()),
                    Err(StoreError::Io(_)) => {},
                    Err(e) => panic!("unexpected error: {e:?}"),
                },
                Op::Retrieve => match store.retrieve_key_pair() {
                    Ok(key_pair) => {
                        prop_assert_eq!(Some(*key_pair.public_key().as_bytes()), model);
                    },
                    Err(StoreError::NotFound) => prop_assert!(model.is_none()),
                    Err(StoreError::Io(_)) => {},
                    Err(e) => panic!("unexpected error: {e:?}"),
                },
                Op::Delete => {
                    if store.delete().is_ok() {
                        model = None;
                    }
                },
            }

            prop_assert_eq!(held_key(&inner), model);
        }
    });
}

#[test]
fn prop_caching_store_never_serves_a_deleted_key() {
    proptest!(|(ops in prop::collection::vec(op(), 1..40))| {
        let inner = MemoryKeyStore::new();
        let store = CachingKeyStore::new(inner.clone(), TestEnv);

        for op in &ops {
            match op {
                Op::Store(key_seed) => {
                    let _ = store.store(&[*key_seed; 32]);
                },
                Op::Retrieve => {
                    let _ = store.retrieve_key_pair();
                },
                Op::Delete => store.delete().unwrap(),
            }

            prop_assert_eq!(held_key(&store), held_key(&inner));
        }
    });
}

#[test]
fn prop_redb_key_survives_reopen() {
    proptest!(ProptestConfig::with_cases(16), |(
        key_seed in any::<u8>(),
        secret in prop::collection::vec(any::<u8>(), 1..64),
    )| {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keyward.redb");

        {
            let store = RedbStore::open(&path, "alice-key", &secret, TestEnv).unwrap();
            store.store(&[key_seed; 32]).unwrap();
        }

        {
            let reopened = RedbStore::open(&path, "alice-key", &secret, TestEnv).unwrap();
            prop_assert_eq!(held_key(&reopened), Some(public_key(key_seed)));
        }

        let other_slot = RedbStore::open(&path, "bob-key", &secret, TestEnv).unwrap();
        prop_assert!(!other_slot.exists().unwrap());
    });
}
