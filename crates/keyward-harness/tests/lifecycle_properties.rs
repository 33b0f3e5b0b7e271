//! Property tests for the identity lifecycle.
//!
//! Random operation sequences run against one participant with faults
//! switched on and off between steps. After every step the standard
//! invariants must hold, whatever the individual operations returned.

use keyward_core::KeywardError;
use keyward_harness::{Fault, InvariantRegistry, Participant, SimCloud, SimEnv, SystemSnapshot};
use keyward_store::KeyStoreOp;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Register,
    RotatePrivateKey,
    Unregister,
    CleanUp,
    Restore,
    Inject(Fault),
    Heal(Fault),
    FailNext(KeyStoreOp),
}

fn fault() -> impl Strategy<Value = Fault> {
    prop_oneof![
        Just(Fault::Search),
        Just(Fault::Publish),
        Just(Fault::Revoke),
        Just(Fault::Relay),
        Just(Fault::Rotate),
        Just(Fault::Reset),
        Just(Fault::Token),
    ]
}

fn key_store_op() -> impl Strategy<Value = KeyStoreOp> {
    prop_oneof![
        Just(KeyStoreOp::Exists),
        Just(KeyStoreOp::Store),
        Just(KeyStoreOp::Retrieve),
        Just(KeyStoreOp::Delete),
    ]
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => Just(Op::Register),
        3 => Just(Op::RotatePrivateKey),
        2 => Just(Op::Unregister),
        2 => Just(Op::CleanUp),
        2 => Just(Op::Restore),
        2 => fault().prop_map(Op::Inject),
        3 => fault().prop_map(Op::Heal),
        1 => key_store_op().prop_map(Op::FailNext),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap()
}

/// Apply `op`, then check what a successful outcome promises.
async fn apply(cloud: &SimCloud, participant: &Participant, op: &Op) {
    let keyward = &participant.keyward;
    match op {
        Op::Register => {
            if keyward.register().await.is_ok() {
                assert_eq!(cloud.current_records(participant.identity()).len(), 1);
                assert!(participant.local_public_key().is_some());
                assert!(keyward.group_manager().is_ok());
            }
        },
        Op::RotatePrivateKey => {
            if keyward.rotate_private_key().await.is_ok() {
                let record = participant.record();
                assert!(record.previous_id.is_some());
                assert_eq!(participant.local_public_key(), Some(record.public_key));
            }
        },
        Op::Unregister => {
            if keyward.unregister().await.is_ok() {
                assert!(cloud.current_records(participant.identity()).is_empty());
                assert!(participant.local_public_key().is_none());
            }
        },
        Op::CleanUp => {
            if keyward.clean_up().await.is_ok() {
                assert!(participant.local_public_key().is_none());
                assert!(keyward.group_manager().is_err());
            }
        },
        Op::Restore => {
            if keyward.restore().await.is_ok() {
                assert!(keyward.group_manager().is_ok());
                assert_eq!(keyward.has_secure_chat(), keyward.config().enable_ratchet);
            }
        },
        Op::Inject(fault) => cloud.inject(*fault),
        Op::Heal(fault) => cloud.heal(*fault),
        Op::FailNext(store_op) => {
            if let Some(chaos) = &participant.chaos {
                chaos.fail_next(*store_op);
            }
        },
    }
}

#[test]
fn prop_invariants_hold_under_random_operations() {
    proptest!(|(
        seed in any::<u64>(),
        ratchet in any::<bool>(),
        ops in prop::collection::vec(op(), 1..40),
    )| {
        runtime().block_on(async {
            let cloud = SimCloud::new();
            let env = SimEnv::with_seed(seed);
            let mut builder = Participant::builder(&cloud, &env, "alice");
            if ratchet {
                builder = builder.ratchet();
            }
            let alice = builder.build();
            let invariants = InvariantRegistry::standard();

            for (step, op) in ops.iter().enumerate() {
                apply(&cloud, &alice, op).await;
                let snapshot = SystemSnapshot::capture(&cloud, &[&alice]);
                invariants.assert_all(&snapshot, &format!("step {step}: {op:?}"));
            }
        });
    });
}

#[test]
fn prop_invariants_hold_with_flaky_key_store() {
    proptest!(|(
        seed in any::<u64>(),
        failure_rate in 0.0..0.5,
        ops in prop::collection::vec(op(), 1..40),
    )| {
        runtime().block_on(async {
            let cloud = SimCloud::new();
            let env = SimEnv::with_seed(seed);
            let alice = Participant::builder(&cloud, &env, "alice")
                .ratchet()
                .chaos(failure_rate, seed)
                .build();
            let invariants = InvariantRegistry::standard();

            for (step, op) in ops.iter().enumerate() {
                apply(&cloud, &alice, op).await;
                let snapshot = SystemSnapshot::capture(&cloud, &[&alice]);
                invariants.assert_all(&snapshot, &format!("step {step}: {op:?}"));
            }
        });
    });
}

#[test]
fn prop_failed_register_publishes_nothing_twice() {
    proptest!(|(seed in any::<u64>(), attempts in 2usize..6)| {
        runtime().block_on(async {
            let cloud = SimCloud::new();
            let env = SimEnv::with_seed(seed);
            let alice = Participant::builder(&cloud, &env, "alice").build();
            alice.keyward.register().await.unwrap();

            for _ in 0..attempts {
                assert_eq!(alice.keyward.register().await, Err(KeywardError::PrivateKeyExists));
            }
            assert_eq!(cloud.record_history(alice.identity()).len(), 1);
        });
    });
}

#[test]
fn prop_same_seed_same_identity_key() {
    proptest!(|(seed in any::<u64>())| {
        let public_key = |seed: u64| {
            runtime().block_on(async {
                let cloud = SimCloud::new();
                let env = SimEnv::with_seed(seed);
                let alice = Participant::builder(&cloud, &env, "alice").build();
                alice.keyward.register().await.unwrap();
                alice.record().public_key
            })
        };

        prop_assert_eq!(public_key(seed), public_key(seed));
    });
}

#[test]
fn prop_self_chat_is_always_rejected() {
    proptest!(|(seed in any::<u64>(), rebuilds in 0usize..3, relay_down in any::<bool>())| {
        runtime().block_on(async {
            let cloud = SimCloud::new();
            let env = SimEnv::with_seed(seed);
            let alice = Participant::builder(&cloud, &env, "alice").ratchet().build();
            alice.keyward.register().await.unwrap();
            for _ in 0..rebuilds {
                alice.keyward.clean_up().await.unwrap();
                alice.keyward.rotate_private_key().await.unwrap();
            }
            if relay_down {
                cloud.inject(Fault::Relay);
            }

            let record = alice.record();
            assert_eq!(
                alice.keyward.create_ratchet_chat(&record).await.unwrap_err(),
                KeywardError::SelfChatForbidden
            );
            assert!(!cloud.has_ticket(alice.identity(), alice.identity()));
            assert!(alice.keyward.get_ratchet_chat(&record).unwrap().is_none());
        });
    });
}
