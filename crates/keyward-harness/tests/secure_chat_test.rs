//! Ratchet engine bootstrap and the periodic rotation timer.
//!
//! Timer tests run on a paused clock and advance it explicitly.

use std::time::Duration;

use keyward_core::{KeywardError, RatchetError, RecordCache, TokenError};
use keyward_harness::{Fault, InvariantRegistry, Participant, SimCloud, SimEnv, SystemSnapshot};
use keyward_store::KeyStoreOp;

const INTERVAL: Duration = Duration::from_secs(60);

fn ratchet_participant(cloud: &SimCloud, env: &SimEnv, name: &str) -> Participant {
    Participant::builder(cloud, env, name).ratchet().rotation_interval(INTERVAL).build()
}

/// Let spawned timer tasks run.
async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

async fn advance(duration: Duration) {
    tokio::time::advance(duration).await;
    settle().await;
}

/// Route scheduler logs to the test output. Later calls are no-ops.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn check(cloud: &SimCloud, participants: &[&Participant], context: &str) {
    InvariantRegistry::standard().assert_all(&SystemSnapshot::capture(cloud, participants), context);
}

#[tokio::test(start_paused = true)]
async fn register_bootstraps_engine_and_timer() {
    let cloud = SimCloud::new();
    let env = SimEnv::with_seed(1);
    let alice = ratchet_participant(&cloud, &env, "alice");

    alice.keyward.register().await.unwrap();

    assert!(alice.keyward.has_secure_chat());
    assert!(alice.keyward.is_rotation_scheduled());
    assert_eq!(cloud.ratchet_rotations(alice.identity()), Some(1));
    assert_eq!(alice.ratchet_engines.created(), 1);
    check(&cloud, &[&alice], "after ratchet register");
}

#[tokio::test(start_paused = true)]
async fn ratchet_disabled_builds_no_engine() {
    let cloud = SimCloud::new();
    let env = SimEnv::with_seed(2);
    let alice = Participant::builder(&cloud, &env, "alice").build();

    alice.keyward.register().await.unwrap();
    advance(Duration::from_secs(3_600)).await;

    assert!(!alice.keyward.has_secure_chat());
    assert!(!alice.keyward.is_rotation_scheduled());
    assert_eq!(alice.ratchet_engines.created(), 0);
    assert_eq!(cloud.ratchet_rotations(alice.identity()), None);
}

#[tokio::test(start_paused = true)]
async fn timer_rotates_once_per_interval() {
    let cloud = SimCloud::new();
    let env = SimEnv::with_seed(3);
    let alice = ratchet_participant(&cloud, &env, "alice");
    alice.keyward.register().await.unwrap();

    advance(INTERVAL / 2).await;
    assert_eq!(cloud.ratchet_rotations(alice.identity()), Some(1));

    advance(INTERVAL / 2).await;
    assert_eq!(cloud.ratchet_rotations(alice.identity()), Some(2));

    advance(INTERVAL).await;
    advance(INTERVAL).await;
    assert_eq!(cloud.ratchet_rotations(alice.identity()), Some(4));
}

#[tokio::test(start_paused = true)]
async fn failed_periodic_rotation_keeps_timer_alive() {
    init_tracing();
    let cloud = SimCloud::new();
    let env = SimEnv::with_seed(4);
    let alice = ratchet_participant(&cloud, &env, "alice");
    alice.keyward.register().await.unwrap();

    cloud.inject(Fault::Rotate);
    advance(INTERVAL).await;
    advance(INTERVAL).await;

    assert_eq!(cloud.ratchet_rotations(alice.identity()), Some(1));
    assert!(alice.keyward.is_rotation_scheduled());
    assert!(alice.keyward.has_secure_chat());

    cloud.heal(Fault::Rotate);
    advance(INTERVAL).await;
    assert_eq!(cloud.ratchet_rotations(alice.identity()), Some(2));
}

#[tokio::test(start_paused = true)]
async fn failed_initial_rotation_installs_nothing() {
    init_tracing();
    let cloud = SimCloud::new();
    let env = SimEnv::with_seed(5);
    let alice = ratchet_participant(&cloud, &env, "alice");
    cloud.inject(Fault::Rotate);

    let result = alice.keyward.register().await;

    assert!(matches!(result, Err(KeywardError::Ratchet(RatchetError::Network(_)))));
    // Identity material is committed before the engine is built.
    assert!(alice.keyward.has_local_private_key().unwrap());
    assert!(alice.keyward.group_manager().is_ok());
    assert!(!alice.keyward.has_secure_chat());
    assert!(!alice.keyward.is_rotation_scheduled());
    check(&cloud, &[&alice], "after failed bootstrap");

    cloud.heal(Fault::Rotate);
    alice.keyward.restore().await.unwrap();
    assert!(alice.keyward.has_secure_chat());
    assert!(alice.keyward.is_rotation_scheduled());
}

#[tokio::test(start_paused = true)]
async fn token_failure_surfaces_as_ratchet_error() {
    let cloud = SimCloud::new();
    let env = SimEnv::with_seed(6);
    let alice = ratchet_participant(&cloud, &env, "alice");
    cloud.inject(Fault::Token);

    let result = alice.keyward.register().await;

    assert!(matches!(result, Err(KeywardError::Ratchet(RatchetError::Token(TokenError(_))))));
    assert!(!alice.keyward.has_secure_chat());
}

#[tokio::test(start_paused = true)]
async fn failed_remote_reset_installs_nothing() {
    let cloud = SimCloud::new();
    let env = SimEnv::with_seed(7);
    let alice = ratchet_participant(&cloud, &env, "alice");
    cloud.inject(Fault::Reset);

    assert!(alice.keyward.register().await.is_err());
    assert!(!alice.keyward.has_secure_chat());
    assert_eq!(cloud.ratchet_rotations(alice.identity()), None);
}

#[tokio::test(start_paused = true)]
async fn restore_replaces_engine_and_timer() {
    let cloud = SimCloud::new();
    let env = SimEnv::with_seed(8);
    let alice = ratchet_participant(&cloud, &env, "alice");
    alice.keyward.register().await.unwrap();

    alice.keyward.restore().await.unwrap();
    settle().await;

    assert_eq!(alice.ratchet_engines.created(), 2);
    assert_eq!(alice.ratchet_engines.live(), 1);
    // Remote state was reset and keys republished.
    assert_eq!(cloud.ratchet_rotations(alice.identity()), Some(1));

    // Only the new timer fires.
    advance(INTERVAL).await;
    assert_eq!(cloud.ratchet_rotations(alice.identity()), Some(2));
    check(&cloud, &[&alice], "after restore");
}

#[tokio::test(start_paused = true)]
async fn teardown_stops_timer_and_releases_engine() {
    let cloud = SimCloud::new();
    let env = SimEnv::with_seed(9);
    let alice = ratchet_participant(&cloud, &env, "alice");
    alice.keyward.register().await.unwrap();

    alice.keyward.unregister().await.unwrap();
    settle().await;

    assert!(!alice.keyward.has_secure_chat());
    assert!(!alice.keyward.is_rotation_scheduled());
    assert_eq!(alice.ratchet_engines.live(), 0);

    advance(INTERVAL * 3).await;
    assert_eq!(cloud.ratchet_rotations(alice.identity()), Some(1));
}

#[tokio::test(start_paused = true)]
async fn clean_up_stops_timer() {
    let cloud = SimCloud::new();
    let env = SimEnv::with_seed(10);
    let alice = ratchet_participant(&cloud, &env, "alice");
    alice.keyward.register().await.unwrap();

    alice.keyward.clean_up().await.unwrap();
    settle().await;

    assert_eq!(alice.ratchet_engines.live(), 0);
    advance(INTERVAL * 2).await;
    assert_eq!(cloud.ratchet_rotations(alice.identity()), Some(1));
    check(&cloud, &[&alice], "after clean up");
}

#[tokio::test(start_paused = true)]
async fn group_reset_failure_still_tears_down_engine() {
    let cloud = SimCloud::new();
    let env = SimEnv::with_seed(11);
    let alice = ratchet_participant(&cloud, &env, "alice");
    alice.keyward.register().await.unwrap();
    alice.group_stores.fail_resets(true);

    assert!(matches!(alice.keyward.clean_up().await, Err(KeywardError::GroupStore(_))));
    settle().await;

    assert!(!alice.keyward.has_secure_chat());
    assert!(!alice.keyward.is_rotation_scheduled());
    assert!(alice.keyward.group_manager().is_err());
    assert_eq!(alice.ratchet_engines.live(), 0);
}

#[tokio::test(start_paused = true)]
async fn dropping_orchestrator_stops_timer() {
    let cloud = SimCloud::new();
    let env = SimEnv::with_seed(12);
    let alice = ratchet_participant(&cloud, &env, "alice");
    alice.keyward.register().await.unwrap();
    let engines = alice.ratchet_engines.clone();
    let identity = alice.identity().clone();

    drop(alice);
    settle().await;

    assert_eq!(engines.live(), 0);
    advance(INTERVAL * 2).await;
    assert_eq!(cloud.ratchet_rotations(&identity), Some(1));
}

#[tokio::test(start_paused = true)]
async fn restore_fetches_self_record_from_directory() {
    let cloud = SimCloud::new();
    let env = SimEnv::with_seed(13);
    let alice = ratchet_participant(&cloud, &env, "alice");
    alice.keyward.register().await.unwrap();

    alice.record_cache.reset().unwrap();
    let restarted = alice.reopen().await.unwrap();

    assert!(restarted.has_secure_chat());
    assert_eq!(restarted.find_cached_user(alice.identity()).unwrap(), Some(alice.record()));
}

#[tokio::test(start_paused = true)]
async fn restore_without_matching_record_fails() {
    let cloud = SimCloud::new();
    let env = SimEnv::with_seed(14);
    let alice = ratchet_participant(&cloud, &env, "alice");
    alice.keyward.register().await.unwrap();

    // Revoked remotely but the local key survived.
    alice.chaos.as_ref().unwrap().fail_next(KeyStoreOp::Delete);
    assert!(alice.keyward.unregister().await.is_err());
    alice.record_cache.reset().unwrap();

    assert_eq!(alice.keyward.restore().await, Err(KeywardError::MissingSelfRecord));
    assert!(!alice.keyward.has_secure_chat());
}

#[tokio::test(start_paused = true)]
async fn zero_rotation_interval_is_rejected_before_publishing() {
    let cloud = SimCloud::new();
    let env = SimEnv::with_seed(30);
    let alice = Participant::builder(&cloud, &env, "alice")
        .ratchet()
        .rotation_interval(Duration::ZERO)
        .build();

    assert_eq!(alice.keyward.register().await, Err(KeywardError::ZeroRotationInterval));
    assert_eq!(alice.keyward.rotate_private_key().await, Err(KeywardError::ZeroRotationInterval));
    assert_eq!(alice.keyward.restore().await, Err(KeywardError::ZeroRotationInterval));
    settle().await;

    assert!(cloud.record_history(alice.identity()).is_empty());
    assert!(!alice.keyward.has_local_private_key().unwrap());
    assert!(!alice.keyward.has_secure_chat());
    assert_eq!(alice.ratchet_engines.created(), 0);
    check(&cloud, &[&alice], "after zero interval");
}

#[tokio::test(start_paused = true)]
async fn failed_periodic_rotation_keeps_open_chats_working() {
    init_tracing();
    let cloud = SimCloud::new();
    let env = SimEnv::with_seed(31);
    let alice = ratchet_participant(&cloud, &env, "alice");
    let bob = ratchet_participant(&cloud, &env, "bob");
    alice.keyward.register().await.unwrap();
    bob.keyward.register().await.unwrap();

    let alice_chat = alice.keyward.create_ratchet_chat(&bob.record()).await.unwrap();
    let bob_chat = bob.keyward.join_ratchet_chat(&alice.record()).await.unwrap();
    assert_eq!(bob_chat.decrypt(&alice_chat.encrypt(b"before").unwrap()).unwrap(), b"before");

    cloud.inject(Fault::Rotate);
    advance(INTERVAL).await;

    assert_eq!(cloud.ratchet_rotations(alice.identity()), Some(1));
    assert_eq!(cloud.ratchet_rotations(bob.identity()), Some(1));
    assert!(alice.keyward.is_rotation_scheduled());
    let ciphertext = alice_chat.encrypt(b"during the outage").unwrap();
    assert_eq!(bob_chat.decrypt(&ciphertext).unwrap(), b"during the outage");
    let reply = bob_chat.encrypt(b"still here").unwrap();
    assert_eq!(alice_chat.decrypt(&reply).unwrap(), b"still here");

    cloud.heal(Fault::Rotate);
    advance(INTERVAL).await;

    assert_eq!(cloud.ratchet_rotations(alice.identity()), Some(2));
    let ciphertext = alice_chat.encrypt(b"after the outage").unwrap();
    assert_eq!(bob_chat.decrypt(&ciphertext).unwrap(), b"after the outage");
    check(&cloud, &[&alice, &bob], "after failed periodic rotation");
}
