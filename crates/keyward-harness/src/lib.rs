//! Deterministic simulation harness for keyward.
//!
//! In-memory implementations of every collaborator the orchestrator needs,
//! driven by a seeded environment so runs are reproducible:
//!
//! - [`SimEnv`]: seeded RNG, tokio clock (pausable in tests)
//! - [`SimCloud`]: identity directory, ticket relay, ratchet key server and
//!   unsafe channel key store, with injectable [`Fault`]s
//! - [`SimRatchetEngine`]: session engine over forward-secure symmetric
//!   chains; not a secure protocol
//! - [`SimGroupStoreFactory`]: group ticket stores bound to identity keys
//! - [`Participant`]: a fully wired [`keyward_client::Keyward`]
//!
//! # Invariant Testing
//!
//! The `invariants` module checks lifecycle properties against a
//! [`SystemSnapshot`] after every step of a scenario, including failed steps.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cloud;
pub mod group;
pub mod invariants;
pub mod participant;
pub mod ratchet;
pub mod sim_env;

pub use cloud::{
    Fault, RecordStatus, SimCloud, SimDirectory, SimTicketRelay, SimTokenSource, SimUnsafeCloud,
};
pub use group::{SimGroupStore, SimGroupStoreFactory};
pub use invariants::{
    Invariant, InvariantRegistry, InvariantResult, PrincipalSnapshot, SystemSnapshot, Violation,
};
pub use participant::{
    CachedKeyStore, Participant, ParticipantBuilder, RecordingObserver, STORAGE_SECRET,
};
pub use ratchet::{SimRatchetEngine, SimRatchetFactory, SimSession};
pub use sim_env::SimEnv;
