//! Identity lifecycle orchestrator.
//!
//! [`Keyward`] manages one principal's identity key: registering it with the
//! directory, replacing a lost key, revoking it, and rebuilding everything
//! derived from it whenever it changes.
//!
//! # Components
//!
//! - [`Keyward`]: lifecycle operations and identity-derived state
//! - [`RotationScheduler`]: periodic ratchet key rotation, bound to one engine
//! - [`RatchetChat`]: handle to a pairwise ratchet session
//! - [`UnsafeChannel`]: handle to a channel with an unregistered correspondent
//! - [`KeywardConfig`]: identity, rotation interval, ratchet switch, storage
//! - [`SystemEnv`]: production environment (real time, OS RNG)
//!
//! # Derived state
//!
//! Every successful register or rotate (and [`Keyward::restore`]) rebuilds:
//!
//! 1. the group ticket store, opened with the new key pair
//! 2. with ratchet enabled, the session engine: reset, one synchronous
//!    rotation, then a fresh [`RotationScheduler`]
//!
//! Unregister and clean up tear all of it down. The previous timer is always
//! stopped before a new engine is installed.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod config;
mod keyward;
mod lifecycle;
mod ratchet_chat;
mod scheduler;
mod system_env;
mod unsafe_channel;

pub use config::{
    DEFAULT_KEY_CACHE_LIFETIME, DEFAULT_KEY_ROTATION_INTERVAL, KeywardConfig, StorageParams,
};
pub use keyward::{Collaborators, Keyward};
pub use keyward_core::KeywardError;
pub use ratchet_chat::RatchetChat;
pub use scheduler::RotationScheduler;
pub use system_env::SystemEnv;
pub use unsafe_channel::UnsafeChannel;
