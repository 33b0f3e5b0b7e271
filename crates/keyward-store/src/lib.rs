//! Local persistence for keyward.
//!
//! Implementations of [`LocalKeyStore`] and [`RecordCache`]:
//!
//! - [`MemoryKeyStore`] / [`MemoryRecordCache`]: in-memory, for tests and
//!   ephemeral sessions
//! - [`RedbStore`]: durable, with the private key sealed at rest
//! - [`CachingKeyStore`]: keeps the decrypted key in memory for a bounded
//!   lifetime on top of any other key store
//! - [`ChaoticKeyStore`]: fault injection wrapper for partial-failure tests
//!
//! [`LocalKeyStore`]: keyward_core::LocalKeyStore
//! [`RecordCache`]: keyward_core::RecordCache

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod caching;
mod chaotic;
mod memory;
mod redb;

pub use caching::CachingKeyStore;
pub use chaotic::{ChaoticKeyStore, KeyStoreOp};
pub use memory::{MemoryKeyStore, MemoryRecordCache};

pub use self::redb::RedbStore;
