//! Key change notification.

use crate::Identity;

/// Kind of change applied to the local identity key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyChange {
    /// A key was generated and published by `register`.
    Registered,
    /// A replacement key was published by `rotate_private_key`.
    Rotated,
    /// The remote record was revoked and the local key deleted.
    Unregistered,
    /// The local key was deleted; the remote record is untouched.
    CleanedUp,
}

/// Receives notifications after successful identity mutations.
///
/// The orchestrator holds observers through a `Weak` reference, so an observer
/// that owns the orchestrator does not form a cycle.
pub trait KeyChangeObserver: Send + Sync {
    /// Called once per successful lifecycle operation.
    fn key_changed(&self, identity: &Identity, change: KeyChange);
}
