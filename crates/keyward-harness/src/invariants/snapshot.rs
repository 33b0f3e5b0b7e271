//! Observable state snapshots for invariant checking.

use keyward_core::{Identity, IdentityRecord, PublicKey};

use crate::{Participant, SimCloud};

/// Snapshot of every principal in a simulation.
#[derive(Debug, Clone, Default)]
pub struct SystemSnapshot {
    /// Per-principal snapshots.
    pub principals: Vec<PrincipalSnapshot>,
}

impl SystemSnapshot {
    /// Capture every participant against the shared cloud.
    pub fn capture(cloud: &SimCloud, participants: &[&Participant]) -> Self {
        Self {
            principals: participants
                .iter()
                .map(|participant| PrincipalSnapshot::capture(cloud, participant))
                .collect(),
        }
    }
}

/// Local and remote state of one principal.
#[derive(Debug, Clone)]
pub struct PrincipalSnapshot {
    /// Principal identity.
    pub identity: Identity,
    /// Public half of the locally stored key, if one can be read.
    pub local_key: Option<PublicKey>,
    /// Records the directory currently returns for the principal.
    pub current_records: Vec<IdentityRecord>,
    /// Whether a group ticket store is installed.
    pub has_group_store: bool,
    /// Whether a ratchet engine is installed.
    pub has_secure_chat: bool,
    /// Whether a rotation timer is running.
    pub rotation_scheduled: bool,
    /// Whether the principal is configured for ratchet support.
    pub ratchet_enabled: bool,
}

impl PrincipalSnapshot {
    /// Capture `participant`'s state.
    pub fn capture(cloud: &SimCloud, participant: &Participant) -> Self {
        let keyward = &participant.keyward;
        Self {
            identity: keyward.identity().clone(),
            local_key: participant.local_public_key(),
            current_records: cloud.current_records(keyward.identity()),
            has_group_store: keyward.group_manager().is_ok(),
            has_secure_chat: keyward.has_secure_chat(),
            rotation_scheduled: keyward.is_rotation_scheduled(),
            ratchet_enabled: keyward.config().enable_ratchet,
        }
    }
}
