//! Unsafe channel cloud contract.

use async_trait::async_trait;

use crate::{Identity, RelayError};

/// Side of an unsafe channel the principal is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelRole {
    /// Created the channel and its temporary key.
    Creator,
    /// The unregistered side that loads the temporary key.
    Participant,
}

impl ChannelRole {
    /// Resolve `(creator, participant)` for a principal acting in this role.
    pub fn slot<'a>(
        self,
        principal: &'a Identity,
        correspondent: &'a Identity,
    ) -> (&'a Identity, &'a Identity) {
        match self {
            Self::Creator => (principal, correspondent),
            Self::Participant => (correspondent, principal),
        }
    }
}

/// Cloud storage for unsafe-channel temporary keys.
///
/// Entries are keyed by `(principal, correspondent, role)`, which resolves to
/// a single `(creator, participant)` slot through [`ChannelRole::slot`]. The
/// temporary key is stored unencrypted; that is what makes the channel unsafe.
#[async_trait]
pub trait UnsafeKeyCloud: Send + Sync {
    /// Upload the temporary private key.
    async fn store(
        &self,
        principal: &Identity,
        correspondent: &Identity,
        role: ChannelRole,
        temporary_key: &[u8],
    ) -> Result<(), RelayError>;

    /// Download the temporary private key, if present.
    async fn load(
        &self,
        principal: &Identity,
        correspondent: &Identity,
        role: ChannelRole,
    ) -> Result<Option<Vec<u8>>, RelayError>;

    /// Delete the temporary key. Only the creator may delete.
    async fn delete(
        &self,
        principal: &Identity,
        correspondent: &Identity,
        role: ChannelRole,
    ) -> Result<(), RelayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_roles_resolve_to_same_slot() {
        let alice = Identity::new("alice");
        let bob = Identity::new("bob");

        let from_creator = ChannelRole::Creator.slot(&alice, &bob);
        let from_participant = ChannelRole::Participant.slot(&bob, &alice);

        assert_eq!(from_creator, from_participant);
    }
}
