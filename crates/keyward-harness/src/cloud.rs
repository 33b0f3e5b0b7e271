//! In-memory stand-ins for every remote service the orchestrator talks to.
//!
//! One [`SimCloud`] holds the identity directory, the ratchet ticket relay,
//! the ratchet key server and the unsafe channel key store. Participants get
//! per-identity views of it ([`SimDirectory`], [`SimTicketRelay`],
//! [`SimUnsafeCloud`]). Faults can be switched on per service to exercise
//! partial-failure paths.

#![allow(clippy::disallowed_types, reason = "Synchronous in-memory state only")]

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use keyward_core::{
    AccessToken, ChannelRole, DirectoryError, Identity, IdentityDirectory, IdentityRecord,
    RecordId, RecordRequest, RelayError, Ticket, TicketRelay, TokenError, TokenSource,
    UnsafeKeyCloud,
};
use keyward_crypto::sha512;

/// Remote operation that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    /// Directory search
    Search,
    /// Directory publish
    Publish,
    /// Directory revoke
    Revoke,
    /// Ticket relay store and retrieve
    Relay,
    /// Ratchet key rotation
    Rotate,
    /// Ratchet remote reset
    Reset,
    /// Access token issuance
    Token,
}

/// Lifecycle state of a published record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    /// Returned by search
    Current,
    /// Replaced by a newer record for the same identity
    Superseded,
    /// Revoked by its owner
    Revoked,
}

#[derive(Default)]
struct CloudState {
    records: Vec<(IdentityRecord, RecordStatus)>,
    /// (sender, receiver) -> pending ticket
    tickets: HashMap<(Identity, Identity), Ticket>,
    /// identity -> completed key rotations
    ratchet_keys: HashMap<Identity, u64>,
    /// (creator, participant) -> temporary private key
    unsafe_keys: HashMap<(Identity, Identity), Vec<u8>>,
    faults: HashSet<Fault>,
    published: u64,
}

/// Shared simulated backend. Clone shares state.
#[derive(Clone, Default)]
pub struct SimCloud {
    state: Arc<Mutex<CloudState>>,
}

impl SimCloud {
    /// Empty backend with no faults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call of `fault`'s operation fail until healed.
    pub fn inject(&self, fault: Fault) {
        self.lock().faults.insert(fault);
    }

    /// Stop failing `fault`'s operation.
    pub fn heal(&self, fault: Fault) {
        self.lock().faults.remove(&fault);
    }

    /// Directory view for any identity.
    pub fn directory(&self) -> SimDirectory {
        SimDirectory { cloud: self.clone() }
    }

    /// Ticket relay view for `owner`.
    pub fn ticket_relay(&self, owner: Identity) -> SimTicketRelay {
        SimTicketRelay { cloud: self.clone(), owner }
    }

    /// Unsafe channel key store view.
    pub fn unsafe_keys(&self) -> SimUnsafeCloud {
        SimUnsafeCloud { cloud: self.clone() }
    }

    /// Token source issuing tokens for `identity`.
    pub fn tokens(&self, identity: Identity) -> SimTokenSource {
        SimTokenSource { cloud: self.clone(), identity }
    }

    /// Current records for `identity`.
    pub fn current_records(&self, identity: &Identity) -> Vec<IdentityRecord> {
        self.lock()
            .records
            .iter()
            .filter(|(record, status)| {
                record.identity == *identity && *status == RecordStatus::Current
            })
            .map(|(record, _)| record.clone())
            .collect()
    }

    /// Every record ever published for `identity`, oldest first.
    pub fn record_history(&self, identity: &Identity) -> Vec<(IdentityRecord, RecordStatus)> {
        self.lock().records.iter().filter(|(record, _)| record.identity == *identity).cloned().collect()
    }

    /// Whether a ticket from `sender` to `receiver` is waiting on the relay.
    pub fn has_ticket(&self, sender: &Identity, receiver: &Identity) -> bool {
        self.lock().tickets.contains_key(&(sender.clone(), receiver.clone()))
    }

    /// Number of completed ratchet key rotations for `identity`, if it has
    /// keys on the server.
    pub fn ratchet_rotations(&self, identity: &Identity) -> Option<u64> {
        self.lock().ratchet_keys.get(identity).copied()
    }

    /// Whether a temporary key for the `(creator, participant)` channel is
    /// stored.
    pub fn has_unsafe_key(&self, creator: &Identity, participant: &Identity) -> bool {
        self.lock().unsafe_keys.contains_key(&(creator.clone(), participant.clone()))
    }

    pub(crate) fn check(&self, fault: Fault) -> Result<(), String> {
        if self.lock().faults.contains(&fault) {
            return Err(format!("injected {fault:?} failure"));
        }
        Ok(())
    }

    /// Remove all ratchet keys for `identity`. Returns whether any existed.
    pub(crate) fn clear_ratchet_keys(&self, identity: &Identity) -> bool {
        self.lock().ratchet_keys.remove(identity).is_some()
    }

    /// Record one rotation. Returns whether keys were freshly published.
    pub(crate) fn rotate_ratchet_keys(&self, identity: &Identity) -> bool {
        let mut state = self.lock();
        let rotations = state.ratchet_keys.entry(identity.clone()).or_insert(0);
        *rotations += 1;
        *rotations == 1
    }

    pub(crate) fn has_ratchet_keys(&self, identity: &Identity) -> bool {
        self.lock().ratchet_keys.contains_key(identity)
    }

    #[allow(clippy::expect_used)]
    fn lock(&self) -> MutexGuard<'_, CloudState> {
        self.state.lock().expect("SimCloud mutex poisoned")
    }
}

/// Identity directory backed by a [`SimCloud`].
///
/// Verifies request signatures and keeps at most one current record per
/// identity.
#[derive(Clone)]
pub struct SimDirectory {
    cloud: SimCloud,
}

#[async_trait]
impl IdentityDirectory for SimDirectory {
    async fn search(&self, identity: &Identity) -> Result<Vec<IdentityRecord>, DirectoryError> {
        self.cloud.check(Fault::Search).map_err(DirectoryError::Network)?;
        Ok(self.cloud.current_records(identity))
    }

    async fn publish(&self, request: RecordRequest) -> Result<IdentityRecord, DirectoryError> {
        self.cloud.check(Fault::Publish).map_err(DirectoryError::Network)?;
        request.verify().map_err(|e| DirectoryError::Rejected(e.to_string()))?;

        let mut state = self.cloud.lock();

        let current = state.records.iter().position(|(record, status)| {
            record.identity == request.identity && *status == RecordStatus::Current
        });

        match (&request.previous_id, current) {
            (None, Some(_)) => {
                return Err(DirectoryError::Rejected(format!(
                    "{} already has a current record",
                    request.identity
                )));
            },
            (Some(previous), Some(index)) if state.records[index].0.id == *previous => {
                state.records[index].1 = RecordStatus::Superseded;
            },
            (Some(previous), _) => {
                return Err(DirectoryError::Rejected(format!("{previous} is not current")));
            },
            (None, None) => {},
        }

        state.published += 1;
        let mut seed = request.identity.as_bytes().to_vec();
        seed.extend_from_slice(request.public_key.as_bytes());
        seed.extend_from_slice(&state.published.to_be_bytes());
        let id = RecordId::new(hex::encode(&sha512(&seed)[..16]));

        let record = IdentityRecord {
            id,
            identity: request.identity,
            public_key: request.public_key,
            previous_id: request.previous_id,
            created_at_secs: state.published,
        };
        state.records.push((record.clone(), RecordStatus::Current));

        tracing::debug!(identity = %record.identity, id = %record.id, "record published");
        Ok(record)
    }

    async fn revoke(&self, id: &RecordId) -> Result<(), DirectoryError> {
        self.cloud.check(Fault::Revoke).map_err(DirectoryError::Network)?;

        let mut state = self.cloud.lock();
        let Some((_, status)) = state
            .records
            .iter_mut()
            .find(|(record, status)| record.id == *id && *status == RecordStatus::Current)
        else {
            return Err(DirectoryError::NotFound(id.clone()));
        };

        *status = RecordStatus::Revoked;
        Ok(())
    }
}

/// Ticket relay view for one identity.
#[derive(Clone)]
pub struct SimTicketRelay {
    cloud: SimCloud,
    owner: Identity,
}

#[async_trait]
impl TicketRelay for SimTicketRelay {
    async fn store(&self, ticket: &Ticket, shared_with: &IdentityRecord) -> Result<(), RelayError> {
        self.cloud.check(Fault::Relay).map_err(RelayError::Network)?;
        self.cloud
            .lock()
            .tickets
            .insert((self.owner.clone(), shared_with.identity.clone()), ticket.clone());
        Ok(())
    }

    async fn retrieve(&self, from: &IdentityRecord) -> Result<Ticket, RelayError> {
        self.cloud.check(Fault::Relay).map_err(RelayError::Network)?;
        self.cloud
            .lock()
            .tickets
            .get(&(from.identity.clone(), self.owner.clone()))
            .cloned()
            .ok_or(RelayError::NotFound)
    }
}

/// Unsafe channel key store backed by a [`SimCloud`].
#[derive(Clone)]
pub struct SimUnsafeCloud {
    cloud: SimCloud,
}

impl SimUnsafeCloud {
    fn slot(principal: &Identity, correspondent: &Identity, role: ChannelRole) -> (Identity, Identity) {
        let (creator, participant) = role.slot(principal, correspondent);
        (creator.clone(), participant.clone())
    }
}

#[async_trait]
impl UnsafeKeyCloud for SimUnsafeCloud {
    async fn store(
        &self,
        principal: &Identity,
        correspondent: &Identity,
        role: ChannelRole,
        temporary_key: &[u8],
    ) -> Result<(), RelayError> {
        self.cloud.check(Fault::Relay).map_err(RelayError::Network)?;
        let slot = Self::slot(principal, correspondent, role);
        self.cloud.lock().unsafe_keys.insert(slot, temporary_key.to_vec());
        Ok(())
    }

    async fn load(
        &self,
        principal: &Identity,
        correspondent: &Identity,
        role: ChannelRole,
    ) -> Result<Option<Vec<u8>>, RelayError> {
        self.cloud.check(Fault::Relay).map_err(RelayError::Network)?;
        let slot = Self::slot(principal, correspondent, role);
        Ok(self.cloud.lock().unsafe_keys.get(&slot).cloned())
    }

    async fn delete(
        &self,
        principal: &Identity,
        correspondent: &Identity,
        role: ChannelRole,
    ) -> Result<(), RelayError> {
        self.cloud.check(Fault::Relay).map_err(RelayError::Network)?;
        let slot = Self::slot(principal, correspondent, role);
        self.cloud.lock().unsafe_keys.remove(&slot);
        Ok(())
    }
}

/// Token source that issues an opaque token per request.
#[derive(Clone)]
pub struct SimTokenSource {
    cloud: SimCloud,
    identity: Identity,
}

#[async_trait]
impl TokenSource for SimTokenSource {
    async fn token(&self, service: &str) -> Result<AccessToken, TokenError> {
        self.cloud.check(Fault::Token).map_err(TokenError)?;
        Ok(AccessToken { identity: self.identity.clone(), value: format!("{service}:{}", self.identity) })
    }
}
