//! Ratchet session engine, ticket relay and access token contracts.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use keyward_crypto::KeyPair;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Identity, IdentityRecord};

/// Errors from the ratchet session engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RatchetError {
    /// A session with this participant already exists
    #[error("session with {0} already exists")]
    SessionAlreadyExists(Identity),

    /// No session with this participant
    #[error("no session with {0}")]
    NoSuchSession(Identity),

    /// The participant has not provisioned ratchet keys
    #[error("{0} has no ratchet keys published")]
    PeerKeysMissing(Identity),

    /// A join ticket could not be parsed or authenticated
    #[error("invalid ticket: {0}")]
    InvalidTicket(String),

    /// Message could not be encrypted
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Message could not be decrypted
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Transport-level failure talking to the ratchet key service
    #[error("ratchet service unreachable: {0}")]
    Network(String),

    /// No access token could be obtained
    #[error("access token unavailable: {0}")]
    Token(#[from] TokenError),
}

/// Result of resetting remote ratchet state.
///
/// A principal that never provisioned ratchet keys has nothing to reset; that
/// is the expected state on first-time setup, not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    /// Existing remote keys and sessions were removed.
    Cleared,
    /// The service held no keys for this principal.
    NoKeysOnCloud,
}

/// Summary of one key rotation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RotationLog {
    /// Whether the long-term key was replaced.
    pub long_term_key_rotated: bool,
    /// One-time keys uploaded.
    pub one_time_keys_added: u32,
    /// One-time keys retired.
    pub one_time_keys_removed: u32,
}

impl fmt::Display for RotationLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "long-term rotated: {}, one-time added: {}, one-time removed: {}",
            self.long_term_key_rotated, self.one_time_keys_added, self.one_time_keys_removed
        )
    }
}

/// Encrypted bootstrap message that lets a receiver join a sender's session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket(Vec<u8>);

impl Ticket {
    /// Wrap ticket bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Ticket bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ticket({} bytes)", self.0.len())
    }
}

/// One pairwise ratchet session.
pub trait RatchetSession: Send + Sync {
    /// The other side of the session.
    fn participant(&self) -> &Identity;

    /// Encrypt and advance the sending chain.
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, RatchetError>;

    /// Decrypt and advance the receiving chain.
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, RatchetError>;
}

/// Double-ratchet session state for one principal.
#[async_trait]
pub trait RatchetEngine: Send + Sync {
    /// Remove this principal's remote keys and sessions.
    async fn reset(&self) -> Result<ResetOutcome, RatchetError>;

    /// Rotate long-term and one-time keys on the ratchet key service.
    ///
    /// A failed rotation must leave the engine usable in its prior state.
    async fn rotate_keys(&self) -> Result<RotationLog, RatchetError>;

    /// Start a session as the initiating side.
    ///
    /// Fails with [`RatchetError::SessionAlreadyExists`] if one exists.
    async fn start_session_as_sender(
        &self,
        receiver: &IdentityRecord,
    ) -> Result<Arc<dyn RatchetSession>, RatchetError>;

    /// Join a session started by `sender` from its ticket.
    fn start_session_as_receiver(
        &self,
        sender: &IdentityRecord,
        ticket: &Ticket,
    ) -> Result<Arc<dyn RatchetSession>, RatchetError>;

    /// Session with `participant`, if one exists.
    fn existing_session(&self, participant: &Identity) -> Option<Arc<dyn RatchetSession>>;

    /// Delete the session with `participant`.
    ///
    /// Fails with [`RatchetError::NoSuchSession`] if none exists.
    fn delete_session(&self, participant: &Identity) -> Result<(), RatchetError>;
}

/// Builds a [`RatchetEngine`] for the current identity.
#[async_trait]
pub trait RatchetEngineFactory: Send + Sync {
    /// Create an engine bound to the principal's record and key pair.
    async fn create(
        &self,
        record: &IdentityRecord,
        key_pair: &KeyPair,
        tokens: Arc<dyn TokenSource>,
    ) -> Result<Arc<dyn RatchetEngine>, RatchetError>;
}

/// Errors from cloud relays.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// Nothing stored under the requested key
    #[error("nothing stored for this participant")]
    NotFound,

    /// Transport-level failure
    #[error("relay unreachable: {0}")]
    Network(String),
}

/// Cloud relay for ratchet join tickets, keyed by (principal, participant).
///
/// Each relay instance acts for one principal.
#[async_trait]
pub trait TicketRelay: Send + Sync {
    /// Post a ticket for `shared_with` to pick up.
    async fn store(&self, ticket: &Ticket, shared_with: &IdentityRecord) -> Result<(), RelayError>;

    /// Fetch the ticket `from` posted for this principal.
    async fn retrieve(&self, from: &IdentityRecord) -> Result<Ticket, RelayError>;
}

/// Access token failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TokenError(pub String);

/// Short-lived credential for remote services.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    /// Principal the token was issued to.
    pub identity: Identity,
    /// Opaque token value.
    pub value: String,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken").field("identity", &self.identity).finish_non_exhaustive()
    }
}

/// Source of access tokens for remote services.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Token valid for `service`.
    async fn token(&self, service: &str) -> Result<AccessToken, TokenError>;
}
