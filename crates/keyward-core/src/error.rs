//! Error type for orchestrator operations.
//!
//! Every public operation resolves with exactly one of these. Collaborator
//! failures pass through wrapped in their own variant so callers can tell a
//! directory outage from a local storage fault.

use thiserror::Error;

use crate::{CryptoError, DirectoryError, Identity, RatchetError, RelayError, StoreError};

/// Errors returned by keyward operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeywardError {
    /// A local key pair already exists
    #[error("private key already exists in local storage")]
    PrivateKeyExists,

    /// No identity is loaded: the local key is missing or was torn down
    #[error("private key is missing; register, rotate or restore first")]
    MissingPrivateKey,

    /// The directory already holds a current record for this principal
    #[error("user is already registered")]
    UserAlreadyRegistered,

    /// The directory holds no current record for this principal
    #[error("user is not registered")]
    UserIsNotRegistered,

    /// Lookup found no current record for another identity
    #[error("user not found: {0}")]
    UserNotFound(Identity),

    /// Identifier is too short for session id derivation
    #[error("identifier too short: {len} bytes, need more than {min}")]
    InvalidIdentityLength {
        /// Supplied length
        len: usize,
        /// Exclusive minimum
        min: usize,
    },

    /// A ratchet chat with this participant already exists
    #[error("ratchet chat already exists")]
    ChatAlreadyExists,

    /// No ratchet chat with this participant
    #[error("ratchet chat not found")]
    MissingChat,

    /// Ratchet chats with oneself are not allowed
    #[error("ratchet chat with self is forbidden")]
    SelfChatForbidden,

    /// Unsafe channels with oneself are not allowed
    #[error("unsafe channel with self is forbidden")]
    SelfChannelForbidden,

    /// Unsafe channels are only for identities without a published record
    #[error("user is registered; use a ratchet chat instead")]
    UserIsRegistered,

    /// No unsafe channel with this participant
    #[error("unsafe channel not found")]
    MissingChannel,

    /// The correspondent has not posted a join ticket
    #[error("no ratchet ticket available")]
    MissingTicket,

    /// No temporary key was uploaded for this channel
    #[error("no temporary key available for unsafe channel")]
    MissingUnsafeKey,

    /// Ratchet support needs the principal's own record and none is known
    #[error("own identity record unavailable")]
    MissingSelfRecord,

    /// Ratchet support is enabled with a zero rotation interval
    #[error("key rotation interval must be non-zero")]
    ZeroRotationInterval,

    /// The configured key store does not cache keys
    #[error("key store does not cache keys")]
    NotCachingKeyStrategy,

    /// Local key store failure
    #[error("key store: {0}")]
    KeyStore(#[from] StoreError),

    /// Record cache failure
    #[error("record cache: {0}")]
    RecordCache(StoreError),

    /// Group ticket store failure
    #[error("group store: {0}")]
    GroupStore(StoreError),

    /// Identity directory failure
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// Ratchet engine failure
    #[error(transparent)]
    Ratchet(#[from] RatchetError),

    /// Cloud relay failure
    #[error(transparent)]
    Relay(#[from] RelayError),

    /// Cryptographic failure
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl KeywardError {
    /// Returns true if this error is transient and may succeed on retry.
    ///
    /// Only transport failures of remote collaborators are transient. State
    /// errors (already registered, missing key) need a different call, not a
    /// retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Directory(DirectoryError::Network(_))
                | Self::Ratchet(RatchetError::Network(_))
                | Self::Relay(RelayError::Network(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_errors_are_transient() {
        assert!(KeywardError::from(DirectoryError::Network("timeout".into())).is_transient());
        assert!(KeywardError::from(RatchetError::Network("timeout".into())).is_transient());
        assert!(KeywardError::from(RelayError::Network("timeout".into())).is_transient());
    }

    #[test]
    fn state_errors_are_fatal() {
        assert!(!KeywardError::PrivateKeyExists.is_transient());
        assert!(!KeywardError::UserAlreadyRegistered.is_transient());
        assert!(!KeywardError::MissingPrivateKey.is_transient());
        assert!(!KeywardError::KeyStore(StoreError::Io("disk full".into())).is_transient());
        assert!(!KeywardError::from(RelayError::NotFound).is_transient());
    }

    #[test]
    fn collaborator_errors_convert() {
        let err: KeywardError = StoreError::NotFound.into();
        assert_eq!(err, KeywardError::KeyStore(StoreError::NotFound));

        let err: KeywardError = CryptoError::BadSignature.into();
        assert!(matches!(err, KeywardError::Crypto(CryptoError::BadSignature)));
    }
}
