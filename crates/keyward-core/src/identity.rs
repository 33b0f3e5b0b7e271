//! Principals and identity records.

use std::fmt;

use keyward_crypto::{KeyPair, PublicKey, verify_signature};
use serde::{Deserialize, Serialize};

use crate::CryptoError;

/// Stable name of a user, as known to the identity directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity(String);

impl Identity {
    /// Wrap an identity string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Identity as raw bytes, for key derivation labels.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Directory-assigned identifier of an identity record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(String);

impl RecordId {
    /// Wrap a record id string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Record id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Self-signed publication request for a new identity record.
///
/// The directory verifies `signature` against `public_key` before issuing a
/// record, so only the holder of the private key can publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRequest {
    /// Principal the record binds.
    pub identity: Identity,
    /// Public key being published.
    pub public_key: PublicKey,
    /// Record this one supersedes, when rotating.
    pub previous_id: Option<RecordId>,
    /// Signature over [`RecordRequest::signing_payload`].
    pub signature: Vec<u8>,
}

impl RecordRequest {
    /// Build and sign a request with `key_pair`.
    pub fn signed(key_pair: &KeyPair, identity: Identity, previous_id: Option<RecordId>) -> Self {
        let public_key = key_pair.public_key();
        let payload = Self::signing_payload(&identity, &public_key, previous_id.as_ref());
        let signature = key_pair.sign(&payload).to_vec();
        Self { identity, public_key, previous_id, signature }
    }

    /// Check the self-signature.
    pub fn verify(&self) -> Result<(), CryptoError> {
        let payload =
            Self::signing_payload(&self.identity, &self.public_key, self.previous_id.as_ref());
        verify_signature(&self.public_key, &payload, &self.signature)
    }

    /// Canonical bytes covered by the self-signature.
    ///
    /// Layout: `len(identity) || identity || public_key || previous_id?`,
    /// lengths as big-endian `u32`.
    pub fn signing_payload(
        identity: &Identity,
        public_key: &PublicKey,
        previous_id: Option<&RecordId>,
    ) -> Vec<u8> {
        let mut payload = Vec::with_capacity(4 + identity.as_bytes().len() + 32 + 36);
        payload.extend_from_slice(&(identity.as_bytes().len() as u32).to_be_bytes());
        payload.extend_from_slice(identity.as_bytes());
        payload.extend_from_slice(public_key.as_bytes());
        if let Some(previous) = previous_id {
            payload.extend_from_slice(&(previous.as_str().len() as u32).to_be_bytes());
            payload.extend_from_slice(previous.as_str().as_bytes());
        }
        payload
    }
}

/// Directory-issued binding of a principal to a public key ("card").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// Unique record identifier.
    pub id: RecordId,
    /// Principal this record binds.
    pub identity: Identity,
    /// Published public key.
    pub public_key: PublicKey,
    /// Record this one superseded, if it was published by a rotation.
    pub previous_id: Option<RecordId>,
    /// Issue time, seconds since the Unix epoch as reported by the directory.
    pub created_at_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_request_verifies() {
        let pair = KeyPair::from_seed(&[5; 32]);
        let request = RecordRequest::signed(&pair, Identity::new("alice"), None);
        assert!(request.verify().is_ok());
    }

    #[test]
    fn tampered_request_fails_verification() {
        let pair = KeyPair::from_seed(&[5; 32]);
        let mut request = RecordRequest::signed(&pair, Identity::new("alice"), None);
        request.identity = Identity::new("mallory");
        assert!(request.verify().is_err());
    }

    #[test]
    fn previous_id_is_covered_by_signature() {
        let pair = KeyPair::from_seed(&[5; 32]);
        let mut request =
            RecordRequest::signed(&pair, Identity::new("alice"), Some(RecordId::new("r1")));
        request.previous_id = Some(RecordId::new("r2"));
        assert!(request.verify().is_err());
    }
}
