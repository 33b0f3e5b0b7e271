//! Identity directory contract.

use async_trait::async_trait;
use thiserror::Error;

use crate::{Identity, IdentityRecord, RecordId, RecordRequest};

/// Errors from the remote identity directory.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// Transport-level failure; the request may not have been applied
    #[error("directory unreachable: {0}")]
    Network(String),

    /// The directory refused the request
    #[error("directory rejected request: {0}")]
    Rejected(String),

    /// Referenced record does not exist or is no longer current
    #[error("record not found: {0}")]
    NotFound(RecordId),
}

/// Remote directory of identity records.
///
/// # Invariants
///
/// - `search` returns only current (not revoked, not superseded) records
/// - After `publish` with `previous_id = Some(id)`, record `id` is no longer
///   current
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Current records for `identity`.
    async fn search(&self, identity: &Identity) -> Result<Vec<IdentityRecord>, DirectoryError>;

    /// Publish a new record.
    async fn publish(&self, request: RecordRequest) -> Result<IdentityRecord, DirectoryError>;

    /// Revoke a current record.
    async fn revoke(&self, id: &RecordId) -> Result<(), DirectoryError>;
}
