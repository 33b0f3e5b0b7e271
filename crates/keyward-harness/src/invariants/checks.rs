//! Standard lifecycle invariants.

use super::{Invariant, InvariantResult, PrincipalSnapshot};

/// The directory never holds two current records for one principal.
pub struct SingleCurrentRecord;

impl Invariant for SingleCurrentRecord {
    fn name(&self) -> &'static str {
        "SingleCurrentRecord"
    }

    fn check(&self, principal: &PrincipalSnapshot) -> InvariantResult {
        match principal.current_records.len() {
            0 | 1 => Ok(()),
            n => Err(format!("{n} current records")),
        }
    }
}

/// A local key and a current record, when both exist, hold the same key.
pub struct LocalKeyMatchesRecord;

impl Invariant for LocalKeyMatchesRecord {
    fn name(&self) -> &'static str {
        "LocalKeyMatchesRecord"
    }

    fn check(&self, principal: &PrincipalSnapshot) -> InvariantResult {
        let (Some(local), [record]) = (&principal.local_key, principal.current_records.as_slice())
        else {
            return Ok(());
        };
        if *local == record.public_key {
            Ok(())
        } else {
            Err(format!(
                "local key {local:?} differs from record {} key {:?}",
                record.id, record.public_key
            ))
        }
    }
}

/// Group store and ratchet engine exist only while a local key does.
pub struct DerivedStateRequiresKey;

impl Invariant for DerivedStateRequiresKey {
    fn name(&self) -> &'static str {
        "DerivedStateRequiresKey"
    }

    fn check(&self, principal: &PrincipalSnapshot) -> InvariantResult {
        let derived = principal.has_group_store || principal.has_secure_chat;
        if derived && principal.local_key.is_none() {
            return Err(format!(
                "group store {} / engine {} without a local key",
                principal.has_group_store, principal.has_secure_chat
            ));
        }
        Ok(())
    }
}

/// A rotation timer runs exactly when an engine is installed.
pub struct SchedulerBoundToEngine;

impl Invariant for SchedulerBoundToEngine {
    fn name(&self) -> &'static str {
        "SchedulerBoundToEngine"
    }

    fn check(&self, principal: &PrincipalSnapshot) -> InvariantResult {
        if principal.rotation_scheduled == principal.has_secure_chat {
            Ok(())
        } else {
            Err(format!(
                "timer running {} but engine installed {}",
                principal.rotation_scheduled, principal.has_secure_chat
            ))
        }
    }
}

/// No engine is ever built for a principal without ratchet support.
pub struct EngineRequiresRatchet;

impl Invariant for EngineRequiresRatchet {
    fn name(&self) -> &'static str {
        "EngineRequiresRatchet"
    }

    fn check(&self, principal: &PrincipalSnapshot) -> InvariantResult {
        if principal.has_secure_chat && !principal.ratchet_enabled {
            return Err("engine installed with ratchet disabled".to_owned());
        }
        Ok(())
    }
}
