//! Lifecycle invariants.
//!
//! Each [`Invariant`] is a property of one principal's local and remote
//! state. It must hold after every lifecycle operation, including failed
//! ones. Tests capture a [`SystemSnapshot`] and hand it to an
//! [`InvariantRegistry`], which checks every principal against every
//! registered invariant and reports all violations at once.

mod checks;
mod snapshot;

use std::fmt;

use keyward_core::Identity;

pub use checks::{
    DerivedStateRequiresKey, EngineRequiresRatchet, LocalKeyMatchesRecord, SchedulerBoundToEngine,
    SingleCurrentRecord,
};
pub use snapshot::{PrincipalSnapshot, SystemSnapshot};

/// Outcome of one invariant on one principal. `Err` describes the breach.
pub type InvariantResult = Result<(), String>;

/// An invariant that failed for a principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Invariant that failed.
    pub invariant: &'static str,
    /// Principal whose state breaks it.
    pub principal: Identity,
    /// What was observed.
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.principal, self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// A property of a single principal's state.
pub trait Invariant: Send + Sync {
    /// Name used in violation reports.
    fn name(&self) -> &'static str;

    /// Check `principal`.
    fn check(&self, principal: &PrincipalSnapshot) -> InvariantResult;
}

/// Invariants checked together against a snapshot.
#[derive(Default)]
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl InvariantRegistry {
    /// Registry with no invariants.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every lifecycle invariant keyward guarantees.
    pub fn standard() -> Self {
        Self::new()
            .with(SingleCurrentRecord)
            .with(LocalKeyMatchesRecord)
            .with(DerivedStateRequiresKey)
            .with(SchedulerBoundToEngine)
            .with(EngineRequiresRatchet)
    }

    /// Add `invariant`.
    #[must_use]
    pub fn with(mut self, invariant: impl Invariant + 'static) -> Self {
        self.invariants.push(Box::new(invariant));
        self
    }

    /// Every violation in `state`, principal by principal.
    pub fn violations(&self, state: &SystemSnapshot) -> Vec<Violation> {
        state
            .principals
            .iter()
            .flat_map(|principal| {
                self.invariants.iter().filter_map(move |invariant| {
                    invariant.check(principal).err().map(|message| Violation {
                        invariant: invariant.name(),
                        principal: principal.identity.clone(),
                        message,
                    })
                })
            })
            .collect()
    }

    /// Panic with every violation in `state`, labelled with `context`.
    #[allow(clippy::panic)]
    pub fn assert_all(&self, state: &SystemSnapshot, context: &str) {
        let violations = self.violations(state);
        if !violations.is_empty() {
            let lines: Vec<_> = violations.iter().map(ToString::to_string).collect();
            panic!("invariants broken {context}:\n  {}", lines.join("\n  "));
        }
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}
