//! Clock and randomness, injected.
//!
//! Key generation, chat markers and the key cache lifetime all read
//! from an [`Environment`]. Production wires in the OS clock and RNG; the
//! harness wires in a seeded RNG and tokio's pausable clock, so a run is a
//! pure function of its seed.

use std::time::Duration;

/// Source of time and entropy for everything keyward derives.
///
/// Implementations must keep `now()` monotonic and, outside simulation,
/// draw `random_bytes()` from a CSPRNG. A simulated environment must produce
/// the same bytes for the same seed.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Point in time on this environment's clock.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current instant. Never earlier than a previous call.
    fn now(&self) -> Self::Instant;

    /// Fill `buffer` with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Generates a random 32-byte array, e.g. a key seed.
    fn random_array(&self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        self.random_bytes(&mut bytes);
        bytes
    }
}
