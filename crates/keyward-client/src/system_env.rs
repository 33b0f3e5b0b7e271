//! The environment keyward runs under outside of tests.

use keyward_core::Environment;

/// Monotonic OS clock and the OS CSPRNG.
///
/// # Panics
///
/// `random_bytes` panics if the OS RNG fails. Key generation without working
/// randomness cannot be made safe, so there is nothing to fall back to.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// The system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG failure is unrecoverable");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    #[allow(clippy::disallowed_methods)]
    fn clock_is_monotonic() {
        let env = SystemEnv::new();

        let before = env.now();
        std::thread::sleep(Duration::from_millis(2));

        assert!(env.now() - before >= Duration::from_millis(2));
    }

    #[test]
    fn seeds_are_not_repeated() {
        let env = SystemEnv::new();
        assert_ne!(env.random_array(), env.random_array());
    }
}
