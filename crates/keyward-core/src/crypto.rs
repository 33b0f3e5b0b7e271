//! Crypto engine contract.

use keyward_crypto::{KeyPair, sha512};

use crate::Environment;

/// Key generation, hashing and randomness used by the orchestrator.
///
/// Implementations must be usable from any thread; the orchestrator shares a
/// single engine with every group store it builds.
pub trait CryptoEngine: Send + Sync + 'static {
    /// Generate a fresh identity key pair.
    fn generate_key_pair(&self) -> KeyPair;

    /// SHA-512 digest of `data`.
    fn hash(&self, data: &[u8]) -> [u8; 64];

    /// Fill `buffer` with cryptographically secure random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);
}

/// [`CryptoEngine`] drawing its randomness from an [`Environment`].
///
/// With a seeded simulation environment every generated key is reproducible.
#[derive(Clone)]
pub struct EnvCrypto<E: Environment> {
    env: E,
}

impl<E: Environment> EnvCrypto<E> {
    /// Create an engine over `env`.
    pub fn new(env: E) -> Self {
        Self { env }
    }
}

impl<E: Environment> CryptoEngine for EnvCrypto<E> {
    fn generate_key_pair(&self) -> KeyPair {
        let seed = zeroize::Zeroizing::new(self.env.random_array());
        KeyPair::from_seed(&seed)
    }

    fn hash(&self, data: &[u8]) -> [u8; 64] {
        sha512(data)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.env.random_bytes(buffer);
    }
}
