//! One direction of a ratchet session.
//!
//! A chain holds a single 32-byte chain key. Every step splits it with
//! HMAC-SHA256 into a message key and the next chain key, and the old chain
//! key is wiped. Holding the chain at generation `n` reveals nothing about
//! the keys of generations below `n`.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

use crate::CryptoError;

type HmacSha256 = Hmac<Sha256>;

const NEXT_CHAIN: u8 = 0x01;
const MESSAGE: u8 = 0x02;

/// Furthest a receiving chain will jump ahead in one call.
pub const MAX_SKIP: u32 = 1000;

/// Single-use key for one chain message.
#[derive(Clone)]
pub struct MessageKey {
    key: Zeroizing<[u8; 32]>,
    generation: u32,
}

impl MessageKey {
    /// AEAD key bytes.
    pub fn key(&self) -> &[u8; 32] {
        &self.key
    }

    /// Chain position the key belongs to.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// Forward-only symmetric chain.
pub struct SymmetricRatchet {
    chain_key: Zeroizing<[u8; 32]>,
    generation: u32,
}

impl SymmetricRatchet {
    /// Chain positioned at generation 0 with `seed` as its chain key.
    pub fn new(seed: &[u8; 32]) -> Self {
        Self { chain_key: Zeroizing::new(*seed), generation: 0 }
    }

    /// Chain resumed at `generation` with `chain_key` as its current key.
    pub fn resume(chain_key: &[u8; 32], generation: u32) -> Self {
        Self { chain_key: Zeroizing::new(*chain_key), generation }
    }

    /// Generation of the next key [`advance`](Self::advance) will hand out.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Take the key for the current generation and move one step forward.
    pub fn advance(&mut self) -> Result<MessageKey, CryptoError> {
        let next_generation = self
            .generation
            .checked_add(1)
            .ok_or(CryptoError::GenerationOverflow { current: self.generation })?;

        let (message_key, mut next_chain) = self.step();
        *self.chain_key = next_chain;
        next_chain.zeroize();

        let key = MessageKey { key: Zeroizing::new(message_key), generation: self.generation };
        self.generation = next_generation;
        Ok(key)
    }

    /// Jump to `target` and take its key, discarding the keys in between.
    ///
    /// A chain never moves backwards: `target` must be at or after the
    /// current generation and at most [`MAX_SKIP`] past it.
    pub fn advance_to(&mut self, target: u32) -> Result<MessageKey, CryptoError> {
        let reachable = target
            .checked_sub(self.generation)
            .is_some_and(|distance| distance <= MAX_SKIP);
        if !reachable {
            return Err(CryptoError::GenerationUnreachable {
                current: self.generation,
                requested: target,
            });
        }

        loop {
            let key = self.advance()?;
            if key.generation() == target {
                return Ok(key);
            }
        }
    }

    fn step(&self) -> ([u8; 32], [u8; 32]) {
        (self.expand(MESSAGE), self.expand(NEXT_CHAIN))
    }

    fn expand(&self, label: u8) -> [u8; 32] {
        let Ok(mut mac) = HmacSha256::new_from_slice(self.chain_key.as_slice()) else {
            unreachable!("HMAC accepts keys of any length");
        };
        mac.update(&[label]);
        mac.finalize().into_bytes().into()
    }
}
