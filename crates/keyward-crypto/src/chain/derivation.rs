//! Chain seed derivation using HKDF

use hkdf::Hkdf;
use sha2::Sha256;

/// Label used for chain seed derivation
const CHAIN_SEED_LABEL: &[u8] = b"keywardChainV1";

/// Derive a chain seed from a session root secret.
///
/// `direction` names the sending side (typically the sender's identity bytes)
/// so that the two directions of a session never share keys.
///
/// # Security
///
/// - Different roots produce unrelated seeds
/// - Different directions produce different seeds (direction isolation)
/// - Deterministic: same inputs always produce same output
pub fn derive_chain_seed(root_secret: &[u8], direction: &[u8]) -> [u8; 32] {
    let hkdf = Hkdf::<Sha256>::new(None, root_secret);

    let mut info = Vec::with_capacity(CHAIN_SEED_LABEL.len() + direction.len());
    info.extend_from_slice(CHAIN_SEED_LABEL);
    info.extend_from_slice(direction);

    let mut seed = [0u8; 32];
    let Ok(()) = hkdf.expand(&info, &mut seed) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };

    seed
}
