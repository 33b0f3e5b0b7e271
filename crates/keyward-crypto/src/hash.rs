//! Hashing and session id derivation.

use sha2::{Digest, Sha512};

use crate::CryptoError;

/// Identifiers must be strictly longer than this to derive a session id.
pub const MIN_IDENTIFIER_LEN: usize = 10;

/// Length of a derived session id.
pub const SESSION_ID_SIZE: usize = 32;

/// SHA-512 digest of `data`.
pub fn sha512(data: &[u8]) -> [u8; 64] {
    let digest = Sha512::digest(data);
    let mut out = [0u8; 64];
    out.copy_from_slice(&digest);
    out
}

/// Derive a 32-byte session id from an application identifier.
///
/// The id is the first half of the identifier's SHA-512 digest. Identifiers of
/// [`MIN_IDENTIFIER_LEN`] bytes or fewer are rejected.
pub fn compute_session_id(identifier: &[u8]) -> Result<[u8; SESSION_ID_SIZE], CryptoError> {
    if identifier.len() <= MIN_IDENTIFIER_LEN {
        return Err(CryptoError::IdentifierTooShort {
            len: identifier.len(),
            min: MIN_IDENTIFIER_LEN,
        });
    }

    let digest = sha512(identifier);
    let mut id = [0u8; SESSION_ID_SIZE];
    id.copy_from_slice(&digest[..SESSION_ID_SIZE]);
    Ok(id)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn boundary_length_is_rejected() {
        let result = compute_session_id(&[0u8; MIN_IDENTIFIER_LEN]);
        assert!(matches!(result, Err(CryptoError::IdentifierTooShort { len: 10, min: 10 })));
    }

    #[test]
    fn one_past_boundary_is_accepted() {
        assert!(compute_session_id(&[0u8; MIN_IDENTIFIER_LEN + 1]).is_ok());
    }

    #[test]
    fn session_id_is_digest_prefix() {
        let identifier = b"group-identifier-0001";
        let id = compute_session_id(identifier).unwrap();
        assert_eq!(id[..], sha512(identifier)[..SESSION_ID_SIZE]);
    }

    proptest! {
        #[test]
        fn prop_session_id_is_deterministic(identifier in prop::collection::vec(any::<u8>(), 11..128)) {
            prop_assert_eq!(compute_session_id(&identifier)?, compute_session_id(&identifier)?);
        }

        #[test]
        fn prop_short_identifiers_always_fail(identifier in prop::collection::vec(any::<u8>(), 0..=10)) {
            prop_assert!(compute_session_id(&identifier).is_err());
        }
    }
}
