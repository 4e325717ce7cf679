//! Auth key hashing and verification.
//!
//! Keys are stored as hex-encoded SHA-512 digests; the plaintext is never
//! written anywhere.

use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq;

/// Hex-encoded SHA-512 digest of `key`.
///
/// This is the form expected in the `auth_key` field of the authorization
/// document.
#[must_use]
pub fn hash_key(key: &str) -> String {
    hex::encode(Sha512::digest(key.as_bytes()))
}

/// Compare the digest of `presented` against the stored hex digest.
///
/// Returns `false` if either side is missing or empty, or if the stored
/// digest is not valid hex. The byte comparison is constant-time.
#[must_use]
pub fn verify_key(stored_hex: Option<&str>, presented: Option<&str>) -> bool {
    let (Some(stored_hex), Some(presented)) = (stored_hex, presented) else {
        return false;
    };
    let stored_hex = stored_hex.trim();
    if stored_hex.is_empty() || presented.is_empty() {
        return false;
    }
    let Ok(stored) = hex::decode(stored_hex) else {
        tracing::warn!("stored auth_key is not valid hex");
        return false;
    };

    let actual = Sha512::digest(presented.as_bytes());
    bool::from(actual.as_slice().ct_eq(&stored))
}
