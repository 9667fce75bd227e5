//! Cache key derivation

use sha2::{Digest, Sha256};

/// Derive the storage key for a normalized locator.
///
/// The key is the hex SHA-256 of the locator string as given. No URL
/// canonicalization happens here: `http://a.com/x` and `http://a.com/x/`
/// are different entries.
pub fn derive_key(locator: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(locator.as_bytes());
    hex::encode(hasher.finalize())
}

/// Whether a string has the shape of a key produced by [`derive_key`]
pub(crate) fn is_key(candidate: &str) -> bool {
    candidate.len() == 64 && candidate.bytes().all(|b| b.is_ascii_hexdigit())
}
