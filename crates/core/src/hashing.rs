//! Shared SHA-256 hex digest utility.
//!
//! Used to compare the automation shared secret without keeping the
//! configured plaintext next to request data.

use sha2::{Digest, Sha256};

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

/// Compare a presented secret against the digest of the expected one.
///
/// Both sides are reduced to fixed-length digests before comparison so the
/// comparison time does not depend on the presented secret's length.
pub fn secret_matches(presented: &str, expected_digest: &str) -> bool {
    let presented = sha256_hex(presented.as_bytes());
    presented
        .bytes()
        .zip(expected_digest.bytes())
        .fold(presented.len() ^ expected_digest.len(), |acc, (a, b)| {
            acc | usize::from(a ^ b)
        })
        == 0
}
