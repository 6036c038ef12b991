// hasher.rs — SHA-256 of policy bytes.
//
// The config hash stamped on every decision record is the SHA-256 of the
// exact bytes the decision was evaluated against, as a 64-character
// lowercase hex string.

use sha2::{Digest, Sha256};

/// Hash arbitrary bytes, returning a lowercase hex-encoded SHA-256 string.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    // `format!("{:x}", ...)` produces lowercase hex
    format!("{:x}", result)
}
