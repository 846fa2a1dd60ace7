//! Content fingerprints used as deduplication keys.

use sha2::{Digest, Sha256};

/// SHA-256 of `bytes`, hex encoded (64 lowercase characters).
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
