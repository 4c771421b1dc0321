//! Deterministic object-id chain.
//!
//! Both peers derive the sequence of object keys from one shared seed, so
//! neither side ever has to signal "what comes next". The successor
//! function is a one-way hash: knowing the current key reveals the future
//! of the chain but never its past.

use sha2::{Digest, Sha256};

/// Successor of an object id: SHA-256 of its UTF-8 bytes as 64 lowercase
/// hex characters. Deterministic and byte-identical across peers.
pub fn next_object_id(current: &str) -> String {
    let digest = Sha256::digest(current.as_bytes());
    hex::encode(digest)
}

/// First object id of a chain: the successor of `prefix` + `seed`.
///
/// Links derive their initial fetch and post ids with distinct prefixes so
/// the two directions never share a chain.
pub fn seeded_object_id(prefix: &str, seed: &str) -> String {
    next_object_id(&format!("{prefix}{seed}"))
}
