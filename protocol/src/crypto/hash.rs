//! # Hashing Utilities
//!
//! Two hash functions, and we refuse to support more without a very good
//! reason:
//!
//! - **BLAKE3**: the default. Nonces, address seeds, transaction digests,
//!   and the intent message both signers sign all go through BLAKE3.
//!   Domain separation uses BLAKE3's `derive_key` mode.
//!
//! - **SHA-256**: only for token fingerprints in logs, where operators
//!   correlate against tooling that already speaks SHA-256.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash and return a fixed-size array.
pub fn sha256_array(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Compute the BLAKE3 hash of the input data.
///
/// # Example
///
/// ```
/// use waypoint_protocol::crypto::blake3_hash;
///
/// let hash = blake3_hash(b"waypoint");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Domain-separated BLAKE3 hash over a sequence of parts.
///
/// Uses BLAKE3's `derive_key` mode: a different context string gives a
/// different internal IV, so cross-context collisions are impossible by
/// construction. The parts are fed sequentially. Callers that hash
/// variable-length fields must add their own separators.
pub fn domain_separated_hash(context: &str, parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

/// Hash multiple byte slices together without concatenation overhead.
pub fn blake3_hash_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

/// Short, non-reversible fingerprint of a bearer token for log lines.
///
/// Raw identity tokens must never hit the logs; the first 8 bytes of their
/// SHA-256 are enough to correlate requests.
pub fn token_fingerprint(token: &str) -> String {
    hex::encode(&sha256_array(token.as_bytes())[..8])
}
