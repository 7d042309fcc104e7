//! # Cryptographic Primitives for Waypoint
//!
//! Every signing operation and every hash flows through here.
//!
//! - **Ed25519** for signatures: the user's ephemeral key and the sponsor's
//!   gas key are both Ed25519.
//! - **BLAKE3** for nonces, address seeds, digests, and intent messages.
//! - **SHA-256** for log fingerprints only.
//!
//! ## A note on "rolling your own crypto"
//!
//! We don't. Everything here is a thin, type-safe wrapper around audited
//! implementations.

pub mod hash;
pub mod keys;
pub mod signatures;

pub use hash::{blake3_hash, domain_separated_hash, sha256_array, token_fingerprint};
pub use keys::{KeyError, LedgerKeypair, LedgerPublicKey, LedgerSignature};
pub use signatures::{intent_message, sign_intent, verify_all_intent, verify_intent};
