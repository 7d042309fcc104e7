//! # Digital Signatures
//!
//! Ed25519 signing and verification for the two authorities that co-sign a
//! sponsored transaction.
//!
//! Both parties sign the same **intent message**, not the raw transaction
//! bytes:
//!
//! ```text
//! intent_message = BLAKE3(INTENT_PREFIX || tx_bytes)
//! ```
//!
//! The prefix pins the message type, so a signature over a transaction can
//! never be replayed as a signature over anything else. Hashing first keeps
//! the signed payload at 32 bytes regardless of transaction size.

use thiserror::Error;

use super::hash::blake3_hash_multi;
use super::keys::{LedgerKeypair, LedgerPublicKey, LedgerSignature};
use crate::config::INTENT_PREFIX;

/// Errors during signature operations.
///
/// Carries no detail about which check failed.
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("signature verification failed")]
    VerificationFailed,
}

/// Compute the 32-byte intent message both signers sign for `tx_bytes`.
pub fn intent_message(tx_bytes: &[u8]) -> [u8; 32] {
    blake3_hash_multi(&[INTENT_PREFIX, tx_bytes])
}

/// Sign transaction bytes under the intent scheme.
pub fn sign_intent(keypair: &LedgerKeypair, tx_bytes: &[u8]) -> LedgerSignature {
    keypair.sign(&intent_message(tx_bytes))
}

/// Verify an intent signature over transaction bytes.
pub fn verify_intent(
    public_key: &LedgerPublicKey,
    tx_bytes: &[u8],
    signature: &LedgerSignature,
) -> bool {
    public_key.verify(&intent_message(tx_bytes), signature)
}

/// Verify that every `(key, signature)` pair signs the same transaction bytes.
///
/// All signatures must be valid. If any single signature fails, the whole
/// set fails and we don't say which one.
pub fn verify_all_intent(
    tx_bytes: &[u8],
    signers: &[(&LedgerPublicKey, &LedgerSignature)],
) -> Result<(), SignatureError> {
    let message = intent_message(tx_bytes);
    for (public_key, signature) in signers {
        if !public_key.verify(&message, signature) {
            return Err(SignatureError::VerificationFailed);
        }
    }
    Ok(())
}
