//! Co-signed transaction assembly and verification.
//!
//! A [`CoSignedTransaction`] is the only place a [`UserSignature`] and a
//! [`SponsorSignature`] meet. It is valid only when both sign the intent
//! message of the same, byte-identical transaction bytes. Flip one byte
//! and both signatures fail together.
//!
//! The checks in [`CoSignedTransaction::verify`] are ordered from cheapest
//! to most expensive to fail fast:
//!
//! 1. **Decode**: the bytes are a canonical, supported-version transaction.
//! 2. **Gas owner**: the sponsor signature's key is the declared gas owner.
//! 3. **Distinct signers**: the user key is not the sponsor key.
//! 4. **Signatures**: both verify over the intent message of the bytes.

use bytes::Bytes;
use thiserror::Error;

use super::builder::SponsoredTransactionData;
use super::signing::{SponsorSignature, UserSignature};
use super::types::TransactionDigest;
use crate::crypto::signatures::verify_all_intent;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors building, decoding or verifying a sponsored transaction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransactionError {
    /// The bytes are not a canonical bincode transaction.
    #[error("transaction encoding error: {0}")]
    Encoding(String),

    #[error("unsupported transaction version {0}")]
    UnsupportedVersion(u8),

    /// The builder was consumed before a required field was set.
    #[error("missing transaction field: {0}")]
    MissingField(&'static str),

    /// The gas owner is also the sender.
    #[error("sponsor cannot pay gas for its own transfer")]
    SelfSponsored,

    /// A wire signature could not be parsed.
    #[error("malformed signature: {reason}")]
    MalformedSignature { reason: String },

    /// The sponsor signature was made by a key other than the gas owner's.
    #[error("sponsor signature is not from the gas owner")]
    GasOwnerMismatch,

    /// Both signatures come from the same key.
    #[error("user and sponsor signatures must come from distinct keys")]
    DuplicateSigner,

    /// At least one signature does not verify over these bytes. We do not
    /// say which.
    #[error("signature verification failed")]
    InvalidSignature,
}

// ---------------------------------------------------------------------------
// CoSignedTransaction
// ---------------------------------------------------------------------------

/// Sponsor-built bytes with both signatures attached. Submitted atomically.
#[derive(Debug, Clone)]
pub struct CoSignedTransaction {
    bytes: Bytes,
    sponsor: SponsorSignature,
    user: UserSignature,
}

impl CoSignedTransaction {
    pub fn new(bytes: Bytes, sponsor: SponsorSignature, user: UserSignature) -> Self {
        Self {
            bytes,
            sponsor,
            user,
        }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn sponsor_signature(&self) -> &SponsorSignature {
        &self.sponsor
    }

    pub fn user_signature(&self) -> &UserSignature {
        &self.user
    }

    pub fn digest(&self) -> TransactionDigest {
        TransactionDigest::of(&self.bytes)
    }

    /// Wire signatures in submission order: user first, sponsor second.
    pub fn wire_signatures(&self) -> Vec<String> {
        vec![self.user.encode(), self.sponsor.encode()]
    }

    /// Run every check and return the decoded transaction.
    pub fn verify(&self) -> Result<SponsoredTransactionData, TransactionError> {
        let data = SponsoredTransactionData::from_bytes(&self.bytes)?;

        if self.sponsor.public_key() != &data.gas.owner_key {
            return Err(TransactionError::GasOwnerMismatch);
        }
        if self.user.public_key() == self.sponsor.public_key() {
            return Err(TransactionError::DuplicateSigner);
        }

        verify_all_intent(
            &self.bytes,
            &[
                (self.user.public_key(), self.user.as_wire().signature()),
                (self.sponsor.public_key(), self.sponsor.as_wire().signature()),
            ],
        )
        .map_err(|_| TransactionError::InvalidSignature)?;

        Ok(data)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
