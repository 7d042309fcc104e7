//! Transaction signing for the two authorities.
//!
//! A sponsored transaction carries two signatures over the same bytes:
//!
//! - the **sponsor** signs as gas owner ([`SponsorSignature`]);
//! - the **user** signs as sender ([`UserSignature`]).
//!
//! They are distinct types so neither can be passed where the other is
//! expected. The only place they meet is
//! [`CoSignedTransaction`](super::CoSignedTransaction).
//!
//! ## Wire format
//!
//! ```text
//! base64( scheme flag (0x00 = Ed25519) || signature (64) || public key (32) )
//! ```
//!
//! 97 bytes before encoding. The public key travels with the signature so
//! the ledger can verify without a lookup.
//!
//! A user signature made inside a login session also carries the
//! [`SessionProof`] that ties its key to the sender address:
//!
//! ```text
//! base64( 0x05 || signature (64) || public key (32) || bincode(SessionProof) )
//! ```

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::fmt;

use super::verification::TransactionError;
use crate::config::{
    ED25519_SCHEME_FLAG, SIGNATURE_LENGTH, WIRE_SIGNATURE_LENGTH, ZKLOGIN_SCHEME_FLAG,
};
use crate::crypto::keys::{LedgerKeypair, LedgerPublicKey, LedgerSignature};
use crate::crypto::signatures::{sign_intent, verify_intent};
use crate::identity::SessionProof;

fn malformed(reason: impl Into<String>) -> TransactionError {
    TransactionError::MalformedSignature {
        reason: reason.into(),
    }
}

fn decode_base64(encoded: &str) -> Result<Vec<u8>, TransactionError> {
    BASE64
        .decode(encoded.trim())
        .map_err(|e| malformed(format!("not base64: {e}")))
}

// ---------------------------------------------------------------------------
// WireSignature
// ---------------------------------------------------------------------------

/// An intent signature plus the key that made it.
#[derive(Clone, PartialEq, Eq)]
pub struct WireSignature {
    signature: LedgerSignature,
    public_key: LedgerPublicKey,
}

impl WireSignature {
    pub fn new(signature: LedgerSignature, public_key: LedgerPublicKey) -> Self {
        Self {
            signature,
            public_key,
        }
    }

    pub fn signature(&self) -> &LedgerSignature {
        &self.signature
    }

    pub fn public_key(&self) -> &LedgerPublicKey {
        &self.public_key
    }

    /// Whether this signs the intent message of exactly `tx_bytes`.
    pub fn verify(&self, tx_bytes: &[u8]) -> bool {
        verify_intent(&self.public_key, tx_bytes, &self.signature)
    }

    /// Serialize to the 97-byte wire form, base64-encoded.
    pub fn encode(&self) -> String {
        BASE64.encode(self.to_raw(ED25519_SCHEME_FLAG))
    }

    /// Parse the base64 wire form.
    pub fn decode(encoded: &str) -> Result<Self, TransactionError> {
        let raw = decode_base64(encoded)?;
        if raw.len() != WIRE_SIGNATURE_LENGTH {
            return Err(malformed(format!(
                "expected {WIRE_SIGNATURE_LENGTH} bytes, got {}",
                raw.len()
            )));
        }
        if raw[0] != ED25519_SCHEME_FLAG {
            return Err(malformed(format!(
                "unsupported signature scheme 0x{:02x}",
                raw[0]
            )));
        }
        Self::from_parts(&raw[1..])
    }

    fn to_raw(&self, flag: u8) -> Vec<u8> {
        let mut raw = Vec::with_capacity(WIRE_SIGNATURE_LENGTH);
        raw.push(flag);
        raw.extend_from_slice(self.signature.as_bytes());
        raw.extend_from_slice(self.public_key.as_bytes());
        raw
    }

    /// Signature then key, without the flag byte.
    fn from_parts(parts: &[u8]) -> Result<Self, TransactionError> {
        let (sig, key) = parts.split_at(SIGNATURE_LENGTH);
        let signature = LedgerSignature::try_from_slice(sig).map_err(|e| malformed(e.to_string()))?;
        let public_key = LedgerPublicKey::try_from_slice(key).map_err(|e| malformed(e.to_string()))?;
        Ok(Self::new(signature, public_key))
    }
}

impl fmt::Debug for WireSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WireSignature(key={:?})", self.public_key)
    }
}

// ---------------------------------------------------------------------------
// Authority-specific signatures
// ---------------------------------------------------------------------------

/// The sender's signature. Produced by the user's ephemeral key, with the
/// session proof the ledger needs to accept that key for the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSignature {
    wire: WireSignature,
    proof: Option<SessionProof>,
}

/// The gas owner's signature. Produced by the sponsor's key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SponsorSignature(WireSignature);

impl UserSignature {
    /// A bare signature, without a session proof.
    pub fn new(signature: LedgerSignature, public_key: LedgerPublicKey) -> Self {
        Self::from_wire(WireSignature::new(signature, public_key))
    }

    /// Assign a decoded wire signature to the sender role.
    pub fn from_wire(wire: WireSignature) -> Self {
        Self { wire, proof: None }
    }

    pub fn with_proof(mut self, proof: SessionProof) -> Self {
        self.proof = Some(proof);
        self
    }

    pub fn proof(&self) -> Option<&SessionProof> {
        self.proof.as_ref()
    }

    /// Parse either wire form.
    pub fn decode(encoded: &str) -> Result<Self, TransactionError> {
        let raw = decode_base64(encoded)?;
        if raw.first() != Some(&ZKLOGIN_SCHEME_FLAG) {
            return WireSignature::decode(encoded).map(Self::from_wire);
        }
        if raw.len() <= WIRE_SIGNATURE_LENGTH {
            return Err(malformed(format!(
                "session signature of {} bytes carries no proof",
                raw.len()
            )));
        }
        let wire = WireSignature::from_parts(&raw[1..WIRE_SIGNATURE_LENGTH])?;
        let proof: SessionProof = bincode::deserialize(&raw[WIRE_SIGNATURE_LENGTH..])
            .map_err(|e| malformed(format!("bad session proof: {e}")))?;
        Ok(Self::from_wire(wire).with_proof(proof))
    }

    pub fn encode(&self) -> String {
        let Some(proof) = &self.proof else {
            return self.wire.encode();
        };
        let mut raw = self.wire.to_raw(ZKLOGIN_SCHEME_FLAG);
        // A struct of strings, integers and bytes always serializes.
        if let Ok(encoded) = bincode::serialize(proof) {
            raw.extend_from_slice(&encoded);
        }
        BASE64.encode(raw)
    }

    pub fn public_key(&self) -> &LedgerPublicKey {
        self.wire.public_key()
    }

    pub fn verify(&self, tx_bytes: &[u8]) -> bool {
        self.wire.verify(tx_bytes)
    }

    pub fn as_wire(&self) -> &WireSignature {
        &self.wire
    }
}

impl SponsorSignature {
    /// Sign `tx_bytes` as gas owner.
    pub fn sign(sponsor: &LedgerKeypair, tx_bytes: &[u8]) -> Self {
        Self(WireSignature::new(
            sign_intent(sponsor, tx_bytes),
            sponsor.public_key(),
        ))
    }

    /// Assign a decoded wire signature to the gas-owner role.
    pub fn from_wire(wire: WireSignature) -> Self {
        Self(wire)
    }

    pub fn decode(encoded: &str) -> Result<Self, TransactionError> {
        WireSignature::decode(encoded).map(Self)
    }

    pub fn encode(&self) -> String {
        self.0.encode()
    }

    pub fn public_key(&self) -> &LedgerPublicKey {
        self.0.public_key()
    }

    pub fn verify(&self, tx_bytes: &[u8]) -> bool {
        self.0.verify(tx_bytes)
    }

    pub fn as_wire(&self) -> &WireSignature {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
