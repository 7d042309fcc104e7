//! # Key Management
//!
//! Ed25519 keypairs for the two signing authorities in Waypoint: the user's
//! per-login ephemeral key and the sponsor's gas key. Both are plain Ed25519;
//! what separates them is who holds them, not the math.
//!
//! Secret halves are wiped when dropped (ed25519-dalek's `zeroize` feature)
//! and fresh keys come from `OsRng`. Nothing in here logs.

use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, VerifyingKey, SECRET_KEY_LENGTH};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// Malformed key or signature bytes. Messages never echo the input.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("secret key must be 32 bytes of hex")]
    InvalidSecretKey,

    #[error("public key is not a 32-byte Ed25519 point")]
    InvalidPublicKey,

    #[error("signature must be exactly 64 bytes")]
    InvalidSignature,
}

/// An Ed25519 keypair.
///
/// Not `Serialize`. Secrets leave only through `secret_key_bytes()` and come
/// back through `from_seed()` or `from_hex()`.
///
/// # Examples
///
/// ```
/// use waypoint_protocol::crypto::keys::LedgerKeypair;
///
/// let kp = LedgerKeypair::generate();
/// let sig = kp.sign(b"gas for alice");
/// assert!(kp.verify(b"gas for alice", &sig));
/// ```
pub struct LedgerKeypair {
    signing_key: SigningKey,
}

/// Public half of a [`LedgerKeypair`]. The sponsor's one doubles as the gas owner key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerPublicKey {
    bytes: [u8; 32],
}

/// Raw Ed25519 signature, before any wire framing.
///
/// Stored as `Vec<u8>` for serde compatibility, but always exactly 64 bytes
/// when produced by us. A signature of any other length simply fails
/// verification.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSignature {
    bytes: Vec<u8>,
}

impl LedgerKeypair {
    /// New random keypair.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Keypair from a 32-byte secret. Tests and key files use this.
    pub fn from_seed(seed: &[u8; SECRET_KEY_LENGTH]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Parses the sponsor key file format: 64 hex chars, surrounding
    /// whitespace ignored.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_str.trim()).map_err(|_| KeyError::InvalidSecretKey)?;
        let arr: [u8; SECRET_KEY_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(Self::from_seed(&arr))
    }

    /// Public half.
    pub fn public_key(&self) -> LedgerPublicKey {
        LedgerPublicKey {
            bytes: self.signing_key.verifying_key().to_bytes(),
        }
    }

    /// Sign a message. Ed25519 signatures are deterministic.
    pub fn sign(&self, message: &[u8]) -> LedgerSignature {
        LedgerSignature {
            bytes: self.signing_key.sign(message).to_bytes().to_vec(),
        }
    }

    pub fn verify(&self, message: &[u8], signature: &LedgerSignature) -> bool {
        self.public_key().verify(message, signature)
    }

    /// Raw secret, for writing the sponsor key file. Wrap it in
    /// `Zeroizing` if it has to outlive the call.
    pub fn secret_key_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }
}

impl Clone for LedgerKeypair {
    fn clone(&self) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&self.signing_key.to_bytes()),
        }
    }
}

impl fmt::Debug for LedgerKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LedgerKeypair(pub={})", self.public_key().to_hex())
    }
}

impl PartialEq for LedgerKeypair {
    /// Compares public halves only.
    fn eq(&self, other: &Self) -> bool {
        self.public_key() == other.public_key()
    }
}

impl Eq for LedgerKeypair {}

// ---------------------------------------------------------------------------
// LedgerPublicKey
// ---------------------------------------------------------------------------

impl LedgerPublicKey {
    /// Create a `LedgerPublicKey` from raw bytes without point validation.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Try to create a public key from a byte slice, validating the length
    /// and that the bytes decode to an Ed25519 point.
    pub fn try_from_slice(slice: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; 32] = slice.try_into().map_err(|_| KeyError::InvalidPublicKey)?;
        VerifyingKey::from_bytes(&bytes).map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Strict verification: rejects small-order keys and non-canonical
    /// signatures that lenient implementations let through.
    pub fn verify(&self, message: &[u8], signature: &LedgerSignature) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.bytes) else {
            return false;
        };
        let Some(dalek_sig) = signature.to_dalek_signature() else {
            return false;
        };
        verifying_key.verify_strict(message, &dalek_sig).is_ok()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s).map_err(|_| KeyError::InvalidPublicKey)?;
        Self::try_from_slice(&bytes)
    }
}

impl Hash for LedgerPublicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

impl fmt::Display for LedgerPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for LedgerPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LedgerPublicKey({})", &self.to_hex()[..16])
    }
}

// ---------------------------------------------------------------------------
// LedgerSignature
// ---------------------------------------------------------------------------

impl LedgerSignature {
    /// Create a signature from its raw 64-byte representation.
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }

    /// Create a signature from a slice, rejecting anything but 64 bytes.
    pub fn try_from_slice(slice: &[u8]) -> Result<Self, KeyError> {
        if slice.len() != 64 {
            return Err(KeyError::InvalidSignature);
        }
        Ok(Self {
            bytes: slice.to_vec(),
        })
    }

    /// Returns the raw signature bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// `None` when the stored bytes are not 64 long.
    pub fn to_dalek_signature(&self) -> Option<DalekSignature> {
        <[u8; 64]>::try_from(self.bytes.as_slice())
            .ok()
            .map(|raw| DalekSignature::from_bytes(&raw))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

impl fmt::Debug for LedgerSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bytes.len() {
            64 => write!(
                f,
                "LedgerSignature({}..{})",
                hex::encode(&self.bytes[..4]),
                hex::encode(&self.bytes[60..])
            ),
            n => write!(f, "LedgerSignature(<{n} bytes>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sponsor_key_signs_and_verifies() {
        let kp = LedgerKeypair::generate();
        let sig = kp.sign(b"sponsor gas for tx 1");
        assert!(kp.verify(b"sponsor gas for tx 1", &sig));
    }

    #[test]
    fn signature_is_bound_to_message() {
        let kp = LedgerKeypair::generate();
        let sig = kp.sign(b"gas for tx 1");
        assert!(!kp.verify(b"gas for tx 2", &sig));
    }

    #[test]
    fn user_signature_does_not_pass_as_sponsor() {
        let user = LedgerKeypair::generate();
        let sponsor = LedgerKeypair::generate();
        let sig = user.sign(b"tx bytes");
        assert!(!sponsor.verify(b"tx bytes", &sig));
    }

    #[test]
    fn key_file_contents_restore_the_key() {
        let kp = LedgerKeypair::generate();
        let restored = LedgerKeypair::from_hex(&hex::encode(kp.secret_key_bytes())).unwrap();
        assert_eq!(kp, restored);
    }

    #[test]
    fn malformed_key_files_rejected() {
        assert!(LedgerKeypair::from_hex("deadbeef").is_err());
        assert!(LedgerKeypair::from_hex("not-hex-at-all").is_err());
    }

    #[test]
    fn key_file_trailing_newline_ignored() {
        // Key files written by `echo` end with a newline.
        let kp = LedgerKeypair::from_seed(&[7u8; 32]);
        let text = format!("{}\n", hex::encode(kp.secret_key_bytes()));
        assert_eq!(LedgerKeypair::from_hex(&text).unwrap(), kp);
    }

    #[test]
    fn public_key_parses_from_its_hex() {
        let pk = LedgerKeypair::generate().public_key();
        assert_eq!(LedgerPublicKey::from_hex(&pk.to_hex()).unwrap(), pk);
    }

    #[test]
    fn short_public_key_rejected() {
        assert!(LedgerPublicKey::try_from_slice(&[0u8; 16]).is_err());
    }

    #[test]
    fn signature_must_be_64_bytes() {
        assert!(LedgerSignature::try_from_slice(&[0u8; 63]).is_err());
        assert!(LedgerSignature::try_from_slice(&[0u8; 64]).is_ok());
    }

    #[test]
    fn same_secret_same_gas_owner() {
        let a = LedgerKeypair::from_seed(&[42u8; 32]);
        let b = LedgerKeypair::from_seed(&[42u8; 32]);
        assert_eq!(a.public_key(), b.public_key());
        assert_eq!(a.sign(b"tx"), b.sign(b"tx"));
    }

    #[test]
    fn debug_shows_public_half_only() {
        let kp = LedgerKeypair::from_seed(&[9u8; 32]);
        let shown = format!("{kp:?}");
        assert!(shown.starts_with("LedgerKeypair(pub="));
        assert!(!shown.contains(&hex::encode([9u8; 32])));
    }

    #[test]
    fn truncated_signature_does_not_verify() {
        let kp = LedgerKeypair::generate();
        let sig = kp.sign(b"tx");
        let truncated = LedgerSignature {
            bytes: sig.as_bytes()[..32].to_vec(),
        };
        assert!(!kp.verify(b"tx", &truncated));
        assert_eq!(format!("{truncated:?}"), "LedgerSignature(<32 bytes>)");
    }
}
