//! # Address Deriver
//!
//! Turns a verified identity token plus the user's salt into a stable ledger
//! address.
//!
//! The real derivation lives on the ledger side: a zero-knowledge proof
//! capability proves possession of a provider-signed token without revealing
//! it, and the ledger computes the address from the public inputs. We treat
//! that capability as an opaque boundary ([`ProofCapability`]) and trust
//! what it returns.
//!
//! [`LocalProofCapability`] is the in-process stand-in used by the devnet
//! backend and the tests. It reproduces the shape of the ledger's address
//! computation:
//!
//! ```text
//! address_seed = BLAKE3-derive_key(ADDRESS_SEED_CONTEXT,
//!                    salt (decimal) || 0x00 || sub || 0x00 || aud)
//! address      = BLAKE3(0x05 || len(iss) || iss || address_seed)
//! ```
//!
//! Same claims and salt in, same address out. The ephemeral key is not an
//! input, so every login of the same person lands on the same account.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::salt::Salt;
use super::token::{decode_claims, TokenError};
use crate::config::{ADDRESS_LENGTH, ADDRESS_SEED_CONTEXT, ZKLOGIN_ADDRESS_FLAG};
use crate::crypto::hash::{blake3_hash_multi, domain_separated_hash};
use crate::recovery::Recovery;

// ---------------------------------------------------------------------------
// LedgerAddress
// ---------------------------------------------------------------------------

/// Errors parsing a textual ledger address.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("address must start with 0x")]
    MissingPrefix,

    #[error("address must be {expected} hex characters, got {got}")]
    InvalidLength { expected: usize, got: usize },

    #[error("address contains non-hex characters")]
    InvalidHex,
}

/// A 32-byte ledger account address, rendered `0x` + 64 lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LedgerAddress([u8; ADDRESS_LENGTH]);

impl LedgerAddress {
    pub fn from_bytes(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    /// The address controlled by a plain Ed25519 key (scheme flag 0x00).
    ///
    /// Used for sponsor accounts, which are ordinary keypairs rather than
    /// token-derived identities.
    pub fn from_public_key(public_key: &crate::crypto::LedgerPublicKey) -> Self {
        Self(blake3_hash_multi(&[
            &[crate::config::ED25519_SCHEME_FLAG],
            public_key.as_bytes(),
        ]))
    }
}

impl fmt::Display for LedgerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for LedgerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LedgerAddress({})", self)
    }
}

impl FromStr for LedgerAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or(AddressError::MissingPrefix)?;
        if digits.len() != ADDRESS_LENGTH * 2 {
            return Err(AddressError::InvalidLength {
                expected: ADDRESS_LENGTH * 2,
                got: digits.len(),
            });
        }
        let mut bytes = [0u8; ADDRESS_LENGTH];
        hex::decode_to_slice(digits, &mut bytes).map_err(|_| AddressError::InvalidHex)?;
        Ok(Self(bytes))
    }
}

impl Serialize for LedgerAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for LedgerAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(serde::de::Error::custom)
        } else {
            <[u8; ADDRESS_LENGTH]>::deserialize(deserializer).map(Self)
        }
    }
}

// ---------------------------------------------------------------------------
// Proof capability boundary
// ---------------------------------------------------------------------------

/// Failures of the proof capability.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProofError {
    /// The capability could not read the token it was handed.
    #[error("proof capability rejected the token: {0}")]
    InvalidToken(#[from] TokenError),

    /// The capability itself was unreachable or failed.
    #[error("proof capability unavailable: {0}")]
    Unavailable(String),

    /// The token's nonce does not commit to the key presented with it.
    #[error("token nonce does not commit to this ephemeral key")]
    KeyNotBound,
}

impl ProofError {
    pub fn recovery(&self) -> Recovery {
        match self {
            ProofError::InvalidToken(e) => e.recovery(),
            ProofError::Unavailable(_) => Recovery::Retry,
            ProofError::KeyNotBound => Recovery::RestartFlow,
        }
    }
}

/// The ledger-side capability that maps (token, salt) to an address.
#[async_trait]
pub trait ProofCapability: Send + Sync {
    async fn derive_address(&self, token: &str, salt: Salt) -> Result<LedgerAddress, ProofError>;
}

/// In-process derivation for devnet and tests.
///
/// Accepts a token only if one of its audiences is `client_id`; that
/// audience is the one bound into the address seed.
#[derive(Debug, Clone)]
pub struct LocalProofCapability {
    client_id: String,
}

impl LocalProofCapability {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
        }
    }

    /// Synchronous derivation, shared by the async trait impl and the
    /// backend's sender check.
    pub fn derive_sync(&self, token: &str, salt: Salt) -> Result<LedgerAddress, ProofError> {
        let (claims, auds) = decode_claims(token)?;
        if !auds.iter().any(|aud| aud == &self.client_id) {
            return Err(TokenError::InvalidAudience {
                expected: self.client_id.clone(),
                got: auds,
            }
            .into());
        }
        Ok(compute_address(&claims.iss, &claims.sub, &self.client_id, salt))
    }
}

#[async_trait]
impl ProofCapability for LocalProofCapability {
    async fn derive_address(&self, token: &str, salt: Salt) -> Result<LedgerAddress, ProofError> {
        self.derive_sync(token, salt)
    }
}

/// The address function itself.
pub fn compute_address(iss: &str, sub: &str, aud: &str, salt: Salt) -> LedgerAddress {
    let salt_decimal = salt.to_string();
    let seed = domain_separated_hash(
        ADDRESS_SEED_CONTEXT,
        &[
            salt_decimal.as_bytes(),
            &[0],
            sub.as_bytes(),
            &[0],
            aud.as_bytes(),
        ],
    );
    // Issuers are URLs; anything longer than 255 bytes is truncated in the
    // length byte only, never in the hashed bytes.
    let iss_len = u8::try_from(iss.len()).unwrap_or(u8::MAX);
    LedgerAddress(blake3_hash_multi(&[
        &[ZKLOGIN_ADDRESS_FLAG, iss_len],
        iss.as_bytes(),
        &seed,
    ]))
}

// ---------------------------------------------------------------------------
// Deriver
// ---------------------------------------------------------------------------

/// Stateless front door to whichever [`ProofCapability`] is configured.
pub struct AddressDeriver;

impl AddressDeriver {
    /// Ask the capability for the address of `token` under `salt`.
    ///
    /// The caller must already have verified the token.
    pub async fn derive(
        token: &str,
        salt: Salt,
        capability: &dyn ProofCapability,
    ) -> Result<LedgerAddress, ProofError> {
        let address = capability.derive_address(token, salt).await?;
        tracing::debug!(%address, "address derived");
        Ok(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::salt::derive_salt;
    use crate::identity::token::encode_unsigned_token;
    use serde_json::json;

    fn token(sub: &str, aud: &str) -> String {
        encode_unsigned_token(&json!({
            "sub": sub,
            "aud": aud,
            "exp": 4_000_000_000u64,
            "iss": "https://accounts.example.com",
        }))
    }

    #[tokio::test]
    async fn same_claims_and_salt_give_the_same_address() {
        let cap = LocalProofCapability::new("waypoint-web");
        let t = token("abc123", "waypoint-web");
        let salt = derive_salt("abc123");
        let a = AddressDeriver::derive(&t, salt, &cap).await.unwrap();
        let b = AddressDeriver::derive(&t, salt, &cap).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn different_subjects_or_salts_give_different_addresses() {
        let cap = LocalProofCapability::new("waypoint-web");
        let a = cap
            .derive_address(&token("abc123", "waypoint-web"), derive_salt("abc123"))
            .await
            .unwrap();
        let b = cap
            .derive_address(&token("abc124", "waypoint-web"), derive_salt("abc124"))
            .await
            .unwrap();
        let c = cap
            .derive_address(&token("abc123", "waypoint-web"), derive_salt("other"))
            .await
            .unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn foreign_audience_is_refused() {
        let cap = LocalProofCapability::new("waypoint-web");
        let err = cap
            .derive_address(&token("abc123", "someone-else"), derive_salt("abc123"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProofError::InvalidToken(TokenError::InvalidAudience { .. })
        ));
    }

    #[test]
    fn address_text_form_roundtrips() {
        let address = compute_address("iss", "sub", "aud", derive_salt("sub"));
        let text = address.to_string();
        assert!(text.starts_with("0x"));
        assert_eq!(text.len(), 66);
        assert_eq!(text.parse::<LedgerAddress>().unwrap(), address);
        assert_eq!(text.to_uppercase().replacen("0X", "0x", 1).parse::<LedgerAddress>().unwrap(), address);
    }

    #[test]
    fn malformed_addresses_are_rejected() {
        assert_eq!(
            "1234".parse::<LedgerAddress>(),
            Err(AddressError::MissingPrefix)
        );
        assert!(matches!(
            "0x1234".parse::<LedgerAddress>(),
            Err(AddressError::InvalidLength { .. })
        ));
        let bad = format!("0x{}", "zz".repeat(32));
        assert_eq!(bad.parse::<LedgerAddress>(), Err(AddressError::InvalidHex));
    }

    #[test]
    fn address_serializes_as_string_in_json() {
        let address = compute_address("iss", "sub", "aud", derive_salt("sub"));
        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(json, format!("\"{address}\""));
        let back: LedgerAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, address);
    }

    #[test]
    fn sponsor_address_differs_from_identity_address_space() {
        let kp = crate::crypto::LedgerKeypair::from_seed(&[9u8; 32]);
        let a = LedgerAddress::from_public_key(&kp.public_key());
        assert_eq!(a, LedgerAddress::from_public_key(&kp.public_key()));
    }
}
