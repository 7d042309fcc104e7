//! Core type definitions for sponsored transactions.
//!
//! These types form the vocabulary shared by the device, the sponsor
//! backend and the ledger. They are small and mostly `Copy`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::config::NATIVE_COIN_TYPE;

// ---------------------------------------------------------------------------
// AssetType
// ---------------------------------------------------------------------------

/// Which kind of asset a sponsorship request moves.
///
/// Wire values are `"native"`, `"coin"` and `"nft"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    /// The ledger's native coin. Needs an amount.
    Native,
    /// A fungible coin of a specific type. Needs an amount and a coin type.
    Coin,
    /// A single owned object. Needs an object id, no amount.
    Nft,
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
            Self::Coin => write!(f, "coin"),
            Self::Nft => write!(f, "nft"),
        }
    }
}

// ---------------------------------------------------------------------------
// TransferKind
// ---------------------------------------------------------------------------

/// What the transaction moves from sender to recipient.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferKind {
    Native { amount: u64 },
    Coin { coin_type: String, amount: u64 },
    Object { object_id: String },
}

impl TransferKind {
    pub fn asset_type(&self) -> AssetType {
        match self {
            Self::Native { .. } => AssetType::Native,
            Self::Coin { .. } => AssetType::Coin,
            Self::Object { .. } => AssetType::Nft,
        }
    }

    /// Amount moved, for fungible transfers.
    pub fn amount(&self) -> Option<u64> {
        match self {
            Self::Native { amount } | Self::Coin { amount, .. } => Some(*amount),
            Self::Object { .. } => None,
        }
    }

    /// Coin type charged, for fungible transfers.
    pub fn coin_type(&self) -> Option<&str> {
        match self {
            Self::Native { .. } => Some(NATIVE_COIN_TYPE),
            Self::Coin { coin_type, .. } => Some(coin_type),
            Self::Object { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// TransactionDigest
// ---------------------------------------------------------------------------

/// BLAKE3 of the canonical transaction bytes, rendered base58.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionDigest([u8; 32]);

impl TransactionDigest {
    pub fn of(tx_bytes: &[u8]) -> Self {
        Self(crate::crypto::blake3_hash(tx_bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for TransactionDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for TransactionDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransactionDigest({})", self)
    }
}

/// A string that is not a base58-encoded 32-byte digest.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid transaction digest: {0}")]
pub struct DigestParseError(String);

impl FromStr for TransactionDigest {
    type Err = DigestParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decoded = bs58::decode(s)
            .into_vec()
            .map_err(|e| DigestParseError(e.to_string()))?;
        let bytes: [u8; 32] = decoded
            .try_into()
            .map_err(|v: Vec<u8>| DigestParseError(format!("expected 32 bytes, got {}", v.len())))?;
        Ok(Self(bytes))
    }
}

impl Serialize for TransactionDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TransactionDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
