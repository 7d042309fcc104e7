//! Sponsored transaction construction via the builder pattern.
//!
//! The [`SponsoredTransactionBuilder`] enforces a disciplined construction
//! flow: set the sender, recipient, transfer and gas, call `.build()`, and
//! get back a [`SponsoredTransactionData`] whose canonical bytes both
//! parties sign.
//!
//! The builder does not sign. That happens in [`super::signing`], once per
//! authority. This separation keeps construction testable without key
//! material.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::{TransactionDigest, TransferKind};
use super::verification::TransactionError;
use crate::config::{DEFAULT_GAS_BUDGET, DEFAULT_GAS_PRICE, TRANSACTION_VERSION};
use crate::crypto::LedgerPublicKey;
use crate::identity::LedgerAddress;

// ---------------------------------------------------------------------------
// GasData
// ---------------------------------------------------------------------------

/// Who pays for execution, and how much they are willing to pay.
///
/// The owner's public key is carried alongside the address so the ledger
/// can check the gas signature without a key lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasData {
    pub owner: LedgerAddress,
    pub owner_key: LedgerPublicKey,
    pub budget: u64,
    pub price: u64,
}

// ---------------------------------------------------------------------------
// SponsoredTransactionData
// ---------------------------------------------------------------------------

/// A transfer whose gas is paid by someone other than the sender.
///
/// # Canonical Byte Format
///
/// The bytes both parties sign are the bincode encoding of this struct,
/// produced by [`SponsoredTransactionData::to_bytes`]. The sponsor produces
/// them once; after that the bytes, not this struct, are the source of
/// truth. Anything that decodes them must re-encode to the same bytes.
///
/// `reference` is a random UUID that makes every sponsored transaction
/// unique, so identical transfers do not collide on the replay check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SponsoredTransactionData {
    pub version: u8,
    pub sender: LedgerAddress,
    pub recipient: LedgerAddress,
    pub transfer: TransferKind,
    pub gas: GasData,
    /// Last epoch in which the ledger will accept this transaction.
    pub expiration_epoch: u64,
    pub reference: Uuid,
}

impl SponsoredTransactionData {
    /// Canonical bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TransactionError> {
        bincode::serialize(self).map_err(|e| TransactionError::Encoding(e.to_string()))
    }

    /// Decode canonical bytes.
    ///
    /// Rejects trailing garbage and unknown versions. A decoded transaction
    /// re-encodes to exactly the input.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TransactionError> {
        let data: Self =
            bincode::deserialize(bytes).map_err(|e| TransactionError::Encoding(e.to_string()))?;
        if data.version != TRANSACTION_VERSION {
            return Err(TransactionError::UnsupportedVersion(data.version));
        }
        if data.to_bytes()? != bytes {
            return Err(TransactionError::Encoding("non-canonical encoding".into()));
        }
        Ok(data)
    }

    /// Digest of the canonical bytes.
    pub fn digest(&self) -> Result<TransactionDigest, TransactionError> {
        Ok(TransactionDigest::of(&self.to_bytes()?))
    }

    /// Highest fee the sponsor can be charged.
    pub fn max_gas_fee(&self) -> u64 {
        self.gas.budget.saturating_mul(self.gas.price)
    }
}

// ---------------------------------------------------------------------------
// SponsoredTransactionBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for [`SponsoredTransactionData`].
///
/// # Example
///
/// ```
/// use waypoint_protocol::crypto::LedgerKeypair;
/// use waypoint_protocol::identity::LedgerAddress;
/// use waypoint_protocol::transaction::SponsoredTransactionBuilder;
///
/// let sponsor = LedgerKeypair::generate();
/// let alice = LedgerAddress::from_bytes([1u8; 32]);
/// let bob = LedgerAddress::from_bytes([2u8; 32]);
///
/// let tx = SponsoredTransactionBuilder::new(alice)
///     .recipient(bob)
///     .native(1_000)
///     .sponsor(sponsor.public_key())
///     .expiration_epoch(12)
///     .build()
///     .unwrap();
/// assert_eq!(tx.gas.budget, waypoint_protocol::config::DEFAULT_GAS_BUDGET);
/// ```
pub struct SponsoredTransactionBuilder {
    sender: LedgerAddress,
    recipient: Option<LedgerAddress>,
    transfer: Option<TransferKind>,
    sponsor: Option<LedgerPublicKey>,
    budget: u64,
    price: u64,
    expiration_epoch: u64,
    reference: Option<Uuid>,
}

impl SponsoredTransactionBuilder {
    /// Creates a builder for a transfer from `sender`.
    ///
    /// Defaults:
    /// - gas budget and price: `DEFAULT_GAS_BUDGET` / `DEFAULT_GAS_PRICE`
    /// - expiration epoch: `u64::MAX` (never expires)
    /// - reference: a fresh UUIDv4 at build time
    pub fn new(sender: LedgerAddress) -> Self {
        Self {
            sender,
            recipient: None,
            transfer: None,
            sponsor: None,
            budget: DEFAULT_GAS_BUDGET,
            price: DEFAULT_GAS_PRICE,
            expiration_epoch: u64::MAX,
            reference: None,
        }
    }

    pub fn recipient(mut self, recipient: LedgerAddress) -> Self {
        self.recipient = Some(recipient);
        self
    }

    /// Move `amount` of the native coin.
    pub fn native(mut self, amount: u64) -> Self {
        self.transfer = Some(TransferKind::Native { amount });
        self
    }

    /// Move `amount` of the coin `coin_type`.
    pub fn coin(mut self, coin_type: impl Into<String>, amount: u64) -> Self {
        self.transfer = Some(TransferKind::Coin {
            coin_type: coin_type.into(),
            amount,
        });
        self
    }

    /// Move the owned object `object_id`.
    pub fn object(mut self, object_id: impl Into<String>) -> Self {
        self.transfer = Some(TransferKind::Object {
            object_id: object_id.into(),
        });
        self
    }

    pub fn transfer(mut self, transfer: TransferKind) -> Self {
        self.transfer = Some(transfer);
        self
    }

    /// The gas owner. Its address is derived from the key.
    pub fn sponsor(mut self, sponsor_key: LedgerPublicKey) -> Self {
        self.sponsor = Some(sponsor_key);
        self
    }

    pub fn gas_budget(mut self, budget: u64) -> Self {
        self.budget = budget;
        self
    }

    pub fn gas_price(mut self, price: u64) -> Self {
        self.price = price;
        self
    }

    pub fn expiration_epoch(mut self, epoch: u64) -> Self {
        self.expiration_epoch = epoch;
        self
    }

    /// Pin the reference. Only tests need this.
    pub fn reference(mut self, reference: Uuid) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Consumes the builder.
    ///
    /// Fails if the recipient, transfer or sponsor was never set, or if the
    /// sponsor would be paying for its own transfer.
    pub fn build(self) -> Result<SponsoredTransactionData, TransactionError> {
        let recipient = self.recipient.ok_or(TransactionError::MissingField("recipient"))?;
        let transfer = self.transfer.ok_or(TransactionError::MissingField("transfer"))?;
        let owner_key = self.sponsor.ok_or(TransactionError::MissingField("sponsor"))?;
        let owner = LedgerAddress::from_public_key(&owner_key);
        if owner == self.sender {
            return Err(TransactionError::SelfSponsored);
        }

        Ok(SponsoredTransactionData {
            version: TRANSACTION_VERSION,
            sender: self.sender,
            recipient,
            transfer,
            gas: GasData {
                owner,
                owner_key,
                budget: self.budget,
                price: self.price,
            },
            expiration_epoch: self.expiration_epoch,
            reference: self.reference.unwrap_or_else(Uuid::new_v4),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
