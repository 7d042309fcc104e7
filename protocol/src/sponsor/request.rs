//! The sponsorship request and its local validation.

use serde::{Deserialize, Serialize};

use super::error::SponsorError;
use crate::identity::LedgerAddress;
use crate::transaction::{AssetType, TransferKind};

/// What the user wants to send. Body of `POST /sponsor`.
///
/// `objectId` is the object to move for `nft`, and the coin type for
/// `coin`. It is ignored for `native`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SponsorshipRequest {
    pub sender_address: String,
    pub recipient: String,
    #[serde(default)]
    pub amount: Option<u64>,
    pub asset_type: AssetType,
    #[serde(default)]
    pub object_id: Option<String>,
}

/// A request that passed validation, in ledger terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    pub sender: LedgerAddress,
    pub recipient: LedgerAddress,
    pub transfer: TransferKind,
}

impl SponsorshipRequest {
    /// Native-coin transfer.
    pub fn native(sender: LedgerAddress, recipient: LedgerAddress, amount: u64) -> Self {
        Self {
            sender_address: sender.to_string(),
            recipient: recipient.to_string(),
            amount: Some(amount),
            asset_type: AssetType::Native,
            object_id: None,
        }
    }

    /// Check the request against the address of the identity sending it.
    ///
    /// - recipient present and a valid address;
    /// - sender is `identity_address`;
    /// - amount present and positive, unless NFT;
    /// - object id (or coin type) present, unless native.
    pub fn validate(&self, identity_address: &LedgerAddress) -> Result<ValidatedRequest, SponsorError> {
        let recipient = self.recipient.trim();
        if recipient.is_empty() {
            return Err(SponsorError::InvalidRequest("recipient is required".into()));
        }
        let recipient: LedgerAddress = recipient
            .parse()
            .map_err(|e| SponsorError::InvalidRequest(format!("recipient: {e}")))?;

        let sender: LedgerAddress = self
            .sender_address
            .trim()
            .parse()
            .map_err(|e| SponsorError::InvalidRequest(format!("senderAddress: {e}")))?;
        if &sender != identity_address {
            return Err(SponsorError::InvalidRequest(
                "senderAddress does not match the signed-in identity".into(),
            ));
        }

        let reference = self
            .object_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());

        let transfer = match self.asset_type {
            AssetType::Native => TransferKind::Native {
                amount: self.positive_amount()?,
            },
            AssetType::Coin => TransferKind::Coin {
                coin_type: reference
                    .ok_or_else(|| SponsorError::InvalidRequest("objectId (coin type) is required for coin transfers".into()))?
                    .to_string(),
                amount: self.positive_amount()?,
            },
            AssetType::Nft => TransferKind::Object {
                object_id: reference
                    .ok_or_else(|| SponsorError::InvalidRequest("objectId is required for nft transfers".into()))?
                    .to_string(),
            },
        };

        Ok(ValidatedRequest {
            sender,
            recipient,
            transfer,
        })
    }

    fn positive_amount(&self) -> Result<u64, SponsorError> {
        match self.amount {
            Some(amount) if amount > 0 => Ok(amount),
            Some(_) => Err(SponsorError::InvalidRequest("amount must be greater than zero".into())),
            None => Err(SponsorError::InvalidRequest(format!(
                "amount is required for {} transfers",
                self.asset_type
            ))),
        }
    }
}
