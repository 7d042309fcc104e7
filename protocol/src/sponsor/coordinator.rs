//! # Sponsorship Coordinator
//!
//! The device side of a gas-free transfer. One call, five steps, no
//! retries:
//!
//! ```text
//!  1. validate locally                 -> InvalidRequest
//!  2. POST /sponsor (bearer token)     -> SponsorUnavailable
//!  3. check the returned transaction   -> SponsorMismatch
//!  4. sign the exact bytes as sender   -> MissingSignature
//!  5. submit [user sig, sponsor sig]   -> LedgerRejected / LedgerUnavailable
//! ```
//!
//! The bytes the sponsor returns are held in one immutable buffer from
//! receipt to submission. The user signs those bytes, never a re-encoding.
//!
//! Dropping the future before step 5 has no on-chain effect: nothing
//! reaches the ledger until both signatures exist.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use std::sync::Arc;

use super::backend::{SponsorBackend, SponsoredResponse};
use super::error::SponsorError;
use super::request::{SponsorshipRequest, ValidatedRequest};
use crate::ledger::LedgerClient;
use crate::session::{BridgedIdentity, EphemeralSigner};
use crate::transaction::{CoSignedTransaction, SponsorSignature, SponsoredTransactionData, TransactionDigest};

/// Runs sponsored transfers for a logged-in identity.
#[derive(Clone)]
pub struct SponsorshipCoordinator {
    backend: Arc<dyn SponsorBackend>,
    ledger: Arc<dyn LedgerClient>,
}

impl SponsorshipCoordinator {
    pub fn new(backend: Arc<dyn SponsorBackend>, ledger: Arc<dyn LedgerClient>) -> Self {
        Self { backend, ledger }
    }

    /// Send `request` on behalf of `identity`, signing with `signer`.
    ///
    /// `signer` is `None` when the session has an identity but no key
    /// material (after a restart). The sponsor is still asked first, so the
    /// caller learns about backend problems before being sent back to
    /// login.
    pub async fn send(
        &self,
        identity: &BridgedIdentity,
        signer: Option<&EphemeralSigner>,
        request: &SponsorshipRequest,
    ) -> Result<TransactionDigest, SponsorError> {
        let expected = request.validate(&identity.address)?;
        let token = identity
            .token
            .as_deref()
            .ok_or(SponsorError::NotAuthenticated)?;

        let response = self.backend.sponsor(token, request).await?;
        let (bytes, sponsor_signature) = decode_response(&response)?;
        let data = check_sponsored(&bytes, &sponsor_signature, &expected)?;
        tracing::debug!(
            sender = %data.sender,
            gas_owner = %data.gas.owner,
            expiration_epoch = data.expiration_epoch,
            "sponsored transaction accepted for signing"
        );

        let signer = signer
            .filter(|s| s.address() == identity.address)
            .ok_or(SponsorError::MissingSignature)?;
        let user_signature = signer.sign(&bytes);

        let tx = CoSignedTransaction::new(bytes, sponsor_signature, user_signature);
        match self.ledger.submit(&tx).await {
            Ok(digest) => {
                tracing::info!(%digest, asset = %data.transfer.asset_type(), "sponsored transaction executed");
                Ok(digest)
            }
            Err(e) => {
                tracing::warn!(digest = %tx.digest(), error = %e, "ledger refused sponsored transaction");
                Err(e.into())
            }
        }
    }
}

impl std::fmt::Debug for SponsorshipCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SponsorshipCoordinator").finish_non_exhaustive()
    }
}

fn decode_response(response: &SponsoredResponse) -> Result<(Bytes, SponsorSignature), SponsorError> {
    let bytes = BASE64
        .decode(response.sponsored_tx_bytes.trim())
        .map_err(|e| SponsorError::SponsorUnavailable(format!("sponsoredTxBytes is not base64: {e}")))?;
    let signature = SponsorSignature::decode(&response.sponsor_signature)
        .map_err(|e| SponsorError::SponsorUnavailable(format!("sponsorSignature: {e}")))?;
    Ok((Bytes::from(bytes), signature))
}

/// Make sure the sponsor returned the transfer that was asked for, paid by
/// someone other than the sender, and signed it.
fn check_sponsored(
    bytes: &[u8],
    sponsor_signature: &SponsorSignature,
    expected: &ValidatedRequest,
) -> Result<SponsoredTransactionData, SponsorError> {
    let mismatch = |what: &str| SponsorError::SponsorMismatch(what.to_string());

    let data = SponsoredTransactionData::from_bytes(bytes)
        .map_err(|e| SponsorError::SponsorMismatch(format!("undecodable transaction: {e}")))?;
    if data.sender != expected.sender {
        return Err(mismatch("sender"));
    }
    if data.recipient != expected.recipient {
        return Err(mismatch("recipient"));
    }
    if data.transfer != expected.transfer {
        return Err(mismatch("transfer"));
    }
    if data.gas.owner == data.sender {
        return Err(mismatch("gas owner is the sender"));
    }
    if sponsor_signature.public_key() != &data.gas.owner_key {
        return Err(mismatch("sponsor signature is not from the gas owner"));
    }
    if !sponsor_signature.verify(bytes) {
        return Err(mismatch("sponsor signature does not cover these bytes"));
    }
    Ok(data)
}
