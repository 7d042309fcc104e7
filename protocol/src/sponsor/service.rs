//! # Sponsor Service
//!
//! The backend half of sponsorship. Sits behind `POST /user` and
//! `POST /sponsor` and owns the sponsor key.
//!
//! For every call the bearer token is verified and the caller's address is
//! derived from it the same way the device does (salt from `sub`, then the
//! local proof capability). A request whose `senderAddress` is not that
//! address is refused, so one user cannot get gas for another user's
//! address.
//!
//! ```text
//!  token ──verify──► claims ──salt──► derive ──► caller address
//!                                                     │
//!  request ──validate(caller address)──► transfer ────┤
//!                                                     ▼
//!          build (gas owner = sponsor, expires epoch + window)
//!                                                     │
//!                                   sign intent with sponsor key
//!                                                     │
//!                        { sponsoredTxBytes, sponsorSignature }
//! ```

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use std::sync::Arc;

use super::backend::{SponsorBackend, SponsoredResponse};
use super::error::{ServiceError, SponsorError};
use super::request::SponsorshipRequest;
use crate::config::{BridgeConfig, DEFAULT_GAS_BUDGET, DEFAULT_GAS_PRICE};
use crate::crypto::{LedgerKeypair, LedgerPublicKey};
use crate::identity::{derive_salt, LedgerAddress, LocalProofCapability, TokenVerifier, VerifiedClaims};
use crate::ledger::LedgerClient;
use crate::storage::{UserRecord, WaypointDb};
use crate::transaction::{SponsorSignature, SponsoredTransactionBuilder};

/// Outcome of `POST /user`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub user: UserRecord,
    /// `false` when the subject was already registered.
    pub newly_registered: bool,
}

/// Authenticates users and co-signs their transfers as gas owner.
pub struct SponsorService {
    verifier: TokenVerifier,
    proof: LocalProofCapability,
    sponsor: LedgerKeypair,
    sponsor_address: LedgerAddress,
    ledger: Arc<dyn LedgerClient>,
    db: WaypointDb,
    epoch_window: u64,
    gas_budget: u64,
    gas_price: u64,
}

impl SponsorService {
    pub fn new(
        config: &BridgeConfig,
        sponsor: LedgerKeypair,
        ledger: Arc<dyn LedgerClient>,
        db: WaypointDb,
    ) -> Self {
        let sponsor_address = LedgerAddress::from_public_key(&sponsor.public_key());
        Self {
            verifier: TokenVerifier::new(config.client_id.clone()),
            proof: LocalProofCapability::new(config.client_id.clone()),
            sponsor,
            sponsor_address,
            ledger,
            db,
            epoch_window: config.epoch_window,
            gas_budget: DEFAULT_GAS_BUDGET,
            gas_price: DEFAULT_GAS_PRICE,
        }
    }

    pub fn with_gas(mut self, budget: u64, price: u64) -> Self {
        self.gas_budget = budget;
        self.gas_price = price;
        self
    }

    pub fn sponsor_address(&self) -> LedgerAddress {
        self.sponsor_address
    }

    pub fn sponsor_key(&self) -> LedgerPublicKey {
        self.sponsor.public_key()
    }

    pub fn db(&self) -> &WaypointDb {
        &self.db
    }

    /// Verify `token` and derive the address it controls.
    pub fn authenticate(&self, token: &str) -> Result<(VerifiedClaims, LedgerAddress), ServiceError> {
        let claims = self.verifier.verify(token)?;
        let address = self
            .proof
            .derive_sync(token, derive_salt(&claims.sub))
            .map_err(|e| ServiceError::Proof(e.to_string()))?;
        Ok((claims, address))
    }

    // -- POST /user ---------------------------------------------------------

    /// Record that the bearer of `token` owns `address`.
    pub fn register(&self, token: &str, address: &str) -> Result<Registration, ServiceError> {
        let (claims, derived) = self.authenticate(token)?;
        let claimed: LedgerAddress = address
            .trim()
            .parse()
            .map_err(|e| ServiceError::InvalidRequest(format!("address: {e}")))?;
        if claimed != derived {
            return Err(ServiceError::InvalidRequest(
                "address does not belong to this token".into(),
            ));
        }

        let registered_at = self
            .db
            .get_user(&claims.sub)?
            .map(|existing| existing.registered_at)
            .unwrap_or_else(Utc::now);
        let user = UserRecord {
            subject: claims.sub,
            address: derived,
            email: claims.email,
            name: claims.name,
            registered_at,
        };
        let newly_registered = self.db.put_user(&user)?;
        tracing::info!(address = %user.address, newly_registered, "user registered");
        Ok(Registration {
            user,
            newly_registered,
        })
    }

    // -- POST /sponsor ------------------------------------------------------

    /// Build and co-sign the requested transfer as gas owner.
    pub async fn sponsor(
        &self,
        token: &str,
        request: &SponsorshipRequest,
    ) -> Result<SponsoredResponse, ServiceError> {
        let (_, caller) = self.authenticate(token)?;
        let validated = request.validate(&caller)?;

        let epoch = self.ledger.current_epoch().await?;
        let tx = SponsoredTransactionBuilder::new(validated.sender)
            .recipient(validated.recipient)
            .transfer(validated.transfer)
            .sponsor(self.sponsor.public_key())
            .gas_budget(self.gas_budget)
            .gas_price(self.gas_price)
            .expiration_epoch(epoch.saturating_add(self.epoch_window))
            .build()?;
        let bytes = tx.to_bytes()?;
        let signature = SponsorSignature::sign(&self.sponsor, &bytes);

        tracing::info!(
            sender = %tx.sender,
            recipient = %tx.recipient,
            asset = %tx.transfer.asset_type(),
            expiration_epoch = tx.expiration_epoch,
            "transaction sponsored"
        );
        Ok(SponsoredResponse {
            sponsored_tx_bytes: BASE64.encode(&bytes),
            sponsor_signature: signature.encode(),
        })
    }
}

impl std::fmt::Debug for SponsorService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SponsorService")
            .field("sponsor_address", &self.sponsor_address)
            .field("epoch_window", &self.epoch_window)
            .finish_non_exhaustive()
    }
}

/// In-process backend: the device and the sponsor share a process. Used on
/// devnet and in tests.
#[async_trait]
impl SponsorBackend for SponsorService {
    async fn sponsor(
        &self,
        token: &str,
        request: &SponsorshipRequest,
    ) -> Result<SponsoredResponse, SponsorError> {
        SponsorService::sponsor(self, token, request)
            .await
            .map_err(|e| SponsorError::SponsorUnavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{compute_address, encode_unsigned_token, TokenError};
    use crate::ledger::DevnetLedger;
    use crate::transaction::{SponsoredTransactionData, TransferKind};
    use serde_json::json;

    const CLIENT_ID: &str = "waypoint-web";
    const ISS: &str = "https://accounts.example.com";

    fn token(sub: &str, aud: &str) -> String {
        encode_unsigned_token(&json!({
            "sub": sub,
            "aud": aud,
            "exp": Utc::now().timestamp() + 600,
            "iss": ISS,
            "email": format!("{sub}@example.com"),
        }))
    }

    fn address_of(sub: &str) -> LedgerAddress {
        compute_address(ISS, sub, CLIENT_ID, derive_salt(sub))
    }

    fn service() -> (SponsorService, Arc<DevnetLedger>) {
        let ledger = Arc::new(DevnetLedger::new());
        ledger.set_epoch(40);
        let service = SponsorService::new(
            &BridgeConfig::for_client(CLIENT_ID),
            LedgerKeypair::generate(),
            ledger.clone(),
            WaypointDb::open_temporary().unwrap(),
        );
        (service, ledger)
    }

    #[test]
    fn register_records_the_derived_address() {
        let (service, _) = service();
        let alice = address_of("alice");
        let first = service.register(&token("alice", CLIENT_ID), &alice.to_string()).unwrap();
        assert!(first.newly_registered);
        assert_eq!(first.user.address, alice);
        assert_eq!(first.user.email.as_deref(), Some("alice@example.com"));

        let again = service.register(&token("alice", CLIENT_ID), &alice.to_string()).unwrap();
        assert!(!again.newly_registered);
        assert_eq!(again.user.registered_at, first.user.registered_at);
        assert_eq!(service.db().user_count(), 1);
    }

    #[test]
    fn register_refuses_someone_elses_address() {
        let (service, _) = service();
        let err = service
            .register(&token("alice", CLIENT_ID), &address_of("bob").to_string())
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRequest(_)));
    }

    #[test]
    fn wrong_audience_is_unauthorized() {
        let (service, _) = service();
        let err = service
            .register(&token("alice", "wrong-client"), &address_of("alice").to_string())
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(TokenError::InvalidAudience { .. })));
    }

    #[tokio::test]
    async fn sponsor_builds_and_signs() {
        let (service, _) = service();
        let request = SponsorshipRequest::native(address_of("alice"), address_of("bob"), 25);
        let resp = service.sponsor(&token("alice", CLIENT_ID), &request).await.unwrap();

        let bytes = BASE64.decode(&resp.sponsored_tx_bytes).unwrap();
        let tx = SponsoredTransactionData::from_bytes(&bytes).unwrap();
        assert_eq!(tx.sender, address_of("alice"));
        assert_eq!(tx.recipient, address_of("bob"));
        assert_eq!(tx.transfer, TransferKind::Native { amount: 25 });
        assert_eq!(tx.gas.owner, service.sponsor_address());
        assert_eq!(tx.expiration_epoch, 42);

        let sig = SponsorSignature::decode(&resp.sponsor_signature).unwrap();
        assert_eq!(sig.public_key(), &service.sponsor_key());
        assert!(sig.verify(&bytes));
    }

    #[tokio::test]
    async fn sponsor_refuses_foreign_sender() {
        let (service, _) = service();
        let request = SponsorshipRequest::native(address_of("bob"), address_of("alice"), 1);
        let err = service.sponsor(&token("alice", CLIENT_ID), &request).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn every_sponsorship_is_unique() {
        let (service, _) = service();
        let request = SponsorshipRequest::native(address_of("alice"), address_of("bob"), 1);
        let a = service.sponsor(&token("alice", CLIENT_ID), &request).await.unwrap();
        let b = service.sponsor(&token("alice", CLIENT_ID), &request).await.unwrap();
        assert_ne!(a.sponsored_tx_bytes, b.sponsored_tx_bytes);
    }
}
