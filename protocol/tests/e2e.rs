//! End-to-end integration tests for the Waypoint protocol.
//!
//! These drive the public API the way a device and its backend do: login
//! through the session manager, registration and sponsorship through the
//! sponsor service, co-signing through the coordinator, execution on the
//! devnet ledger.
//!
//! Each test builds its own ledger, stores and keys.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use serde_json::json;

use waypoint_protocol::config::{BridgeConfig, NATIVE_COIN_TYPE};
use waypoint_protocol::crypto::LedgerKeypair;
use waypoint_protocol::identity::{
    derive_salt, derive_salt_with_prefix, encode_unsigned_token, LedgerAddress,
    LocalProofCapability, LoginNonce, TokenError,
};
use waypoint_protocol::ledger::{DevnetLedger, LedgerClient, LedgerError};
use waypoint_protocol::session::{
    IdentitySessionManager, NoopRegistrar, SessionError, SessionState, SessionStore,
};
use waypoint_protocol::sponsor::{
    SponsorBackend, SponsorError, SponsorService, SponsoredResponse, SponsorshipCoordinator,
    SponsorshipRequest,
};
use waypoint_protocol::storage::WaypointDb;
use waypoint_protocol::transaction::{
    AssetType, CoSignedTransaction, SponsorSignature, TransactionDigest, TransactionError,
    UserSignature,
};
use waypoint_protocol::Recovery;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

const CLIENT_ID: &str = "waypoint-web";
const ISSUER: &str = "https://accounts.example.com";

fn provider_token(sub: &str, aud: &str, nonce: &LoginNonce) -> String {
    encode_unsigned_token(&json!({
        "sub": sub,
        "aud": aud,
        "exp": chrono::Utc::now().timestamp() + 3600,
        "iss": ISSUER,
        "nonce": nonce.as_str(),
        "email": format!("{sub}@example.com"),
        "name": "Test User",
    }))
}

fn manager(store: Arc<SessionStore>) -> IdentitySessionManager {
    IdentitySessionManager::new(
        BridgeConfig::for_client(CLIENT_ID),
        store,
        Arc::new(LocalProofCapability::new(CLIENT_ID)),
        Arc::new(NoopRegistrar),
    )
}

/// A devnet ledger with a funded sponsor service in front of it.
fn backend() -> (Arc<DevnetLedger>, Arc<SponsorService>) {
    let ledger = Arc::new(DevnetLedger::new());
    ledger.set_epoch(10);
    let service = Arc::new(SponsorService::new(
        &BridgeConfig::for_client(CLIENT_ID),
        LedgerKeypair::generate(),
        ledger.clone(),
        WaypointDb::open_temporary().expect("temp db"),
    ));
    ledger.credit(service.sponsor_address(), NATIVE_COIN_TYPE, 1_000_000_000);
    (ledger, service)
}

fn someone_else() -> LedgerAddress {
    LedgerAddress::from_bytes([0xEE; 32])
}

// ---------------------------------------------------------------------------
// 1. Salt Golden Values
// ---------------------------------------------------------------------------

#[test]
fn salt_is_deterministic_with_golden_values() {
    assert_eq!(derive_salt("abc123").value(), 986_835_730);
    assert_eq!(derive_salt_with_prefix("", "abc123").value(), 1_424_436_592);
    assert_eq!(derive_salt("abc123"), derive_salt("abc123"));
    assert_ne!(derive_salt("abc123"), derive_salt("abc124"));
}

// ---------------------------------------------------------------------------
// 2. Login, Register, Send
// ---------------------------------------------------------------------------

#[tokio::test]
async fn login_register_and_send_native() {
    let (ledger, service) = backend();
    let device = manager(Arc::new(SessionStore::in_memory()));

    let nonce = device.start_login(ledger.current_epoch().await.unwrap());
    let token = provider_token("ada", CLIENT_ID, &nonce);
    let identity = device.complete_login(&token).await.expect("login");

    let registration = service
        .register(&token, &identity.address.to_string())
        .expect("register");
    assert!(registration.newly_registered);
    ledger.credit(identity.address, NATIVE_COIN_TYPE, 500);

    let coordinator = SponsorshipCoordinator::new(service.clone(), ledger.clone());
    let signer = device.signer().expect("signer");
    let digest = coordinator
        .send(
            &identity,
            Some(&signer),
            &SponsorshipRequest::native(identity.address, someone_else(), 200),
        )
        .await
        .expect("send");

    assert!(ledger.is_executed(&digest));
    assert_eq!(ledger.native_balance(&identity.address), 300);
    assert_eq!(ledger.native_balance(&someone_else()), 200);
}

// ---------------------------------------------------------------------------
// 3. Wrong Audience
// ---------------------------------------------------------------------------

#[tokio::test]
async fn wrong_audience_never_yields_an_identity() {
    let store = Arc::new(SessionStore::in_memory());
    let device = manager(store.clone());
    let nonce = device.start_login(1);

    let err = device
        .complete_login(&provider_token("ada", "wrong-client", &nonce))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Token(TokenError::InvalidAudience { .. })));
    assert_eq!(err.recovery(), Recovery::DoNotRetry);
    assert!(device.identity().is_none());
    assert!(store.load_identity().unwrap().is_none());
}

// ---------------------------------------------------------------------------
// 4. Nonce Binding
// ---------------------------------------------------------------------------

#[tokio::test]
async fn superseded_nonce_cannot_complete_login() {
    let device = manager(Arc::new(SessionStore::in_memory()));
    let first = device.start_login(1);
    let second = device.start_login(1);
    assert_ne!(first, second);

    let err = device
        .complete_login(&provider_token("ada", CLIENT_ID, &first))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::NonceMismatch));
    assert_eq!(device.state(), SessionState::Authenticating { nonce: second.clone() });

    device
        .complete_login(&provider_token("ada", CLIENT_ID, &second))
        .await
        .expect("the current attempt still completes");
}

// ---------------------------------------------------------------------------
// 5. Restart
// ---------------------------------------------------------------------------

#[tokio::test]
async fn identity_survives_restart_but_signer_does_not() {
    let dir = tempfile::tempdir().unwrap();
    let (ledger, service) = backend();

    let identity = {
        let db = WaypointDb::open(dir.path()).unwrap();
        let device = manager(Arc::new(SessionStore::new(db)));
        let nonce = device.start_login(1);
        device
            .complete_login(&provider_token("ada", CLIENT_ID, &nonce))
            .await
            .unwrap()
    };

    let db = WaypointDb::open(dir.path()).unwrap();
    let device = manager(Arc::new(SessionStore::new(db)));
    let resumed = device.resume().unwrap().expect("persisted identity");
    assert_eq!(resumed, identity);
    assert_eq!(device.state(), SessionState::LoggedIn(identity.clone()));
    assert!(device.signer().is_none());

    // Still logged in, but sending needs a fresh login.
    ledger.credit(identity.address, NATIVE_COIN_TYPE, 10);
    let coordinator = SponsorshipCoordinator::new(service, ledger);
    let err = coordinator
        .send(
            &resumed,
            device.signer().as_ref(),
            &SponsorshipRequest::native(resumed.address, someone_else(), 1),
        )
        .await
        .unwrap_err();
    assert_eq!(err, SponsorError::MissingSignature);
    assert_eq!(err.recovery(), Recovery::RestartFlow);
}

// ---------------------------------------------------------------------------
// 6. NFT Transfer
// ---------------------------------------------------------------------------

#[tokio::test]
async fn nft_moves_without_an_amount() {
    let (ledger, service) = backend();
    let device = manager(Arc::new(SessionStore::in_memory()));
    let nonce = device.start_login(10);
    let identity = device
        .complete_login(&provider_token("ada", CLIENT_ID, &nonce))
        .await
        .unwrap();
    ledger.mint_object(identity.address, "0xbadge").unwrap();

    let coordinator = SponsorshipCoordinator::new(service, ledger.clone());
    let request = SponsorshipRequest {
        sender_address: identity.address.to_string(),
        recipient: someone_else().to_string(),
        amount: None,
        asset_type: AssetType::Nft,
        object_id: Some("0xbadge".into()),
    };
    coordinator
        .send(&identity, device.signer().as_ref(), &request)
        .await
        .expect("nft transfer");
    assert_eq!(ledger.owner_of("0xbadge"), Some(someone_else()));

    let empty = SponsorshipRequest {
        object_id: Some(String::new()),
        ..request
    };
    let err = coordinator
        .send(&identity, device.signer().as_ref(), &empty)
        .await
        .unwrap_err();
    assert!(matches!(err, SponsorError::InvalidRequest(_)));
}

// ---------------------------------------------------------------------------
// 7. Sponsor Down
// ---------------------------------------------------------------------------

struct GasStationDown;

#[async_trait]
impl SponsorBackend for GasStationDown {
    async fn sponsor(&self, _: &str, _: &SponsorshipRequest) -> Result<SponsoredResponse, SponsorError> {
        Err(SponsorError::SponsorUnavailable("sponsor wallet is empty".into()))
    }
}

struct NeverCalledLedger;

#[async_trait]
impl LedgerClient for NeverCalledLedger {
    async fn submit(&self, _: &CoSignedTransaction) -> Result<TransactionDigest, LedgerError> {
        panic!("nothing may be submitted when sponsorship failed");
    }

    async fn current_epoch(&self) -> Result<u64, LedgerError> {
        Ok(0)
    }
}

#[tokio::test]
async fn sponsor_error_surfaces_verbatim_and_nothing_is_signed() {
    let device = manager(Arc::new(SessionStore::in_memory()));
    let nonce = device.start_login(1);
    let identity = device
        .complete_login(&provider_token("ada", CLIENT_ID, &nonce))
        .await
        .unwrap();

    let coordinator = SponsorshipCoordinator::new(Arc::new(GasStationDown), Arc::new(NeverCalledLedger));
    let err = coordinator
        .send(
            &identity,
            device.signer().as_ref(),
            &SponsorshipRequest::native(identity.address, someone_else(), 1),
        )
        .await
        .unwrap_err();
    assert_eq!(err, SponsorError::SponsorUnavailable("sponsor wallet is empty".into()));
    assert_eq!(err.recovery(), Recovery::Retry);
}

// ---------------------------------------------------------------------------
// 8. Byte Binding, Replay, Expiry
// ---------------------------------------------------------------------------

/// Log in, get a transfer sponsored, and co-sign it without submitting.
async fn cosigned(ledger: &Arc<DevnetLedger>, service: &SponsorService) -> CoSignedTransaction {
    let device = manager(Arc::new(SessionStore::in_memory()));
    let nonce = device.start_login(ledger.epoch());
    let token = provider_token("ada", CLIENT_ID, &nonce);
    let identity = device.complete_login(&token).await.unwrap();
    ledger.credit(identity.address, NATIVE_COIN_TYPE, 100);

    let resp = service
        .sponsor(&token, &SponsorshipRequest::native(identity.address, someone_else(), 1))
        .await
        .unwrap();
    let bytes = Bytes::from(BASE64.decode(resp.sponsored_tx_bytes).unwrap());
    let sponsor = SponsorSignature::decode(&resp.sponsor_signature).unwrap();
    let user: UserSignature = device.signer().unwrap().sign(&bytes);
    CoSignedTransaction::new(bytes, sponsor, user)
}

#[tokio::test]
async fn flipping_one_byte_invalidates_both_signatures() {
    let (ledger, service) = backend();
    let tx = cosigned(&ledger, &service).await;
    assert!(tx.verify().is_ok());

    let mut tampered = tx.bytes().to_vec();
    let last = tampered.len() - 1;
    tampered[last] ^= 0x01;
    let tampered = Bytes::from(tampered);

    assert!(!tx.sponsor_signature().verify(&tampered));
    assert!(!tx.user_signature().verify(&tampered));

    let forged = CoSignedTransaction::new(
        tampered,
        tx.sponsor_signature().clone(),
        tx.user_signature().clone(),
    );
    assert!(matches!(forged.verify(), Err(TransactionError::InvalidSignature)));
    assert!(matches!(ledger.submit(&forged).await, Err(LedgerError::Rejected(_))));
}

#[tokio::test]
async fn replay_is_rejected() {
    let (ledger, service) = backend();
    let tx = cosigned(&ledger, &service).await;

    let digest = ledger.submit(&tx).await.unwrap();
    assert_eq!(digest, tx.digest());
    let err = ledger.submit(&tx).await.unwrap_err();
    assert!(matches!(err, LedgerError::Rejected(reason) if reason.contains("already executed")));
}

#[tokio::test]
async fn expired_sponsorship_is_rejected() {
    let (ledger, service) = backend();
    let tx = cosigned(&ledger, &service).await;

    ledger.set_epoch(ledger.epoch() + BridgeConfig::default().epoch_window + 1);
    let err = ledger.submit(&tx).await.unwrap_err();
    assert!(matches!(err, LedgerError::Rejected(reason) if reason.contains("expired")));
}

#[tokio::test]
async fn wire_path_executes_in_either_signature_order() {
    let (ledger, service) = backend();
    let tx = cosigned(&ledger, &service).await;

    let mut sigs = tx.wire_signatures();
    sigs.reverse();
    let digest = ledger.execute(tx.bytes(), &sigs).unwrap();
    assert_eq!(ledger.native_balance(&someone_else()), 1);
    assert!(ledger.is_executed(&digest));
}
