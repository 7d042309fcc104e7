//! # Identity Session Manager
//!
//! Orchestrates the login flow and owns the session state:
//!
//! ```text
//!              start_login                complete_login (ok)
//!  LoggedOut ──────────────► Authenticating ──────────────────► LoggedIn
//!      ▲                       │   ▲     │                        │  │
//!      │        cancel_login   │   │     │ complete_login (err)   │  │
//!      ├───────────────────────┘   │     └──► stays Authenticating │  │
//!      │                           └────── start_login ────────────┘  │
//!      └─────────────────────────── logout ───────────────────────────┘
//! ```
//!
//! `resume` loads a persisted identity straight into `LoggedIn` after a
//! process restart.
//!
//! ## Binding integrity
//!
//! The token handed to `complete_login` must carry the nonce of the
//! *current* pending attempt. A token minted for another ephemeral key,
//! or for an attempt that a later `start_login` replaced, is refused with
//! [`SessionError::NonceMismatch`].
//!
//! ## Cancellation
//!
//! Dropping a `complete_login` future leaves the pending attempt intact.
//! Persisted state only changes after the address is derived, in one
//! synchronous step.
//!
//! ## Concurrency
//!
//! Every transition takes the state write lock first and the store's
//! transient slot second. `complete_login` re-checks the pending nonce
//! under that lock after derivation, so a `start_login` that lands while
//! the proof service is working always wins.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

use super::error::SessionError;
use super::identity::BridgedIdentity;
use super::registration::{spawn_registration, BackendRegistrar, RegistrationHandle};
use super::signer::EphemeralSigner;
use super::store::SessionStore;
use crate::config::BridgeConfig;
use crate::crypto::hash::token_fingerprint;
use crate::identity::{
    begin_session, derive_salt, AddressDeriver, LoginNonce, ProofCapability, SessionProof,
    TokenVerifier,
};

/// Where the device is in the login lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    LoggedOut,
    /// A login attempt is pending. The nonce is the one the identity
    /// provider must echo back.
    Authenticating { nonce: LoginNonce },
    LoggedIn(BridgedIdentity),
}

/// Drives salt, ephemeral keys, token verification and address derivation
/// in order, and keeps the session store consistent with the state.
pub struct IdentitySessionManager {
    config: BridgeConfig,
    verifier: TokenVerifier,
    store: Arc<SessionStore>,
    proof: Arc<dyn ProofCapability>,
    registrar: Arc<dyn BackendRegistrar>,
    state: RwLock<SessionState>,
    registration: Mutex<Option<RegistrationHandle>>,
}

impl IdentitySessionManager {
    pub fn new(
        config: BridgeConfig,
        store: Arc<SessionStore>,
        proof: Arc<dyn ProofCapability>,
        registrar: Arc<dyn BackendRegistrar>,
    ) -> Self {
        let verifier = TokenVerifier::new(config.client_id.clone());
        Self {
            config,
            verifier,
            store,
            proof,
            registrar,
            state: RwLock::new(SessionState::LoggedOut),
            registration: Mutex::new(None),
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> SessionState {
        self.state.read().clone()
    }

    /// The logged-in identity, if any.
    pub fn identity(&self) -> Option<BridgedIdentity> {
        match &*self.state.read() {
            SessionState::LoggedIn(identity) => Some(identity.clone()),
            _ => None,
        }
    }

    // -- Transitions ---------------------------------------------------------

    /// Begin a login attempt while the ledger is at `current_epoch`.
    ///
    /// Returns the nonce to embed in the identity-provider request. Any
    /// earlier pending attempt is discarded. A persisted identity stays on
    /// disk until this attempt completes.
    pub fn start_login(&self, current_epoch: u64) -> LoginNonce {
        let max_epoch = self.config.max_epoch(current_epoch);
        let mut state = self.state.write();
        let (_, nonce) = begin_session(&self.store, max_epoch);
        *state = SessionState::Authenticating {
            nonce: nonce.clone(),
        };
        drop(state);
        tracing::info!(max_epoch, "login started");
        nonce
    }

    /// Complete the pending login with the token the provider returned.
    ///
    /// On success the identity is persisted, backend registration is
    /// dispatched in the background, and the state becomes `LoggedIn`. On
    /// failure the state stays `Authenticating` and nothing is persisted.
    pub async fn complete_login(&self, token: &str) -> Result<BridgedIdentity, SessionError> {
        let expected = match &*self.state.read() {
            SessionState::Authenticating { nonce } => nonce.clone(),
            _ => return Err(SessionError::NoPendingLogin),
        };
        if self.store.ephemeral().map(|r| r.nonce()) != Some(expected.clone()) {
            return Err(SessionError::NoPendingLogin);
        }

        let fingerprint = token_fingerprint(token);
        let claims = self.verifier.verify(token).map_err(|e| {
            tracing::info!(token = %fingerprint, error = %e, "identity token refused");
            e
        })?;

        match claims.nonce.as_deref() {
            Some(nonce) if expected.matches(nonce) => {}
            _ => {
                tracing::info!(token = %fingerprint, "token nonce does not match pending attempt");
                return Err(SessionError::NonceMismatch);
            }
        }

        let salt = derive_salt(&claims.sub);
        let address = AddressDeriver::derive(token, salt, self.proof.as_ref()).await?;

        let identity = BridgedIdentity::from_claims(claims, address, token);
        {
            // A newer start_login may have run while we were deriving.
            let mut state = self.state.write();
            let pending = SessionState::Authenticating {
                nonce: expected.clone(),
            };
            let record_nonce = self.store.ephemeral().map(|r| r.nonce());
            if *state != pending || record_nonce.as_ref() != Some(&expected) {
                tracing::info!(token = %fingerprint, "login attempt replaced during derivation");
                return Err(SessionError::NonceMismatch);
            }
            self.store.save_identity(&identity)?;
            *state = SessionState::LoggedIn(identity.clone());
        }

        let handle = spawn_registration(self.registrar.clone(), token.to_string(), address);
        *self.registration.lock() = handle;
        tracing::info!(%address, token = %fingerprint, "login complete");
        Ok(identity)
    }

    /// Abandon the pending login attempt.
    ///
    /// Falls back to the persisted identity if there is one. Its ephemeral
    /// key was discarded by `start_login`, so no signer is available until
    /// the next login.
    pub fn cancel_login(&self) -> Result<SessionState, SessionError> {
        let mut state = self.state.write();
        self.store.clear_ephemeral();
        let next = match self.store.load_identity()? {
            Some(identity) => SessionState::LoggedIn(identity),
            None => SessionState::LoggedOut,
        };
        *state = next.clone();
        drop(state);
        tracing::info!("login cancelled");
        Ok(next)
    }

    /// Forget everything: persisted identity and transient keys.
    pub fn logout(&self) -> Result<(), SessionError> {
        let mut state = self.state.write();
        self.store.clear_ephemeral();
        self.store.clear_identity()?;
        *state = SessionState::LoggedOut;
        drop(state);
        tracing::info!("logged out");
        Ok(())
    }

    /// Restore a persisted identity after a process restart.
    ///
    /// Re-sends the backend registration if the record carries a token.
    pub fn resume(&self) -> Result<Option<BridgedIdentity>, SessionError> {
        let Some(identity) = self.store.load_identity()? else {
            *self.state.write() = SessionState::LoggedOut;
            return Ok(None);
        };

        if let Some(token) = &identity.token {
            let handle = spawn_registration(self.registrar.clone(), token.clone(), identity.address);
            *self.registration.lock() = handle;
        }

        *self.state.write() = SessionState::LoggedIn(identity.clone());
        tracing::info!(address = %identity.address, "session resumed");
        Ok(Some(identity))
    }

    // -- Accessors -----------------------------------------------------------

    /// The user's signer, while logged in with key material in memory.
    ///
    /// The signer carries the session proof for its key. No signer is
    /// handed out if the stored token does not prove the current key for
    /// the logged-in address.
    pub fn signer(&self) -> Option<EphemeralSigner> {
        let identity = self.identity()?;
        let token = identity.token.clone()?;
        let record = self.store.ephemeral()?;
        let keypair = record.keypair();
        let proof = SessionProof {
            audience: self.config.client_id.clone(),
            token,
            salt: derive_salt(&identity.subject),
            max_epoch: record.max_epoch(),
            randomness: record.randomness().to_vec(),
        };
        match proof.authorize(&keypair.public_key()) {
            Ok(address) if address == identity.address => {
                Some(EphemeralSigner::new(address, keypair, proof))
            }
            Ok(address) => {
                tracing::debug!(%address, expected = %identity.address, "session proof names another address");
                None
            }
            Err(e) => {
                tracing::debug!(error = %e, "no session proof for the current key");
                None
            }
        }
    }

    /// Take the handle of the most recent registration task.
    pub fn take_registration(&self) -> Option<RegistrationHandle> {
        self.registration.lock().take()
    }
}

impl std::fmt::Debug for IdentitySessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentitySessionManager")
            .field("client_id", &self.config.client_id)
            .field("state", &*self.state.read())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{
        encode_unsigned_token, LedgerAddress, LocalProofCapability, ProofError, Salt, TokenError,
    };
    use crate::recovery::Recovery;
    use crate::session::registration::{NoopRegistrar, RegistrationError};
    use crate::storage::WaypointDb;
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::oneshot;

    const CLIENT_ID: &str = "waypoint-web";

    fn far_future() -> u64 {
        u64::try_from(chrono::Utc::now().timestamp()).unwrap() + 3600
    }

    fn token_for(sub: &str, aud: &str, nonce: &LoginNonce) -> String {
        encode_unsigned_token(&json!({
            "sub": sub,
            "aud": aud,
            "exp": far_future(),
            "iss": "https://accounts.example.com",
            "nonce": nonce.as_str(),
            "email": "ada@example.com",
            "name": "Ada",
            "picture": "https://example.com/ada.png",
        }))
    }

    fn manager_with(store: Arc<SessionStore>, registrar: Arc<dyn BackendRegistrar>) -> IdentitySessionManager {
        IdentitySessionManager::new(
            BridgeConfig::for_client(CLIENT_ID),
            store,
            Arc::new(LocalProofCapability::new(CLIENT_ID)),
            registrar,
        )
    }

    fn manager() -> IdentitySessionManager {
        manager_with(Arc::new(SessionStore::in_memory()), Arc::new(NoopRegistrar))
    }

    #[tokio::test]
    async fn happy_path_logs_in_and_persists() {
        let m = manager();
        assert_eq!(m.state(), SessionState::LoggedOut);

        let nonce = m.start_login(100);
        assert!(matches!(m.state(), SessionState::Authenticating { .. }));

        let identity = m.complete_login(&token_for("abc123", CLIENT_ID, &nonce)).await.unwrap();
        assert_eq!(identity.subject, "abc123");
        assert_eq!(identity.avatar.as_deref(), Some("https://example.com/ada.png"));
        assert_eq!(m.state(), SessionState::LoggedIn(identity.clone()));
        assert_eq!(m.store.load_identity().unwrap(), Some(identity.clone()));

        let signer = m.signer().expect("signer while logged in");
        assert_eq!(signer.address(), identity.address);
        assert_eq!(signer.max_epoch(), 102);

        let signature = signer.sign(b"tx");
        let proof = signature.proof().expect("session signatures carry a proof");
        assert_eq!(proof.max_epoch, 102);
        assert_eq!(proof.authorize(signature.public_key()), Ok(identity.address));
    }

    #[tokio::test]
    async fn address_is_stable_across_logins() {
        let m = manager();
        let n1 = m.start_login(1);
        let first = m.complete_login(&token_for("abc123", CLIENT_ID, &n1)).await.unwrap();
        let n2 = m.start_login(5);
        let second = m.complete_login(&token_for("abc123", CLIENT_ID, &n2)).await.unwrap();
        assert_eq!(first.address, second.address);
    }

    #[tokio::test]
    async fn wrong_audience_produces_no_identity() {
        let m = manager();
        let nonce = m.start_login(1);
        let err = m
            .complete_login(&token_for("abc123", "wrong-client", &nonce))
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::Token(TokenError::InvalidAudience { .. })));
        assert!(matches!(m.state(), SessionState::Authenticating { .. }));
        assert!(m.store.load_identity().unwrap().is_none());
        assert!(m.signer().is_none());
    }

    #[tokio::test]
    async fn expired_token_is_refused() {
        let m = manager();
        let nonce = m.start_login(1);
        let token = encode_unsigned_token(&json!({
            "sub": "abc123", "aud": CLIENT_ID, "exp": 1, "nonce": nonce.as_str(),
        }));
        let err = m.complete_login(&token).await.unwrap_err();
        assert!(matches!(err, SessionError::Token(TokenError::Expired { .. })));
        assert_eq!(err.recovery(), Recovery::RestartFlow);
    }

    #[tokio::test]
    async fn earlier_nonce_cannot_complete_later_attempt() {
        let m = manager();
        let first = m.start_login(1);
        let second = m.start_login(1);
        assert_ne!(first, second);

        let err = m
            .complete_login(&token_for("abc123", CLIENT_ID, &first))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NonceMismatch));

        // The latest attempt still completes.
        assert!(m.complete_login(&token_for("abc123", CLIENT_ID, &second)).await.is_ok());
    }

    /// Derives locally, but the first call parks until released.
    struct PausingProof {
        inner: LocalProofCapability,
        gate: Mutex<Option<(oneshot::Sender<()>, oneshot::Receiver<()>)>>,
    }

    #[async_trait]
    impl ProofCapability for PausingProof {
        async fn derive_address(&self, token: &str, salt: Salt) -> Result<LedgerAddress, ProofError> {
            let gate = self.gate.lock().take();
            if let Some((entered, release)) = gate {
                let _ = entered.send(());
                let _ = release.await;
            }
            self.inner.derive_sync(token, salt)
        }
    }

    #[tokio::test]
    async fn start_login_during_derivation_wins() {
        let (entered_tx, entered_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        let m = IdentitySessionManager::new(
            BridgeConfig::for_client(CLIENT_ID),
            Arc::new(SessionStore::in_memory()),
            Arc::new(PausingProof {
                inner: LocalProofCapability::new(CLIENT_ID),
                gate: Mutex::new(Some((entered_tx, release_rx))),
            }),
            Arc::new(NoopRegistrar),
        );

        let first = m.start_login(1);
        let first_token = token_for("abc123", CLIENT_ID, &first);
        let (outcome, second) = tokio::join!(m.complete_login(&first_token), async {
            entered_rx.await.unwrap();
            let second = m.start_login(1);
            release_tx.send(()).unwrap();
            second
        });

        assert!(matches!(outcome, Err(SessionError::NonceMismatch)));
        assert_eq!(
            m.state(),
            SessionState::Authenticating {
                nonce: second.clone()
            }
        );
        assert!(m.store.load_identity().unwrap().is_none());
        assert!(m.signer().is_none());

        // The replacing attempt completes and its key signs.
        let identity = m
            .complete_login(&token_for("abc123", CLIENT_ID, &second))
            .await
            .unwrap();
        assert_eq!(m.signer().unwrap().address(), identity.address);
    }

    #[tokio::test]
    async fn token_without_nonce_is_a_mismatch() {
        let m = manager();
        m.start_login(1);
        let token = encode_unsigned_token(&json!({
            "sub": "abc123", "aud": CLIENT_ID, "exp": far_future(),
        }));
        assert!(matches!(m.complete_login(&token).await, Err(SessionError::NonceMismatch)));
    }

    #[tokio::test]
    async fn complete_without_start_is_refused() {
        let m = manager();
        let nonce = crate::identity::mint_ephemeral(1).nonce();
        let err = m
            .complete_login(&token_for("abc123", CLIENT_ID, &nonce))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NoPendingLogin));
    }

    #[tokio::test]
    async fn start_login_while_logged_in_keeps_persisted_identity() {
        let m = manager();
        let n1 = m.start_login(1);
        let identity = m.complete_login(&token_for("abc123", CLIENT_ID, &n1)).await.unwrap();

        m.start_login(2);
        assert!(m.signer().is_none());
        assert_eq!(m.store.load_identity().unwrap(), Some(identity.clone()));

        // Cancelling falls back to the persisted identity without a signer.
        assert_eq!(m.cancel_login().unwrap(), SessionState::LoggedIn(identity));
        assert!(m.signer().is_none());
    }

    #[tokio::test]
    async fn cancel_without_identity_logs_out() {
        let m = manager();
        m.start_login(1);
        assert_eq!(m.cancel_login().unwrap(), SessionState::LoggedOut);
        assert!(!m.store.has_ephemeral());
    }

    #[tokio::test]
    async fn logout_clears_both_tiers() {
        let m = manager();
        let nonce = m.start_login(1);
        m.complete_login(&token_for("abc123", CLIENT_ID, &nonce)).await.unwrap();

        m.logout().unwrap();
        assert_eq!(m.state(), SessionState::LoggedOut);
        assert!(m.store.load_identity().unwrap().is_none());
        assert!(!m.store.has_ephemeral());
        assert!(m.signer().is_none());
    }

    #[tokio::test]
    async fn resume_after_restart_restores_logged_in() {
        let dir = tempfile::tempdir().unwrap();
        let identity = {
            let store = Arc::new(SessionStore::new(WaypointDb::open(dir.path()).unwrap()));
            let m = manager_with(store, Arc::new(NoopRegistrar));
            let nonce = m.start_login(1);
            m.complete_login(&token_for("abc123", CLIENT_ID, &nonce)).await.unwrap()
        };

        let store = Arc::new(SessionStore::new(WaypointDb::open(dir.path()).unwrap()));
        let m = manager_with(store, Arc::new(NoopRegistrar));
        assert_eq!(m.resume().unwrap(), Some(identity.clone()));
        assert_eq!(m.state(), SessionState::LoggedIn(identity));
        assert!(m.signer().is_none(), "ephemeral keys do not survive a restart");
        assert!(m.take_registration().is_some(), "registration is re-sent");
    }

    #[tokio::test]
    async fn resume_with_nothing_persisted_is_logged_out() {
        let m = manager();
        assert_eq!(m.resume().unwrap(), None);
        assert_eq!(m.state(), SessionState::LoggedOut);
    }

    struct DownBackend;

    #[async_trait]
    impl BackendRegistrar for DownBackend {
        async fn register(
            &self,
            _: &str,
            _: &crate::identity::LedgerAddress,
        ) -> Result<(), RegistrationError> {
            Err(RegistrationError::Rejected {
                status: 503,
                message: "maintenance".into(),
            })
        }
    }

    #[tokio::test]
    async fn registration_failure_does_not_fail_login() {
        let m = manager_with(Arc::new(SessionStore::in_memory()), Arc::new(DownBackend));
        let nonce = m.start_login(1);
        let identity = m.complete_login(&token_for("abc123", CLIENT_ID, &nonce)).await;
        assert!(identity.is_ok());

        let outcome = m.take_registration().unwrap().await.unwrap();
        assert!(matches!(outcome, Err(RegistrationError::Rejected { status: 503, .. })));
        assert!(matches!(m.state(), SessionState::LoggedIn(_)));
    }
}
