//! # Ephemeral Session Keys
//!
//! Every login attempt mints a fresh Ed25519 keypair and a nonce that binds
//! it into the OAuth round trip:
//!
//! ```text
//! randomness = 16 bytes from OsRng
//! nonce      = base64url(BLAKE3-derive_key(NONCE_CONTEXT,
//!                  ephemeral_pubkey || max_epoch (LE) || randomness)[..20])
//! ```
//!
//! The nonce goes into the identity-provider request and comes back inside
//! the signed token. A token is therefore only good for the ephemeral key
//! whose nonce it carries. Present it with a different key and the binding
//! check in the session manager refuses it.
//!
//! The secret half lives only in the transient slot of the
//! [`SessionStore`](crate::session::SessionStore). It is never written to
//! durable storage and is zeroized when dropped.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::{NONCE_CONTEXT, NONCE_HASH_BYTES, NONCE_RANDOMNESS_BYTES};
use crate::crypto::hash::domain_separated_hash;
use crate::crypto::keys::{LedgerKeypair, LedgerPublicKey, LedgerSignature};
use crate::crypto::signatures::sign_intent;
use crate::session::SessionStore;

// ---------------------------------------------------------------------------
// LoginNonce
// ---------------------------------------------------------------------------

/// The binding value embedded in the identity-provider request.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginNonce(String);

impl LoginNonce {
    /// Compute the nonce for an ephemeral public key, epoch bound, and randomness.
    pub fn compute(public_key: &LedgerPublicKey, max_epoch: u64, randomness: &[u8]) -> Self {
        let digest = domain_separated_hash(
            NONCE_CONTEXT,
            &[public_key.as_bytes(), &max_epoch.to_le_bytes(), randomness],
        );
        Self(URL_SAFE_NO_PAD.encode(&digest[..NONCE_HASH_BYTES]))
    }

    /// The nonce string as sent to the identity provider.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compare against the nonce claim of a returned token.
    ///
    /// Constant-time over equal-length inputs.
    pub fn matches(&self, token_nonce: &str) -> bool {
        let ours = self.0.as_bytes();
        let theirs = token_nonce.as_bytes();
        if ours.len() != theirs.len() {
            return false;
        }
        ours.iter()
            .zip(theirs)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl fmt::Display for LoginNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for LoginNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LoginNonce({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// EphemeralRecord
// ---------------------------------------------------------------------------

/// Everything needed to resume a login attempt later in the same session.
///
/// Lives in transient storage only. Wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EphemeralRecord {
    secret_key: [u8; 32],
    randomness: [u8; NONCE_RANDOMNESS_BYTES],
    max_epoch: u64,
    nonce: String,
}

impl EphemeralRecord {
    /// The nonce this record was minted with.
    pub fn nonce(&self) -> LoginNonce {
        LoginNonce(self.nonce.clone())
    }

    /// Last epoch at which the ephemeral key is valid.
    pub fn max_epoch(&self) -> u64 {
        self.max_epoch
    }

    /// Randomness mixed into the nonce. The proof capability needs it to
    /// reconstruct the nonce in zero knowledge.
    pub fn randomness(&self) -> &[u8] {
        &self.randomness
    }

    /// Rebuild the signing keypair.
    pub fn keypair(&self) -> EphemeralKeypair {
        EphemeralKeypair {
            inner: LedgerKeypair::from_seed(&self.secret_key),
            max_epoch: self.max_epoch,
        }
    }
}

impl fmt::Debug for EphemeralRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralRecord")
            .field("max_epoch", &self.max_epoch)
            .field("nonce", &self.nonce)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// EphemeralKeypair
// ---------------------------------------------------------------------------

/// The short-lived signing key of one login attempt.
#[derive(Clone, PartialEq, Eq)]
pub struct EphemeralKeypair {
    inner: LedgerKeypair,
    max_epoch: u64,
}

impl EphemeralKeypair {
    /// Public half, embedded (via the nonce) in the identity token.
    pub fn public_key(&self) -> LedgerPublicKey {
        self.inner.public_key()
    }

    /// Last epoch at which the ledger accepts signatures from this key.
    pub fn max_epoch(&self) -> u64 {
        self.max_epoch
    }

    /// Sign transaction bytes under the intent scheme. The bytes are only
    /// read, never altered.
    pub fn sign_transaction(&self, tx_bytes: &[u8]) -> LedgerSignature {
        sign_intent(&self.inner, tx_bytes)
    }
}

impl fmt::Debug for EphemeralKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EphemeralKeypair(pub={}, max_epoch={})",
            self.public_key().to_hex(),
            self.max_epoch
        )
    }
}

// ---------------------------------------------------------------------------
// Session start
// ---------------------------------------------------------------------------

/// Mint a keypair, randomness and nonce without touching any store.
pub fn mint_ephemeral(max_epoch: u64) -> EphemeralRecord {
    let keypair = LedgerKeypair::generate();
    let mut randomness = [0u8; NONCE_RANDOMNESS_BYTES];
    OsRng.fill_bytes(&mut randomness);
    let nonce = LoginNonce::compute(&keypair.public_key(), max_epoch, &randomness);

    EphemeralRecord {
        secret_key: keypair.secret_key_bytes(),
        randomness,
        max_epoch,
        nonce: nonce.0,
    }
}

/// Begin a login attempt.
///
/// Generates a fresh keypair and nonce and writes the record into the
/// store's transient slot, replacing any earlier attempt. Only the most
/// recent attempt is completable.
pub fn begin_session(store: &SessionStore, max_epoch: u64) -> (EphemeralKeypair, LoginNonce) {
    let record = mint_ephemeral(max_epoch);
    let result = (record.keypair(), record.nonce());
    store.put_ephemeral(record);
    tracing::debug!(max_epoch, "ephemeral session keys minted");
    result
}
