//! # Session Proof
//!
//! What a ledger needs before it accepts an ephemeral key as the sender.
//!
//! On a production network this is the zero-knowledge proof: the provider
//! signed a token whose nonce commits to the ephemeral key, and the token's
//! claims plus the salt hash to the sender address. The devnet ledger has
//! no verifier for such proofs, so the user signature carries the public
//! inputs in the clear and the ledger recomputes both commitments:
//!
//! ```text
//! token.nonce == LoginNonce::compute(ephemeral_pk, max_epoch, randomness)
//! sender      == compute_address(token.iss, token.sub, audience, salt)
//! ```
//!
//! A key without a matching proof cannot move the sender's assets, no
//! matter who else signed the transaction.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::address::{compute_address, LedgerAddress, ProofError};
use super::ephemeral::LoginNonce;
use super::salt::Salt;
use super::token::{decode_claims, TokenError};
use crate::crypto::hash::token_fingerprint;
use crate::crypto::LedgerPublicKey;

/// Public inputs tying one ephemeral key to one token-derived address.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionProof {
    /// OAuth client id bound into the address seed.
    pub audience: String,
    pub token: String,
    pub salt: Salt,
    /// Last epoch the ephemeral key may sign in.
    pub max_epoch: u64,
    pub randomness: Vec<u8>,
}

impl SessionProof {
    /// The address `public_key` may sign for under this proof.
    ///
    /// Expiry of the token is not checked here; the ledger bounds the key
    /// by `max_epoch` instead.
    pub fn authorize(&self, public_key: &LedgerPublicKey) -> Result<LedgerAddress, ProofError> {
        let (claims, auds) = decode_claims(&self.token)?;
        if !auds.iter().any(|aud| aud == &self.audience) {
            return Err(TokenError::InvalidAudience {
                expected: self.audience.clone(),
                got: auds,
            }
            .into());
        }

        let committed = LoginNonce::compute(public_key, self.max_epoch, &self.randomness);
        match claims.nonce.as_deref() {
            Some(nonce) if committed.matches(nonce) => {}
            _ => return Err(ProofError::KeyNotBound),
        }

        Ok(compute_address(&claims.iss, &claims.sub, &self.audience, self.salt))
    }
}

impl fmt::Debug for SessionProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionProof")
            .field("audience", &self.audience)
            .field("token", &token_fingerprint(&self.token))
            .field("max_epoch", &self.max_epoch)
            .finish_non_exhaustive()
    }
}
