//! The signing capability of a logged-in user.

use crate::crypto::LedgerPublicKey;
use crate::identity::{EphemeralKeypair, LedgerAddress, SessionProof};
use crate::transaction::UserSignature;

/// The user's side of a co-signed transaction: the ephemeral key of the
/// current session, tied to the address it signs for by a [`SessionProof`].
///
/// Only handed out while the session is logged in and its key material is
/// still in memory. After a restart there is an identity but no signer
/// until the user logs in again.
#[derive(Debug, Clone)]
pub struct EphemeralSigner {
    address: LedgerAddress,
    keypair: EphemeralKeypair,
    proof: SessionProof,
}

impl EphemeralSigner {
    pub(crate) fn new(address: LedgerAddress, keypair: EphemeralKeypair, proof: SessionProof) -> Self {
        Self {
            address,
            keypair,
            proof,
        }
    }

    pub fn address(&self) -> LedgerAddress {
        self.address
    }

    pub fn public_key(&self) -> LedgerPublicKey {
        self.keypair.public_key()
    }

    pub fn max_epoch(&self) -> u64 {
        self.keypair.max_epoch()
    }

    /// Sign the exact transaction bytes. The proof rides along.
    pub fn sign(&self, tx_bytes: &[u8]) -> UserSignature {
        UserSignature::new(self.keypair.sign_transaction(tx_bytes), self.public_key())
            .with_proof(self.proof.clone())
    }
}
