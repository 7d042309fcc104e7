//! The bridged identity record.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::hash::token_fingerprint;
use crate::identity::{LedgerAddress, VerifiedClaims};

/// A user's ledger identity, as created by a successful login.
///
/// Only [`IdentitySessionManager`](super::IdentitySessionManager) builds
/// these, and only after address derivation succeeded. Persisted durably
/// under `IDENTITY_STORAGE_KEY` and destroyed on logout.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgedIdentity {
    pub subject: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub address: LedgerAddress,
    /// The raw identity token. Sent as the bearer credential to the backend.
    /// Absent on records written by older clients.
    #[serde(default)]
    pub token: Option<String>,
}

impl BridgedIdentity {
    pub(crate) fn from_claims(claims: VerifiedClaims, address: LedgerAddress, token: &str) -> Self {
        Self {
            subject: claims.sub,
            email: claims.email,
            name: claims.name,
            avatar: claims.picture,
            address,
            token: Some(token.to_string()),
        }
    }
}

impl fmt::Debug for BridgedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgedIdentity")
            .field("subject", &self.subject)
            .field("address", &self.address)
            .field("email", &self.email)
            .field("token", &self.token.as_deref().map(token_fingerprint))
            .finish_non_exhaustive()
    }
}
