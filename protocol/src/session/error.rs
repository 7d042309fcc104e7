//! Error types for the identity session.

use thiserror::Error;

use crate::identity::{ProofError, TokenError};
use crate::recovery::Recovery;
use crate::storage::DbError;

/// Errors returned by [`IdentitySessionManager`](super::IdentitySessionManager).
///
/// A failed `complete_login` leaves the manager in `Authenticating` and the
/// persisted identity untouched, whatever the variant.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The identity token failed local verification.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// The token's `nonce` claim does not belong to the pending login
    /// attempt. Either it was minted for another ephemeral key, or a newer
    /// `start_login` has replaced the attempt it was minted for.
    #[error("token nonce does not match the pending login attempt")]
    NonceMismatch,

    /// `complete_login` was called with no login attempt in progress.
    #[error("no login attempt in progress")]
    NoPendingLogin,

    /// The proof capability could not derive an address.
    #[error("address derivation failed: {0}")]
    Proof(#[from] ProofError),

    /// The durable identity store failed.
    #[error("identity store error: {0}")]
    Store(#[from] DbError),
}

impl SessionError {
    pub fn recovery(&self) -> Recovery {
        match self {
            SessionError::Token(e) => e.recovery(),
            SessionError::NonceMismatch | SessionError::NoPendingLogin => Recovery::RestartFlow,
            SessionError::Proof(e) => e.recovery(),
            SessionError::Store(_) => Recovery::Retry,
        }
    }
}
