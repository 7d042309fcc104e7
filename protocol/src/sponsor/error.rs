//! Error types for sponsorship.

use thiserror::Error;

use crate::identity::TokenError;
use crate::ledger::LedgerError;
use crate::recovery::Recovery;
use crate::storage::DbError;
use crate::transaction::TransactionError;

/// Errors returned by the sponsorship coordinator.
///
/// Every variant is terminal for the `send` call that produced it. Nothing
/// here is retried automatically; [`SponsorError::recovery`] tells the
/// caller whether it is worth trying again.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SponsorError {
    /// The request failed local validation. Nothing was sent anywhere.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The identity carries no token to authenticate with the backend.
    #[error("identity has no token; log in again")]
    NotAuthenticated,

    /// The sponsor backend could not be reached, answered with an error, or
    /// sent something unreadable. Backend error text is kept verbatim.
    #[error("sponsor unavailable: {0}")]
    SponsorUnavailable(String),

    /// The sponsor returned a transaction that is not the one requested.
    /// It was not signed.
    #[error("sponsor returned a different transaction: {0}")]
    SponsorMismatch(String),

    /// No signer is available for this identity.
    #[error("no signer available for this identity")]
    MissingSignature,

    /// The ledger refused the co-signed transaction. Reason verbatim.
    #[error("ledger rejected transaction: {0}")]
    LedgerRejected(String),

    /// The ledger could not be reached.
    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),
}

impl SponsorError {
    pub fn recovery(&self) -> Recovery {
        match self {
            SponsorError::SponsorUnavailable(_) | SponsorError::LedgerUnavailable(_) => {
                Recovery::Retry
            }
            SponsorError::MissingSignature | SponsorError::NotAuthenticated => {
                Recovery::RestartFlow
            }
            SponsorError::InvalidRequest(_)
            | SponsorError::SponsorMismatch(_)
            | SponsorError::LedgerRejected(_) => Recovery::DoNotRetry,
        }
    }
}

impl From<LedgerError> for SponsorError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Rejected(reason) => SponsorError::LedgerRejected(reason),
            LedgerError::Unavailable(reason) => SponsorError::LedgerUnavailable(reason),
        }
    }
}

/// Errors returned by the backend-side [`SponsorService`](super::SponsorService).
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The bearer token failed verification.
    #[error("unauthorized: {0}")]
    Unauthorized(#[from] TokenError),

    /// The request body is invalid or does not match the caller.
    #[error("{0}")]
    InvalidRequest(String),

    /// The transaction could not be built.
    #[error("transaction build failed: {0}")]
    Build(#[from] TransactionError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("storage error: {0}")]
    Store(#[from] DbError),

    /// The address derivation failed.
    #[error("address derivation failed: {0}")]
    Proof(String),
}

impl From<SponsorError> for ServiceError {
    fn from(e: SponsorError) -> Self {
        match e {
            SponsorError::InvalidRequest(reason) => ServiceError::InvalidRequest(reason),
            other => ServiceError::InvalidRequest(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovery_classification() {
        assert_eq!(SponsorError::SponsorUnavailable("x".into()).recovery(), Recovery::Retry);
        assert_eq!(SponsorError::MissingSignature.recovery(), Recovery::RestartFlow);
        assert_eq!(SponsorError::LedgerRejected("x".into()).recovery(), Recovery::DoNotRetry);
        assert_eq!(SponsorError::InvalidRequest("x".into()).recovery(), Recovery::DoNotRetry);
        assert_eq!(SponsorError::SponsorMismatch("x".into()).recovery(), Recovery::DoNotRetry);
    }

    #[test]
    fn ledger_errors_convert() {
        assert_eq!(
            SponsorError::from(LedgerError::Rejected("InsufficientGas".into())),
            SponsorError::LedgerRejected("InsufficientGas".into())
        );
        assert!(SponsorError::from(LedgerError::Unavailable("timeout".into()))
            .recovery()
            .is_retryable());
    }
}
