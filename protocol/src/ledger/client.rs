//! The ledger submission boundary.

use async_trait::async_trait;
use thiserror::Error;

use crate::recovery::Recovery;
use crate::transaction::{CoSignedTransaction, TransactionDigest};

/// Why a submission did not produce a digest.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The ledger looked at the transaction and said no. The reason is the
    /// ledger's own text, unmodified.
    #[error("ledger rejected transaction: {0}")]
    Rejected(String),

    /// The ledger could not be reached or did not answer sensibly.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

impl LedgerError {
    pub fn recovery(&self) -> Recovery {
        match self {
            LedgerError::Rejected(_) => Recovery::DoNotRetry,
            LedgerError::Unavailable(_) => Recovery::Retry,
        }
    }
}

/// Anything that accepts co-signed transactions.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Submit the bytes with both signatures. Atomic: the ledger either
    /// executes the whole transaction or none of it.
    async fn submit(&self, tx: &CoSignedTransaction) -> Result<TransactionDigest, LedgerError>;

    /// The ledger's current epoch. Used to bound ephemeral keys.
    async fn current_epoch(&self) -> Result<u64, LedgerError>;
}
