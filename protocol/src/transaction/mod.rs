//! # Transaction Module
//!
//! Sponsored transactions: built by the sponsor, signed by two authorities,
//! submitted as one.
//!
//! ## Lifecycle
//!
//! ```text
//! SponsoredTransactionBuilder::build()   (sponsor backend)
//!     → SponsoredTransactionData::to_bytes()
//!     → SponsorSignature::sign()         (gas owner)
//!     → UserSignature                    (device, ephemeral key)
//!     → CoSignedTransaction::verify()    (ledger)
//! ```
//!
//! After `to_bytes`, the bytes are the source of truth. Nobody re-encodes a
//! transaction they received; they sign and forward the exact bytes.
//!
//! ## Submodules
//!
//! - [`types`]: asset selector, transfer kinds, digests.
//! - [`builder`]: transaction data and its builder.
//! - [`signing`]: wire signatures for each authority.
//! - [`verification`]: co-signed assembly and the checks the ledger runs.

pub mod builder;
pub mod signing;
pub mod types;
pub mod verification;

pub use builder::{GasData, SponsoredTransactionBuilder, SponsoredTransactionData};
pub use signing::{SponsorSignature, UserSignature, WireSignature};
pub use types::{AssetType, DigestParseError, TransactionDigest, TransferKind};
pub use verification::{CoSignedTransaction, TransactionError};
