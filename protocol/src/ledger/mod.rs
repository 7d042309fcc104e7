//! # Ledger Module
//!
//! Where co-signed transactions go.
//!
//! - [`LedgerClient`]: the submission boundary the coordinator talks to.
//! - [`DevnetLedger`]: an in-process ledger that enforces the two-signature
//!   rule and moves balances. Served over `/rpc` by the node on devnet.
//! - [`JsonRpcLedger`]: the HTTP client for any ledger that speaks the
//!   `ledger_*` JSON-RPC methods.

pub mod client;
pub mod devnet;
pub mod rpc;

pub use client::{LedgerClient, LedgerError};
pub use devnet::DevnetLedger;
pub use rpc::{ExecuteParams, JsonRpcError, JsonRpcLedger, JsonRpcRequest, JsonRpcResponse};
