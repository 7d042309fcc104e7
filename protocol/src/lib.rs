// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Waypoint Protocol: Core Library
//!
//! Waypoint lets someone who signed in with an OAuth provider own a ledger
//! address and move assets from it, without ever holding a seed phrase or
//! a single coin for gas.
//!
//! Two ideas carry the whole thing:
//!
//! 1. **Identity bridge.** A provider-issued token, a per-user salt and a
//!    short-lived ephemeral key are combined into a stable ledger address.
//!    The token is bound to the ephemeral key through the login nonce, so a
//!    token captured elsewhere is useless here.
//! 2. **Sponsored transactions.** Every transfer carries two signatures over
//!    the same bytes: the user's, as sender, and a sponsor's, as gas owner.
//!    The ledger accepts it only with both.
//!
//! ## Architecture
//!
//! - **identity**: Salt, ephemeral keys and nonce, token checks, addresses.
//! - **session**: The login state machine and what it persists.
//! - **transaction**: Sponsored transaction bytes and the two signatures.
//! - **sponsor**: Getting a transfer sponsored, signed and submitted.
//! - **ledger**: Submission boundary, JSON-RPC client, devnet ledger.
//! - **storage**: sled-backed identity record and user registry.
//! - **checkin**: Proximity gate for location check-ins.
//! - **crypto**: Ed25519 keys, hashing, intent signatures.
//! - **recovery**: What a caller should do about an error.
//! - **config**: Protocol constants and runtime configuration.
//!
//! ## Ground Rules
//!
//! 1. Key material never leaves the device and never reaches a log line.
//! 2. Tokens are logged by fingerprint only.
//! 3. Whatever is signed is signed as bytes, exactly as received.
//! 4. Nothing retries on its own. Errors say whether a retry makes sense.

pub mod checkin;
pub mod config;
pub mod crypto;
pub mod identity;
pub mod ledger;
pub mod recovery;
pub mod session;
pub mod sponsor;
pub mod storage;
pub mod transaction;

pub use recovery::Recovery;
