//! # Identity Module
//!
//! Everything needed to turn an OAuth login into a ledger identity.
//!
//! The identity stack is layered, leaf first:
//!
//! 1. **Salt**: a pure function from the provider's subject id to the
//!    per-user salt. Changing it moves every user to a new address.
//! 2. **Ephemeral keys**: a fresh Ed25519 keypair and binding nonce per
//!    login attempt. The nonce rides through the OAuth round trip.
//! 3. **Token verifier**: local audience and expiry checks on the returned
//!    identity token.
//! 4. **Address deriver**: (token, salt) to a stable ledger address through
//!    the ledger-side proof capability.
//! 5. **Session proof**: the inputs a ledger checks to accept an ephemeral
//!    key as the owner of that address.
//!
//! The session manager in [`crate::session`] drives these in order.
//!
//! ## Design Decisions
//!
//! - The long-term identity is the (issuer, subject, audience, salt) tuple,
//!   not a key. Users never hold a long-term private key; each session signs
//!   with a throwaway Ed25519 key that the ledger accepts until `max_epoch`.
//! - Token signatures are not checked here. The proof capability proves the
//!   provider's signature and the backend re-verifies independently.

pub mod address;
pub mod ephemeral;
pub mod proof;
pub mod salt;
pub mod token;

pub use address::{
    compute_address, AddressDeriver, AddressError, LedgerAddress, LocalProofCapability,
    ProofCapability, ProofError,
};
pub use ephemeral::{begin_session, mint_ephemeral, EphemeralKeypair, EphemeralRecord, LoginNonce};
pub use proof::SessionProof;
pub use salt::{derive_salt, derive_salt_with_prefix, Salt};
pub use token::{encode_unsigned_token, TokenError, TokenVerifier, VerifiedClaims};
