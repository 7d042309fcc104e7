//! # Session Module
//!
//! The identity session of one device: login state machine, the two-tier
//! session store, backend registration and the user's signer.
//!
//! ```text
//! manager.rs        IdentitySessionManager and SessionState
//! store.rs          SessionStore (transient keys + durable identity)
//! identity.rs       BridgedIdentity
//! signer.rs         EphemeralSigner
//! registration.rs   detached POST /user task
//! error.rs          SessionError
//! ```

pub mod error;
pub mod identity;
pub mod manager;
pub mod registration;
pub mod signer;
pub mod store;

pub use error::SessionError;
pub use identity::BridgedIdentity;
pub use manager::{IdentitySessionManager, SessionState};
pub use registration::{
    spawn_registration, BackendRegistrar, NoopRegistrar, RegistrationError, RegistrationHandle,
};
pub use signer::EphemeralSigner;
pub use store::{IdentityStore, MemoryIdentityStore, SessionStore};
