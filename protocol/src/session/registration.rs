//! Backend registration, fire-and-forget.
//!
//! After a login the device tells the backend which address belongs to the
//! bearer of the token (`POST /user`). The login does not wait for it and
//! does not fail because of it. The detached task's `JoinHandle` is the
//! error channel: callers that care can await it, everyone else gets a
//! `warn!` line.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::crypto::hash::token_fingerprint;
use crate::identity::LedgerAddress;

/// Why the backend did not record the registration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// The backend could not be reached.
    #[error("backend unreachable: {0}")]
    Transport(String),

    /// The backend answered with an error.
    #[error("backend refused registration (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },
}

/// The backend's user endpoint.
#[async_trait]
pub trait BackendRegistrar: Send + Sync {
    async fn register(&self, token: &str, address: &LedgerAddress)
        -> Result<(), RegistrationError>;
}

/// Registrar that does nothing. For offline devices and tests that do not
/// care about the backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRegistrar;

#[async_trait]
impl BackendRegistrar for NoopRegistrar {
    async fn register(&self, _: &str, _: &LedgerAddress) -> Result<(), RegistrationError> {
        Ok(())
    }
}

/// Handle to a detached registration task.
pub type RegistrationHandle = JoinHandle<Result<(), RegistrationError>>;

/// Spawn the registration call on the current Tokio runtime.
///
/// Returns `None` when called outside a runtime; the registration is then
/// skipped and logged, and will be retried on the next `resume`.
pub fn spawn_registration(
    registrar: Arc<dyn BackendRegistrar>,
    token: String,
    address: LedgerAddress,
) -> Option<RegistrationHandle> {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        tracing::warn!(%address, "no async runtime; backend registration skipped");
        return None;
    };

    Some(runtime.spawn(async move {
        let fingerprint = token_fingerprint(&token);
        match registrar.register(&token, &address).await {
            Ok(()) => {
                tracing::debug!(%address, token = %fingerprint, "backend registration recorded");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(%address, token = %fingerprint, error = %e, "backend registration failed");
                Err(e)
            }
        }
    }))
}
