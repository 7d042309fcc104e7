//! What a caller should do after a failure.
//!
//! Nothing in this crate retries on its own. Every user-facing error
//! classifies itself so the UI layer can pick between "try again",
//! "sign in again" and "give up".

use serde::{Deserialize, Serialize};

/// Recovery classification attached to every user-facing error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recovery {
    /// Transient. The same action may succeed if repeated.
    Retry,
    /// The login flow has to start over before the action can succeed.
    RestartFlow,
    /// Repeating the action unchanged will fail again.
    DoNotRetry,
}

impl Recovery {
    /// Whether repeating the action unchanged could succeed.
    pub fn is_retryable(self) -> bool {
        matches!(self, Recovery::Retry)
    }
}
