//! The sponsor backend, as seen from the device.
//!
//! Two calls, both authenticated with the identity token as a bearer:
//!
//! ```text
//! POST /user     { "address": "0x.." }                      -> 2xx
//! POST /sponsor  { senderAddress, recipient, amount,
//!                  assetType, objectId }                     -> { sponsoredTxBytes,
//!                                                                 sponsorSignature }
//! errors         { "error": "..." }
//! ```
//!
//! [`HttpBackend`] implements both [`SponsorBackend`] and
//! [`BackendRegistrar`], so one client serves the session manager and the
//! coordinator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::SponsorError;
use super::request::SponsorshipRequest;
use crate::config::{BridgeConfig, USER_AGENT};
use crate::identity::LedgerAddress;
use crate::session::{BackendRegistrar, RegistrationError};

/// Body of a successful `POST /sponsor`. Both fields are base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SponsoredResponse {
    pub sponsored_tx_bytes: String,
    pub sponsor_signature: String,
}

/// Body of `POST /user`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterUserBody {
    pub address: String,
}

/// Error body used by every backend endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Whoever pays for gas.
#[async_trait]
pub trait SponsorBackend: Send + Sync {
    async fn sponsor(
        &self,
        token: &str,
        request: &SponsorshipRequest,
    ) -> Result<SponsoredResponse, SponsorError>;
}

// ---------------------------------------------------------------------------
// HttpBackend
// ---------------------------------------------------------------------------

/// `reqwest` client for the sponsor backend.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SponsorError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| SponsorError::SponsorUnavailable(format!("http client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
        })
    }

    pub fn from_config(config: &BridgeConfig) -> Result<Self, SponsorError> {
        Self::new(config.backend_url.clone(), config.request_timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Pull the `error` field out of a failed response, falling back to the raw
/// body, then to the status line.
async fn error_text(response: reqwest::Response) -> String {
    let status = response.status();
    match response.text().await {
        Ok(body) => match serde_json::from_str::<ErrorBody>(&body) {
            Ok(parsed) => parsed.error,
            Err(_) if !body.trim().is_empty() => body,
            Err(_) => format!("HTTP {status}"),
        },
        Err(_) => format!("HTTP {status}"),
    }
}

#[async_trait]
impl SponsorBackend for HttpBackend {
    async fn sponsor(
        &self,
        token: &str,
        request: &SponsorshipRequest,
    ) -> Result<SponsoredResponse, SponsorError> {
        let url = self.url("/sponsor");
        tracing::debug!(%url, asset = %request.asset_type, "requesting sponsorship");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(token)
            .json(request)
            .send()
            .await
            .map_err(|e| SponsorError::SponsorUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SponsorError::SponsorUnavailable(error_text(response).await));
        }

        response
            .json::<SponsoredResponse>()
            .await
            .map_err(|e| SponsorError::SponsorUnavailable(format!("invalid sponsor response: {e}")))
    }
}

#[async_trait]
impl BackendRegistrar for HttpBackend {
    async fn register(&self, token: &str, address: &LedgerAddress) -> Result<(), RegistrationError> {
        let body = RegisterUserBody {
            address: address.to_string(),
        };
        let response = self
            .http_client
            .post(self.url("/user"))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| RegistrationError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegistrationError::Rejected {
                status: status.as_u16(),
                message: error_text(response).await,
            });
        }
        Ok(())
    }
}
