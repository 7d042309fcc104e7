//! # Token Verifier
//!
//! Local checks on the identity token returned by the OAuth provider.
//!
//! The verifier decodes the JWT payload and checks two things against local
//! configuration: the audience is our client id, and the token has not
//! expired. It does **not** check the issuer's signature. That is the proof
//! capability's job (it proves possession of a provider-signed token in zero
//! knowledge), and the backend re-checks the token independently.
//!
//! ## What we read
//!
//! `sub`, `aud`, `exp` are required. `iss`, `nonce`, `email`, `name` and
//! `picture` are optional. Everything else is ignored. `aud` may be a single
//! string or an array of strings, as RFC 7519 allows.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::recovery::Recovery;

/// Reasons a token is refused.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// The token was minted for a different OAuth client.
    #[error("token audience {got:?} does not match client id {expected:?}")]
    InvalidAudience { expected: String, got: Vec<String> },

    /// `exp` is at or before the current time.
    #[error("token expired at {exp} (now {now})")]
    Expired { exp: u64, now: u64 },

    /// Not three dot-separated segments, bad base64, bad JSON, or a
    /// required claim is missing.
    #[error("malformed token: {0}")]
    MalformedToken(String),
}

impl TokenError {
    pub fn recovery(&self) -> Recovery {
        match self {
            TokenError::Expired { .. } => Recovery::RestartFlow,
            TokenError::InvalidAudience { .. } | TokenError::MalformedToken(_) => {
                Recovery::DoNotRetry
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Claims
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    fn into_vec(self) -> Vec<String> {
        match self {
            Audience::One(aud) => vec![aud],
            Audience::Many(auds) => auds,
        }
    }
}

#[derive(Deserialize)]
struct RawClaims {
    sub: Option<String>,
    aud: Option<Audience>,
    exp: Option<u64>,
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    nonce: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

/// Claims of a token that passed local verification.
///
/// Only constructed by [`TokenVerifier`], so holding one means the audience
/// and expiry checks were done. `aud` is the matched client id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedClaims {
    pub sub: String,
    pub aud: String,
    pub exp: u64,
    pub iss: String,
    pub nonce: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
}

/// Decode the claims of a JWT without checking anything.
///
/// Used where the token has already been verified upstream and only the
/// claim values are needed.
pub(crate) fn decode_claims(token: &str) -> Result<(RawClaimsView, Vec<String>), TokenError> {
    let raw = decode_raw(token)?;
    let auds = raw
        .aud
        .ok_or_else(|| TokenError::MalformedToken("missing aud claim".into()))?
        .into_vec();
    let view = RawClaimsView {
        sub: raw
            .sub
            .ok_or_else(|| TokenError::MalformedToken("missing sub claim".into()))?,
        exp: raw
            .exp
            .ok_or_else(|| TokenError::MalformedToken("missing exp claim".into()))?,
        iss: raw.iss.unwrap_or_default(),
        nonce: raw.nonce,
        email: raw.email,
        name: raw.name,
        picture: raw.picture,
    };
    Ok((view, auds))
}

/// Required claims present, audience not yet checked.
pub(crate) struct RawClaimsView {
    pub sub: String,
    pub exp: u64,
    pub iss: String,
    pub nonce: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
}

fn decode_raw(token: &str) -> Result<RawClaims, TokenError> {
    let mut segments = token.trim().split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(TokenError::MalformedToken(
            "expected three dot-separated segments".into(),
        ));
    };

    // Some providers pad their segments; the JOSE encoding is unpadded.
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| TokenError::MalformedToken(format!("payload is not base64url: {e}")))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| TokenError::MalformedToken(format!("payload is not a claim set: {e}")))
}

// ---------------------------------------------------------------------------
// Verifier
// ---------------------------------------------------------------------------

/// Checks audience and expiry against the configured OAuth client id.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    client_id: String,
}

impl TokenVerifier {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Verify against the system clock.
    pub fn verify(&self, token: &str) -> Result<VerifiedClaims, TokenError> {
        let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0);
        self.verify_at(token, now)
    }

    /// Verify against an explicit clock, in seconds since the Unix epoch.
    ///
    /// Audience is checked before expiry: a token for another client is
    /// refused as such even when it has also expired.
    pub fn verify_at(&self, token: &str, now: u64) -> Result<VerifiedClaims, TokenError> {
        let (claims, auds) = decode_claims(token)?;

        if !auds.iter().any(|aud| aud == &self.client_id) {
            return Err(TokenError::InvalidAudience {
                expected: self.client_id.clone(),
                got: auds,
            });
        }

        if claims.exp <= now {
            return Err(TokenError::Expired {
                exp: claims.exp,
                now,
            });
        }

        Ok(VerifiedClaims {
            sub: claims.sub,
            aud: self.client_id.clone(),
            exp: claims.exp,
            iss: claims.iss,
            nonce: claims.nonce,
            email: claims.email,
            name: claims.name,
            picture: claims.picture,
        })
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// Build an unsigned JWT carrying `claims`. The signature segment is a
/// fixed placeholder; nothing in this crate checks it.
#[doc(hidden)]
pub fn encode_unsigned_token(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
    format!("{header}.{payload}.c2lnbmF0dXJl")
}
