//! # Ledger JSON-RPC
//!
//! JSON-RPC 2.0 wire types shared by the node's `/rpc` endpoint and the
//! [`JsonRpcLedger`] client.
//!
//! ## Methods
//!
//! | Method                      | Params                                  | Result            |
//! |-----------------------------|-----------------------------------------|-------------------|
//! | `ledger_executeTransaction` | `[txBytesBase64, [sigBase64, sigBase64]]` | digest (base58) |
//! | `ledger_getBalance`         | `[address, coinType?]`                  | `u64`             |
//! | `ledger_getEpoch`           | none                                    | `u64`             |
//!
//! ## Error codes
//!
//! Standard JSON-RPC codes, plus `-32001` (not found) and `-32002`
//! (execution rejected). Only `-32002` and `-32602` map to
//! [`LedgerError::Rejected`]; everything else is treated as the ledger
//! being unavailable.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::client::{LedgerClient, LedgerError};
use crate::config::USER_AGENT;
use crate::transaction::{CoSignedTransaction, TransactionDigest};

// ---------------------------------------------------------------------------
// Method names and error codes
// ---------------------------------------------------------------------------

pub const METHOD_EXECUTE_TRANSACTION: &str = "ledger_executeTransaction";
pub const METHOD_GET_BALANCE: &str = "ledger_getBalance";
pub const METHOD_GET_EPOCH: &str = "ledger_getEpoch";

pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
pub const NOT_FOUND: i32 = -32001;
pub const EXECUTION_REJECTED: i32 = -32002;

// ---------------------------------------------------------------------------
// JSON-RPC Types
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 request envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version. Must be "2.0".
    pub jsonrpc: String,
    pub method: String,
    /// Positional parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    /// Request identifier. Echoed back in the response.
    pub id: serde_json::Value,
}

impl JsonRpcRequest {
    pub fn new(method: &str, params: serde_json::Value, id: u64) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params: Some(params),
            id: serde_json::Value::from(id),
        }
    }
}

/// A JSON-RPC 2.0 response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol version. Always "2.0".
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: serde_json::Value,
}

impl JsonRpcResponse {
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn failure(id: serde_json::Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

impl From<LedgerError> for JsonRpcError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Rejected(reason) => JsonRpcError::new(EXECUTION_REJECTED, reason),
            LedgerError::Unavailable(reason) => JsonRpcError::new(INTERNAL_ERROR, reason),
        }
    }
}

/// Parsed `ledger_executeTransaction` params.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteParams {
    pub tx_bytes: Vec<u8>,
    pub signatures: Vec<String>,
}

impl ExecuteParams {
    /// Parse `[txBytesBase64, [sig, ...]]`.
    pub fn parse(params: Option<&serde_json::Value>) -> Result<Self, JsonRpcError> {
        let invalid = || {
            JsonRpcError::new(
                INVALID_PARAMS,
                "Invalid params: expected [txBytesBase64, [signatures]]",
            )
        };
        let arr = params.and_then(|p| p.as_array()).ok_or_else(invalid)?;
        let [bytes, sigs] = arr.as_slice() else {
            return Err(invalid());
        };
        let tx_bytes = bytes
            .as_str()
            .and_then(|s| BASE64.decode(s).ok())
            .ok_or_else(invalid)?;
        let signatures = sigs
            .as_array()
            .ok_or_else(invalid)?
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(invalid)?;
        Ok(Self {
            tx_bytes,
            signatures,
        })
    }
}

// ---------------------------------------------------------------------------
// JsonRpcLedger
// ---------------------------------------------------------------------------

/// [`LedgerClient`] that talks JSON-RPC over HTTP.
#[derive(Debug)]
pub struct JsonRpcLedger {
    url: String,
    http_client: reqwest::Client,
    next_id: AtomicU64,
}

impl JsonRpcLedger {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, LedgerError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            http_client,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(method, params, id);
        tracing::debug!(method, id, url = %self.url, "ledger rpc call");

        let response = self
            .http_client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LedgerError::Unavailable(format!(
                "HTTP {} from {}",
                response.status(),
                self.url
            )));
        }

        let body: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::Unavailable(format!("invalid JSON-RPC response: {e}")))?;

        match (body.result, body.error) {
            (_, Some(error)) if error.code == EXECUTION_REJECTED || error.code == INVALID_PARAMS => {
                Err(LedgerError::Rejected(error.message))
            }
            (_, Some(error)) => Err(LedgerError::Unavailable(format!(
                "rpc error {}: {}",
                error.code, error.message
            ))),
            (Some(result), None) => Ok(result),
            (None, None) => Err(LedgerError::Unavailable("empty JSON-RPC response".into())),
        }
    }

    /// Balance of `address` in `coin_type` (native when `None`).
    pub async fn balance(&self, address: &str, coin_type: Option<&str>) -> Result<u64, LedgerError> {
        let params = match coin_type {
            Some(coin) => serde_json::json!([address, coin]),
            None => serde_json::json!([address]),
        };
        let result = self.call(METHOD_GET_BALANCE, params).await?;
        result
            .as_u64()
            .ok_or_else(|| LedgerError::Unavailable(format!("balance is not a number: {result}")))
    }
}

#[async_trait]
impl LedgerClient for JsonRpcLedger {
    async fn submit(&self, tx: &CoSignedTransaction) -> Result<TransactionDigest, LedgerError> {
        let params = serde_json::json!([BASE64.encode(tx.bytes()), tx.wire_signatures()]);
        let result = self.call(METHOD_EXECUTE_TRANSACTION, params).await?;
        let digest = result
            .as_str()
            .and_then(|s| s.parse::<TransactionDigest>().ok())
            .ok_or_else(|| LedgerError::Unavailable(format!("digest is not base58: {result}")))?;
        Ok(digest)
    }

    async fn current_epoch(&self) -> Result<u64, LedgerError> {
        let result = self.call(METHOD_GET_EPOCH, serde_json::json!([])).await?;
        result
            .as_u64()
            .ok_or_else(|| LedgerError::Unavailable(format!("epoch is not a number: {result}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::signatures::sign_intent;
    use crate::crypto::LedgerKeypair;
    use crate::identity::LedgerAddress;
    use crate::transaction::{SponsorSignature, SponsoredTransactionBuilder, UserSignature};
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use bytes::Bytes;
    use serde_json::json;

    /// Serve `router` on an ephemeral local port and return its `/rpc` URL.
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{addr}/rpc")
    }

    /// Answers every call with `reply(request)`.
    async fn ledger_stub<F>(reply: F) -> JsonRpcLedger
    where
        F: Fn(JsonRpcRequest) -> JsonRpcResponse + Clone + Send + Sync + 'static,
    {
        let router = Router::new().route(
            "/rpc",
            post(move |Json(req): Json<JsonRpcRequest>| {
                let reply = reply.clone();
                async move { Json(reply(req)) }
            }),
        );
        JsonRpcLedger::new(serve(router).await, Duration::from_secs(5)).unwrap()
    }

    fn cosigned() -> CoSignedTransaction {
        let sponsor = LedgerKeypair::generate();
        let user = LedgerKeypair::generate();
        let bytes = SponsoredTransactionBuilder::new(LedgerAddress::from_bytes([0xA1; 32]))
            .recipient(LedgerAddress::from_bytes([0xB0; 32]))
            .native(5)
            .sponsor(sponsor.public_key())
            .build()
            .unwrap()
            .to_bytes()
            .unwrap();
        CoSignedTransaction::new(
            Bytes::from(bytes.clone()),
            SponsorSignature::sign(&sponsor, &bytes),
            UserSignature::new(sign_intent(&user, &bytes), user.public_key()),
        )
    }

    #[tokio::test]
    async fn submit_returns_the_digest_from_the_node() {
        let tx = cosigned();
        let expected = (BASE64.encode(tx.bytes()), tx.wire_signatures(), tx.digest());
        let ledger = ledger_stub(move |req| {
            let (bytes, sigs, digest) = expected.clone();
            match ExecuteParams::parse(req.params.as_ref()) {
                Ok(params) if req.method == METHOD_EXECUTE_TRANSACTION
                    && BASE64.encode(&params.tx_bytes) == bytes
                    && params.signatures == sigs =>
                {
                    JsonRpcResponse::success(req.id, json!(digest.to_string()))
                }
                Ok(_) => JsonRpcResponse::failure(req.id, JsonRpcError::new(INVALID_REQUEST, "unexpected call")),
                Err(e) => JsonRpcResponse::failure(req.id, e),
            }
        })
        .await;

        assert_eq!(ledger.submit(&tx).await.unwrap(), tx.digest());
    }

    #[tokio::test]
    async fn execution_rejected_maps_to_rejected() {
        let ledger = ledger_stub(|req| {
            JsonRpcResponse::failure(
                req.id,
                JsonRpcError::new(EXECUTION_REJECTED, "transaction expired at epoch 5, current epoch 9"),
            )
        })
        .await;
        let err = ledger.submit(&cosigned()).await.unwrap_err();
        assert_eq!(
            err,
            LedgerError::Rejected("transaction expired at epoch 5, current epoch 9".into())
        );
    }

    #[tokio::test]
    async fn other_rpc_errors_and_bad_results_are_unavailable() {
        let ledger = ledger_stub(|req| match req.method.as_str() {
            METHOD_GET_EPOCH => JsonRpcResponse::failure(req.id, JsonRpcError::new(INTERNAL_ERROR, "db locked")),
            _ => JsonRpcResponse::success(req.id, json!("not-a-digest")),
        })
        .await;

        let err = ledger.current_epoch().await.unwrap_err();
        assert_eq!(err, LedgerError::Unavailable("rpc error -32603: db locked".into()));
        let err = ledger.submit(&cosigned()).await.unwrap_err();
        assert!(matches!(err, LedgerError::Unavailable(ref m) if m.starts_with("digest is not base58")));
    }

    #[tokio::test]
    async fn epoch_and_balance_over_rpc() {
        let ledger = ledger_stub(|req| {
            let result = match req.method.as_str() {
                METHOD_GET_EPOCH => json!(7),
                METHOD_GET_BALANCE => match req.params.as_ref().and_then(|p| p.get(1)) {
                    Some(_) => json!(20),
                    None => json!(1_500),
                },
                _ => json!(null),
            };
            JsonRpcResponse::success(req.id, result)
        })
        .await;

        assert_eq!(ledger.current_epoch().await.unwrap(), 7);
        assert_eq!(ledger.balance("0xa1", None).await.unwrap(), 1_500);
        assert_eq!(ledger.balance("0xa1", Some("0xbeef::token::T")).await.unwrap(), 20);
    }

    #[tokio::test]
    async fn http_failure_status_is_unavailable() {
        let router = Router::new().route("/rpc", post(|| async { StatusCode::INTERNAL_SERVER_ERROR }));
        let ledger = JsonRpcLedger::new(serve(router).await, Duration::from_secs(5)).unwrap();
        let err = ledger.current_epoch().await.unwrap_err();
        assert!(matches!(err, LedgerError::Unavailable(ref m) if m.starts_with("HTTP 500")));
    }

    #[test]
    fn execute_params_parse() {
        let params = json!([BASE64.encode(b"tx"), ["a", "b"]]);
        let parsed = ExecuteParams::parse(Some(&params)).unwrap();
        assert_eq!(parsed.tx_bytes, b"tx");
        assert_eq!(parsed.signatures, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn execute_params_reject_bad_shapes() {
        for params in [
            json!([]),
            json!(["!!!", []]),
            json!([BASE64.encode(b"tx")]),
            json!([BASE64.encode(b"tx"), "not an array"]),
            json!([BASE64.encode(b"tx"), [1, 2]]),
            json!({ "tx": "x" }),
        ] {
            let err = ExecuteParams::parse(Some(&params)).unwrap_err();
            assert_eq!(err.code, INVALID_PARAMS, "{params}");
        }
        assert!(ExecuteParams::parse(None).is_err());
    }

    #[test]
    fn ledger_errors_map_to_rpc_codes() {
        let rejected: JsonRpcError = LedgerError::Rejected("nope".into()).into();
        assert_eq!(rejected, JsonRpcError::new(EXECUTION_REJECTED, "nope"));
        let down: JsonRpcError = LedgerError::Unavailable("down".into()).into();
        assert_eq!(down.code, INTERNAL_ERROR);
    }

    #[test]
    fn response_omits_absent_fields() {
        let ok = JsonRpcResponse::success(json!(1), json!(42));
        let text = serde_json::to_string(&ok).unwrap();
        assert!(!text.contains("error"));
        let back: JsonRpcResponse = serde_json::from_str(&text).unwrap();
        assert_eq!(back.result, Some(json!(42)));
    }

    #[tokio::test]
    async fn unreachable_ledger_is_unavailable() {
        // Port 9 (discard) is closed on any sane test host.
        let ledger = JsonRpcLedger::new("http://127.0.0.1:9/rpc", Duration::from_secs(2)).unwrap();
        let err = ledger.current_epoch().await.unwrap_err();
        assert!(matches!(err, LedgerError::Unavailable(_)));
    }
}
