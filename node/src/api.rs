//! # REST + JSON-RPC API
//!
//! Builds the axum router for the sponsor backend and the devnet ledger.
//! All endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path       | Auth   | Description                                |
//! |--------|------------|--------|--------------------------------------------|
//! | GET    | `/health`  |        | Liveness probe                             |
//! | GET    | `/status`  |        | Epoch, sponsor, registered users           |
//! | POST   | `/user`    | Bearer | Register the caller's address              |
//! | POST   | `/sponsor` | Bearer | Build and co-sign a transfer as gas owner  |
//! | POST   | `/rpc`     |        | JSON-RPC 2.0 gateway to the devnet ledger  |
//!
//! REST errors are `{ "error": "..." }` with a matching status code.

use axum::{
    extract::State,
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use waypoint_protocol::config::NATIVE_COIN_TYPE;
use waypoint_protocol::identity::LedgerAddress;
use waypoint_protocol::ledger::rpc::{
    INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, METHOD_EXECUTE_TRANSACTION,
    METHOD_GET_BALANCE, METHOD_GET_EPOCH, METHOD_NOT_FOUND,
};
use waypoint_protocol::ledger::{DevnetLedger, ExecuteParams, JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use waypoint_protocol::sponsor::{
    ErrorBody, RegisterUserBody, ServiceError, SponsorService, SponsoredResponse,
    SponsorshipRequest,
};

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone. Everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// Network identifier. Only "devnet" for now.
    pub network: String,
    pub service: Arc<SponsorService>,
    pub ledger: Arc<DevnetLedger>,
    pub metrics: SharedMetrics,
    /// Native coins credited on first registration.
    pub faucet_amount: u64,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/user", post(register_handler))
        .route("/sponsor", post(sponsor_handler))
        .route("/rpc", post(rpc_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub network: String,
    /// Current devnet epoch.
    pub epoch: u64,
    pub sponsor_address: String,
    /// Sponsor's native balance on the devnet ledger.
    pub sponsor_balance: u64,
    pub registered_users: usize,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

/// Response payload for `POST /user`.
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub address: String,
    /// `false` when the user was already registered.
    pub registered: bool,
}

/// A REST error: status code plus `{ "error" }` body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        let status = match &e {
            ServiceError::Unauthorized(_) | ServiceError::Proof(_) => StatusCode::UNAUTHORIZED,
            ServiceError::InvalidRequest(_) | ServiceError::Build(_) => StatusCode::BAD_REQUEST,
            ServiceError::Ledger(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

/// Pull the bearer token out of `Authorization`.
fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "missing bearer token"))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status`: node status summary.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let sponsor = state.service.sponsor_address();
    Json(StatusResponse {
        version: state.version.clone(),
        network: state.network.clone(),
        epoch: state.ledger.epoch(),
        sponsor_address: sponsor.to_string(),
        sponsor_balance: state.ledger.native_balance(&sponsor),
        registered_users: state.service.db().user_count(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `POST /user`: record the caller's address; fund it on first sight.
async fn register_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RegisterUserBody>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let token = bearer_token(&headers)?;
    let registration = state.service.register(token, &body.address)?;

    if registration.newly_registered {
        state.metrics.registrations_total.inc();
        if state.faucet_amount > 0 {
            state
                .ledger
                .credit(registration.user.address, NATIVE_COIN_TYPE, state.faucet_amount);
            tracing::info!(
                address = %registration.user.address,
                amount = state.faucet_amount,
                "devnet faucet credited"
            );
        }
    }

    Ok(Json(RegisterResponse {
        address: registration.user.address.to_string(),
        registered: registration.newly_registered,
    }))
}

/// `POST /sponsor`: build and co-sign the requested transfer.
async fn sponsor_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SponsorshipRequest>,
) -> Result<Json<SponsoredResponse>, ApiError> {
    let timer = state.metrics.sponsor_latency_seconds.start_timer();
    let token = bearer_token(&headers)?;

    let result = state.service.sponsor(token, &request).await;
    timer.observe_duration();

    match result {
        Ok(response) => {
            state.metrics.sponsorships_total.inc();
            Ok(Json(response))
        }
        Err(e) => {
            state.metrics.sponsorship_failures_total.inc();
            tracing::warn!(error = %e, "sponsorship refused");
            Err(e.into())
        }
    }
}

/// `POST /rpc`: JSON-RPC 2.0 gateway to the devnet ledger.
///
/// Unknown methods return error code -32601 (Method not found).
async fn rpc_handler(State(state): State<AppState>, Json(req): Json<JsonRpcRequest>) -> impl IntoResponse {
    if req.jsonrpc != "2.0" {
        return Json(JsonRpcResponse::failure(
            req.id,
            JsonRpcError::new(INVALID_REQUEST, "Invalid Request: jsonrpc must be \"2.0\""),
        ));
    }

    let outcome = match req.method.as_str() {
        METHOD_EXECUTE_TRANSACTION => rpc_execute(&state, req.params.as_ref()),
        METHOD_GET_BALANCE => rpc_balance(&state, req.params.as_ref()),
        METHOD_GET_EPOCH => Ok(serde_json::json!(state.ledger.epoch())),
        other => Err(JsonRpcError::new(
            METHOD_NOT_FOUND,
            format!("Method not found: {}", other),
        )),
    };

    Json(match outcome {
        Ok(result) => JsonRpcResponse::success(req.id, result),
        Err(error) => JsonRpcResponse::failure(req.id, error),
    })
}

fn rpc_execute(
    state: &AppState,
    params: Option<&serde_json::Value>,
) -> Result<serde_json::Value, JsonRpcError> {
    let params = ExecuteParams::parse(params)?;
    match state.ledger.execute(&params.tx_bytes, &params.signatures) {
        Ok(digest) => {
            state.metrics.ledger_executions_total.inc();
            Ok(serde_json::json!(digest.to_string()))
        }
        Err(e) => {
            state.metrics.ledger_rejections_total.inc();
            tracing::warn!(error = %e, "devnet ledger refused transaction");
            Err(e.into())
        }
    }
}

fn rpc_balance(
    state: &AppState,
    params: Option<&serde_json::Value>,
) -> Result<serde_json::Value, JsonRpcError> {
    let invalid = || JsonRpcError::new(INVALID_PARAMS, "Invalid params: expected [address, coinType?]");
    let arr = params.and_then(|p| p.as_array()).ok_or_else(invalid)?;
    let address: LedgerAddress = arr
        .first()
        .and_then(|v| v.as_str())
        .ok_or_else(invalid)?
        .parse()
        .map_err(|e| JsonRpcError::new(INVALID_PARAMS, format!("Invalid params: {}", e)))?;
    let coin_type = match arr.get(1) {
        None | Some(serde_json::Value::Null) => NATIVE_COIN_TYPE,
        Some(v) => v.as_str().ok_or_else(invalid)?,
    };
    serde_json::to_value(state.ledger.balance(&address, coin_type))
        .map_err(|e| JsonRpcError::new(INTERNAL_ERROR, e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
