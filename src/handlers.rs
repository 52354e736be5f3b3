//! HTTP endpoints of the x402 facilitator.
//!
//! The facilitator is a loopback sidecar: the payment gate on the seller
//! side posts verify/settle requests here, authenticated with a shared
//! secret. Bodies are parsed by hand from bytes so that every malformed
//! request maps to a plain 400 rather than a framework-specific rejection.
//!
//! Endpoints:
//! - `GET  /x402/health` - liveness, relayer identity and balance, assets
//! - `POST /x402/verify` / `/x402/settle` - escrow mode
//! - `POST /x402/verify-transfer` / `/x402/settle-transfer` - transfer mode
//! - `POST /x402/demo-ai` - server-side demo of the full buyer flow

use axum::Router;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;
use tower_http::trace::TraceLayer;
use tracing::instrument;

use crate::client::{Fetched, PayerClient};
use crate::facilitator_local::FacilitatorLocal;
use crate::types::{ErrorResponse, SettlementMode, VerifyRequest, X402_VERSION};

/// Maximum accepted request body size.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Timeout for the demo flow, which chains two seller calls.
const DEMO_TIMEOUT: Duration = Duration::from_secs(45);

/// Demo buyer configuration, present only when both `DEMO_BUYER_KEY` and
/// `API_URL` are set.
#[derive(Clone)]
pub struct DemoConfig {
    pub buyer: alloy::signers::local::PrivateKeySigner,
    pub api_url: url::Url,
}

/// Shared state handed to every request handler.
///
/// Immutable after boot; the only mutability underneath is the relayer's
/// account-nonce sequencing inside the provider.
pub struct AppState {
    pub facilitator: FacilitatorLocal,
    pub api_key: String,
    pub demo: Option<DemoConfig>,
}

/// Builds the facilitator router.
pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/x402/verify", post(post_verify_escrow))
        .route("/x402/settle", post(post_settle_escrow))
        .route("/x402/verify-transfer", post(post_verify_transfer))
        .route("/x402/settle-transfer", post(post_settle_transfer))
        .route("/x402/demo-ai", post(post_demo_ai))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/x402/health", get(get_health))
        .merge(protected)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// Shared-secret check for every endpoint except health.
///
/// Accepts the key in either `X-API-Key` or `X-Facilitator-Key`.
async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let provided = request
        .headers()
        .get("x-api-key")
        .or_else(|| request.headers().get("x-facilitator-key"));
    match provided {
        Some(value) if constant_time_eq(value.as_bytes(), state.api_key.as_bytes()) => {
            next.run(request).await
        }
        Some(_) => {
            tracing::warn!("facilitator key mismatch");
            unauthorized("invalid facilitator key")
        }
        None => {
            tracing::warn!("facilitator key missing");
            unauthorized("facilitator key required")
        }
    }
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// `GET /x402/health`: liveness plus relayer identity.
///
/// The native-balance read is best effort: a dead RPC endpoint must not make
/// the process look dead, so the field is null when the read fails.
#[instrument(skip_all)]
async fn get_health(State(state): State<Arc<AppState>>) -> Response {
    let chain = state.facilitator.chain();
    let relayer = chain.relayer();
    let relayer_balance = match chain.native_balance(relayer).await {
        Ok(balance) => {
            // 0.01 native tokens; below this, settlements will soon start failing.
            let low_water = alloy::primitives::U256::from(10_000_000_000_000_000u64);
            if balance < low_water {
                tracing::warn!(relayer = %relayer, balance = %balance, "relayer native balance is low");
            }
            Some(balance.to_string())
        }
        Err(error) => {
            tracing::warn!(error = %error, "failed to read relayer balance");
            None
        }
    };

    let assets: Vec<_> = state
        .facilitator
        .assets()
        .iter()
        .map(|asset| {
            json!({
                "address": asset.address,
                "symbol": asset.symbol,
                "decimals": asset.decimals,
                "eip3009": asset.eip3009,
            })
        })
        .collect();

    Json(json!({
        "status": "ok",
        "network": state.facilitator.network().tag(),
        "relayer": relayer,
        "relayerBalance": relayer_balance,
        "assets": assets,
        "x402Version": X402_VERSION,
    }))
    .into_response()
}

async fn post_verify_transfer(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    verify_with_mode(state, body, SettlementMode::Transfer).await
}

async fn post_verify_escrow(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    verify_with_mode(state, body, SettlementMode::Escrow).await
}

async fn post_settle_transfer(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    settle_with_mode(state, body, SettlementMode::Transfer).await
}

async fn post_settle_escrow(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    settle_with_mode(state, body, SettlementMode::Escrow).await
}

/// Off-chain verification. Rejections ride HTTP 200 as
/// `{valid: false, reason}`; only unreadable bodies and infrastructure
/// faults use error statuses.
#[instrument(skip_all, fields(mode = %mode))]
async fn verify_with_mode(
    state: Arc<AppState>,
    body: Bytes,
    mode: SettlementMode,
) -> Response {
    let request: VerifyRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(error) => {
            tracing::debug!(error = %error, "unreadable verify body");
            return bad_request("Invalid request body");
        }
    };
    match state.facilitator.verify_mode(&request, mode).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(error) => {
            tracing::error!(error = %error, "verification infrastructure failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: error.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// On-chain settlement.
///
/// The broadcast runs on a spawned task: once the transaction is out, a
/// client disconnect must not cancel the receipt wait, and the outcome is
/// logged either way.
#[instrument(skip_all, fields(mode = %mode))]
async fn settle_with_mode(
    state: Arc<AppState>,
    body: Bytes,
    mode: SettlementMode,
) -> Response {
    let request: VerifyRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(error) => {
            tracing::debug!(error = %error, "unreadable settle body");
            return bad_request("Invalid request body");
        }
    };

    let facilitator = state.facilitator.clone();
    let outcome = tokio::spawn(async move {
        let result = facilitator.settle_mode(&request, mode).await;
        match &result {
            Ok(settlement) => {
                tracing::info!(tx = %settlement.transaction, payer = %settlement.payer, "settlement succeeded");
            }
            Err(error) => {
                tracing::warn!(error = %error, "settlement failed");
            }
        }
        result
    })
    .await;

    match outcome {
        Ok(Ok(settlement)) => (StatusCode::OK, Json(settlement)).into_response(),
        Ok(Err(error)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "success": false, "error": error.to_string() })),
        )
            .into_response(),
        Err(join_error) => {
            tracing::error!(error = %join_error, "settlement task panicked");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": "settlement task failed" })),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct DemoAiRequest {
    #[serde(default)]
    query: Option<String>,
}

/// `POST /x402/demo-ai`: runs the full buyer flow against the seller URL
/// with the embedded demo key, so browser demos never see a private key.
#[instrument(skip_all)]
async fn post_demo_ai(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let Some(demo) = state.demo.clone() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: "demo buyer is not configured".to_string(),
            }),
        )
            .into_response();
    };

    let request: DemoAiRequest = if body.is_empty() {
        DemoAiRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(request) => request,
            Err(_) => return bad_request("Invalid request body"),
        }
    };

    let mut url = demo.api_url.clone();
    if let Some(query) = &request.query {
        url.query_pairs_mut().append_pair("q", query);
    }

    let payer = match PayerClient::with_timeout(
        demo.buyer.clone(),
        state.facilitator.network(),
        DEMO_TIMEOUT,
    ) {
        Ok(payer) => payer,
        Err(error) => {
            tracing::error!(error = %error, "failed to build demo payer client");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: error.to_string(),
                }),
            )
                .into_response();
        }
    };

    let paid = match payer.fetch(url.as_str()).await {
        Ok(Fetched::Complete(response)) => response,
        Ok(Fetched::PaymentRequired(offers)) => {
            let Some(offer) = payer.select_offer(&offers).cloned() else {
                return demo_error("no acceptable payment option offered");
            };
            // Funds check before signing, so the demo reports a clear error
            // instead of a verify rejection.
            match state
                .facilitator
                .chain()
                .balance_of(offer.asset, payer.address().into())
                .await
            {
                Ok(balance) if balance < offer.amount.0 => {
                    return bad_request("Insufficient buyer balance");
                }
                Ok(_) => {}
                Err(error) => return demo_error(&error.to_string()),
            }
            match payer.pay(url.as_str(), &offer).await {
                Ok(paid) => paid,
                Err(error) => return demo_error(&error.to_string()),
            }
        }
        Err(error) => return demo_error(&error.to_string()),
    };

    let body_json: serde_json::Value = serde_json::from_str(&paid.body)
        .unwrap_or_else(|_| serde_json::Value::String(paid.body.clone()));
    Json(json!({
        "status": paid.status.as_u16(),
        "body": body_json,
        "settlement": paid.settlement,
    }))
    .into_response()
}

fn demo_error(message: &str) -> Response {
    tracing::warn!(error = %message, "demo flow failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}
