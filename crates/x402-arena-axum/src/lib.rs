//! Axum middleware for enforcing x402 v2 payments on protected routes.
//!
//! The payment gate sits in front of a protected handler and is the single
//! place that turns facilitator verdicts into HTTP status codes:
//!
//! - no `PAYMENT-SIGNATURE` header → `402` with the offer list in the
//!   `PAYMENT-REQUIRED` header,
//! - malformed header → `400`,
//! - failed verification → `402` with the facilitator's reason,
//! - failed settlement → `500`,
//! - settled payment → the inner handler runs and the response carries a
//!   `PAYMENT-RESPONSE` receipt header.
//!
//! ## Example
//!
//! ```rust,no_run
//! use axum::{Router, routing::get};
//! use axum::response::IntoResponse;
//! use x402_arena::types::{PaymentRequirements, RequirementsExtra, Scheme, SettlementMode};
//! use x402_arena_axum::X402Middleware;
//!
//! let price_tag = PaymentRequirements {
//!     scheme: Scheme::Exact,
//!     network: "eip155:1030".parse().unwrap(),
//!     amount: "10000".parse().unwrap(),
//!     asset: "0xaf3744a2d92f7b1f07c938f9d9cb7a7e2fb647ff".parse().unwrap(),
//!     pay_to: "0x00000000000000000000000000000000000000a1".parse().unwrap(),
//!     extra: RequirementsExtra {
//!         settlement_mode: Some(SettlementMode::Transfer),
//!         name: Some("USDT0".into()),
//!         version: Some("1".into()),
//!         ..Default::default()
//!     },
//! };
//!
//! let x402 = X402Middleware::try_new("http://127.0.0.1:3849", "facilitator-secret")
//!     .unwrap()
//!     .with_price_tag(price_tag);
//!
//! let app: Router = Router::new().route("/resource", get(handler).layer(x402));
//!
//! async fn handler() -> impl IntoResponse {
//!     "paid content"
//! }
//! ```
//!
//! The protected handler can read the settlement receipt from request
//! extensions (`Extension<SettlementResult>`) to write its payment log; a
//! failure to log must not fail the response, because the payment is
//! already final on-chain.

pub mod facilitator_client;
pub mod layer;
pub mod paygate;

pub use facilitator_client::{FacilitatorClient, FacilitatorClientError};
pub use layer::{X402Middleware, X402MiddlewareService};
pub use paygate::{Paygate, cors_layer};
