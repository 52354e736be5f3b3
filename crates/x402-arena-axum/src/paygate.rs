//! The payment gate: request interception and the 402/400/500 decision
//! table.
//!
//! [`Paygate`] owns one request's journey: extract the payment header,
//! verify and settle with the facilitator, then hand control to the
//! protected handler with the settlement receipt attached. Settlement always
//! happens *before* the handler runs; once the resource is served the nonce
//! is consumed on-chain, so there is no retry path.

use axum_core::body::Body;
use axum_core::response::{IntoResponse, Response};
use http::header::{HeaderName, HeaderValue};
use http::{Method, StatusCode};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tower::Service;
use tower_http::cors::{self, CorsLayer};

use x402_arena::facilitator::Facilitator;
use x402_arena::types::{
    PaymentPayload, PaymentRequirements, SettlementResult, VerifyOutcome, VerifyRequest,
    X402_VERSION, error_code, headers,
};
use x402_arena::util::Base64Bytes;

/// CORS layer exposing the x402 payment headers to browser clients.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(cors::Any)
        .expose_headers([
            HeaderName::from_static(headers::PAYMENT_REQUIRED),
            HeaderName::from_static(headers::PAYMENT_SIGNATURE),
            HeaderName::from_static(headers::PAYMENT_RESPONSE),
            HeaderName::from_static(headers::X_PAYMENT_REQUIRED),
            HeaderName::from_static(headers::X_PAYMENT_RESPONSE),
        ])
}

/// One-request payment enforcement against a facilitator.
pub struct Paygate<TFacilitator> {
    /// The facilitator used for verification and settlement.
    pub facilitator: TFacilitator,
    /// Payment options offered to unpaying clients.
    pub accepts: Arc<Vec<PaymentRequirements>>,
}

impl<TFacilitator> Paygate<TFacilitator>
where
    TFacilitator: Facilitator,
{
    /// Handles an incoming request, enforcing payment before the inner
    /// service runs.
    pub async fn handle_request<ReqBody, S>(
        self,
        mut inner: S,
        mut req: http::Request<ReqBody>,
    ) -> Result<Response, Infallible>
    where
        S: Service<http::Request<ReqBody>, Error = Infallible>,
        S::Response: IntoResponse,
    {
        if self.accepts.is_empty() {
            // The seller booted without treasury/price configuration.
            return Ok(error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                error_code::SERVICE_UNAVAILABLE,
                "payment requirements are not configured",
            ));
        }

        let Some(header) = req.headers().get(headers::PAYMENT_SIGNATURE) else {
            return Ok(self.payment_required_response("payment required"));
        };

        let payload = match PaymentPayload::try_from(Base64Bytes::from(header.as_bytes())) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::debug!(error = %error, "malformed payment header");
                return Ok(error_response(
                    StatusCode::BAD_REQUEST,
                    error_code::INVALID_PAYLOAD,
                    "malformed payment header",
                ));
            }
        };

        let Some(selected) = self.accepts.iter().find(|requirement| {
            requirement.network == payload.network && payload.scheme == requirement.scheme.as_str()
        }) else {
            return Ok(self.verify_failed_response("no matching payment requirements"));
        };

        let verify_request = VerifyRequest {
            x402_version: X402_VERSION,
            payment_payload: payload,
            payment_requirements: selected.clone(),
        };

        match self.facilitator.verify(&verify_request).await {
            Ok(VerifyOutcome::Valid { .. }) => {}
            Ok(VerifyOutcome::Invalid { reason }) => {
                tracing::info!(reason = %reason, "payment verification failed");
                return Ok(self.verify_failed_response(&reason));
            }
            Err(error) => {
                tracing::error!(error = %error, "facilitator verify call failed");
                return Ok(error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_code::VERIFY_FAILED,
                    &error.to_string(),
                ));
            }
        }

        // Settlement is final: a transport error here must not trigger a
        // blind retry, because the broadcast may already be in flight and a
        // second one only wastes the relayer's gas.
        let settlement = match self.facilitator.settle(&verify_request).await {
            Ok(settlement) if settlement.success => settlement,
            Ok(_) => {
                return Ok(error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_code::SETTLE_FAILED,
                    "settlement did not succeed",
                ));
            }
            Err(error) => {
                tracing::error!(error = %error, "settlement failed");
                return Ok(error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_code::SETTLE_FAILED,
                    &error.to_string(),
                ));
            }
        };

        let receipt_header = match settlement_header(&settlement) {
            Ok(value) => value,
            Err(error) => {
                tracing::error!(error = %error, "failed to encode settlement receipt");
                return Ok(error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_code::SETTLE_FAILED,
                    "failed to encode settlement receipt",
                ));
            }
        };

        // Hand the receipt to the resource layer for its payment log.
        req.extensions_mut().insert(settlement);

        let response = inner.call(req).await?;
        let mut response = response.into_response();
        response
            .headers_mut()
            .insert(HeaderName::from_static(headers::PAYMENT_RESPONSE), receipt_header.clone());
        response
            .headers_mut()
            .insert(HeaderName::from_static(headers::X_PAYMENT_RESPONSE), receipt_header);
        Ok(response)
    }

    /// Builds the 402 response advertising the configured payment options.
    ///
    /// The `PAYMENT-REQUIRED` header always carries a JSON *array*, so the
    /// offer list can grow without a wire change.
    fn payment_required_response(&self, message: &str) -> Response {
        self.with_offers_header(
            StatusCode::PAYMENT_REQUIRED,
            error_code::PAYMENT_REQUIRED,
            message,
        )
    }

    fn verify_failed_response(&self, reason: &str) -> Response {
        self.with_offers_header(
            StatusCode::PAYMENT_REQUIRED,
            error_code::VERIFY_FAILED,
            reason,
        )
    }

    fn with_offers_header(&self, status: StatusCode, code: &str, message: &str) -> Response {
        let mut response = error_response(status, code, message);
        let encoded =
            PaymentRequirements::encode_list(&self.accepts).expect("offer list serializes");
        let header_value =
            HeaderValue::from_bytes(encoded.as_ref()).expect("base64 is a valid header value");
        response
            .headers_mut()
            .insert(HeaderName::from_static(headers::PAYMENT_REQUIRED), header_value.clone());
        response
            .headers_mut()
            .insert(HeaderName::from_static(headers::X_PAYMENT_REQUIRED), header_value);
        response
    }
}

/// Builds a JSON error response with a machine-readable code.
fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    let body = json!({ "error": message, "code": code }).to_string();
    Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .expect("static response construction")
}

/// Encodes a settlement receipt into the `PAYMENT-RESPONSE` header value.
fn settlement_header(settlement: &SettlementResult) -> Result<HeaderValue, String> {
    let encoded: Base64Bytes = settlement.try_into().map_err(|e| format!("{e}"))?;
    HeaderValue::from_bytes(encoded.as_ref()).map_err(|e| e.to_string())
}
