//! End-to-end tests of the payment gate against a scripted facilitator.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Router};
use http_body_util::BodyExt;
use tower::ServiceExt;

use x402_arena::facilitator::Facilitator;
use x402_arena::types::{
    EvmAddress, PaymentPayload, PaymentRequirements, RequirementsExtra, Scheme, SettleRequest,
    SettlementMode, SettlementResult, TransactionHash, VerifyOutcome, VerifyRequest,
    X402_VERSION, headers,
};
use x402_arena::util::Base64Bytes;
use x402_arena_axum::X402Middleware;

/// A facilitator with pre-scripted verdicts.
#[derive(Clone)]
struct MockFacilitator {
    verify_reason: Option<String>,
    settle_error: Option<String>,
}

impl MockFacilitator {
    fn happy() -> Self {
        MockFacilitator {
            verify_reason: None,
            settle_error: None,
        }
    }

    fn rejecting(reason: &str) -> Self {
        MockFacilitator {
            verify_reason: Some(reason.to_string()),
            settle_error: None,
        }
    }

    fn failing_settle(error: &str) -> Self {
        MockFacilitator {
            verify_reason: None,
            settle_error: Some(error.to_string()),
        }
    }
}

impl Facilitator for MockFacilitator {
    type Error = String;

    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyOutcome, Self::Error> {
        match &self.verify_reason {
            Some(reason) => Ok(VerifyOutcome::invalid(reason.clone())),
            None => Ok(VerifyOutcome::valid(
                request.payment_payload.payload.authorization.from,
            )),
        }
    }

    async fn settle(&self, request: &SettleRequest) -> Result<SettlementResult, Self::Error> {
        match &self.settle_error {
            Some(error) => Err(error.clone()),
            None => Ok(SettlementResult {
                success: true,
                transaction: TransactionHash([7u8; 32]),
                payer: request.payment_payload.payload.authorization.from,
                scheme: Scheme::Exact,
                network: request.payment_requirements.network,
                x402_version: X402_VERSION,
            }),
        }
    }
}

fn price_tag() -> PaymentRequirements {
    PaymentRequirements {
        scheme: Scheme::Exact,
        network: "eip155:1030".parse().unwrap(),
        amount: "10000".parse().unwrap(),
        asset: "0xaf3744a2d92f7b1f07c938f9d9cb7a7e2fb647ff".parse().unwrap(),
        pay_to: "0x00000000000000000000000000000000000000a1".parse().unwrap(),
        extra: RequirementsExtra {
            settlement_mode: Some(SettlementMode::Transfer),
            name: Some("USDT0".into()),
            version: Some("1".into()),
            ..Default::default()
        },
    }
}

fn payment_header() -> String {
    let json = serde_json::json!({
        "x402Version": 2,
        "scheme": "exact",
        "network": "eip155:1030",
        "payload": {
            "signature": format!("0x{}", "ab".repeat(65)),
            "authorization": {
                "from": "0x00000000000000000000000000000000000000b2",
                "to": "0x00000000000000000000000000000000000000a1",
                "value": "10000",
                "validAfter": "0",
                "validBefore": "1893456000",
                "nonce": format!("0x{}", "cd".repeat(32)),
            }
        }
    });
    Base64Bytes::encode(serde_json::to_vec(&json).unwrap()).to_string()
}

async fn protected_handler(
    settlement: Option<Extension<SettlementResult>>,
) -> impl IntoResponse {
    match settlement {
        Some(Extension(settlement)) => format!("paid by {}", settlement.payer),
        None => "no settlement attached".to_string(),
    }
}

fn app(facilitator: MockFacilitator) -> Router {
    let middleware = X402Middleware::with_facilitator(facilitator).with_price_tag(price_tag());
    Router::new().route("/resource", get(protected_handler).layer(middleware))
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn missing_header_yields_402_with_offer_array() {
    let response = app(MockFacilitator::happy())
        .oneshot(Request::get("/resource").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);

    let header = response
        .headers()
        .get(headers::PAYMENT_REQUIRED)
        .expect("PAYMENT-REQUIRED header present")
        .clone();
    let decoded = Base64Bytes::from(header.as_bytes()).decode().unwrap();
    let value: serde_json::Value = serde_json::from_slice(&decoded).unwrap();
    assert!(value.is_array(), "offer list must be a JSON array");
    let offers: Vec<PaymentRequirements> = serde_json::from_value(value).unwrap();
    assert_eq!(offers, vec![price_tag()]);

    assert!(response.headers().contains_key(headers::X_PAYMENT_REQUIRED));

    let body = body_json(response).await;
    assert_eq!(body["code"], "X402_PAYMENT_REQUIRED");
}

#[tokio::test]
async fn malformed_header_yields_400() {
    let response = app(MockFacilitator::happy())
        .oneshot(
            Request::get("/resource")
                .header(headers::PAYMENT_SIGNATURE, "!!!not-base64!!!")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "X402_INVALID_PAYLOAD");
}

#[tokio::test]
async fn settled_payment_serves_resource_with_receipt() {
    let response = app(MockFacilitator::happy())
        .oneshot(
            Request::get("/resource")
                .header(headers::PAYMENT_SIGNATURE, payment_header())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let receipt = response
        .headers()
        .get(headers::PAYMENT_RESPONSE)
        .expect("PAYMENT-RESPONSE header present")
        .clone();
    let settlement =
        SettlementResult::try_from(Base64Bytes::from(receipt.as_bytes())).unwrap();
    assert!(settlement.success);
    assert_eq!(
        settlement.payer,
        "0x00000000000000000000000000000000000000b2"
            .parse::<EvmAddress>()
            .unwrap(),
        "receipt payer must equal the authorization sender"
    );

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(body.starts_with("paid by"), "handler saw the settlement: {body}");
}

#[tokio::test]
async fn rejected_verification_yields_402_with_reason() {
    let response = app(MockFacilitator::rejecting("Insufficient amount"))
        .oneshot(
            Request::get("/resource")
                .header(headers::PAYMENT_SIGNATURE, payment_header())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let body = body_json(response).await;
    assert_eq!(body["code"], "X402_VERIFY_FAILED");
    assert_eq!(body["error"], "Insufficient amount");
}

#[tokio::test]
async fn failed_settlement_yields_500() {
    let response = app(MockFacilitator::failing_settle("authorization is used or canceled"))
        .oneshot(
            Request::get("/resource")
                .header(headers::PAYMENT_SIGNATURE, payment_header())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["code"], "X402_SETTLE_FAILED");
    assert!(
        body["error"]
            .as_str()
            .unwrap()
            .contains("authorization is used or canceled")
    );
}

#[tokio::test]
async fn wrong_network_payload_yields_402_without_facilitator_call() {
    let json = serde_json::json!({
        "x402Version": 2,
        "scheme": "exact",
        "network": "eip155:1",
        "payload": {
            "signature": format!("0x{}", "ab".repeat(65)),
            "authorization": {
                "from": "0x00000000000000000000000000000000000000b2",
                "to": "0x00000000000000000000000000000000000000a1",
                "value": "10000",
                "validAfter": "0",
                "validBefore": "1893456000",
                "nonce": format!("0x{}", "cd".repeat(32)),
            }
        }
    });
    let header = Base64Bytes::encode(serde_json::to_vec(&json).unwrap()).to_string();

    let response = app(MockFacilitator::happy())
        .oneshot(
            Request::get("/resource")
                .header(headers::PAYMENT_SIGNATURE, header)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
}

#[tokio::test]
async fn unconfigured_gate_yields_503() {
    let middleware = X402Middleware::with_facilitator(MockFacilitator::happy());
    let router: Router =
        Router::new().route("/resource", get(protected_handler).layer(middleware));

    let response = router
        .oneshot(Request::get("/resource").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["code"], "SRV_SERVICE_UNAVAILABLE");
}
