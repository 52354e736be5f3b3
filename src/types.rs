//! Wire types for the x402 v2 protocol.
//!
//! These mirror the structures exchanged between buyer, payment gate, and
//! facilitator: `PaymentRequirements` advertised in a 402 response,
//! `PaymentPayload` submitted by the buyer, and the `VerifyOutcome` /
//! `SettlementResult` verdicts produced by the facilitator.
//!
//! Fields the seller controls are strictly typed. Fields a buyer supplies
//! (`x402Version`, `scheme`, `network` inside [`PaymentPayload`]) are lenient
//! so that a wrong value is rejected during verification with a structured
//! reason instead of a JSON parse error.

use alloy::primitives::U256;
use alloy::{hex, sol};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fmt::{Debug, Display};
use std::str::FromStr;

use crate::network::NetworkTag;
use crate::timestamp::UnixTimestamp;
use crate::util::Base64Bytes;

/// The protocol version implemented by this crate.
pub const X402_VERSION: u8 = 2;

/// HTTP header names used by the x402 v2 wire protocol.
pub mod headers {
    /// Response header carrying a base64 JSON *array* of [`super::PaymentRequirements`].
    pub const PAYMENT_REQUIRED: &str = "payment-required";
    /// Request header carrying a base64 JSON [`super::PaymentPayload`].
    pub const PAYMENT_SIGNATURE: &str = "payment-signature";
    /// Response header carrying a base64 JSON [`super::SettlementResult`].
    pub const PAYMENT_RESPONSE: &str = "payment-response";
    /// Informational copy of [`PAYMENT_REQUIRED`].
    pub const X_PAYMENT_REQUIRED: &str = "x-payment-required";
    /// Informational copy of [`PAYMENT_RESPONSE`].
    pub const X_PAYMENT_RESPONSE: &str = "x-payment-response";
}

/// Machine-readable error codes surfaced in gate response bodies.
pub mod error_code {
    pub const PAYMENT_REQUIRED: &str = "X402_PAYMENT_REQUIRED";
    pub const INVALID_PAYLOAD: &str = "X402_INVALID_PAYLOAD";
    pub const VERIFY_FAILED: &str = "X402_VERIFY_FAILED";
    pub const SETTLE_FAILED: &str = "X402_SETTLE_FAILED";
    pub const SERVICE_UNAVAILABLE: &str = "SRV_SERVICE_UNAVAILABLE";
    pub const METHOD_NOT_ALLOWED: &str = "OP_METHOD_NOT_ALLOWED";
    pub const REQUIRED_FIELD: &str = "VAL_REQUIRED_FIELD";
    pub const INVALID_FORMAT: &str = "VAL_INVALID_FORMAT";
    pub const RATE_LIMIT: &str = "OP_RATE_LIMIT";
}

/// Payment schemes. Only "exact" is implemented: the signed value must cover
/// the advertised amount and is transferred as authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Exact,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Exact => "exact",
        }
    }
}

impl Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a payment reaches the seller once settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementMode {
    /// Direct EIP-3009 transfer to the treasury address.
    Transfer,
    /// Settlement routed through the escrow adapter contract.
    Escrow,
}

impl Display for SettlementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettlementMode::Transfer => write!(f, "transfer"),
            SettlementMode::Escrow => write!(f, "escrow"),
        }
    }
}

/// On-chain mechanism used to move the asset. Escrow-mode requirements
/// advertise `eip3009` here instead of a `settlementMode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetTransferMethod {
    #[serde(rename = "eip3009")]
    Eip3009,
}

/// An EVM address.
///
/// Wrapper around [`alloy::primitives::Address`] providing display and
/// serialization support. Equality is byte-wise, so two hex spellings of the
/// same address compare equal regardless of checksum casing.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct EvmAddress(pub alloy::primitives::Address);

impl Display for EvmAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Failed to decode EVM address")]
pub struct EvmAddressDecodingError;

impl FromStr for EvmAddress {
    type Err = EvmAddressDecodingError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let address =
            alloy::primitives::Address::from_str(s).map_err(|_| EvmAddressDecodingError)?;
        Ok(Self(address))
    }
}

impl From<EvmAddress> for alloy::primitives::Address {
    fn from(address: EvmAddress) -> Self {
        address.0
    }
}

impl From<alloy::primitives::Address> for EvmAddress {
    fn from(address: alloy::primitives::Address) -> Self {
        EvmAddress(address)
    }
}

impl PartialEq<alloy::primitives::Address> for EvmAddress {
    fn eq(&self, other: &alloy::primitives::Address) -> bool {
        self.0 == *other
    }
}

/// A 65-byte ECDSA signature over the EIP-712 digest of an authorization.
/// Serialized as a 0x-prefixed hex string of 130 characters.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct EvmSignature(pub [u8; 65]);

impl Debug for EvmSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EvmSignature(0x{})", hex::encode(self.0))
    }
}

impl From<[u8; 65]> for EvmSignature {
    fn from(bytes: [u8; 65]) -> Self {
        EvmSignature(bytes)
    }
}

impl<'de> Deserialize<'de> for EvmSignature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        static SIG_REGEX: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"^0x[0-9a-fA-F]{130}$").expect("Invalid regex for EVM signature")
        });

        if !SIG_REGEX.is_match(&s) {
            return Err(serde::de::Error::custom(
                "Invalid EVM signature format: must be 0x-prefixed and 130 hex chars",
            ));
        }

        let bytes = hex::decode(s.trim_start_matches("0x"))
            .map_err(|_| serde::de::Error::custom("Failed to decode EVM signature hex string"))?;

        let array: [u8; 65] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("Signature must be exactly 65 bytes"))?;

        Ok(EvmSignature(array))
    }
}

impl Serialize for EvmSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(self.0)))
    }
}

/// A 32-byte authorization nonce, hex-encoded with 0x prefix.
///
/// Unique per authorization; the token contract's nonce bitmap rejects any
/// authorization whose nonce was already consumed by the same sender.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct HexEncodedNonce(pub [u8; 32]);

impl Debug for HexEncodedNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HexEncodedNonce(0x{})", hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for HexEncodedNonce {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let array = decode_hex32(&String::deserialize(deserializer)?)
            .map_err(serde::de::Error::custom)?;
        Ok(HexEncodedNonce(array))
    }
}

impl Serialize for HexEncodedNonce {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(self.0)))
    }
}

/// A 32-byte escrow order identifier, hex-encoded with 0x prefix.
///
/// The zero order id means "no specific order" to the adapter contract.
#[derive(Copy, Clone, Default, PartialEq, Eq)]
pub struct OrderId(pub [u8; 32]);

impl Debug for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OrderId(0x{})", hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for OrderId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let array = decode_hex32(&String::deserialize(deserializer)?)
            .map_err(serde::de::Error::custom)?;
        Ok(OrderId(array))
    }
}

impl Serialize for OrderId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(self.0)))
    }
}

/// A 32-byte EVM transaction hash, encoded as 0x-prefixed hex string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionHash(pub [u8; 32]);

impl<'de> Deserialize<'de> for TransactionHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let array = decode_hex32(&String::deserialize(deserializer)?)
            .map_err(serde::de::Error::custom)?;
        Ok(TransactionHash(array))
    }
}

impl Serialize for TransactionHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl Display for TransactionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

fn decode_hex32(s: &str) -> Result<[u8; 32], String> {
    static HEX32_REGEX: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{64}$").expect("Invalid 32-byte hex regex"));

    if !HEX32_REGEX.is_match(s) {
        return Err("expected 0x-prefixed 64-char hex string".to_string());
    }
    let bytes = hex::decode(&s[2..]).map_err(|_| "invalid hex".to_string())?;
    bytes
        .try_into()
        .map_err(|_| "expected exactly 32 bytes".to_string())
}

/// A token amount in the asset's smallest unit.
///
/// Carried on the wire as a decimal string (never hex, never a JSON number)
/// to survive JavaScript clients and 256-bit magnitudes alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TokenAmount(pub U256);

impl Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("token amount must be a decimal integer string")]
pub struct TokenAmountParseError;

impl FromStr for TokenAmount {
    type Err = TokenAmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TokenAmountParseError);
        }
        let value = U256::from_str_radix(s, 10).map_err(|_| TokenAmountParseError)?;
        Ok(TokenAmount(value))
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        TokenAmount::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl From<u64> for TokenAmount {
    fn from(value: u64) -> Self {
        TokenAmount(U256::from(value))
    }
}

impl From<U256> for TokenAmount {
    fn from(value: U256) -> Self {
        TokenAmount(value)
    }
}

impl From<TokenAmount> for U256 {
    fn from(value: TokenAmount) -> Self {
        value.0
    }
}

sol!(
    /// EIP-712 struct for ERC-3009 `transferWithAuthorization`, in canonical
    /// field order. Used to reconstruct the signed typed data when verifying
    /// a buyer's signature and when signing on the client side.
    #[derive(Serialize, Deserialize)]
    struct TransferWithAuthorization {
        address from;
        address to;
        uint256 value;
        uint256 validAfter;
        uint256 validBefore;
        bytes32 nonce;
    }
);

/// The EIP-3009 authorization a buyer signs: who pays whom, how much, within
/// which time window, under which single-use nonce.
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authorization {
    pub from: EvmAddress,
    pub to: EvmAddress,
    pub value: TokenAmount,
    pub valid_after: UnixTimestamp,
    pub valid_before: UnixTimestamp,
    pub nonce: HexEncodedNonce,
}

/// Scheme-specific payload: the authorization plus the signature over its
/// EIP-712 digest.
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactEvmPayload {
    pub signature: EvmSignature,
    pub authorization: Authorization,
}

/// A signed payment submitted by a buyer in the `PAYMENT-SIGNATURE` header.
///
/// `x402_version`, `scheme` and `network` are buyer-supplied claims checked
/// during verification, which is why they are looser types than their
/// counterparts in [`PaymentRequirements`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub x402_version: u8,
    pub scheme: String,
    pub network: NetworkTag,
    pub payload: ExactEvmPayload,
}

/// Error returned when decoding a base64 JSON header value fails.
#[derive(Debug, thiserror::Error)]
pub enum PaymentHeaderDecodingError {
    /// The header bytes were not valid base64.
    #[error("base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
    /// The decoded JSON was invalid or did not match the expected shape.
    #[error("json parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TryFrom<Base64Bytes<'_>> for PaymentPayload {
    type Error = PaymentHeaderDecodingError;

    fn try_from(value: Base64Bytes) -> Result<Self, Self::Error> {
        let decoded = value.decode()?;
        serde_json::from_slice(&decoded).map_err(PaymentHeaderDecodingError::from)
    }
}

/// Mode- and asset-specific extras attached to [`PaymentRequirements`].
///
/// Exactly one of the two discriminators is expected: `settlementMode:
/// "transfer"` for direct transfers, or `assetTransferMethod: "eip3009"` for
/// escrow settlement. `name` and `version` override the asset's EIP-712
/// domain defaults; `orderId` ties an escrow settlement to a seller order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementsExtra {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settlement_mode: Option<SettlementMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_transfer_method: Option<AssetTransferMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Payment terms set by the seller for one acceptable payment.
///
/// The `PAYMENT-REQUIRED` header carries a JSON *array* of these, so a seller
/// can offer several options and clients pick one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    pub scheme: Scheme,
    pub network: NetworkTag,
    /// Amount due, in the asset's smallest unit.
    pub amount: TokenAmount,
    /// The token contract the payment is denominated in.
    pub asset: EvmAddress,
    /// Recipient of a direct transfer (the treasury).
    pub pay_to: EvmAddress,
    pub extra: RequirementsExtra,
}

impl PaymentRequirements {
    /// The settlement mode this requirement advertises. Escrow wins when the
    /// seller explicitly tagged it; everything else is a direct transfer.
    pub fn settlement_mode(&self) -> SettlementMode {
        self.extra
            .settlement_mode
            .unwrap_or(SettlementMode::Transfer)
    }

    /// Encodes a list of requirements for the `PAYMENT-REQUIRED` header.
    ///
    /// The value is always a JSON array, even for a single offer.
    pub fn encode_list(list: &[Self]) -> Result<Base64Bytes<'static>, serde_json::Error> {
        let json = serde_json::to_vec(list)?;
        Ok(Base64Bytes::encode(json))
    }

    /// Decodes a `PAYMENT-REQUIRED` header value back into requirements.
    pub fn decode_list(value: Base64Bytes<'_>) -> Result<Vec<Self>, PaymentHeaderDecodingError> {
        let decoded = value.decode()?;
        serde_json::from_slice(&decoded).map_err(PaymentHeaderDecodingError::from)
    }
}

/// A payment payload and the requirements it must satisfy, as posted to the
/// facilitator's verify and settle endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub x402_version: u8,
    pub payment_payload: PaymentPayload,
    pub payment_requirements: PaymentRequirements,
}

/// Settlement reuses the verify request shape.
pub type SettleRequest = VerifyRequest;

/// Verdict of an off-chain verification.
///
/// Always carried over HTTP 200 so the reason channel stays structured;
/// transport-level errors use plain HTTP status codes instead.
#[derive(Debug, Clone, PartialEq)]
pub enum VerifyOutcome {
    /// Every check passed; `payer` is the recovered signer.
    Valid { payer: EvmAddress },
    /// A check failed; `reason` names the first failure.
    Invalid { reason: String },
}

impl VerifyOutcome {
    pub fn valid(payer: EvmAddress) -> Self {
        VerifyOutcome::Valid { payer }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        VerifyOutcome::Invalid {
            reason: reason.into(),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, VerifyOutcome::Valid { .. })
    }
}

impl Serialize for VerifyOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            VerifyOutcome::Valid { payer } => {
                let mut s = serializer.serialize_struct("VerifyOutcome", 2)?;
                s.serialize_field("valid", &true)?;
                s.serialize_field("payer", payer)?;
                s.end()
            }
            VerifyOutcome::Invalid { reason } => {
                let mut s = serializer.serialize_struct("VerifyOutcome", 2)?;
                s.serialize_field("valid", &false)?;
                s.serialize_field("reason", reason)?;
                s.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for VerifyOutcome {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            valid: bool,
            #[serde(default)]
            payer: Option<EvmAddress>,
            #[serde(default)]
            reason: Option<String>,
        }

        let raw = Raw::deserialize(deserializer)?;
        match (raw.valid, raw.payer, raw.reason) {
            (true, Some(payer), _) => Ok(VerifyOutcome::Valid { payer }),
            (true, None, _) => Err(serde::de::Error::custom(
                "`payer` must be present when `valid` is true",
            )),
            (false, _, Some(reason)) => Ok(VerifyOutcome::Invalid { reason }),
            (false, _, None) => Err(serde::de::Error::custom(
                "`reason` must be present when `valid` is false",
            )),
        }
    }
}

/// Receipt of a confirmed on-chain settlement, reflected back to the buyer
/// in the `PAYMENT-RESPONSE` header.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementResult {
    pub success: bool,
    pub transaction: TransactionHash,
    pub payer: EvmAddress,
    pub scheme: Scheme,
    pub network: NetworkTag,
    pub x402_version: u8,
}

/// Error returned when encoding a [`SettlementResult`] into base64 fails.
#[derive(Debug, thiserror::Error)]
#[error("Failed to encode settlement result as base64: {0}")]
pub struct SettlementResultB64EncodingError(#[from] pub serde_json::Error);

impl TryFrom<&SettlementResult> for Base64Bytes<'static> {
    type Error = SettlementResultB64EncodingError;

    fn try_from(value: &SettlementResult) -> Result<Self, Self::Error> {
        let json = serde_json::to_vec(value)?;
        Ok(Base64Bytes::encode(json))
    }
}

impl TryFrom<Base64Bytes<'_>> for SettlementResult {
    type Error = PaymentHeaderDecodingError;

    fn try_from(value: Base64Bytes) -> Result<Self, Self::Error> {
        let decoded = value.decode()?;
        serde_json::from_slice(&decoded).map_err(PaymentHeaderDecodingError::from)
    }
}

/// A simple error structure returned on unexpected or fatal server errors.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_requirements() -> PaymentRequirements {
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

    #[test]
    fn requirements_round_trip_is_stable() {
        let requirements = sample_requirements();
        let json = serde_json::to_string(&requirements).unwrap();
        let decoded: PaymentRequirements = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, requirements);
        // Re-encoding the decoded value yields the same bytes.
        assert_eq!(serde_json::to_string(&decoded).unwrap(), json);
    }

    #[test]
    fn requirements_list_encodes_as_json_array() {
        let encoded = PaymentRequirements::encode_list(&[sample_requirements()]).unwrap();
        let raw = encoded.decode().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert!(value.is_array(), "PAYMENT-REQUIRED must carry a JSON array");
        let decoded = PaymentRequirements::decode_list(encoded).unwrap();
        assert_eq!(decoded, vec![sample_requirements()]);
    }

    #[test]
    fn amount_is_a_decimal_string() {
        let json = serde_json::to_value(TokenAmount::from(10000u64)).unwrap();
        assert_eq!(json, serde_json::json!("10000"));
        assert!(serde_json::from_value::<TokenAmount>(serde_json::json!("0x27")).is_err());
        assert!(serde_json::from_value::<TokenAmount>(serde_json::json!(42)).is_err());
        assert!("".parse::<TokenAmount>().is_err());
        assert!("-1".parse::<TokenAmount>().is_err());
    }

    #[test]
    fn signature_format_is_validated() {
        let short = serde_json::json!("0xdead");
        assert!(serde_json::from_value::<EvmSignature>(short).is_err());
        let unprefixed = serde_json::json!("ab".repeat(65));
        assert!(serde_json::from_value::<EvmSignature>(unprefixed).is_err());
        let good = serde_json::json!(format!("0x{}", "ab".repeat(65)));
        assert!(serde_json::from_value::<EvmSignature>(good).is_ok());
    }

    #[test]
    fn nonce_format_is_validated() {
        assert!(serde_json::from_value::<HexEncodedNonce>(serde_json::json!("0x1234")).is_err());
        let good = serde_json::json!(format!("0x{}", "cd".repeat(32)));
        assert!(serde_json::from_value::<HexEncodedNonce>(good).is_ok());
    }

    #[test]
    fn verify_outcome_wire_shape() {
        let valid = VerifyOutcome::valid("0x00000000000000000000000000000000000000a1".parse().unwrap());
        let json = serde_json::to_value(&valid).unwrap();
        assert_eq!(json["valid"], serde_json::json!(true));
        assert!(json.get("reason").is_none());

        let invalid = VerifyOutcome::invalid("Insufficient amount");
        let json = serde_json::to_value(&invalid).unwrap();
        assert_eq!(json["valid"], serde_json::json!(false));
        assert_eq!(json["reason"], serde_json::json!("Insufficient amount"));

        let parsed: VerifyOutcome = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, invalid);
    }

    #[test]
    fn settlement_result_header_round_trip() {
        let result = SettlementResult {
            success: true,
            transaction: TransactionHash([7u8; 32]),
            payer: "0x00000000000000000000000000000000000000a1".parse().unwrap(),
            scheme: Scheme::Exact,
            network: "eip155:1030".parse().unwrap(),
            x402_version: X402_VERSION,
        };
        let header: Base64Bytes = (&result).try_into().unwrap();
        let decoded = SettlementResult::try_from(header).unwrap();
        assert_eq!(decoded.payer, result.payer);
        assert_eq!(decoded.transaction, result.transaction);
        assert!(decoded.success);
    }

    #[test]
    fn payload_decoding_accepts_foreign_claims() {
        // Wrong version/scheme/network must survive parsing so that verify
        // can reject them with a structured reason.
        let json = serde_json::json!({
            "x402Version": 1,
            "scheme": "upto",
            "network": "eip155:1",
            "payload": {
                "signature": format!("0x{}", "ab".repeat(65)),
                "authorization": {
                    "from": "0x00000000000000000000000000000000000000a1",
                    "to": "0x00000000000000000000000000000000000000a2",
                    "value": "10000",
                    "validAfter": "0",
                    "validBefore": "1893456000",
                    "nonce": format!("0x{}", "cd".repeat(32)),
                }
            }
        });
        let payload: PaymentPayload = serde_json::from_value(json).unwrap();
        assert_eq!(payload.x402_version, 1);
        assert_eq!(payload.scheme, "upto");
        assert_eq!(payload.network.chain_id(), 1);
    }
}
