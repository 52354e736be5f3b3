//! Reference buyer client for x402-protected resources.
//!
//! Implements the client half of the protocol: request the resource, read
//! the `PAYMENT-REQUIRED` offer list from the 402 response, sign an EIP-3009
//! authorization for the first acceptable offer, and retry the request with
//! a `PAYMENT-SIGNATURE` header. Used by the facilitator's demo endpoint and
//! by the `x402-pay` binary.

use alloy::signers::Signer;
use rand::{Rng, rng};
use reqwest::StatusCode;
use std::time::Duration;

use crate::eip712;
use crate::network::{Network, SupportedAssets};
use crate::timestamp::UnixTimestamp;
use crate::types::{
    Authorization, EvmSignature, ExactEvmPayload, HexEncodedNonce, PaymentHeaderDecodingError,
    PaymentPayload, PaymentRequirements, Scheme, SettlementMode, SettlementResult, X402_VERSION,
    headers,
};
use crate::util::Base64Bytes;

/// How long a freshly signed authorization stays valid.
const AUTHORIZATION_TTL_SECS: u64 = 3600;

/// Errors that can occur while paying for a resource.
#[derive(Debug, thiserror::Error)]
pub enum PayerError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server answered 402 without a {0} header")]
    MissingHeader(&'static str),
    #[error("failed to decode payment header: {0}")]
    Decode(#[from] PaymentHeaderDecodingError),
    #[error("no acceptable payment option offered")]
    NoAcceptableOffer,
    #[error("offered asset has no known EIP-712 domain")]
    UnknownAssetDomain,
    #[error("failed to sign payment authorization: {0}")]
    Signing(String),
    #[error("system clock error: {0}")]
    Clock(#[from] std::time::SystemTimeError),
    #[error("failed to encode payment payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Outcome of the first, unpaid request.
#[derive(Debug)]
pub enum Fetched {
    /// The resource did not demand payment (or failed some other way); the
    /// response is passed through untouched.
    Complete(PaidResponse),
    /// The resource answered 402 with these payment options.
    PaymentRequired(Vec<PaymentRequirements>),
}

/// A completed exchange: final status, body, and the settlement receipt when
/// the server attached one.
#[derive(Debug)]
pub struct PaidResponse {
    pub status: StatusCode,
    pub body: String,
    pub settlement: Option<SettlementResult>,
}

impl PaidResponse {
    async fn from_response(response: reqwest::Response) -> Result<Self, PayerError> {
        let status = response.status();
        let settlement = response
            .headers()
            .get(headers::PAYMENT_RESPONSE)
            .map(|value| Base64Bytes::from(value.as_bytes()))
            .map(SettlementResult::try_from)
            .transpose()?;
        let body = response.text().await?;
        Ok(PaidResponse {
            status,
            body,
            settlement,
        })
    }
}

/// A buyer-side client holding the buyer's signing key.
///
/// Cheap to clone; the inner `reqwest::Client` shares its connection pool.
#[derive(Clone, Debug)]
pub struct PayerClient<S> {
    http: reqwest::Client,
    signer: S,
    network: Network,
}

impl<S> PayerClient<S>
where
    S: Signer + Sync,
{
    /// Creates a client for the given buyer key and network.
    pub fn new(signer: S, network: Network) -> Result<Self, PayerError> {
        Self::with_timeout(signer, network, Duration::from_secs(30))
    }

    /// Creates a client with an explicit overall request timeout.
    pub fn with_timeout(
        signer: S,
        network: Network,
        timeout: Duration,
    ) -> Result<Self, PayerError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(PayerClient {
            http,
            signer,
            network,
        })
    }

    /// The buyer address payments will be drawn from.
    pub fn address(&self) -> alloy::primitives::Address {
        self.signer.address()
    }

    /// Fetches a resource, paying for it if the server demands payment.
    pub async fn get(&self, url: &str) -> Result<PaidResponse, PayerError> {
        match self.fetch(url).await? {
            Fetched::Complete(response) => Ok(response),
            Fetched::PaymentRequired(offers) => {
                let selected = self
                    .select_offer(&offers)
                    .ok_or(PayerError::NoAcceptableOffer)?;
                self.pay(url, selected).await
            }
        }
    }

    /// Issues the initial unpaid request and decodes the 402 offer list when
    /// present.
    pub async fn fetch(&self, url: &str) -> Result<Fetched, PayerError> {
        let response = self.http.get(url).send().await?;
        if response.status() != StatusCode::PAYMENT_REQUIRED {
            return Ok(Fetched::Complete(PaidResponse::from_response(response).await?));
        }
        let header = response
            .headers()
            .get(headers::PAYMENT_REQUIRED)
            .ok_or(PayerError::MissingHeader("PAYMENT-REQUIRED"))?;
        let offers = PaymentRequirements::decode_list(Base64Bytes::from(header.as_bytes()))?;
        Ok(Fetched::PaymentRequired(offers))
    }

    /// Picks the first offer this client can satisfy: "exact" scheme, our
    /// network, and either direct-transfer mode or an EIP-3009 escrow.
    pub fn select_offer<'a>(
        &self,
        offers: &'a [PaymentRequirements],
    ) -> Option<&'a PaymentRequirements> {
        offers.iter().find(|offer| {
            offer.scheme == Scheme::Exact
                && offer.network == self.network.tag()
                && (offer.extra.settlement_mode == Some(SettlementMode::Transfer)
                    || offer.extra.asset_transfer_method.is_some())
        })
    }

    /// Signs an authorization for the offer and retries the request with the
    /// `PAYMENT-SIGNATURE` header attached.
    pub async fn pay(
        &self,
        url: &str,
        offer: &PaymentRequirements,
    ) -> Result<PaidResponse, PayerError> {
        let payload = self.sign_payment(offer).await?;
        let header = Base64Bytes::encode(serde_json::to_vec(&payload)?);
        let response = self
            .http
            .get(url)
            .header(headers::PAYMENT_SIGNATURE, header.to_string())
            .send()
            .await?;
        PaidResponse::from_response(response).await
    }

    /// Builds and signs the payment payload for an offer.
    ///
    /// The authorization pays exactly the offered amount to the offer's
    /// destination, is valid from the epoch until an hour from now, and uses
    /// a fresh random nonce. The EIP-712 domain comes from the offer's
    /// `extra`, falling back to the known asset table.
    pub async fn sign_payment(
        &self,
        offer: &PaymentRequirements,
    ) -> Result<PaymentPayload, PayerError> {
        let assets = SupportedAssets::for_network(self.network);
        let descriptor = assets.get(&offer.asset);
        let name = offer
            .extra
            .name
            .as_deref()
            .or(descriptor.map(|d| d.eip712.name.as_str()))
            .ok_or(PayerError::UnknownAssetDomain)?;
        let version = offer
            .extra
            .version
            .as_deref()
            .or(descriptor.map(|d| d.eip712.version.as_str()))
            .ok_or(PayerError::UnknownAssetDomain)?;
        let domain = eip712::domain(name, version, self.network.chain_id(), offer.asset.0);

        // Escrow offers advertise the adapter contract as payTo, so the
        // destination is the same field in both modes.
        let destination = offer.pay_to;
        let nonce: [u8; 32] = rng().random();
        let now = UnixTimestamp::try_now()?;
        let authorization = Authorization {
            from: self.signer.address().into(),
            to: destination,
            value: offer.amount,
            valid_after: UnixTimestamp::from_secs(0),
            valid_before: now + AUTHORIZATION_TTL_SECS,
            nonce: HexEncodedNonce(nonce),
        };

        let digest = eip712::signing_hash(&domain, &authorization);
        let signature = self
            .signer
            .sign_hash(&digest)
            .await
            .map_err(|e| PayerError::Signing(e.to_string()))?;
        let signature: EvmSignature = signature.as_bytes().into();

        Ok(PaymentPayload {
            x402_version: X402_VERSION,
            scheme: Scheme::Exact.as_str().to_string(),
            network: self.network.tag(),
            payload: ExactEvmPayload {
                signature,
                authorization,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::signers::local::PrivateKeySigner;

    use crate::types::RequirementsExtra;

    fn transfer_offer() -> PaymentRequirements {
        PaymentRequirements {
            scheme: Scheme::Exact,
            network: Network::ConfluxEspace.tag(),
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

    fn client() -> PayerClient<PrivateKeySigner> {
        PayerClient::new(PrivateKeySigner::random(), Network::ConfluxEspace).unwrap()
    }

    #[test]
    fn selects_first_matching_offer() {
        let client = client();
        let mut foreign = transfer_offer();
        foreign.network = "eip155:1".parse().unwrap();
        let offers = vec![foreign, transfer_offer()];
        let selected = client.select_offer(&offers).expect("one offer matches");
        assert_eq!(selected.network, Network::ConfluxEspace.tag());
    }

    #[test]
    fn rejects_offer_without_mode_discriminator() {
        let client = client();
        let mut bare = transfer_offer();
        bare.extra.settlement_mode = None;
        assert!(client.select_offer(&[bare]).is_none());
    }

    #[tokio::test]
    async fn signed_payload_recovers_to_the_buyer() {
        let signer = PrivateKeySigner::random();
        let buyer = signer.address();
        let client = PayerClient::new(signer, Network::ConfluxEspace).unwrap();
        let offer = transfer_offer();

        let payload = client.sign_payment(&offer).await.unwrap();
        assert_eq!(payload.x402_version, X402_VERSION);
        assert_eq!(payload.payload.authorization.to, offer.pay_to);
        assert_eq!(payload.payload.authorization.value, offer.amount);
        assert_eq!(
            payload.payload.authorization.valid_after,
            UnixTimestamp::from_secs(0)
        );

        let domain = eip712::domain("USDT0", "1", 1030, offer.asset.0);
        let recovered = eip712::recover_payer(
            &domain,
            &payload.payload.authorization,
            &payload.payload.signature,
        )
        .unwrap();
        assert_eq!(recovered, buyer);
    }

    #[tokio::test]
    async fn fresh_nonce_per_payment() {
        let client = client();
        let offer = transfer_offer();
        let first = client.sign_payment(&offer).await.unwrap();
        let second = client.sign_payment(&offer).await.unwrap();
        assert_ne!(
            first.payload.authorization.nonce.0,
            second.payload.authorization.nonce.0
        );
    }
}
