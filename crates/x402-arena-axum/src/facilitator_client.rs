//! A [`Facilitator`] implementation that talks to the loopback facilitator
//! over HTTP.
//!
//! The client authenticates every request with the shared secret in the
//! `X-API-Key` header and selects the mode-specific endpoint pair
//! (`/x402/verify[-transfer]`, `/x402/settle[-transfer]`) from the
//! requirement's settlement mode. Cheap to clone: the underlying
//! `reqwest::Client` shares its connection pool across routes and tasks.

use http::StatusCode;
use reqwest::Client;
use std::time::Duration;
use url::Url;

use x402_arena::facilitator::Facilitator;
use x402_arena::types::{
    SettleRequest, SettlementMode, SettlementResult, VerifyOutcome, VerifyRequest,
};

/// Default timeout for the loopback verify/settle hops.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur while calling the facilitator.
#[derive(Debug, thiserror::Error)]
pub enum FacilitatorClientError {
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        context: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("HTTP error: {context}: {source}")]
    Http {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Facilitator answered {status}: {context}: {body}")]
    HttpStatus {
        context: &'static str,
        status: StatusCode,
        body: String,
    },
}

/// HTTP client for a remote (loopback) facilitator.
#[derive(Clone, Debug)]
pub struct FacilitatorClient {
    base_url: Url,
    verify_transfer_url: Url,
    settle_transfer_url: Url,
    verify_escrow_url: Url,
    settle_escrow_url: Url,
    client: Client,
    api_key: String,
    timeout: Duration,
}

impl FacilitatorClient {
    /// Constructs a client from the facilitator base URL and shared secret.
    pub fn try_new(base_url: Url, api_key: &str) -> Result<Self, FacilitatorClientError> {
        let join = |path: &'static str| {
            base_url
                .join(path)
                .map_err(|e| FacilitatorClientError::UrlParse {
                    context: "Failed to construct endpoint URL",
                    source: e,
                })
        };
        Ok(Self {
            verify_transfer_url: join("./x402/verify-transfer")?,
            settle_transfer_url: join("./x402/settle-transfer")?,
            verify_escrow_url: join("./x402/verify")?,
            settle_escrow_url: join("./x402/settle")?,
            base_url,
            client: Client::new(),
            api_key: api_key.to_string(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Parses the base URL and constructs the client.
    pub fn try_from_str(value: &str, api_key: &str) -> Result<Self, FacilitatorClientError> {
        // Normalize: a single trailing slash so relative joins behave.
        let mut normalized = value.trim_end_matches('/').to_string();
        normalized.push('/');
        let url = Url::parse(&normalized).map_err(|e| FacilitatorClientError::UrlParse {
            context: "Failed to parse base url",
            source: e,
        })?;
        Self::try_new(url, api_key)
    }

    /// The facilitator base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Overrides the request timeout.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let mut this = self.clone();
        this.timeout = timeout;
        this
    }

    fn verify_url(&self, mode: SettlementMode) -> &Url {
        match mode {
            SettlementMode::Transfer => &self.verify_transfer_url,
            SettlementMode::Escrow => &self.verify_escrow_url,
        }
    }

    fn settle_url(&self, mode: SettlementMode) -> &Url {
        match mode {
            SettlementMode::Transfer => &self.settle_transfer_url,
            SettlementMode::Escrow => &self.settle_escrow_url,
        }
    }

    /// POST helper handling serialization, auth, timeout, and error mapping.
    async fn post_json<T, R>(
        &self,
        url: &Url,
        context: &'static str,
        payload: &T,
    ) -> Result<R, FacilitatorClientError>
    where
        T: serde::Serialize + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let response = self
            .client
            .post(url.clone())
            .header("X-API-Key", &self.api_key)
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await
            .map_err(|e| FacilitatorClientError::Http { context, source: e })?;

        if response.status() == StatusCode::OK {
            response
                .json::<R>()
                .await
                .map_err(|e| FacilitatorClientError::JsonDeserialization { context, source: e })
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, context, body = %body, "facilitator returned an error status");
            Err(FacilitatorClientError::HttpStatus {
                context,
                status,
                body,
            })
        }
    }
}

impl Facilitator for FacilitatorClient {
    type Error = FacilitatorClientError;

    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyOutcome, Self::Error> {
        let mode = request.payment_requirements.settlement_mode();
        self.post_json(self.verify_url(mode), "POST verify", request)
            .await
    }

    async fn settle(&self, request: &SettleRequest) -> Result<SettlementResult, Self::Error> {
        let mode = request.payment_requirements.settlement_mode();
        self.post_json(self.settle_url(mode), "POST settle", request)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_urls_are_mode_specific() {
        let client = FacilitatorClient::try_from_str("http://127.0.0.1:3849", "secret").unwrap();
        assert_eq!(
            client.verify_url(SettlementMode::Transfer).as_str(),
            "http://127.0.0.1:3849/x402/verify-transfer"
        );
        assert_eq!(
            client.settle_url(SettlementMode::Transfer).as_str(),
            "http://127.0.0.1:3849/x402/settle-transfer"
        );
        assert_eq!(
            client.verify_url(SettlementMode::Escrow).as_str(),
            "http://127.0.0.1:3849/x402/verify"
        );
        assert_eq!(
            client.settle_url(SettlementMode::Escrow).as_str(),
            "http://127.0.0.1:3849/x402/settle"
        );
    }

    #[test]
    fn trailing_slashes_are_normalized() {
        let client = FacilitatorClient::try_from_str("http://127.0.0.1:3849///", "secret").unwrap();
        assert_eq!(client.base_url().as_str(), "http://127.0.0.1:3849/");
    }
}
