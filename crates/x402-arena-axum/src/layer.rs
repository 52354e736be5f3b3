//! The tower [`Layer`] wiring the paygate into an axum router.
//!
//! Create one [`X402Middleware`] per application, configure its price tags,
//! and attach it to protected routes with `.layer(...)`. Each wrapped
//! request is handled by a [`Paygate`] built from the shared configuration.

use axum_core::extract::Request;
use axum_core::response::Response;
use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service};

use x402_arena::facilitator::Facilitator;
use x402_arena::types::PaymentRequirements;

use crate::facilitator_client::{FacilitatorClient, FacilitatorClientError};
use crate::paygate::Paygate;

/// Payment middleware configuration: a facilitator plus the accepted
/// payment options.
///
/// Implements [`Layer`], so it can be attached directly to a route. Clones
/// share the facilitator client and the offer list.
#[derive(Clone, Debug)]
pub struct X402Middleware<TFacilitator> {
    facilitator: TFacilitator,
    accepts: Arc<Vec<PaymentRequirements>>,
}

impl X402Middleware<Arc<FacilitatorClient>> {
    /// Creates middleware talking to a facilitator at `url`, authenticating
    /// with the shared secret.
    pub fn try_new(url: &str, api_key: &str) -> Result<Self, FacilitatorClientError> {
        let facilitator = FacilitatorClient::try_from_str(url, api_key)?;
        Ok(Self {
            facilitator: Arc::new(facilitator),
            accepts: Arc::new(Vec::new()),
        })
    }

    /// Overrides the facilitator request timeout.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            facilitator: Arc::new(self.facilitator.with_timeout(timeout)),
            accepts: self.accepts.clone(),
        }
    }
}

impl<TFacilitator> X402Middleware<TFacilitator> {
    /// Creates middleware around any [`Facilitator`] implementation.
    pub fn with_facilitator(facilitator: TFacilitator) -> Self {
        Self {
            facilitator,
            accepts: Arc::new(Vec::new()),
        }
    }

    /// The configured payment options.
    pub fn accepts(&self) -> &[PaymentRequirements] {
        &self.accepts
    }
}

impl<TFacilitator> X402Middleware<TFacilitator>
where
    TFacilitator: Clone,
{
    /// Adds a payment option.
    ///
    /// Call repeatedly to offer several options (the 402 response advertises
    /// all of them; clients pick one).
    pub fn with_price_tag(&self, requirements: PaymentRequirements) -> Self {
        let mut accepts = (*self.accepts).clone();
        accepts.push(requirements);
        Self {
            facilitator: self.facilitator.clone(),
            accepts: Arc::new(accepts),
        }
    }
}

impl<S, TFacilitator> Layer<S> for X402Middleware<TFacilitator>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
    TFacilitator: Facilitator + Clone + Send + Sync + 'static,
{
    type Service = X402MiddlewareService<TFacilitator>;

    fn layer(&self, inner: S) -> Self::Service {
        X402MiddlewareService {
            facilitator: self.facilitator.clone(),
            accepts: self.accepts.clone(),
            inner: BoxCloneSyncService::new(inner),
        }
    }
}

/// The service produced by [`X402Middleware`]; enforces payment on every
/// request before delegating to the wrapped service.
#[derive(Clone)]
pub struct X402MiddlewareService<TFacilitator> {
    facilitator: TFacilitator,
    accepts: Arc<Vec<PaymentRequirements>>,
    inner: BoxCloneSyncService<Request, Response, Infallible>,
}

impl<TFacilitator> Service<Request> for X402MiddlewareService<TFacilitator>
where
    TFacilitator: Facilitator + Clone + Send + Sync + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future =
        std::pin::Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let gate = Paygate {
            facilitator: self.facilitator.clone(),
            accepts: self.accepts.clone(),
        };
        let inner = self.inner.clone();
        Box::pin(async move { gate.handle_request(inner, req).await })
    }
}
