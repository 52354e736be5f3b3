//! Core trait defining the verification and settlement interface.
//!
//! Implementors validate incoming payment payloads against requirements
//! ([`Facilitator::verify`]) and execute on-chain transfers
//! ([`Facilitator::settle`]). Both the local facilitator and the HTTP client
//! used by the payment gate implement this trait, so middleware can run
//! against either.

use std::fmt::{Debug, Display};
use std::sync::Arc;

use crate::types::{SettleRequest, SettlementResult, VerifyOutcome, VerifyRequest};

/// Asynchronous interface for x402 payment facilitators.
///
/// The settlement mode (direct transfer vs. escrow) travels inside the
/// request's payment requirements; implementations dispatch on it.
pub trait Facilitator {
    /// The error type returned by this facilitator.
    ///
    /// Errors represent infrastructure failures (unreachable RPC, transport
    /// problems). Payment rejections are not errors; they come back as
    /// [`VerifyOutcome::Invalid`].
    type Error: Debug + Display;

    /// Verifies a proposed payment payload off-chain.
    ///
    /// Checks payload integrity, signature validity, destination, balance
    /// sufficiency, validity window, and amount; in escrow mode, also
    /// simulates the settlement call.
    fn verify(
        &self,
        request: &VerifyRequest,
    ) -> impl Future<Output = Result<VerifyOutcome, Self::Error>> + Send;

    /// Executes the settlement on-chain and waits for confirmation.
    ///
    /// Trusts that [`Facilitator::verify`] was just run for this request; no
    /// off-chain checks are repeated. The chain's nonce accounting is the
    /// final arbiter against replays.
    fn settle(
        &self,
        request: &SettleRequest,
    ) -> impl Future<Output = Result<SettlementResult, Self::Error>> + Send;
}

impl<T: Facilitator> Facilitator for Arc<T> {
    type Error = T::Error;

    fn verify(
        &self,
        request: &VerifyRequest,
    ) -> impl Future<Output = Result<VerifyOutcome, Self::Error>> + Send {
        self.as_ref().verify(request)
    }

    fn settle(
        &self,
        request: &SettleRequest,
    ) -> impl Future<Output = Result<SettlementResult, Self::Error>> + Send {
        self.as_ref().settle(request)
    }
}
