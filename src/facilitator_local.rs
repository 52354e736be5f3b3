//! The local facilitator: off-chain verification and on-chain settlement.
//!
//! [`FacilitatorLocal`] owns the chain client (and with it the relayer key),
//! the supported-asset table, and the optional escrow adapter address. It
//! implements the ordered verification pipeline for both settlement modes
//! and broadcasts EIP-3009 settlements through the [`EvmChainClient`].
//!
//! Verification checks run in a fixed order and stop at the first failure.
//! A failed check is *not* an error: it becomes a structured
//! `{valid: false, reason}` verdict so the payment gate can relay the reason
//! to the buyer. Errors are reserved for infrastructure faults (unreachable
//! RPC, broken clock), which the HTTP layer turns into 5xx responses.

use tracing::instrument;

use crate::chain::{AuthorizedTransfer, ChainError, EvmChainClient};
use crate::eip712;
use crate::facilitator::Facilitator;
use crate::network::{AssetDescriptor, Network, SupportedAssets};
use crate::timestamp::UnixTimestamp;
use crate::types::{
    EvmAddress, PaymentRequirements, Scheme, SettleRequest, SettlementMode, SettlementResult,
    TokenAmount, VerifyOutcome, VerifyRequest, X402_VERSION,
};

/// Failure modes of verification and settlement.
///
/// Variants up to [`PaymentError::SimulationReverted`] are payment
/// rejections whose `Display` text is the reason sent to the buyer.
/// [`PaymentError::Clock`] and [`PaymentError::Chain`] are infrastructure
/// failures.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Unsupported x402 version")]
    UnsupportedVersion(u8),
    #[error("Unsupported scheme")]
    UnsupportedScheme(String),
    #[error("Wrong network")]
    WrongNetwork,
    #[error("Unsupported asset")]
    UnsupportedAsset(EvmAddress),
    #[error("Wrong settlement mode")]
    WrongSettlementMode,
    #[error("Escrow adapter not configured")]
    EscrowNotConfigured,
    #[error("Invalid signature")]
    InvalidSignature(String),
    #[error("Wrong payment destination")]
    WrongDestination,
    #[error("Insufficient balance")]
    InsufficientBalance,
    #[error("Authorization expired or not yet valid")]
    OutsideValidityWindow,
    #[error("Insufficient amount")]
    InsufficientAmount,
    #[error("Settlement simulation reverted: {0}")]
    SimulationReverted(String),
    #[error("System clock error: {0}")]
    Clock(#[from] std::time::SystemTimeError),
    #[error(transparent)]
    Chain(ChainError),
}

impl PaymentError {
    /// The buyer-facing rejection reason, or `None` for infrastructure
    /// failures that must surface as server errors instead.
    pub fn rejection_reason(&self) -> Option<String> {
        match self {
            PaymentError::Clock(_) | PaymentError::Chain(_) => None,
            other => Some(other.to_string()),
        }
    }
}

/// Checks the authorization's validity window against the current time.
///
/// No grace period is applied on either bound: clock skew between buyer and
/// facilitator is reported, not absorbed.
pub fn assert_time(
    valid_after: UnixTimestamp,
    valid_before: UnixTimestamp,
    now: UnixTimestamp,
) -> Result<(), PaymentError> {
    if now < valid_after || now > valid_before {
        return Err(PaymentError::OutsideValidityWindow);
    }
    Ok(())
}

/// Checks the signed value covers the required amount.
pub fn assert_enough_value(value: TokenAmount, required: TokenAmount) -> Result<(), PaymentError> {
    if value < required {
        return Err(PaymentError::InsufficientAmount);
    }
    Ok(())
}

/// A [`Facilitator`] that verifies locally and settles through its own
/// relayer.
#[derive(Clone)]
pub struct FacilitatorLocal {
    chain: EvmChainClient,
    assets: SupportedAssets,
    network: Network,
    escrow_adapter: Option<EvmAddress>,
}

impl FacilitatorLocal {
    pub fn new(
        chain: EvmChainClient,
        assets: SupportedAssets,
        network: Network,
        escrow_adapter: Option<EvmAddress>,
    ) -> Self {
        FacilitatorLocal {
            chain,
            assets,
            network,
            escrow_adapter,
        }
    }

    pub fn chain(&self) -> &EvmChainClient {
        &self.chain
    }

    pub fn assets(&self) -> &SupportedAssets {
        &self.assets
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Verifies a payment for the settlement mode of the endpoint it arrived
    /// on.
    ///
    /// Check failures are folded into [`VerifyOutcome::Invalid`]; only
    /// infrastructure faults surface as `Err`.
    #[instrument(skip_all, err, fields(mode = %mode, payer = %request.payment_payload.payload.authorization.from))]
    pub async fn verify_mode(
        &self,
        request: &VerifyRequest,
        mode: SettlementMode,
    ) -> Result<VerifyOutcome, PaymentError> {
        match self.assert_valid_payment(request, mode).await {
            Ok(payer) => Ok(VerifyOutcome::valid(payer)),
            Err(error) => match error.rejection_reason() {
                Some(reason) => {
                    tracing::info!(reason = %reason, "payment rejected");
                    Ok(VerifyOutcome::invalid(reason))
                }
                None => Err(error),
            },
        }
    }

    /// Broadcasts the settlement for a payment that was just verified.
    ///
    /// Off-chain checks are deliberately not repeated here; a replayed
    /// authorization reverts on-chain via the nonce bitmap and surfaces as a
    /// settlement failure.
    #[instrument(skip_all, err, fields(mode = %mode, payer = %request.payment_payload.payload.authorization.from))]
    pub async fn settle_mode(
        &self,
        request: &SettleRequest,
        mode: SettlementMode,
    ) -> Result<SettlementResult, PaymentError> {
        let requirements = &request.payment_requirements;
        let payload = &request.payment_payload.payload;
        let transfer = AuthorizedTransfer::new(&payload.authorization, &payload.signature);

        let transaction = match mode {
            SettlementMode::Transfer => self
                .chain
                .settle_transfer(requirements.asset, &transfer)
                .await
                .map_err(PaymentError::Chain)?,
            SettlementMode::Escrow => {
                let adapter = self.escrow_adapter.ok_or(PaymentError::EscrowNotConfigured)?;
                let order_id = requirements.extra.order_id.unwrap_or_default();
                self.chain
                    .settle_escrow(adapter, requirements.asset, order_id, &transfer)
                    .await
                    .map_err(PaymentError::Chain)?
            }
        };

        Ok(SettlementResult {
            success: true,
            transaction,
            payer: payload.authorization.from,
            scheme: Scheme::Exact,
            network: self.network.tag(),
            x402_version: X402_VERSION,
        })
    }

    /// Runs the ordered verification pipeline, returning the verified payer.
    /// Stops at the first failing check.
    async fn assert_valid_payment(
        &self,
        request: &VerifyRequest,
        mode: SettlementMode,
    ) -> Result<EvmAddress, PaymentError> {
        let payload = &request.payment_payload;
        let requirements = &request.payment_requirements;

        if payload.x402_version != X402_VERSION {
            return Err(PaymentError::UnsupportedVersion(payload.x402_version));
        }
        if payload.scheme != Scheme::Exact.as_str() {
            return Err(PaymentError::UnsupportedScheme(payload.scheme.clone()));
        }
        let expected_network = self.network.tag();
        if payload.network != expected_network || requirements.network != expected_network {
            return Err(PaymentError::WrongNetwork);
        }
        let descriptor = self
            .assets
            .get(&requirements.asset)
            .ok_or(PaymentError::UnsupportedAsset(requirements.asset))?;
        if !descriptor.eip3009 {
            return Err(PaymentError::UnsupportedAsset(requirements.asset));
        }

        let destination = match mode {
            SettlementMode::Transfer => {
                if requirements.extra.settlement_mode != Some(SettlementMode::Transfer) {
                    return Err(PaymentError::WrongSettlementMode);
                }
                requirements.pay_to
            }
            SettlementMode::Escrow => {
                if requirements.extra.asset_transfer_method.is_none() {
                    return Err(PaymentError::WrongSettlementMode);
                }
                self.escrow_adapter.ok_or(PaymentError::EscrowNotConfigured)?
            }
        };

        let authorization = &payload.payload.authorization;
        let domain = self.eip712_domain(descriptor, requirements);
        let recovered = eip712::recover_payer(&domain, authorization, &payload.payload.signature)
            .map_err(|e| PaymentError::InvalidSignature(e.to_string()))?;
        if recovered != authorization.from.0 {
            return Err(PaymentError::InvalidSignature(format!(
                "recovered {recovered}, expected {}",
                authorization.from
            )));
        }

        if authorization.to != destination {
            return Err(PaymentError::WrongDestination);
        }

        let balance = self
            .chain
            .balance_of(requirements.asset, authorization.from)
            .await
            .map_err(PaymentError::Chain)?;
        if balance < authorization.value.0 {
            return Err(PaymentError::InsufficientBalance);
        }

        let now = UnixTimestamp::try_now()?;
        assert_time(authorization.valid_after, authorization.valid_before, now)?;
        assert_enough_value(authorization.value, requirements.amount)?;

        if mode == SettlementMode::Escrow {
            let transfer = AuthorizedTransfer::new(authorization, &payload.payload.signature);
            let order_id = requirements.extra.order_id.unwrap_or_default();
            self.chain
                .simulate_settle_payment(destination, requirements.asset, order_id, &transfer)
                .await
                .map_err(|e| match e {
                    ChainError::Reverted(reason) => PaymentError::SimulationReverted(reason),
                    other => PaymentError::Chain(other),
                })?;
        }

        Ok(authorization.from)
    }

    /// The EIP-712 domain a conforming buyer signed against.
    ///
    /// `extra.name`/`extra.version` take precedence because they are part of
    /// the advertised requirements the buyer signed; the asset table supplies
    /// the defaults.
    fn eip712_domain(
        &self,
        descriptor: &AssetDescriptor,
        requirements: &PaymentRequirements,
    ) -> alloy::sol_types::Eip712Domain {
        let name = requirements
            .extra
            .name
            .as_deref()
            .unwrap_or(&descriptor.eip712.name);
        let version = requirements
            .extra
            .version
            .as_deref()
            .unwrap_or(&descriptor.eip712.version);
        eip712::domain(name, version, self.network.chain_id(), requirements.asset.0)
    }
}

impl std::fmt::Debug for FacilitatorLocal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FacilitatorLocal")
            .field("network", &self.network)
            .field("escrow_adapter", &self.escrow_adapter)
            .finish()
    }
}

impl Facilitator for FacilitatorLocal {
    type Error = PaymentError;

    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyOutcome, Self::Error> {
        let mode = request.payment_requirements.settlement_mode();
        self.verify_mode(request, mode).await
    }

    async fn settle(&self, request: &SettleRequest) -> Result<SettlementResult, Self::Error> {
        let mode = request.payment_requirements.settlement_mode();
        self.settle_mode(request, mode).await
    }
}
