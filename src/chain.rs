//! EVM chain client used by the facilitator.
//!
//! Thin wrapper over a JSON-RPC provider with the relayer wallet attached:
//! token balance reads, settlement simulation via `eth_call`, and transaction
//! broadcast with receipt confirmation. Revert data is decoded back into the
//! contract's reason string wherever the node surfaces it.

use alloy::network::{Ethereum, EthereumWallet, NetworkWallet};
use alloy::primitives::{Address, Bytes, FixedBytes, U256};
use alloy::providers::fillers::{
    BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller, WalletFiller,
};
use alloy::providers::{Identity, Provider, ProviderBuilder, RootProvider};
use alloy::sol;
use alloy::sol_types::{Revert, SolError};
use tracing::instrument;
use url::Url;

use crate::network::Network;
use crate::types::{Authorization, EvmAddress, EvmSignature, OrderId, TransactionHash};

sol!(
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface IEip3009 {
        function balanceOf(address account) external view returns (uint256);
        function transferWithAuthorization(
            address from,
            address to,
            uint256 value,
            uint256 validAfter,
            uint256 validBefore,
            bytes32 nonce,
            bytes calldata signature
        ) external;
    }
);

sol!(
    #[allow(missing_docs)]
    #[allow(clippy::too_many_arguments)]
    #[sol(rpc)]
    interface IEscrowAdapter {
        function settlePayment(
            address asset,
            bytes32 orderId,
            address from,
            uint256 value,
            uint256 validAfter,
            uint256 validBefore,
            bytes32 nonce,
            bytes calldata signature
        ) external;
    }
);

/// Gas limit for a direct `transferWithAuthorization` settlement.
pub const TRANSFER_GAS_LIMIT: u64 = 200_000;
/// Gas limit for an escrow `settlePayment` settlement.
pub const ESCROW_GAS_LIMIT: u64 = 500_000;

/// The fully composed provider type used by the chain client.
///
/// Combines filler layers for gas, blob gas, nonce, and chain ID with the
/// relayer wallet, wrapping a [`RootProvider`] for JSON-RPC communication.
/// The nonce filler serializes the relayer's account nonces across
/// concurrent settlements.
pub type InnerProvider = FillProvider<
    JoinFill<
        JoinFill<
            Identity,
            JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>,
        >,
        WalletFiller<EthereumWallet>,
    >,
    RootProvider,
>;

/// Errors surfaced by chain interaction.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// The RPC endpoint was unreachable or returned a transport-level error.
    #[error("rpc error: {0}")]
    Transport(String),
    /// A call or transaction reverted; the string is the decoded reason when
    /// the node returned revert data, otherwise the raw error.
    #[error("{0}")]
    Reverted(String),
    /// The transaction was mined but its receipt reports failure.
    #[error("transaction {transaction} reverted on-chain")]
    TransactionFailed { transaction: TransactionHash },
}

/// Maps a contract error to [`ChainError`], decoding `Error(string)` revert
/// data into the contract's reason when present.
fn contract_error(err: alloy::contract::Error) -> ChainError {
    if let Some(data) = err.as_revert_data() {
        if let Ok(revert) = Revert::abi_decode(data.as_ref()) {
            return ChainError::Reverted(revert.reason);
        }
        return ChainError::Reverted(format!("revert data 0x{}", alloy::hex::encode(&data)));
    }
    ChainError::Transport(err.to_string())
}

/// An authorization in the form the settlement contracts consume.
#[derive(Debug, Clone)]
pub struct AuthorizedTransfer {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub valid_after: U256,
    pub valid_before: U256,
    pub nonce: FixedBytes<32>,
    pub signature: Bytes,
}

impl AuthorizedTransfer {
    pub fn new(authorization: &Authorization, signature: &EvmSignature) -> Self {
        AuthorizedTransfer {
            from: authorization.from.into(),
            to: authorization.to.into(),
            value: authorization.value.into(),
            valid_after: authorization.valid_after.into(),
            valid_before: authorization.valid_before.into(),
            nonce: FixedBytes(authorization.nonce.0),
            signature: Bytes::copy_from_slice(&signature.0),
        }
    }
}

/// JSON-RPC client bound to one network, holding the relayer wallet.
///
/// Cheap to clone; the underlying provider shares its connection pool and
/// nonce management across clones.
#[derive(Clone)]
pub struct EvmChainClient {
    inner: InnerProvider,
    relayer: Address,
    network: Network,
}

impl EvmChainClient {
    /// Connects to the RPC endpoint with the relayer wallet attached.
    ///
    /// Connection is lazy; no request is issued until the first call. Use
    /// [`EvmChainClient::chain_id`] at boot to confirm the endpoint serves
    /// the expected network.
    pub fn connect(wallet: EthereumWallet, rpc_url: &Url, network: Network) -> Self {
        let relayer = NetworkWallet::<Ethereum>::default_signer_address(&wallet);
        let inner = ProviderBuilder::new()
            .wallet(wallet)
            .connect_http(rpc_url.clone());
        Self {
            inner,
            relayer,
            network,
        }
    }

    /// The address paying gas for settlement transactions.
    pub fn relayer(&self) -> EvmAddress {
        self.relayer.into()
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Fetches the chain ID reported by the RPC endpoint.
    pub async fn chain_id(&self) -> Result<u64, ChainError> {
        self.inner
            .get_chain_id()
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))
    }

    /// Native-token balance of an account, in wei.
    pub async fn native_balance(&self, account: EvmAddress) -> Result<U256, ChainError> {
        self.inner
            .get_balance(account.into())
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))
    }

    /// ERC-20 `balanceOf` on the given asset contract.
    #[instrument(skip(self), err, fields(asset = %asset, account = %account))]
    pub async fn balance_of(
        &self,
        asset: EvmAddress,
        account: EvmAddress,
    ) -> Result<U256, ChainError> {
        IEip3009::new(asset.into(), &self.inner)
            .balanceOf(account.into())
            .call()
            .await
            .map_err(contract_error)
    }

    /// Simulates `settlePayment` on the escrow adapter via `eth_call` from
    /// the relayer address.
    ///
    /// # Errors
    ///
    /// [`ChainError::Reverted`] with the contract's reason if the settlement
    /// would revert; [`ChainError::Transport`] if the node is unreachable.
    #[instrument(skip(self, transfer), err, fields(adapter = %adapter, asset = %asset))]
    pub async fn simulate_settle_payment(
        &self,
        adapter: EvmAddress,
        asset: EvmAddress,
        order_id: OrderId,
        transfer: &AuthorizedTransfer,
    ) -> Result<(), ChainError> {
        IEscrowAdapter::new(adapter.into(), &self.inner)
            .settlePayment(
                asset.into(),
                FixedBytes(order_id.0),
                transfer.from,
                transfer.value,
                transfer.valid_after,
                transfer.valid_before,
                transfer.nonce,
                transfer.signature.clone(),
            )
            .from(self.relayer)
            .call()
            .await
            .map(|_| ())
            .map_err(contract_error)
    }

    /// Broadcasts a direct `transferWithAuthorization` and waits for its
    /// receipt.
    #[instrument(skip(self, transfer), err, fields(asset = %asset, from = %transfer.from, to = %transfer.to, value = %transfer.value))]
    pub async fn settle_transfer(
        &self,
        asset: EvmAddress,
        transfer: &AuthorizedTransfer,
    ) -> Result<TransactionHash, ChainError> {
        let pending = IEip3009::new(asset.into(), &self.inner)
            .transferWithAuthorization(
                transfer.from,
                transfer.to,
                transfer.value,
                transfer.valid_after,
                transfer.valid_before,
                transfer.nonce,
                transfer.signature.clone(),
            )
            .gas(TRANSFER_GAS_LIMIT)
            .send()
            .await
            .map_err(contract_error)?;
        Self::confirm(pending).await
    }

    /// Broadcasts an escrow `settlePayment` and waits for its receipt.
    #[instrument(skip(self, transfer), err, fields(adapter = %adapter, asset = %asset, from = %transfer.from, value = %transfer.value))]
    pub async fn settle_escrow(
        &self,
        adapter: EvmAddress,
        asset: EvmAddress,
        order_id: OrderId,
        transfer: &AuthorizedTransfer,
    ) -> Result<TransactionHash, ChainError> {
        let pending = IEscrowAdapter::new(adapter.into(), &self.inner)
            .settlePayment(
                asset.into(),
                FixedBytes(order_id.0),
                transfer.from,
                transfer.value,
                transfer.valid_after,
                transfer.valid_before,
                transfer.nonce,
                transfer.signature.clone(),
            )
            .gas(ESCROW_GAS_LIMIT)
            .send()
            .await
            .map_err(contract_error)?;
        Self::confirm(pending).await
    }

    /// Awaits at least one confirmation and checks the receipt status.
    ///
    /// Must not be skipped: a receipt is the only proof the nonce was
    /// consumed and the transfer happened.
    async fn confirm(
        pending: alloy::providers::PendingTransactionBuilder<Ethereum>,
    ) -> Result<TransactionHash, ChainError> {
        let tx_hash = *pending.tx_hash();
        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| ChainError::Transport(format!("awaiting receipt for {tx_hash}: {e}")))?;
        let transaction = TransactionHash(receipt.transaction_hash.0);
        if receipt.status() {
            tracing::info!(tx = %transaction, "settlement confirmed");
            Ok(transaction)
        } else {
            tracing::warn!(tx = %transaction, "settlement transaction reverted");
            Err(ChainError::TransactionFailed { transaction })
        }
    }
}

impl std::fmt::Debug for EvmChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmChainClient")
            .field("relayer", &self.relayer)
            .field("network", &self.network)
            .finish()
    }
}
