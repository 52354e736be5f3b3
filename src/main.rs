//! x402 facilitator HTTP entrypoint.
//!
//! Launches the loopback facilitator serving verification, settlement, and
//! the demo buyer flow. See [`x402_arena::handlers`] for the endpoint table
//! and [`x402_arena::config`] for the environment variables.

use alloy::network::EthereumWallet;
use dotenvy::dotenv;
use std::sync::Arc;

use x402_arena::chain::EvmChainClient;
use x402_arena::config::Config;
use x402_arena::facilitator_local::FacilitatorLocal;
use x402_arena::handlers::{self, AppState, DemoConfig};
use x402_arena::network::SupportedAssets;
use x402_arena::telemetry;

#[tokio::main]
async fn main() {
    dotenv().ok();
    telemetry::init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(error) => {
            tracing::error!("configuration error: {error}");
            std::process::exit(1);
        }
    };

    let wallet = EthereumWallet::from(config.relayer.clone());
    let chain = EvmChainClient::connect(wallet, &config.rpc_url, config.network);

    // Refuse to start against an endpoint serving a different chain: every
    // signature this process verifies embeds the configured chain ID.
    match chain.chain_id().await {
        Ok(chain_id) if chain_id == config.network.chain_id() => {
            tracing::info!(
                network = %config.network,
                rpc = %config.rpc_url,
                relayer = %chain.relayer(),
                "connected to RPC endpoint"
            );
        }
        Ok(chain_id) => {
            tracing::error!(
                "RPC endpoint serves chain {chain_id}, expected {} ({})",
                config.network.chain_id(),
                config.network
            );
            std::process::exit(1);
        }
        Err(error) => {
            tracing::error!("failed to reach RPC endpoint {}: {error}", config.rpc_url);
            std::process::exit(1);
        }
    }

    let assets = SupportedAssets::for_network(config.network);
    let facilitator = FacilitatorLocal::new(
        chain,
        assets,
        config.network,
        config.escrow_adapter,
    );

    let demo = match (config.demo_buyer.clone(), config.api_url.clone()) {
        (Some(buyer), Some(api_url)) => Some(DemoConfig { buyer, api_url }),
        (Some(_), None) | (None, Some(_)) => {
            tracing::warn!("demo endpoint disabled: both DEMO_BUYER_KEY and API_URL are required");
            None
        }
        (None, None) => None,
    };

    let state = Arc::new(AppState {
        facilitator,
        api_key: config.api_key.clone(),
        demo,
    });
    let app = handlers::router(state);

    let addr = config.socket_addr();
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(error) => {
            tracing::error!("failed to bind {addr}: {error}");
            std::process::exit(1);
        }
    };
    tracing::info!("x402 facilitator listening on http://{addr}");

    if let Err(error) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("server error: {error}");
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("shutting down");
    }
}
