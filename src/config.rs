//! Environment-driven configuration for the facilitator server.
//!
//! All settings come from environment variables (with `.env` loaded by the
//! binaries before parsing). The facilitator refuses to bind anywhere but a
//! loopback address: it authenticates with a single shared secret and is not
//! meant to face the internet.

use alloy::signers::local::PrivateKeySigner;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use url::Url;

use crate::network::{Network, NetworkTag};
use crate::types::{EvmAddress, TokenAmount};

const ENV_SIGNER_KEY: &str = "ARENA_SIGNER_PRIVATE_KEY";
const ENV_FACILITATOR_KEY: &str = "X402_FACILITATOR_KEY";
const ENV_FACILITATOR_PORT: &str = "X402_FACILITATOR_PORT";
const ENV_FACILITATOR_HOST: &str = "X402_FACILITATOR_HOST";
const ENV_NETWORK: &str = "X402_NETWORK";
const ENV_RPC_URL: &str = "X402_RPC_URL";
const ENV_ADAPTER_ADDRESS: &str = "X402_ADAPTER_ADDRESS";
const ENV_TREASURY: &str = "X402_API_TREASURY";
const ENV_PRICE: &str = "X402_API_PRICE";
const ENV_DEMO_BUYER_KEY: &str = "DEMO_BUYER_KEY";
const ENV_API_URL: &str = "API_URL";

const DEFAULT_PORT: u16 = 3849;

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("env {0} is not set")]
    MissingVar(&'static str),
    #[error("env {var} is invalid: {message}")]
    InvalidVar {
        var: &'static str,
        message: String,
    },
    #[error("facilitator must bind to a loopback address, got {0}")]
    NonLoopbackHost(IpAddr),
}

/// Fully parsed facilitator configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// The relayer: signs settlement transactions and pays gas.
    pub relayer: PrivateKeySigner,
    /// Shared secret expected in `X-API-Key` / `X-Facilitator-Key`.
    pub api_key: String,
    pub host: IpAddr,
    pub port: u16,
    pub network: Network,
    pub rpc_url: Url,
    /// Escrow adapter contract; escrow mode is disabled when unset.
    pub escrow_adapter: Option<EvmAddress>,
    /// Direct-transfer recipient used by the seller's payment gate.
    pub treasury: Option<EvmAddress>,
    /// Price in the asset's smallest unit, used by the seller's gate.
    pub price: Option<TokenAmount>,
    /// Buyer key for the demo endpoint; demo is disabled when unset.
    pub demo_buyer: Option<PrivateKeySigner>,
    /// Seller URL targeted by the demo endpoint.
    pub api_url: Option<Url>,
}

impl Config {
    /// Loads configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Loads configuration from an arbitrary variable source.
    pub fn from_vars(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let relayer = parse_required(&get, ENV_SIGNER_KEY, |raw| {
            PrivateKeySigner::from_str(raw).map_err(|e| e.to_string())
        })?;
        let api_key = get(ENV_FACILITATOR_KEY)
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingVar(ENV_FACILITATOR_KEY))?;

        let host = parse_optional(&get, ENV_FACILITATOR_HOST, |raw| {
            raw.parse::<IpAddr>().map_err(|e| e.to_string())
        })?
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        if !host.is_loopback() {
            return Err(ConfigError::NonLoopbackHost(host));
        }
        let port = parse_optional(&get, ENV_FACILITATOR_PORT, |raw| {
            raw.parse::<u16>().map_err(|e| e.to_string())
        })?
        .unwrap_or(DEFAULT_PORT);

        let network = parse_optional(&get, ENV_NETWORK, |raw| {
            let tag = raw.parse::<NetworkTag>().map_err(|e| e.to_string())?;
            Network::by_tag(&tag).ok_or_else(|| format!("unsupported network {tag}"))
        })?
        .unwrap_or(Network::ConfluxEspace);
        let rpc_url = parse_optional(&get, ENV_RPC_URL, |raw| {
            Url::parse(raw).map_err(|e| e.to_string())
        })?
        .unwrap_or_else(|| {
            Url::parse(network.default_rpc_url()).expect("default RPC URLs are valid")
        });

        let escrow_adapter = parse_optional(&get, ENV_ADAPTER_ADDRESS, |raw| {
            raw.parse::<EvmAddress>().map_err(|e| e.to_string())
        })?;
        let treasury = parse_optional(&get, ENV_TREASURY, |raw| {
            raw.parse::<EvmAddress>().map_err(|e| e.to_string())
        })?;
        let price = parse_optional(&get, ENV_PRICE, |raw| {
            raw.parse::<TokenAmount>().map_err(|e| e.to_string())
        })?;
        let demo_buyer = parse_optional(&get, ENV_DEMO_BUYER_KEY, |raw| {
            PrivateKeySigner::from_str(raw).map_err(|e| e.to_string())
        })?;
        let api_url = parse_optional(&get, ENV_API_URL, |raw| {
            Url::parse(raw).map_err(|e| e.to_string())
        })?;

        Ok(Config {
            relayer,
            api_key,
            host,
            port,
            network,
            rpc_url,
            escrow_adapter,
            treasury,
            price,
            demo_buyer,
            api_url,
        })
    }

    /// The address the server binds to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
    }
}

fn parse_required<T>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    parse: impl Fn(&str) -> Result<T, String>,
) -> Result<T, ConfigError> {
    let raw = get(var).ok_or(ConfigError::MissingVar(var))?;
    parse(&raw).map_err(|message| ConfigError::InvalidVar { var, message })
}

fn parse_optional<T>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    parse: impl Fn(&str) -> Result<T, String>,
) -> Result<Option<T>, ConfigError> {
    match get(var).filter(|raw| !raw.is_empty()) {
        Some(raw) => parse(&raw)
            .map(Some)
            .map_err(|message| ConfigError::InvalidVar { var, message }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const KEY: &str = "0xcafe000000000000000000000000000000000000000000000000000000000001";

    fn base_vars() -> HashMap<&'static str, String> {
        HashMap::from([
            (ENV_SIGNER_KEY, KEY.to_string()),
            (ENV_FACILITATOR_KEY, "secret".to_string()),
        ])
    }

    fn load(vars: HashMap<&'static str, String>) -> Result<Config, ConfigError> {
        Config::from_vars(|name| vars.get(name).cloned())
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = load(base_vars()).unwrap();
        assert_eq!(config.port, 3849);
        assert!(config.host.is_loopback());
        assert_eq!(config.network, Network::ConfluxEspace);
        assert_eq!(config.rpc_url.as_str(), "https://evm.confluxrpc.com/");
        assert!(config.escrow_adapter.is_none());
        assert!(config.demo_buyer.is_none());
    }

    #[test]
    fn missing_relayer_key_fails() {
        let mut vars = base_vars();
        vars.remove(ENV_SIGNER_KEY);
        assert!(matches!(
            load(vars),
            Err(ConfigError::MissingVar(ENV_SIGNER_KEY))
        ));
    }

    #[test]
    fn missing_shared_secret_fails() {
        let mut vars = base_vars();
        vars.remove(ENV_FACILITATOR_KEY);
        assert!(matches!(
            load(vars),
            Err(ConfigError::MissingVar(ENV_FACILITATOR_KEY))
        ));
    }

    #[test]
    fn non_loopback_host_is_refused() {
        let mut vars = base_vars();
        vars.insert(ENV_FACILITATOR_HOST, "0.0.0.0".to_string());
        assert!(matches!(load(vars), Err(ConfigError::NonLoopbackHost(_))));
    }

    #[test]
    fn unsupported_network_is_refused() {
        let mut vars = base_vars();
        vars.insert(ENV_NETWORK, "eip155:1".to_string());
        assert!(matches!(load(vars), Err(ConfigError::InvalidVar { .. })));
    }

    #[test]
    fn testnet_selects_testnet_rpc() {
        let mut vars = base_vars();
        vars.insert(ENV_NETWORK, "eip155:71".to_string());
        let config = load(vars).unwrap();
        assert_eq!(config.network, Network::ConfluxEspaceTestnet);
        assert_eq!(config.rpc_url.as_str(), "https://evmtestnet.confluxrpc.com/");
    }

    #[test]
    fn optional_seller_settings_parse() {
        let mut vars = base_vars();
        vars.insert(
            ENV_TREASURY,
            "0x00000000000000000000000000000000000000a1".to_string(),
        );
        vars.insert(ENV_PRICE, "10000".to_string());
        let config = load(vars).unwrap();
        assert!(config.treasury.is_some());
        assert_eq!(config.price, Some(TokenAmount::from(10000u64)));
    }
}
