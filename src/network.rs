//! Network definitions and known token deployments.
//!
//! The facilitator serves exactly one EVM network, identified on the wire by
//! a CAIP-2 tag such as `eip155:1030`. This module defines the supported
//! networks, the [`NetworkTag`] wire type, and the static table of EIP-3009
//! capable token deployments the facilitator accepts payment in.

use alloy::primitives::address;
use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::types::EvmAddress;

/// A CAIP-2 chain identifier in the `eip155` namespace, e.g. `eip155:1030`.
///
/// The tag is lenient by design: any well-formed `eip155:<decimal>` string
/// parses, so that a payment targeting a foreign chain is rejected during
/// verification with a structured reason instead of failing JSON decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NetworkTag {
    reference: u64,
}

impl NetworkTag {
    /// The numeric chain ID carried by the tag.
    pub fn chain_id(&self) -> u64 {
        self.reference
    }
}

impl Display for NetworkTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "eip155:{}", self.reference)
    }
}

/// Error returned when a string is not a valid `eip155:<decimal>` tag.
#[derive(Debug, thiserror::Error)]
#[error("invalid network tag, expected eip155:<chain-id>")]
pub struct NetworkTagParseError;

impl FromStr for NetworkTag {
    type Err = NetworkTagParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let reference = s
            .strip_prefix("eip155:")
            .ok_or(NetworkTagParseError)?
            .parse::<u64>()
            .map_err(|_| NetworkTagParseError)?;
        Ok(NetworkTag { reference })
    }
}

impl Serialize for NetworkTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for NetworkTag {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NetworkTag::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Networks this facilitator knows how to settle on.
#[derive(Debug, Hash, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Network {
    /// Conflux eSpace mainnet (chain ID 1030).
    #[serde(rename = "conflux-espace")]
    ConfluxEspace,
    /// Conflux eSpace testnet (chain ID 71).
    #[serde(rename = "conflux-espace-testnet")]
    ConfluxEspaceTestnet,
}

impl Display for Network {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::ConfluxEspace => write!(f, "conflux-espace"),
            Network::ConfluxEspaceTestnet => write!(f, "conflux-espace-testnet"),
        }
    }
}

impl Network {
    /// The numeric chain ID of the network.
    pub fn chain_id(&self) -> u64 {
        match self {
            Network::ConfluxEspace => 1030,
            Network::ConfluxEspaceTestnet => 71,
        }
    }

    /// The CAIP-2 tag used on the wire for this network.
    pub fn tag(&self) -> NetworkTag {
        NetworkTag {
            reference: self.chain_id(),
        }
    }

    /// The public JSON-RPC endpoint used when `X402_RPC_URL` is unset.
    pub fn default_rpc_url(&self) -> &'static str {
        match self {
            Network::ConfluxEspace => "https://evm.confluxrpc.com",
            Network::ConfluxEspaceTestnet => "https://evmtestnet.confluxrpc.com",
        }
    }

    /// All known [`Network`] variants.
    pub fn variants() -> &'static [Network] {
        &[Network::ConfluxEspace, Network::ConfluxEspaceTestnet]
    }

    /// Resolves a wire tag back to a known network, if any.
    pub fn by_tag(tag: &NetworkTag) -> Option<Network> {
        Network::variants()
            .iter()
            .copied()
            .find(|network| network.chain_id() == tag.chain_id())
    }
}

/// EIP-712 domain separator metadata for a token deployment.
///
/// Both fields must match what the token contract hashed into its domain
/// separator; a mismatch makes every signature recover to a wrong address.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct AssetEip712 {
    pub name: String,
    pub version: String,
}

/// A deployed token the facilitator accepts payment in.
///
/// Loaded once at boot from the static deployment table below; immutable
/// afterwards. Assets missing from the table are refused during verification
/// rather than probed on-chain.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AssetDescriptor {
    pub address: EvmAddress,
    pub symbol: String,
    pub decimals: u8,
    pub eip712: AssetEip712,
    /// Whether the deployment implements ERC-3009 `transferWithAuthorization`.
    pub eip3009: bool,
}

static USDT0_CONFLUX: Lazy<AssetDescriptor> = Lazy::new(|| AssetDescriptor {
    address: address!("0xaf3744a2d92f7b1f07c938f9d9cb7a7e2fb647ff").into(),
    symbol: "USDT0".into(),
    decimals: 6,
    eip712: AssetEip712 {
        name: "USDT0".into(),
        version: "1".into(),
    },
    eip3009: true,
});

static USDT0_CONFLUX_TESTNET: Lazy<AssetDescriptor> = Lazy::new(|| AssetDescriptor {
    address: address!("0x7d682e65efc5c13bf4e394b8f376c48e6bae0355").into(),
    symbol: "USDT0".into(),
    decimals: 6,
    eip712: AssetEip712 {
        name: "USDT0".into(),
        version: "1".into(),
    },
    eip3009: true,
});

/// The read-only map of token deployments supported on one network.
///
/// Keyed by contract address; address comparison is byte-wise, so lookups are
/// case-insensitive with respect to the hex spelling a client sent.
#[derive(Clone, Debug, Default)]
pub struct SupportedAssets {
    assets: HashMap<EvmAddress, AssetDescriptor>,
}

impl SupportedAssets {
    /// Builds the asset table for the given network from the known
    /// deployments.
    pub fn for_network(network: Network) -> Self {
        let deployments: &[&Lazy<AssetDescriptor>] = match network {
            Network::ConfluxEspace => &[&USDT0_CONFLUX],
            Network::ConfluxEspaceTestnet => &[&USDT0_CONFLUX_TESTNET],
        };
        let mut assets = HashMap::new();
        for deployment in deployments {
            let descriptor: &AssetDescriptor = deployment;
            assets.insert(descriptor.address, descriptor.clone());
        }
        SupportedAssets { assets }
    }

    /// Looks up a deployment by contract address.
    pub fn get(&self, address: &EvmAddress) -> Option<&AssetDescriptor> {
        self.assets.get(address)
    }

    /// Iterates over all supported deployments.
    pub fn iter(&self) -> impl Iterator<Item = &AssetDescriptor> {
        self.assets.values()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn network_tag_round_trip() {
        let tag = NetworkTag::from_str("eip155:1030").unwrap();
        assert_eq!(tag.chain_id(), 1030);
        assert_eq!(tag.to_string(), "eip155:1030");
        assert_eq!(Network::ConfluxEspace.tag(), tag);
    }

    #[test]
    fn foreign_tags_parse_but_do_not_resolve() {
        let mainnet = NetworkTag::from_str("eip155:1").unwrap();
        assert_eq!(Network::by_tag(&mainnet), None);
    }

    #[test]
    fn malformed_tags_are_rejected() {
        assert!(NetworkTag::from_str("base-sepolia").is_err());
        assert!(NetworkTag::from_str("eip155:").is_err());
        assert!(NetworkTag::from_str("eip155:0x406").is_err());
        assert!(NetworkTag::from_str("solana:mainnet").is_err());
    }

    #[test]
    fn asset_lookup_is_case_insensitive() {
        let assets = SupportedAssets::for_network(Network::ConfluxEspace);
        let upper: EvmAddress = "0xAF3744A2D92F7B1F07C938F9D9CB7A7E2FB647FF"
            .parse()
            .unwrap();
        let descriptor = assets.get(&upper).expect("known deployment");
        assert_eq!(descriptor.symbol, "USDT0");
        assert!(descriptor.eip3009);
    }

    #[test]
    fn testnet_table_is_distinct() {
        let mainnet = SupportedAssets::for_network(Network::ConfluxEspace);
        let testnet = SupportedAssets::for_network(Network::ConfluxEspaceTestnet);
        for descriptor in testnet.iter() {
            assert!(mainnet.get(&descriptor.address).is_none());
        }
    }
}
