//! One-shot paid request against an x402-protected URL.
//!
//! ```text
//! DEMO_BUYER_KEY=0x... x402-pay https://api.example/resource?q=hi
//! ```
//!
//! Prints the final status, the response body, and the decoded settlement
//! receipt when the seller attached one.

use dotenvy::dotenv;
use std::process::ExitCode;
use std::str::FromStr;

use alloy::signers::local::PrivateKeySigner;
use x402_arena::client::PayerClient;
use x402_arena::network::{Network, NetworkTag};

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    x402_arena::telemetry::init();

    let Some(url) = std::env::args().nth(1) else {
        eprintln!("usage: x402-pay <url>");
        return ExitCode::from(2);
    };

    let Ok(raw_key) = std::env::var("DEMO_BUYER_KEY") else {
        eprintln!("env DEMO_BUYER_KEY is not set");
        return ExitCode::from(2);
    };
    let signer = match PrivateKeySigner::from_str(&raw_key) {
        Ok(signer) => signer,
        Err(error) => {
            eprintln!("invalid DEMO_BUYER_KEY: {error}");
            return ExitCode::from(2);
        }
    };

    let network = match std::env::var("X402_NETWORK") {
        Ok(raw) => {
            let parsed = NetworkTag::from_str(&raw)
                .ok()
                .and_then(|tag| Network::by_tag(&tag));
            match parsed {
                Some(network) => network,
                None => {
                    eprintln!("unsupported X402_NETWORK: {raw}");
                    return ExitCode::from(2);
                }
            }
        }
        Err(_) => Network::ConfluxEspace,
    };

    let payer = match PayerClient::new(signer, network) {
        Ok(payer) => payer,
        Err(error) => {
            eprintln!("failed to build client: {error}");
            return ExitCode::FAILURE;
        }
    };

    match payer.get(&url).await {
        Ok(paid) => {
            println!("status: {}", paid.status);
            println!("{}", paid.body);
            if let Some(settlement) = paid.settlement {
                println!(
                    "settled: tx={} payer={}",
                    settlement.transaction, settlement.payer
                );
            }
            if paid.status.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(error) => {
            eprintln!("request failed: {error}");
            ExitCode::FAILURE
        }
    }
}
