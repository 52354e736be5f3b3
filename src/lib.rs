//! Seller-side implementation of the x402 v2 payment protocol for EVM
//! chains.
//!
//! The x402 protocol negotiates a payment inline with an HTTP request: the
//! seller answers `402 Payment Required` with machine-readable payment
//! requirements, the buyer signs a gasless EIP-3009 transfer authorization,
//! and a facilitator verifies the signature off-chain and relays the
//! settlement on-chain before the resource is served.
//!
//! # Roles
//!
//! - **Facilitator**: verifies and settles payments. See [`facilitator`] for
//!   the trait and [`facilitator_local`] for the reference implementation;
//!   [`handlers`] exposes it over loopback HTTP.
//! - **Seller**: protects resources with the payment gate in the
//!   `x402-arena-axum` crate, which talks to the facilitator through the
//!   same [`facilitator::Facilitator`] trait.
//! - **Buyer**: signs authorizations with [`client::PayerClient`] (also
//!   behind the `x402-pay` binary and the facilitator's demo endpoint).
//!
//! # Modules
//!
//! - [`chain`] - EVM JSON-RPC client with the relayer wallet
//! - [`client`] - reference buyer client
//! - [`config`] - environment configuration
//! - [`eip712`] - typed-data digests and signer recovery
//! - [`facilitator`] - the verify/settle trait
//! - [`facilitator_local`] - local verification and settlement
//! - [`handlers`] - the facilitator HTTP surface
//! - [`network`] - networks, CAIP-2 tags, known asset deployments
//! - [`timestamp`] - authorization validity windows
//! - [`types`] - wire types
//! - [`util`] - base64 header plumbing

pub mod chain;
pub mod client;
pub mod config;
pub mod eip712;
pub mod facilitator;
pub mod facilitator_local;
pub mod handlers;
pub mod network;
pub mod telemetry;
pub mod timestamp;
pub mod types;
pub mod util;
