//! Utility types shared across the crate.
//!
//! - [`b64`] - Base64 encoding/decoding for x402 header payloads

pub mod b64;

pub use b64::*;
