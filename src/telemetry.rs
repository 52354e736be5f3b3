//! Logging bootstrap.
//!
//! Installs a `tracing` subscriber with an env-filterable fmt layer.
//! Controlled with `RUST_LOG` (e.g. `RUST_LOG=x402_arena=debug`); defaults
//! to `info`.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Initializes the global tracing subscriber.
///
/// Call once at binary start, before the first log line. A second call
/// panics, which is fine for binaries and wrong for tests; tests should not
/// call this.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}
