//! Telemetry
//!
//! Structured logging via `tracing`. Applications embedding the client
//! usually install their own subscriber; this initializer is for
//! binaries and examples that want sane defaults.

use tracing_subscriber::EnvFilter;

/// Install a formatting subscriber filtered by `RUST_LOG`, defaulting
/// to `info`. Does nothing if a global subscriber is already set.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
