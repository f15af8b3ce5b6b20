//! Tracing setup for Strata.
//!
//! The library crates only emit `tracing` events; whoever owns `main` (or a
//! test) decides where they go. This crate holds that one decision.
//!
//! # Filtering
//!
//! `STRATA_LOG` takes priority, then `RUST_LOG`, then the default (`info`):
//!
//! ```bash
//! STRATA_LOG=strata_kernel=debug cargo test -p strata-kernel
//! ```

use std::sync::Once;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable consulted before `RUST_LOG`.
pub const LOG_ENV: &str = "STRATA_LOG";

/// Filter used when neither environment variable is set.
pub const DEFAULT_FILTER: &str = "info";

/// Errors from subscriber installation.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// A global subscriber was already installed.
    #[error("failed to install tracing subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Build the env-driven filter, falling back to `default`.
pub fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default))
}

/// Install the global subscriber for a process: env filter + stderr fmt layer.
pub fn init_tracing(service: &str) -> Result<(), TelemetryError> {
    tracing_subscriber::registry()
        .with(env_filter(DEFAULT_FILTER))
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()?;

    tracing::debug!(service, "tracing initialized");
    Ok(())
}

/// Install a test-friendly subscriber once per process.
///
/// Output goes through the libtest capture writer, so it only shows for
/// failing tests. Safe to call from every test.
pub fn init_test_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(env_filter("warn"))
            .with(fmt::layer().with_test_writer())
            .try_init();
    });
}
