//! Tracing subscriber setup for hosting applications
//!
//! The library only emits `tracing` events; installing a subscriber is the
//! host's call. This helper covers the common case.

use crate::config::TelemetryConfig;
use crate::error::{CoreError, Result};
use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber filtered by `config.filter`
///
/// `RUST_LOG`, when set, takes precedence over the configured filter.
/// Fails if a global subscriber is already installed.
pub fn init_tracing(config: &TelemetryConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| CoreError::Config(format!("Invalid log filter '{}': {}", config.filter, e)))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| CoreError::Config(format!("Failed to install tracing subscriber: {}", e)))
}
