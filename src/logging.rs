//! Tracing subscriber setup for binaries and demos
//!
//! The library itself only emits `tracing` events; installing a subscriber
//! is left to the process entry point.

use crate::{Error, Result};
use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info";

/// Install a global fmt subscriber honouring `RUST_LOG`.
///
/// # Errors
///
/// Returns error if the filter is malformed or a global subscriber is
/// already installed
pub fn init_tracing() -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(DEFAULT_FILTER)
            .map_err(|e| Error::InvalidInput(format!("Invalid log filter: {e}")))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| Error::Other(format!("Failed to install tracing subscriber: {e}")))
}
