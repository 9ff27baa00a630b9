//! Tracing setup
//!
//! `RUST_LOG` wins over the configured level when it is set.

use std::io;
use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::GroveConfig;
use crate::error::{GroveError, GroveResult};

/// Install a global fmt subscriber filtered at `level` (or `RUST_LOG`).
///
/// Returns `false` when a global subscriber was already installed, in which
/// case nothing changes.
pub fn init_tracing(level: &str, json: bool) -> GroveResult<bool> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| GroveError::Configuration(format!("invalid log filter '{}': {}", level, e)))?;

    let installed = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr).json())
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr))
            .try_init()
            .is_ok()
    };

    if installed {
        tracing::debug!(target: "grove::telemetry", level, json, "Tracing initialized");
    }
    Ok(installed)
}

/// [`init_tracing`] with the level and format from `config`
pub fn init_from_config(config: &GroveConfig) -> GroveResult<bool> {
    init_tracing(&config.log_level, config.log_json)
}
