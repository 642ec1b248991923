//! Tracing subscriber setup

use crate::config::BindConfig;
use anyhow::Result;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

/// Build the filter: `RUST_LOG` first, then `log_filter` from config
pub fn env_filter(config: &BindConfig) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let directives = config.log_filter.as_deref().unwrap_or(DEFAULT_FILTER);
    EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a global fmt subscriber
///
/// Fails if a global subscriber is already set.
pub fn init_tracing(config: &BindConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))
}
