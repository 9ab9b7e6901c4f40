//! Tracing subscriber setup for hosts embedding the cache

use crate::config::LoggingConfig;
use crate::error::{CacheError, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a global fmt subscriber.
///
/// `RUST_LOG` takes precedence over the configured filter. Returns `Ok(false)`
/// when a global subscriber was already installed.
pub fn try_init(config: &LoggingConfig) -> Result<bool> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter)
            .map_err(|e| CacheError::Config(format!("invalid log filter: {}", e)))?,
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok();

    Ok(installed)
}
