//! Global `tracing` subscriber initialisation.
//!
//! `RUST_LOG` wins when set; otherwise `logging.level` from configuration is
//! used as the filter directive.

use fieldsync_domain::{FieldSyncError, LoggingConfig, Result};
use tracing_subscriber::EnvFilter;

/// Filter from `RUST_LOG`, falling back to `config.level`.
///
/// # Errors
/// `Config` when the fallback level is not a valid filter directive.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            FieldSyncError::Config(format!("invalid logging.level {:?}: {e}", config.level))
        }),
    }
}

/// Install the global subscriber: JSON lines when `config.json`, otherwise
/// the human-readable formatter.
///
/// # Errors
/// `Config` for an invalid level; `Internal` when a global subscriber is
/// already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(config)?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let installed = if config.json {
        builder.json().with_current_span(true).try_init()
    } else {
        builder.compact().try_init()
    };

    installed.map_err(|e| FieldSyncError::Internal(format!("tracing already initialised: {e}")))
}
