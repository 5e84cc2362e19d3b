//! Configuration loader
//!
//! ## Loading Strategy
//! 1. `FIELDSYNC_API_BASE_URL` set: build the config from environment
//!    variables, defaults filling everything else
//! 2. Otherwise probe for a config file (JSON or TOML by extension)
//!
//! ## Environment Variables
//! - `FIELDSYNC_API_BASE_URL`: remote API root (required for env loading)
//! - `FIELDSYNC_AUTO_SYNC_INTERVAL_MS`, `FIELDSYNC_BATCH_SIZE`,
//!   `FIELDSYNC_MAX_CONCURRENCY`, `FIELDSYNC_REQUEST_TIMEOUT_MS`,
//!   `FIELDSYNC_INLINE_RETRIES`, `FIELDSYNC_MAX_RETRIES`
//! - `FIELDSYNC_BACKGROUND_SYNC`: whether auto-sync starts (true/false)
//! - `FIELDSYNC_CONNECTIVITY_URL`: health URL for the connectivity probe
//! - `FIELDSYNC_MAX_QUEUE_SIZE`, `FIELDSYNC_RETENTION_DAYS`
//! - `FIELDSYNC_DB_PATH`, `FIELDSYNC_DB_POOL_SIZE`
//! - `FIELDSYNC_LOG_LEVEL`, `FIELDSYNC_LOG_JSON`
//!
//! ## File Locations
//! `fieldsync.{json,toml}` then `config.{json,toml}`, first in the working
//! directory and its parent, then next to the executable.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use fieldsync_domain::{Config, FieldSyncError, Result};

const FILE_STEMS: [&str; 2] = ["fieldsync", "config"];
const EXTENSIONS: [&str; 2] = ["json", "toml"];

/// Load configuration from the environment, falling back to a config file.
///
/// # Errors
/// Returns `FieldSyncError::Config` if neither source yields a config or a
/// value fails to parse.
pub fn load() -> Result<Config> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Build a config from `FIELDSYNC_*` variables.
///
/// # Errors
/// `Config` when `FIELDSYNC_API_BASE_URL` is missing or any set variable
/// has an invalid value.
pub fn load_from_env() -> Result<Config> {
    let mut config = Config::with_api_base_url(env_var("FIELDSYNC_API_BASE_URL")?);

    let sync = &mut config.sync;
    override_parsed("FIELDSYNC_AUTO_SYNC_INTERVAL_MS", &mut sync.auto_sync_interval_ms)?;
    override_parsed("FIELDSYNC_BATCH_SIZE", &mut sync.batch_size)?;
    override_parsed("FIELDSYNC_MAX_CONCURRENCY", &mut sync.max_concurrency)?;
    override_parsed("FIELDSYNC_REQUEST_TIMEOUT_MS", &mut sync.request_timeout_ms)?;
    override_parsed("FIELDSYNC_INLINE_RETRIES", &mut sync.inline_retries)?;
    override_parsed("FIELDSYNC_MAX_RETRIES", &mut sync.retry.max_retries)?;
    sync.enable_background_sync = env_bool("FIELDSYNC_BACKGROUND_SYNC", sync.enable_background_sync);
    if let Ok(url) = std::env::var("FIELDSYNC_CONNECTIVITY_URL") {
        sync.connectivity_url = Some(url);
    }

    override_parsed("FIELDSYNC_MAX_QUEUE_SIZE", &mut config.queue.max_queue_size)?;
    override_parsed("FIELDSYNC_RETENTION_DAYS", &mut config.queue.retention_days)?;

    if let Ok(path) = std::env::var("FIELDSYNC_DB_PATH") {
        config.database.path = path;
    }
    override_parsed("FIELDSYNC_DB_POOL_SIZE", &mut config.database.pool_size)?;

    if let Ok(level) = std::env::var("FIELDSYNC_LOG_LEVEL") {
        config.logging.level = level;
    }
    config.logging.json = env_bool("FIELDSYNC_LOG_JSON", config.logging.json);

    Ok(config)
}

/// Load configuration from a file.
///
/// If `path` is `None`, probes the standard locations.
///
/// # Errors
/// Returns `FieldSyncError::Config` if the file is missing, unreadable or
/// malformed.
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(FieldSyncError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            FieldSyncError::Config("No config file found in any of the standard locations".into())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| FieldSyncError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

/// Format is chosen by extension; anything but `.toml` is read as JSON.
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| FieldSyncError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| FieldSyncError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(FieldSyncError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// First existing config file among the standard locations.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut roots = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        roots.push(cwd.clone());
        roots.push(cwd.join(".."));
    }
    if let Some(exe_dir) = std::env::current_exe().ok().and_then(|p| p.parent().map(Path::to_path_buf)) {
        roots.push(exe_dir);
    }

    roots
        .iter()
        .flat_map(|root| {
            FILE_STEMS.iter().flat_map(move |stem| {
                EXTENSIONS.iter().map(move |ext| root.join(format!("{stem}.{ext}")))
            })
        })
        .find(|path| path.exists())
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key)
        .map_err(|_| FieldSyncError::Config(format!("Missing required environment variable: {key}")))
}

/// Replace `target` with the parsed variable when it is set.
fn override_parsed<T>(key: &str, target: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Ok(raw) = std::env::var(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|e| FieldSyncError::Config(format!("Invalid value for {key}: {e}")))?;
    }
    Ok(())
}

/// Accepts `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive).
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
