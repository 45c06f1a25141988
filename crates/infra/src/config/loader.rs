//! Configuration loader
//!
//! Loads application configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If incomplete, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `TANDEM_DB_PATH`: Database file path
//! - `TANDEM_DB_POOL_SIZE`: Connection pool size
//! - `TANDEM_SYNC_INTERVAL`: External sync interval in seconds
//! - `TANDEM_SYNC_ENABLED`: Whether external sync is enabled (true/false)
//! - `TANDEM_FEED_DEBOUNCE_MS`: Change-feed debounce window in milliseconds
//! - `TANDEM_SUPPRESSION_WINDOW_MS`: Optimistic suppression window in
//!   milliseconds
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./config.json` or `./config.toml` (current working directory)
//! 2. `./tandem.json` or `./tandem.toml` (current working directory)
//! 3. `../config.json` or `../config.toml` (parent directory)
//! 4. Relative to executable location

use std::path::{Path, PathBuf};

use tandem_domain::{Config, DatabaseConfig, FeedConfig, Result, SyncConfig, TandemError};

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If any required
/// variables are missing, falls back to loading from a config file.
///
/// # Errors
/// Returns `TandemError::Config` if:
/// - Configuration cannot be loaded from either source
/// - File format is invalid
/// - Required fields are missing
pub fn load() -> Result<Config> {
    // Try loading from environment first
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            // Fall back to file
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// The database path and pool size are required; the sync and feed sections
/// fall back to their defaults when unset.
///
/// # Errors
/// Returns `TandemError::Config` if required variables are missing or have
/// invalid values.
pub fn load_from_env() -> Result<Config> {
    let db_path = env_var("TANDEM_DB_PATH")?;
    let db_pool_size = env_var("TANDEM_DB_POOL_SIZE").and_then(|s| {
        s.parse::<u32>().map_err(|e| TandemError::Config(format!("Invalid pool size: {e}")))
    })?;

    let defaults = Config::default();

    let sync_interval = env_parsed("TANDEM_SYNC_INTERVAL", defaults.sync.interval_seconds)?;
    let sync_enabled = env_bool("TANDEM_SYNC_ENABLED", defaults.sync.enabled);
    let debounce_ms = env_parsed("TANDEM_FEED_DEBOUNCE_MS", defaults.feed.debounce_ms)?;
    let suppression_window_ms =
        env_parsed("TANDEM_SUPPRESSION_WINDOW_MS", defaults.feed.suppression_window_ms)?;

    Ok(Config {
        database: DatabaseConfig { path: db_path, pool_size: db_pool_size },
        sync: SyncConfig { interval_seconds: sync_interval, enabled: sync_enabled },
        feed: FeedConfig { debounce_ms, suppression_window_ms },
    })
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `TandemError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(TandemError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            TandemError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| TandemError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration from string content, dispatching on extension.
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

    match extension {
        "json" => serde_json::from_str(contents)
            .map_err(|e| TandemError::Config(format!("Invalid JSON config: {e}"))),
        "toml" => toml::from_str(contents)
            .map_err(|e| TandemError::Config(format!("Invalid TOML config: {e}"))),
        other => Err(TandemError::Config(format!(
            "Unsupported config format '{other}' (expected json or toml)"
        ))),
    }
}

/// Probe standard locations for a config file
fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();

    for stem in ["config", "tandem"] {
        for ext in ["json", "toml"] {
            candidates.push(PathBuf::from(format!("{stem}.{ext}")));
        }
    }
    for ext in ["json", "toml"] {
        candidates.push(PathBuf::from(format!("../config.{ext}")));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            for ext in ["json", "toml"] {
                candidates.push(dir.join(format!("config.{ext}")));
            }
        }
    }

    candidates.into_iter().find(|p| p.exists())
}

fn env_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| TandemError::Config(format!("Missing environment variable: {name}")))
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .map_err(|e| TandemError::Config(format!("Invalid value for {name}: {e}"))),
        Err(_) => Ok(default),
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
