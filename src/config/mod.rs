//! Configuration file loading and parsing.
//!
//! This module handles loading the configuration file from disk, parsing
//! it into validated, type-safe structures, and overlaying secrets from the
//! environment.
//!
//! # Configuration File Locations
//!
//! The configuration file is searched in the following order:
//!
//! 1. Path specified via `--config` CLI flag
//! 2. Default location:
//!    - **Linux/macOS:** `~/.ads-mcp-gateway/config.json`
//!    - **Windows:** `%USERPROFILE%\.ads-mcp-gateway\config.json`
//!
//! If neither exists, built-in defaults are used. Only an explicitly named
//! file that is missing is an error.
//!
//! # Environment Overrides
//!
//! Non-empty values of these variables replace the file's settings:
//! `MCP_SHARED_SECRET`, `ADS_API_BASE_URL`, `ADS_DEVELOPER_TOKEN`,
//! `ADS_ACCESS_TOKEN`, `ADS_LOGIN_CUSTOMER_ID`, and `PORT`.

mod settings;

pub use settings::{
    AuthConfig, Config, LoggingConfig, ProtocolConfig, ResolverConfig, RetryConfig, ServerConfig,
    UpstreamConfig,
};

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Returns the default configuration directory.
///
/// - **Linux/macOS:** `~/.ads-mcp-gateway/`
/// - **Windows:** `%USERPROFILE%\.ads-mcp-gateway\`
#[must_use]
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".ads-mcp-gateway"))
}

/// Returns the platform-specific default configuration file path.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join("config.json"))
}

/// Loads and parses the configuration file, then applies environment overrides.
///
/// If `path` is `None`, uses the platform-specific default location, falling
/// back to built-in defaults when that file does not exist.
///
/// # Errors
///
/// Returns an error if:
/// - An explicitly given configuration file cannot be found
/// - The file cannot be read
/// - The JSON is malformed
/// - Required fields are missing or invalid
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => read_config_file(p)?,
        None => match default_config_path() {
            Some(p) if p.exists() => read_config_file(&p)?,
            _ => Config::default(),
        },
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    // Validate the configuration
    config.validate()?;

    Ok(config)
}

fn read_config_file(config_path: &Path) -> Result<Config, ConfigError> {
    if !config_path.exists() {
        return Err(ConfigError::NotFound {
            path: config_path.to_path_buf(),
        });
    }

    let contents = std::fs::read_to_string(config_path).map_err(|e| ConfigError::Read {
        path: config_path.to_path_buf(),
        source: e,
    })?;

    serde_json::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: config_path.to_path_buf(),
        source: e,
    })
}

/// Overlays environment values onto `config`.
///
/// `lookup` is injected so tests do not have to mutate the process environment.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(secret) = non_empty("MCP_SHARED_SECRET") {
        config.auth.shared_secret = Some(secret);
    }
    if let Some(url) = non_empty("ADS_API_BASE_URL") {
        config.upstream.base_url = Some(url);
    }
    if let Some(token) = non_empty("ADS_DEVELOPER_TOKEN") {
        config.upstream.developer_token = Some(token);
    }
    if let Some(token) = non_empty("ADS_ACCESS_TOKEN") {
        config.upstream.access_token = Some(token);
    }
    if let Some(login) = non_empty("ADS_LOGIN_CUSTOMER_ID") {
        config.upstream.login_customer_id = Some(login);
    }
    if let Some(port) = non_empty("PORT") {
        let host = config
            .server
            .bind_address
            .rsplit_once(':')
            .map_or("0.0.0.0", |(host, _)| host)
            .to_string();
        config.server.bind_address = format!("{host}:{}", port.trim());
    }
}
