//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::mcp::negotiation::is_well_formed_version;
use crate::resolver::canonical_digits;

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Protocol version settings.
    #[serde(default)]
    pub protocol: ProtocolConfig,

    /// Shared-secret authorisation settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Identifier resolution settings.
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Upstream retry settings.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Upstream reporting API settings.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol.supported_versions.is_empty() {
            return Err(ConfigError::invalid(
                "protocol.supported_versions",
                "must not be empty",
            ));
        }
        if let Some(bad) = self
            .protocol
            .supported_versions
            .iter()
            .find(|v| !is_well_formed_version(v))
        {
            return Err(ConfigError::invalid(
                "protocol.supported_versions",
                format!("'{bad}' is not a YYYY-MM-DD date"),
            ));
        }

        let threshold = self.resolver.similarity_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::invalid(
                "resolver.similarity_threshold",
                format!("must be in (0, 1], got {threshold}"),
            ));
        }
        for (alias, id) in &self.resolver.aliases {
            if canonical_digits(id).is_none() {
                return Err(ConfigError::invalid(
                    "resolver.aliases",
                    format!("'{alias}' maps to '{id}', which is not an 8-20 digit account id"),
                ));
            }
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::invalid("retry.max_attempts", "must be at least 1"));
        }

        if self.auth.secret_header.trim().is_empty() {
            return Err(ConfigError::invalid("auth.secret_header", "must not be empty"));
        }
        Ok(())
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Socket address to bind, e.g. `0.0.0.0:8080`.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

/// Protocol version configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProtocolConfig {
    /// Supported MCP protocol versions (`YYYY-MM-DD`). Order does not matter;
    /// the negotiator sorts them.
    #[serde(default = "default_supported_versions")]
    pub supported_versions: Vec<String>,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            supported_versions: default_supported_versions(),
        }
    }
}

fn default_supported_versions() -> Vec<String> {
    vec!["2024-11-05".to_string()]
}

/// Shared-secret authorisation configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Shared secret. When unset, every request is authorised.
    #[serde(default)]
    pub shared_secret: Option<String>,

    /// Secondary header that may carry the secret instead of `Authorization`.
    #[serde(default = "default_secret_header")]
    pub secret_header: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            shared_secret: None,
            secret_header: default_secret_header(),
        }
    }
}

fn default_secret_header() -> String {
    "x-mcp-secret".to_string()
}

/// Identifier resolution configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolverConfig {
    /// Operator-curated account name to id table.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,

    /// Minimum similarity ratio for a fuzzy match.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            aliases: BTreeMap::new(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

const fn default_similarity_threshold() -> f64 {
    0.8
}

/// Upstream retry configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts per upstream call, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Ceiling for the exponential part of the backoff, in seconds.
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            max_backoff_secs: default_max_backoff_secs(),
        }
    }
}

const fn default_max_attempts() -> u32 {
    5
}

const fn default_max_backoff_secs() -> u64 {
    20
}

/// Upstream reporting API configuration.
///
/// Credentials are only checked when the HTTP backend is constructed, so a
/// gateway without credentials still serves the local tools.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamConfig {
    /// Base URL of the reporting API.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Developer token sent with every request.
    #[serde(default)]
    pub developer_token: Option<String>,

    /// Bearer access token.
    #[serde(default)]
    pub access_token: Option<String>,

    /// Default manager account used as login header and resolver root.
    #[serde(default)]
    pub login_customer_id: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            developer_token: None,
            access_token: None,
            login_customer_id: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

const fn default_timeout_secs() -> u64 {
    60
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let json = r"{}";
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.protocol.supported_versions, vec!["2024-11-05"]);
        assert!(config.auth.shared_secret.is_none());
    }

    #[test]
    fn parse_full_config() {
        let json = r#"{
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "_comment": "Test config",
            "server": { "bind_address": "127.0.0.1:9000" },
            "protocol": { "supported_versions": ["2024-11-05", "2025-03-26"] },
            "auth": { "shared_secret": "s3cret", "secret_header": "x-api-key" },
            "resolver": {
                "aliases": { "Acme Shoes": "123-456-7890" },
                "similarity_threshold": 0.85
            },
            "retry": { "max_attempts": 3, "max_backoff_secs": 10 },
            "upstream": {
                "base_url": "https://reporting.example.com/v1",
                "developer_token": "dev",
                "access_token": "tok",
                "login_customer_id": "111-222-3333",
                "timeout_secs": 30
            },
            "logging": { "level": "debug" }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.bind_address, "127.0.0.1:9000");
        assert_eq!(config.auth.shared_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.auth.secret_header, "x-api-key");
        assert_eq!(config.resolver.aliases.len(), 1);
        assert!((config.resolver.similarity_threshold - 0.85).abs() < f64::EPSILON);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.upstream.timeout_secs, 30);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn retry_config_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.max_backoff_secs, 20);
    }

    #[test]
    fn logging_config_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "warn");
    }

    #[test]
    fn reject_malformed_protocol_version() {
        let json = r#"{ "protocol": { "supported_versions": ["2024-11"] } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        let err = config.validate().unwrap_err();
        assert_eq!(err.setting(), Some("protocol.supported_versions"));
    }

    #[test]
    fn reject_empty_protocol_versions() {
        let json = r#"{ "protocol": { "supported_versions": [] } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        let err = config.validate().unwrap_err();
        assert_eq!(err.setting(), Some("protocol.supported_versions"));
    }

    #[test]
    fn reject_out_of_range_threshold() {
        let json = r#"{ "resolver": { "similarity_threshold": 1.5 } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        let err = config.validate().unwrap_err();
        assert_eq!(err.setting(), Some("resolver.similarity_threshold"));
    }

    #[test]
    fn reject_non_canonical_alias_target() {
        let json = r#"{ "resolver": { "aliases": { "acme": "not-an-id" } } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        let err = config.validate().unwrap_err();
        assert_eq!(err.setting(), Some("resolver.aliases"));
    }

    #[test]
    fn reject_zero_attempts() {
        let json = r#"{ "retry": { "max_attempts": 0 } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        let err = config.validate().unwrap_err();
        assert_eq!(err.setting(), Some("retry.max_attempts"));
    }

    #[test]
    fn reject_unknown_fields() {
        let json = r#"{
            "unknown_field": "value"
        }"#;

        let result: Result<Config, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
