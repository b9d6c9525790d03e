//! Error types for ads-mcp-gateway.
//!
//! Each failure surface has its own type:
//!
//! - [`ConfigError`]: startup only; the process exits with the message
//! - [`NegotiationError`]: an `initialize` the server cannot honour
//! - [`Unresolved`]: an account argument that names no known account
//! - [`ToolError`] and [`UpstreamError`]: a tool call that failed after dispatch
//!
//! The last three reach the client as JSON-RPC error objects; the mapping
//! lives in the dispatcher.
//!
//! # Security Note
//!
//! Messages never carry credentials. A rejected setting is named by its
//! dotted path and the reason, not by its value, unless the value is an
//! identifier such as a protocol version or an alias target.

use std::path::PathBuf;

use thiserror::Error;

pub use crate::mcp::negotiation::NegotiationError;
pub use crate::upstream::{ToolError, UpstreamError};

/// Errors raised while loading the gateway configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read configuration file {path}")]
    Read {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid JSON or has unknown keys.
    #[error("failed to parse configuration file {path}: {source}")]
    Parse {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error, with line and column.
        #[source]
        source: serde_json::Error,
    },

    /// An explicitly given file does not exist.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// A setting parsed but holds an unusable value.
    #[error("invalid setting {setting}: {reason}")]
    InvalidSetting {
        /// Dotted path of the setting, e.g. `retry.max_attempts`.
        setting: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl ConfigError {
    /// Shorthand for [`ConfigError::InvalidSetting`].
    #[must_use]
    pub fn invalid(setting: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            setting,
            reason: reason.into(),
        }
    }

    /// The dotted path of the rejected setting, if this is a validation error.
    #[must_use]
    pub const fn setting(&self) -> Option<&'static str> {
        match self {
            Self::InvalidSetting { setting, .. } => Some(*setting),
            _ => None,
        }
    }
}

/// An identifier argument that could not be resolved to an account id.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Could not resolve {argument} '{value}' to an account id")]
pub struct Unresolved {
    /// Argument name, e.g. `customer_id`.
    pub argument: String,
    /// What the caller sent.
    pub value: String,
}
