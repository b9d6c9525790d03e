//! The reporting-API collaborator.
//!
//! The gateway does not know what a reporting tool computes. It hands the
//! tool name and resolved arguments to a [`ToolBackend`] and gets back either
//! a JSON value or a [`ToolError`].
//!
//! - [`status`]: upstream status classification and failure payloads
//! - [`retry`]: the retry policy wrapped around every upstream call
//! - [`http`]: the reqwest-backed collaborator used in production
//! - [`local`]: the in-process diagnostic tools

pub mod http;
pub mod local;
pub mod retry;
pub mod status;

pub use http::HttpToolBackend;
pub use retry::RetryPolicy;
pub use status::{Classification, ErrorDetail, UpstreamError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Errors raised by a tool invocation.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    /// The caller supplied bad arguments. Never retried.
    #[error("{0}")]
    InvalidArguments(String),

    /// The upstream system reported a failure.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// The collaborator cannot be built from the current configuration.
    #[error("Upstream is not configured: missing {}", .missing.join(", "))]
    Configuration {
        /// Names of the missing settings.
        missing: Vec<String>,
    },

    /// The request never produced an upstream status (decode failure, I/O).
    #[error("{0}")]
    Transport(String),
}

impl ToolError {
    /// The best-effort detail reported to the client.
    #[must_use]
    pub fn detail(&self) -> ErrorDetail {
        match self {
            Self::Upstream(err) => ErrorDetail::Structured(err.to_detail()),
            Self::Configuration { missing } => ErrorDetail::Structured(json!({
                "status": "FAILED_PRECONDITION",
                "errors": [{ "message": self.to_string() }],
                "missing": missing,
            })),
            Self::InvalidArguments(text) | Self::Transport(text) => ErrorDetail::from_text(text),
        }
    }
}

/// One account in the upstream hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountNode {
    /// Canonical account id.
    pub id: String,
    /// Human-readable account name.
    pub name: String,
}

/// The external system that executes reporting tools.
#[async_trait]
pub trait ToolBackend: Send + Sync {
    /// Runs the named reporting tool.
    async fn call_tool(&self, name: &str, arguments: &Map<String, Value>)
        -> Result<Value, ToolError>;

    /// Lists the accounts reachable from `root_id`.
    async fn account_hierarchy(&self, root_id: &str) -> Result<Vec<AccountNode>, ToolError>;
}

/// Stands in for a backend whose construction failed.
///
/// Every call reports the construction error, so local tools keep working
/// while reporting tools fail loudly.
#[derive(Debug, Clone)]
pub struct UnavailableBackend {
    error: ToolError,
}

impl UnavailableBackend {
    /// Wraps the construction error.
    #[must_use]
    pub const fn new(error: ToolError) -> Self {
        Self { error }
    }
}

#[async_trait]
impl ToolBackend for UnavailableBackend {
    async fn call_tool(
        &self,
        _name: &str,
        _arguments: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        Err(self.error.clone())
    }

    async fn account_hierarchy(&self, _root_id: &str) -> Result<Vec<AccountNode>, ToolError> {
        Err(self.error.clone())
    }
}
