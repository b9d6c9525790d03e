//! Protocol version negotiation.
//!
//! MCP protocol versions are ISO calendar dates (`YYYY-MM-DD`). Because the
//! format is fixed-width, plain string comparison orders them chronologically.
//! The server picks the newest supported version that is not newer than the
//! client's request.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde_json::{json, Value};
use thiserror::Error;

static VERSION_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("static pattern"));

/// Returns `true` if `version` is a real calendar date in `YYYY-MM-DD` form.
#[must_use]
pub fn is_well_formed_version(version: &str) -> bool {
    VERSION_SHAPE.is_match(version) && NaiveDate::parse_from_str(version, "%Y-%m-%d").is_ok()
}

/// Why a negotiation failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NegotiationError {
    /// The requested version is not a `YYYY-MM-DD` date.
    #[error("Invalid protocolVersion format")]
    InvalidFormat {
        /// The rejected input.
        requested: String,
        /// Versions the server supports, oldest first.
        supported: Vec<String>,
    },

    /// The requested version predates every supported version.
    #[error("Unsupported protocolVersion")]
    Unsupported {
        /// The rejected input.
        requested: String,
        /// Versions the server supports, oldest first.
        supported: Vec<String>,
    },
}

impl NegotiationError {
    /// Diagnostic payload for the JSON-RPC `error.data` member.
    #[must_use]
    pub fn data(&self) -> Value {
        match self {
            Self::InvalidFormat {
                requested,
                supported,
            }
            | Self::Unsupported {
                requested,
                supported,
            } => json!({
                "requested": requested,
                "supportedVersions": supported,
            }),
        }
    }
}

/// The outcome of negotiation for one HTTP exchange.
///
/// Lives only for the duration of a request; the transport reads
/// `negotiated_version` to set the response header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatedSession {
    /// What the client asked for, if anything.
    pub requested_version: Option<String>,
    /// What the server settled on (or fell back to for the header).
    pub negotiated_version: String,
}

/// Selects a mutually supported protocol version.
#[derive(Debug, Clone)]
pub struct ProtocolNegotiator {
    /// Supported versions, sorted oldest first, deduplicated.
    supported: Vec<String>,
}

impl ProtocolNegotiator {
    /// Creates a negotiator over `supported`.
    ///
    /// Malformed entries are dropped; configuration validation rejects them
    /// earlier. An empty list falls back to `2024-11-05`.
    #[must_use]
    pub fn new<I, S>(supported: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut versions: Vec<String> = supported
            .into_iter()
            .map(Into::into)
            .filter(|v| is_well_formed_version(v))
            .collect();
        versions.sort();
        versions.dedup();
        if versions.is_empty() {
            versions.push("2024-11-05".to_string());
        }
        Self {
            supported: versions,
        }
    }

    /// Supported versions, oldest first.
    #[must_use]
    pub fn supported(&self) -> &[String] {
        &self.supported
    }

    /// The newest supported version.
    #[must_use]
    pub fn latest(&self) -> &str {
        self.supported.last().map_or("2024-11-05", String::as_str)
    }

    /// Picks the greatest supported version that is `<= requested`.
    ///
    /// With no request, the newest supported version is returned.
    ///
    /// # Errors
    ///
    /// - [`NegotiationError::InvalidFormat`] if `requested` is not `YYYY-MM-DD`
    /// - [`NegotiationError::Unsupported`] if `requested` predates all supported versions
    pub fn negotiate(&self, requested: Option<&str>) -> Result<String, NegotiationError> {
        let Some(requested) = requested else {
            return Ok(self.latest().to_string());
        };

        if !is_well_formed_version(requested) {
            return Err(NegotiationError::InvalidFormat {
                requested: requested.to_string(),
                supported: self.supported.clone(),
            });
        }

        self.supported
            .iter()
            .rev()
            .find(|v| v.as_str() <= requested)
            .cloned()
            .ok_or_else(|| NegotiationError::Unsupported {
                requested: requested.to_string(),
                supported: self.supported.clone(),
            })
    }

    /// Negotiates and records the result, falling back to the newest
    /// version for the header when negotiation fails.
    #[must_use]
    pub fn session(
        &self,
        requested: Option<&str>,
    ) -> (NegotiatedSession, Result<String, NegotiationError>) {
        let outcome = self.negotiate(requested);
        let negotiated_version = outcome
            .as_ref()
            .map_or_else(|_| self.latest().to_string(), Clone::clone);
        (
            NegotiatedSession {
                requested_version: requested.map(str::to_string),
                negotiated_version,
            },
            outcome,
        )
    }
}

impl Default for ProtocolNegotiator {
    fn default() -> Self {
        Self::new(["2024-11-05"])
    }
}
