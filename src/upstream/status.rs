//! Upstream status classification and failure payloads.
//!
//! The reporting API reports failures with a symbolic status name
//! (`UNAVAILABLE`, `PERMISSION_DENIED`, ...). Some statuses are worth
//! retrying; everything else is terminal.

use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Statuses that are eligible for retry.
pub const TRANSIENT_STATUSES: [&str; 5] = [
    "UNAVAILABLE",
    "DEADLINE_EXCEEDED",
    "RESOURCE_EXHAUSTED",
    "INTERNAL",
    "ABORTED",
];

/// Status used when the upstream reply carried no recognisable status.
pub const UNKNOWN_STATUS: &str = "UNKNOWN";

/// Attached to `PERMISSION_DENIED` failures.
pub const PERMISSION_DENIED_HINT: &str =
    "Check that the login_customer_id manager account has access to customer_id \
     and that the access token belongs to a user of that manager account.";

/// Retry classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Upstream failure worth retrying.
    Transient,
    /// Upstream failure that will not improve on retry.
    Terminal,
    /// Not an upstream failure at all (caller or configuration error).
    Local,
}

/// Classifies an upstream status name.
#[must_use]
pub fn classify_status(status: &str) -> Classification {
    if TRANSIENT_STATUSES
        .iter()
        .any(|s| s.eq_ignore_ascii_case(status))
    {
        Classification::Transient
    } else {
        Classification::Terminal
    }
}

/// A classified upstream failure.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("upstream call failed with status {status}")]
pub struct UpstreamError {
    /// Symbolic status name, e.g. `PERMISSION_DENIED`.
    pub status: String,

    /// Upstream request correlation id, when the reply carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// Sub-error messages.
    pub errors: Vec<String>,

    /// Remediation hint for the operator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl UpstreamError {
    /// Creates an error with the given status and no detail.
    #[must_use]
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into().to_ascii_uppercase(),
            request_id: None,
            errors: Vec::new(),
            hint: None,
        }
    }

    /// Sets the upstream request id.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Appends a sub-error message.
    #[must_use]
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.errors.push(message.into());
        self
    }

    /// Returns `true` if the status is in the transient set.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        classify_status(&self.status) == Classification::Transient
    }

    /// Marks the error as final, attaching the remediation hint where one applies.
    #[must_use]
    pub fn into_terminal(mut self) -> Self {
        if self.status == "PERMISSION_DENIED" && self.hint.is_none() {
            self.hint = Some(PERMISSION_DENIED_HINT.to_string());
        }
        self
    }

    /// The structured `error.data` payload for this failure.
    #[must_use]
    pub fn to_detail(&self) -> Value {
        let mut detail = Map::new();
        detail.insert("status".to_string(), json!(self.status));
        if let Some(request_id) = &self.request_id {
            detail.insert("request_id".to_string(), json!(request_id));
        }
        detail.insert(
            "errors".to_string(),
            Value::Array(
                self.errors
                    .iter()
                    .map(|m| json!({ "message": m }))
                    .collect(),
            ),
        );
        if let Some(hint) = &self.hint {
            detail.insert("hint".to_string(), json!(hint));
        }
        Value::Object(detail)
    }
}

/// Best-effort detail attached to a tool failure.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorDetail {
    /// The failure text was structured JSON.
    Structured(Value),
    /// Anything else, kept verbatim.
    Plain(String),
}

impl ErrorDetail {
    /// Decides once whether `text` is structured.
    ///
    /// Only JSON objects and arrays count; a bare JSON string or number is
    /// treated as plain text.
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        match serde_json::from_str::<Value>(text.trim()) {
            Ok(value @ (Value::Object(_) | Value::Array(_))) => Self::Structured(value),
            _ => Self::Plain(text.to_string()),
        }
    }

    /// Converts into the `error.data` value.
    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Self::Structured(value) => value,
            Self::Plain(text) => json!({ "detail": text }),
        }
    }
}
