//! reqwest-backed reporting API collaborator.
//!
//! Tool calls are `POST {base_url}/tools/{name}` with `{"tool", "arguments"}`;
//! the account hierarchy is `GET {base_url}/customers/{root}/hierarchy`.
//! Failures come back as
//! `{"error": {"status", "requestId", "details": [{"message"}]}}`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::status::{UpstreamError, UNKNOWN_STATUS};
use super::{AccountNode, ToolBackend, ToolError};
use crate::config::UpstreamConfig;

/// Header carrying the developer token.
pub const DEVELOPER_TOKEN_HEADER: &str = "developer-token";

/// Header carrying the manager account the call acts through.
pub const LOGIN_CUSTOMER_HEADER: &str = "login-customer-id";

/// Response header carrying the upstream request id.
pub const REQUEST_ID_HEADER: &str = "request-id";

/// Production [`ToolBackend`] talking to the reporting API over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpToolBackend {
    client: reqwest::Client,
    base_url: String,
    developer_token: String,
    access_token: String,
    login_customer_id: Option<String>,
}

impl HttpToolBackend {
    /// Builds the backend, checking that every credential is present.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Configuration`] naming each missing setting, or
    /// [`ToolError::Transport`] if the HTTP client cannot be built.
    pub fn from_config(config: &UpstreamConfig) -> Result<Self, ToolError> {
        let base_url = present(config.base_url.as_deref());
        let developer_token = present(config.developer_token.as_deref());
        let access_token = present(config.access_token.as_deref());

        let missing: Vec<String> = [
            ("base_url", base_url),
            ("developer_token", developer_token),
            ("access_token", access_token),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_none())
        .map(|(name, _)| name.to_string())
        .collect();

        let (Some(base_url), Some(developer_token), Some(access_token)) =
            (base_url, developer_token, access_token)
        else {
            return Err(ToolError::Configuration { missing });
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("ads-mcp-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ToolError::Transport(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            developer_token: developer_token.to_string(),
            access_token: access_token.to_string(),
            login_customer_id: present(config.login_customer_id.as_deref()).map(digits_only),
        })
    }

    fn authorise(&self, request: RequestBuilder, login_customer_id: Option<&str>) -> RequestBuilder {
        let request = request
            .bearer_auth(&self.access_token)
            .header(DEVELOPER_TOKEN_HEADER, &self.developer_token);
        match login_customer_id.or(self.login_customer_id.as_deref()) {
            Some(login) => request.header(LOGIN_CUSTOMER_HEADER, digits_only(login)),
            None => request,
        }
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ToolError> {
        let status = response.status();
        let request_id = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response.text().await.map_err(classify_transport)?;
        if !status.is_success() {
            let mut err = parse_failure(status, &body);
            if err.request_id.is_none() {
                err.request_id = request_id;
            }
            return Err(err.into());
        }

        serde_json::from_str(&body)
            .map_err(|e| ToolError::Transport(format!("Invalid upstream response: {e}")))
    }
}

#[async_trait]
impl ToolBackend for HttpToolBackend {
    async fn call_tool(
        &self,
        name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        let url = format!("{}/tools/{name}", self.base_url);
        let login = arguments.get("login_customer_id").and_then(Value::as_str);
        debug!(tool = name, url = %url, "Calling upstream tool");

        let response = self
            .authorise(self.client.post(&url), login)
            .json(&json!({ "tool": name, "arguments": arguments }))
            .send()
            .await
            .map_err(classify_transport)?;

        Self::read_json(response).await
    }

    async fn account_hierarchy(&self, root_id: &str) -> Result<Vec<AccountNode>, ToolError> {
        let url = format!("{}/customers/{}/hierarchy", self.base_url, digits_only(root_id));
        debug!(url = %url, "Fetching account hierarchy");

        let response = self
            .authorise(self.client.get(&url), Some(root_id))
            .send()
            .await
            .map_err(classify_transport)?;

        Self::read_json(response).await
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

fn digits_only(id: &str) -> String {
    id.chars().filter(char::is_ascii_digit).collect()
}

/// Maps a reqwest failure that produced no HTTP reply.
fn classify_transport(err: reqwest::Error) -> ToolError {
    if err.is_timeout() {
        UpstreamError::new("DEADLINE_EXCEEDED")
            .with_error(err.to_string())
            .into()
    } else if err.is_connect() {
        UpstreamError::new("UNAVAILABLE").with_error(err.to_string()).into()
    } else {
        ToolError::Transport(err.to_string())
    }
}

/// Status name implied by an HTTP code when the body does not say.
fn status_from_http(code: StatusCode) -> &'static str {
    match code.as_u16() {
        400 => "INVALID_ARGUMENT",
        401 => "UNAUTHENTICATED",
        403 => "PERMISSION_DENIED",
        404 => "NOT_FOUND",
        409 => "ABORTED",
        429 => "RESOURCE_EXHAUSTED",
        500 => "INTERNAL",
        502 | 503 => "UNAVAILABLE",
        504 => "DEADLINE_EXCEEDED",
        _ => UNKNOWN_STATUS,
    }
}

#[derive(Debug, Deserialize)]
struct FailureBody {
    error: FailureInner,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FailureInner {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    request_id: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Vec<FailureDetail>,
}

#[derive(Debug, Deserialize)]
struct FailureDetail {
    #[serde(default)]
    message: Option<String>,
}

/// Parses a non-2xx reply body into an [`UpstreamError`].
fn parse_failure(code: StatusCode, body: &str) -> UpstreamError {
    let Ok(FailureBody { error }) = serde_json::from_str::<FailureBody>(body) else {
        let err = UpstreamError::new(status_from_http(code));
        return if body.trim().is_empty() {
            err.with_error(format!("HTTP {code}"))
        } else {
            err.with_error(body.trim())
        };
    };

    let mut err = UpstreamError::new(
        error
            .status
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| status_from_http(code).to_string()),
    );
    err.request_id = error.request_id;
    err.errors = error
        .details
        .into_iter()
        .filter_map(|d| d.message)
        .collect();
    if err.errors.is_empty() {
        if let Some(message) = error.message {
            err.errors.push(message);
        }
    }
    err
}
