//! Shared-secret authorisation.
//!
//! With no secret configured the gateway is open. Otherwise public tools are
//! always callable and everything else needs the secret, sent either as
//! `Authorization: Bearer <secret>` or in the configured secondary header.
//! A failed check never becomes an HTTP error; the dispatcher reports it
//! inside the JSON-RPC envelope.

use std::collections::HashSet;

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;

use super::registry::ToolRegistry;
use crate::config::AuthConfig;

/// Decides whether a request may see private tools or call a given tool.
#[derive(Debug, Clone)]
pub struct AuthGate {
    secret: Option<String>,
    secret_header: String,
    public_tools: HashSet<String>,
}

impl AuthGate {
    /// Creates a gate. An empty secret counts as no secret.
    #[must_use]
    pub fn new(
        secret: Option<String>,
        secret_header: impl Into<String>,
        registry: &ToolRegistry,
    ) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
            secret_header: secret_header.into().to_ascii_lowercase(),
            public_tools: registry.public_names().map(str::to_string).collect(),
        }
    }

    /// Creates a gate from configuration.
    #[must_use]
    pub fn from_config(config: &AuthConfig, registry: &ToolRegistry) -> Self {
        Self::new(
            config.shared_secret.clone(),
            config.secret_header.as_str(),
            registry,
        )
    }

    /// Returns `true` if no secret is configured.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.secret.is_none()
    }

    /// Authorises a request.
    ///
    /// `target_tool` is the tool a `tools/call` names; `None` stands for any
    /// other method that exposes private data.
    #[must_use]
    pub fn authorize(&self, headers: &HeaderMap, target_tool: Option<&str>) -> bool {
        let Some(secret) = &self.secret else {
            return true;
        };
        if target_tool.is_some_and(|name| self.public_tools.contains(name)) {
            return true;
        }
        self.presented_secrets(headers).any(|s| s == secret.as_str())
    }

    fn presented_secrets<'a>(&'a self, headers: &'a HeaderMap) -> impl Iterator<Item = &'a str> {
        let bearer = headers
            .get_all(AUTHORIZATION)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| {
                let (scheme, token) = v.trim().split_once(' ')?;
                scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
            });
        let secondary = headers
            .get_all(self.secret_header.as_str())
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::trim);
        bearer.chain(secondary)
    }
}
