//! JSON-RPC dispatch for the gateway.
//!
//! One HTTP body goes in, at most one JSON body comes out:
//!
//! 1. **Parse**: invalid JSON short-circuits to a single parse error
//! 2. **Split**: a single envelope or a batch, each element judged on its own
//! 3. **Route**: `initialize`, `initialized`, `tools/list`, `tools/call`, `ping`
//! 4. **Assemble**: notifications are dropped; a batch always yields an array
//!
//! The dispatcher also records the negotiated protocol version so the
//! transport can put it in the response header, even when negotiation failed.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use axum::http::HeaderMap;
use futures_util::FutureExt;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

use super::auth::AuthGate;
use super::negotiation::{NegotiatedSession, ProtocolNegotiator};
use super::protocol::{
    parse_body, parse_envelope, ErrorCode, IncomingBody, JsonRpcError, JsonRpcErrorData,
    JsonRpcResponse, RequestId, RpcEnvelope, RpcReply, PROTOCOL_VERSION_HEADER, SERVER_NAME,
};
use super::registry::{ToolDescriptor, ToolKind, ToolRegistry};
use crate::config::Config;
use crate::resolver::{canonical_digits, AliasCache, IdentifierResolver};
use crate::upstream::{local, RetryPolicy, ToolBackend, ToolError};

/// Server capabilities advertised during initialisation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServerCapabilities {
    /// Tool-related capabilities.
    pub tools: ToolCapabilities,
}

/// Tool-specific capabilities.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolCapabilities {
    /// Whether the tool list can change during the session. The catalog is
    /// fixed at startup, so this is always `false`.
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

/// Server information for initialisation response.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Content item in a tool call response.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
}

/// Result of a successful tool call.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallResult {
    /// Content returned by the tool.
    pub content: Vec<ToolContent>,
}

impl ToolCallResult {
    /// Creates a text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
        }
    }

    /// Packs a tool value as text: strings verbatim, anything else as compact JSON.
    #[must_use]
    pub fn json(value: &Value) -> Self {
        match value {
            Value::String(s) => Self::text(s.clone()),
            other => Self::text(other.to_string()),
        }
    }
}

/// What the transport needs to build the HTTP response.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// JSON body, or `None` for "no content" (a lone notification).
    pub body: Option<Value>,
    /// Protocol version to report in the response header.
    pub session: NegotiatedSession,
}

/// Per-request state shared by every envelope in one body.
struct RequestContext<'a> {
    headers: &'a HeaderMap,
    /// Whether the caller may see private tools.
    privileged: bool,
    /// Set by the last `initialize` in the body.
    session: Option<NegotiatedSession>,
}

/// Routes JSON-RPC envelopes to their handlers.
pub struct RpcDispatcher {
    negotiator: ProtocolNegotiator,
    registry: ToolRegistry,
    auth: AuthGate,
    resolver: IdentifierResolver,
    retry: RetryPolicy,
    backend: Arc<dyn ToolBackend>,
    /// Configured manager account, canonical form.
    login_customer_id: Option<String>,
}

impl RpcDispatcher {
    /// Builds a dispatcher with the built-in tool catalog.
    #[must_use]
    pub fn from_config(config: &Config, backend: Arc<dyn ToolBackend>) -> Self {
        let registry = ToolRegistry::builtin();
        let auth = AuthGate::from_config(&config.auth, &registry);
        let resolver = IdentifierResolver::from_config(
            &config.resolver,
            Arc::new(AliasCache::new()),
            Arc::clone(&backend),
        );

        Self {
            negotiator: ProtocolNegotiator::new(config.protocol.supported_versions.iter().cloned()),
            registry,
            auth,
            resolver,
            retry: RetryPolicy::from_config(&config.retry),
            backend,
            login_customer_id: config
                .upstream
                .login_customer_id
                .as_deref()
                .and_then(canonical_digits),
        }
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The protocol negotiator.
    #[must_use]
    pub const fn negotiator(&self) -> &ProtocolNegotiator {
        &self.negotiator
    }

    /// The tool catalog.
    #[must_use]
    pub const fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// The identifier resolver.
    #[must_use]
    pub const fn resolver(&self) -> &IdentifierResolver {
        &self.resolver
    }

    /// Handles one raw HTTP request body.
    pub async fn handle(&self, headers: &HeaderMap, body: &[u8]) -> DispatchOutcome {
        let mut ctx = RequestContext {
            headers,
            privileged: self.auth.authorize(headers, None),
            session: None,
        };

        let body = match parse_body(body) {
            Err(err) => {
                debug!("Request body is not valid JSON");
                Some(reply_value(&RpcReply::from(err)))
            }
            Ok(IncomingBody::Single(value)) => self
                .dispatch_value(&mut ctx, value)
                .await
                .map(|reply| reply_value(&reply)),
            Ok(IncomingBody::Batch(items)) => {
                debug!(entries = items.len(), "Dispatching batch");
                let mut replies = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(reply) = self.dispatch_value(&mut ctx, item).await {
                        replies.push(reply_value(&reply));
                    }
                }
                Some(Value::Array(replies))
            }
        };

        let session = ctx
            .session
            .unwrap_or_else(|| self.header_session(headers));
        DispatchOutcome { body, session }
    }

    /// The static discovery document served at `/.well-known/mcp.json`.
    #[must_use]
    pub fn discovery_document(&self, headers: &HeaderMap) -> Value {
        let auth_type = if self.auth.is_open() { "none" } else { "bearer" };
        json!({
            "mcpVersion": self.negotiator.latest(),
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION"),
            "auth": { "type": auth_type },
            "capabilities": ServerCapabilities::default(),
            "endpoints": { "rpc": "/" },
            "tools": self.visible_tools(self.auth.authorize(headers, None)),
        })
    }

    /// Negotiates from the client's protocol-version header, falling back
    /// to the newest supported version.
    #[must_use]
    pub fn header_session(&self, headers: &HeaderMap) -> NegotiatedSession {
        let requested = headers
            .get(PROTOCOL_VERSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim);
        self.negotiator.session(requested).0
    }

    fn visible_tools(&self, privileged: bool) -> Vec<&ToolDescriptor> {
        self.registry.list(privileged)
    }

    /// Validates and routes one element, catching handler panics.
    ///
    /// Returns `None` when no reply is owed.
    async fn dispatch_value(&self, ctx: &mut RequestContext<'_>, value: Value) -> Option<RpcReply> {
        let envelope = match parse_envelope(value) {
            Ok(envelope) => envelope,
            Err(invalid) => return (!invalid.notification).then(|| invalid.error.into()),
        };

        let id = envelope.reply_id();
        let notification = envelope.is_notification();
        let method = envelope.method.clone();

        let reply = match AssertUnwindSafe(self.route(ctx, envelope))
            .catch_unwind()
            .await
        {
            Ok(reply) => reply,
            Err(payload) => {
                error!(method = %method, panic = panic_message(payload.as_ref()), "Handler panicked");
                JsonRpcError::new(id, JsonRpcErrorData::from_code(ErrorCode::DispatchError)).into()
            }
        };

        if notification {
            debug!(method = %method, "Notification handled, no reply");
            None
        } else {
            Some(reply)
        }
    }

    async fn route(&self, ctx: &mut RequestContext<'_>, envelope: RpcEnvelope) -> RpcReply {
        let id = envelope.reply_id();
        match envelope.method.to_ascii_lowercase().as_str() {
            "initialize" => self.handle_initialize(ctx, &envelope),
            "initialized" | "notifications/initialized" => {
                JsonRpcResponse::success(id, json!({ "ok": true })).into()
            }
            "tools/list" | "tools.list" | "list_tools" | "tools.index" => {
                JsonRpcResponse::success(id, json!({ "tools": self.visible_tools(ctx.privileged) }))
                    .into()
            }
            "tools/call" => self.handle_tools_call(ctx, envelope).await,
            "ping" => JsonRpcResponse::success(id, json!({})).into(),
            _ => {
                debug!(method = %envelope.method, "Unknown method");
                JsonRpcError::method_not_found(id, &envelope.method).into()
            }
        }
    }

    fn handle_initialize(&self, ctx: &mut RequestContext<'_>, envelope: &RpcEnvelope) -> RpcReply {
        let id = envelope.reply_id();
        let requested = match envelope.params.get("protocolVersion") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        };

        let (session, outcome) = self.negotiator.session(requested.as_deref());
        ctx.session = Some(session);

        match outcome {
            Ok(version) => {
                info!(requested = ?requested, negotiated = %version, "Session initialised");
                JsonRpcResponse::success(
                    id,
                    json!({
                        "protocolVersion": version,
                        "capabilities": ServerCapabilities::default(),
                        "serverInfo": ServerInfo::default(),
                        "tools": self.visible_tools(ctx.privileged),
                    }),
                )
                .into()
            }
            Err(err) => {
                warn!(requested = ?requested, error = %err, "Protocol negotiation failed");
                JsonRpcError::new(
                    id,
                    JsonRpcErrorData::with_message(ErrorCode::InvalidParams, err.to_string())
                        .with_data(err.data()),
                )
                .into()
            }
        }
    }

    async fn handle_tools_call(&self, ctx: &RequestContext<'_>, envelope: RpcEnvelope) -> RpcReply {
        let id = envelope.reply_id();
        let (name, mut arguments) = match call_target(&id, envelope.params) {
            Ok(target) => target,
            Err(reply) => return reply,
        };
        let tool = match self.authorised_tool(ctx, &id, &name) {
            Ok(tool) => tool,
            Err(reply) => return reply,
        };
        if let Err(reply) = self.prepare_arguments(tool, &id, &mut arguments).await {
            return reply;
        }

        let started = Instant::now();
        let result = self.invoke_tool(tool, &arguments).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        call_reply(id, &name, result, elapsed_ms)
    }

    /// Looks the tool up, then checks the caller may run it.
    fn authorised_tool(
        &self,
        ctx: &RequestContext<'_>,
        id: &RequestId,
        name: &str,
    ) -> Result<&ToolDescriptor, RpcReply> {
        let Some(tool) = self.registry.get(name) else {
            return Err(JsonRpcError::new(
                id.clone(),
                JsonRpcErrorData::with_message(
                    ErrorCode::MethodNotFound,
                    format!("Unknown tool: {name}"),
                )
                .with_data(json!({ "name": name })),
            )
            .into());
        };

        if !self.auth.authorize(ctx.headers, Some(name)) {
            warn!(tool = %name, "Unauthorised tool call");
            return Err(JsonRpcError::new(
                id.clone(),
                JsonRpcErrorData::from_code(ErrorCode::Unauthorized)
                    .with_data(json!({ "tool": name })),
            )
            .into());
        }
        Ok(tool)
    }

    /// Resolves account identifiers in place, then checks the schema.
    async fn prepare_arguments(
        &self,
        tool: &ToolDescriptor,
        id: &RequestId,
        arguments: &mut Map<String, Value>,
    ) -> Result<(), RpcReply> {
        let fields: Vec<&str> = tool.identifier_arguments.iter().map(String::as_str).collect();
        if let Err(unresolved) = self
            .resolver
            .resolve_arguments(arguments, &fields, self.login_customer_id.as_deref())
            .await
        {
            return Err(JsonRpcError::new(
                id.clone(),
                JsonRpcErrorData::with_message(ErrorCode::InvalidParams, unresolved.to_string())
                    .with_data(json!({
                        "argument": unresolved.argument,
                        "value": unresolved.value,
                    })),
            )
            .into());
        }

        tool.validate_arguments(arguments)
            .map_err(|message| JsonRpcError::invalid_params(id.clone(), message).into())
    }

    async fn invoke_tool(
        &self,
        tool: &ToolDescriptor,
        arguments: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        match tool.kind {
            ToolKind::Local => {
                local::call_local(&tool.name, arguments, self.login_customer_id.as_deref())
            }
            ToolKind::Upstream => {
                self.retry
                    .invoke(|| self.backend.call_tool(&tool.name, arguments))
                    .await
            }
        }
    }
}

/// Splits `tools/call` params into the tool name and its arguments.
fn call_target(
    id: &RequestId,
    mut params: Map<String, Value>,
) -> Result<(String, Map<String, Value>), RpcReply> {
    let name = match params.remove("name") {
        Some(Value::String(name)) if !name.is_empty() => name,
        _ => return Err(JsonRpcError::invalid_params(id.clone(), "Missing tool name").into()),
    };
    let arguments = match params.remove("arguments") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map,
        Some(_) => {
            return Err(
                JsonRpcError::invalid_params(id.clone(), "arguments must be an object").into(),
            )
        }
    };
    Ok((name, arguments))
}

/// Maps a tool outcome onto the JSON-RPC reply.
fn call_reply(
    id: RequestId,
    name: &str,
    result: Result<Value, ToolError>,
    elapsed_ms: u64,
) -> RpcReply {
    match result {
        Ok(value) => {
            info!(tool = %name, elapsed_ms, "Tool call succeeded");
            match serde_json::to_value(ToolCallResult::json(&value)) {
                Ok(result) => JsonRpcResponse::success(id, result).into(),
                Err(e) => {
                    error!(error = %e, "Failed to serialise tool call result");
                    JsonRpcError::new(id, JsonRpcErrorData::from_code(ErrorCode::DispatchError))
                        .into()
                }
            }
        }
        Err(ToolError::InvalidArguments(message)) => {
            debug!(tool = %name, message = %message, "Tool rejected its arguments");
            JsonRpcError::invalid_params(id, message).into()
        }
        Err(err) => {
            warn!(tool = %name, elapsed_ms, error = %err, "Tool call failed");
            JsonRpcError::new(
                id,
                JsonRpcErrorData::with_message(ErrorCode::ToolFailure, err.to_string())
                    .with_data(err.detail().into_value()),
            )
            .into()
        }
    }
}

fn reply_value<T: Serialize>(reply: &T) -> Value {
    serde_json::to_value(reply).unwrap_or_else(|e| {
        error!(error = %e, "Failed to serialise reply");
        json!({
            "jsonrpc": "2.0",
            "id": RequestId::Null,
            "error": JsonRpcErrorData::from_code(ErrorCode::DispatchError),
        })
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
