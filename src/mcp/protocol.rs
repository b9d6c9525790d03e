//! JSON-RPC 2.0 message types for the MCP gateway.
//!
//! This module defines the envelope types exchanged on the RPC endpoint.
//! All messages follow the JSON-RPC 2.0 specification with MCP-specific extensions.
//!
//! # Message Types
//!
//! - **Request**: an envelope with an `id` key, expecting a response
//! - **Notification**: an envelope without an `id` key, never answered
//! - **Response**: exactly one of `result` or `error`, echoing the request `id`
//!
//! Parsing works on an already-decoded [`Value`] so that a batch body can be
//! split into elements first and each element judged independently.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Server name for capability negotiation.
pub const SERVER_NAME: &str = "ads-mcp-gateway";

/// HTTP header carrying the negotiated protocol version.
pub const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";

/// A JSON-RPC 2.0 request ID.
///
/// Strings, any JSON number and an explicit `null` are accepted and echoed
/// verbatim. Fractional and out-of-`i64` numbers keep their exact value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric request ID.
    Number(serde_json::Number),
    /// String request ID.
    String(String),
    /// Explicit `null` ID (also used when the ID cannot be determined).
    Null,
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Null => write!(f, "null"),
        }
    }
}

/// One parsed JSON-RPC envelope (request or notification).
#[derive(Debug, Clone)]
pub struct RpcEnvelope {
    /// Request ID; `None` when the envelope had no `id` key.
    pub id: Option<RequestId>,

    /// The method to invoke, as sent by the client.
    pub method: String,

    /// Parameters object; empty when absent or `null`.
    pub params: Map<String, Value>,
}

impl RpcEnvelope {
    /// Returns `true` if this envelope must not receive a response.
    #[must_use]
    pub const fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Returns the ID to use in a response (`null` for notifications).
    #[must_use]
    pub fn reply_id(&self) -> RequestId {
        self.id.clone().unwrap_or(RequestId::Null)
    }
}

/// An envelope that failed structural validation.
#[derive(Debug, Clone)]
pub struct InvalidEnvelope {
    /// Whether the offending element was shaped like a notification.
    pub notification: bool,

    /// The error response to send when it was not.
    pub error: JsonRpcError,
}

/// A successful JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// The request ID this response corresponds to.
    pub id: RequestId,

    /// The result of the method call.
    pub result: Value,
}

impl JsonRpcResponse {
    /// Creates a new success response.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Value is not const-compatible
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result,
        }
    }
}

/// JSON-RPC 2.0 error codes used by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid JSON was received by the server.
    ParseError,
    /// The JSON sent is not a valid Request object.
    InvalidRequest,
    /// The method or tool does not exist.
    MethodNotFound,
    /// Invalid method parameters, tool arguments, or protocol version.
    InvalidParams,
    /// The caller may not invoke the targeted tool.
    Unauthorized,
    /// The tool ran and failed (upstream or configuration failure).
    ToolFailure,
    /// Unexpected failure inside the dispatcher itself.
    DispatchError,
}

impl ErrorCode {
    /// Returns the numeric code for this error.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::Unauthorized => -32001,
            Self::ToolFailure => -32000,
            Self::DispatchError => -32098,
        }
    }

    /// Returns the default message for this error code.
    #[must_use]
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::Unauthorized => "Unauthorized",
            Self::ToolFailure => "Tool execution failed",
            Self::DispatchError => "Dispatch error",
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcErrorData {
    /// The error code.
    pub code: i32,

    /// A short description of the error.
    pub message: String,

    /// Additional information about the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcErrorData {
    /// Creates a new error from an error code.
    #[must_use]
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code: code.code(),
            message: code.default_message().to_string(),
            data: None,
        }
    }

    /// Creates a new error with a custom message.
    #[must_use]
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    /// Adds additional data to the error.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// A JSON-RPC 2.0 error response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// The request ID this error corresponds to (`null` if unknown).
    pub id: RequestId,

    /// The error details.
    pub error: JsonRpcErrorData,
}

impl JsonRpcError {
    /// Creates a new error response.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // JsonRpcErrorData contains String
    pub fn new(id: RequestId, error: JsonRpcErrorData) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            error,
        }
    }

    /// Creates a parse error response (ID cannot be determined).
    #[must_use]
    pub fn parse_error() -> Self {
        Self::new(
            RequestId::Null,
            JsonRpcErrorData::from_code(ErrorCode::ParseError),
        )
    }

    /// Creates an invalid request error response.
    #[must_use]
    pub fn invalid_request(id: RequestId) -> Self {
        Self::new(id, JsonRpcErrorData::from_code(ErrorCode::InvalidRequest))
    }

    /// Creates a method not found error response.
    #[must_use]
    pub fn method_not_found(id: RequestId, method: &str) -> Self {
        Self::new(
            id,
            JsonRpcErrorData::with_message(
                ErrorCode::MethodNotFound,
                format!("Method not found: {method}"),
            ),
        )
    }

    /// Creates an invalid params error response.
    #[must_use]
    pub fn invalid_params(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(
            id,
            JsonRpcErrorData::with_message(ErrorCode::InvalidParams, message),
        )
    }
}

/// Exactly one response envelope: success or error.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RpcReply {
    /// A `result` envelope.
    Success(JsonRpcResponse),
    /// An `error` envelope.
    Failure(JsonRpcError),
}

impl RpcReply {
    /// Returns the ID this reply answers.
    #[must_use]
    pub const fn id(&self) -> &RequestId {
        match self {
            Self::Success(resp) => &resp.id,
            Self::Failure(err) => &err.id,
        }
    }

    /// Returns the error object if this is an error reply.
    #[must_use]
    pub const fn error(&self) -> Option<&JsonRpcErrorData> {
        match self {
            Self::Success(_) => None,
            Self::Failure(err) => Some(&err.error),
        }
    }

    /// Returns the result value if this is a success reply.
    #[must_use]
    pub const fn result(&self) -> Option<&Value> {
        match self {
            Self::Success(resp) => Some(&resp.result),
            Self::Failure(_) => None,
        }
    }
}

impl From<JsonRpcResponse> for RpcReply {
    fn from(value: JsonRpcResponse) -> Self {
        Self::Success(value)
    }
}

impl From<JsonRpcError> for RpcReply {
    fn from(value: JsonRpcError) -> Self {
        Self::Failure(value)
    }
}

/// The decoded body of an RPC POST.
#[derive(Debug, Clone)]
pub enum IncomingBody {
    /// A single JSON value (expected to be one envelope).
    Single(Value),
    /// A JSON array of envelopes.
    Batch(Vec<Value>),
}

/// Decodes a raw request body into a single envelope value or a batch.
///
/// # Errors
///
/// Returns a parse error response if the body is not valid JSON.
pub fn parse_body(body: &[u8]) -> Result<IncomingBody, JsonRpcError> {
    let value: Value = serde_json::from_slice(body).map_err(|_| JsonRpcError::parse_error())?;
    Ok(match value {
        Value::Array(items) => IncomingBody::Batch(items),
        other => IncomingBody::Single(other),
    })
}

/// Validates one element of a request body as a JSON-RPC envelope.
///
/// The `jsonrpc` member is optional for leniency with older clients, but when
/// present it must equal `"2.0"`.
///
/// # Errors
///
/// Returns an [`InvalidEnvelope`] describing whether a reply is owed.
pub fn parse_envelope(value: Value) -> Result<RpcEnvelope, InvalidEnvelope> {
    let Value::Object(mut obj) = value else {
        return Err(InvalidEnvelope {
            notification: false,
            error: JsonRpcError::invalid_request(RequestId::Null),
        });
    };

    let id = match obj.remove("id") {
        None => None,
        Some(raw) => match serde_json::from_value::<RequestId>(raw) {
            Ok(id) => Some(id),
            Err(_) => {
                return Err(InvalidEnvelope {
                    notification: false,
                    error: JsonRpcError::invalid_request(RequestId::Null),
                })
            }
        },
    };

    let reject = |id: &Option<RequestId>| InvalidEnvelope {
        notification: id.is_none(),
        error: JsonRpcError::invalid_request(id.clone().unwrap_or(RequestId::Null)),
    };

    if let Some(version) = obj.get("jsonrpc") {
        if version.as_str() != Some("2.0") {
            return Err(reject(&id));
        }
    }

    let method = match obj.remove("method") {
        Some(Value::String(m)) if !m.trim().is_empty() => m,
        _ => return Err(reject(&id)),
    };

    let params = match obj.remove("params") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map,
        Some(_) => {
            return Err(InvalidEnvelope {
                notification: id.is_none(),
                error: JsonRpcError::invalid_params(
                    id.clone().unwrap_or(RequestId::Null),
                    "params must be an object",
                ),
            })
        }
    };

    Ok(RpcEnvelope { id, method, params })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_valid_request() {
        let env = parse_envelope(
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
        )
        .unwrap();
        assert_eq!(env.id, Some(RequestId::Number(1.into())));
        assert_eq!(env.method, "initialize");
        assert!(!env.is_notification());
    }

    #[test]
    fn parse_valid_notification() {
        let env =
            parse_envelope(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
                .unwrap();
        assert!(env.is_notification());
        assert_eq!(env.reply_id(), RequestId::Null);
    }

    #[test]
    fn explicit_null_id_is_a_request() {
        let env = parse_envelope(json!({"jsonrpc": "2.0", "id": null, "method": "ping"})).unwrap();
        assert_eq!(env.id, Some(RequestId::Null));
        assert!(!env.is_notification());
    }

    #[test]
    fn fractional_and_large_ids_are_echoed_exactly() {
        let env = parse_envelope(json!({"jsonrpc": "2.0", "id": 1.5, "method": "ping"})).unwrap();
        let reply = serde_json::to_value(JsonRpcResponse::success(env.reply_id(), json!({}))).unwrap();
        assert_eq!(reply["id"], json!(1.5));

        let env = parse_envelope(
            json!({"jsonrpc": "2.0", "id": 18_446_744_073_709_551_615_u64, "method": "ping"}),
        )
        .unwrap();
        assert_eq!(env.id, Some(RequestId::Number(u64::MAX.into())));
        let reply = serde_json::to_string(&JsonRpcResponse::success(env.reply_id(), json!({}))).unwrap();
        assert!(reply.contains(r#""id":18446744073709551615"#), "{reply}");
    }

    #[test]
    fn parse_string_id() {
        let env = parse_envelope(json!({"jsonrpc": "2.0", "id": "abc-123", "method": "test"}))
            .unwrap();
        assert_eq!(env.id, Some(RequestId::String("abc-123".to_string())));
    }

    #[test]
    fn parse_invalid_json_body() {
        let err = parse_body(b"not valid json").unwrap_err();
        assert_eq!(err.error.code, ErrorCode::ParseError.code());
        assert_eq!(err.id, RequestId::Null);
    }

    #[test]
    fn parse_batch_body() {
        let body = parse_body(br#"[{"id":1,"method":"ping"},{"method":"x"}]"#).unwrap();
        let IncomingBody::Batch(items) = body else {
            panic!("Expected Batch");
        };
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn non_object_element_is_invalid_request_with_null_id() {
        let err = parse_envelope(json!(42)).unwrap_err();
        assert!(!err.notification);
        assert_eq!(err.error.id, RequestId::Null);
        assert_eq!(err.error.error.code, ErrorCode::InvalidRequest.code());
    }

    #[test]
    fn parse_wrong_jsonrpc_version() {
        let err = parse_envelope(json!({"jsonrpc": "1.0", "id": 1, "method": "test"})).unwrap_err();
        assert!(!err.notification);
        assert_eq!(err.error.id, RequestId::Number(1.into()));
        assert_eq!(err.error.error.code, ErrorCode::InvalidRequest.code());
    }

    #[test]
    fn missing_method_on_notification_stays_silent() {
        let err = parse_envelope(json!({"jsonrpc": "2.0"})).unwrap_err();
        assert!(err.notification);
    }

    #[test]
    fn array_params_are_rejected() {
        let err = parse_envelope(json!({"id": 3, "method": "tools/call", "params": [1, 2]}))
            .unwrap_err();
        assert_eq!(err.error.error.code, ErrorCode::InvalidParams.code());
    }

    #[test]
    fn serialise_success_response() {
        let response =
            JsonRpcResponse::success(RequestId::Number(1.into()), serde_json::json!({"ok": true}));
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains(r#""jsonrpc":"2.0""#));
        assert!(json.contains(r#""id":1"#));
        assert!(json.contains(r#""result":{"ok":true}"#));
    }

    #[test]
    fn serialise_error_response_keeps_null_id() {
        let json = serde_json::to_value(JsonRpcError::parse_error()).unwrap();
        assert_eq!(json["id"], Value::Null);
        assert_eq!(json["error"]["code"], -32700);
        assert!(json.get("result").is_none());
    }

    #[test]
    fn reply_serialises_exactly_one_outcome() {
        let reply: RpcReply =
            JsonRpcError::method_not_found(RequestId::Number(1.into()), "unknown/method").into();
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["error"]["code"], -32601);
        assert!(json.get("result").is_none());
        assert!(json["error"]["message"]
            .as_str()
            .unwrap()
            .contains("unknown/method"));
    }

    #[test]
    fn module_reserved_codes() {
        assert_eq!(ErrorCode::Unauthorized.code(), -32001);
        assert_eq!(ErrorCode::ToolFailure.code(), -32000);
        assert_eq!(ErrorCode::DispatchError.code(), -32098);
    }

    #[test]
    fn request_id_display() {
        assert_eq!(format!("{}", RequestId::Number(42.into())), "42");
        assert_eq!(format!("{}", RequestId::String("abc".to_string())), "abc");
        assert_eq!(format!("{}", RequestId::Null), "null");
    }
}
