//! Integration tests for JSON-RPC dispatch.
//!
//! These tests drive `RpcDispatcher::handle` with raw bodies and scripted
//! backends, covering negotiation, auth, batching, retries, identifier
//! resolution and fault isolation.

mod common;

use std::sync::Arc;

use axum::http::{HeaderMap, HeaderValue};
use serde_json::{json, Value};

use ads_mcp_gateway::config::Config;
use ads_mcp_gateway::mcp::{DispatchOutcome, ErrorCode, RpcDispatcher};
use ads_mcp_gateway::upstream::status::PERMISSION_DENIED_HINT;
use ads_mcp_gateway::upstream::{ToolError, UpstreamError};

use common::{config, dispatcher, request, tool_call, PanickingBackend, ScriptedBackend};

async fn send(d: &RpcDispatcher, body: &Value) -> DispatchOutcome {
    d.handle(&HeaderMap::new(), body.to_string().as_bytes()).await
}

async fn send_with(d: &RpcDispatcher, headers: &HeaderMap, body: &Value) -> DispatchOutcome {
    d.handle(headers, body.to_string().as_bytes()).await
}

fn locked_config() -> Config {
    config(json!({ "auth": { "shared_secret": "s3cret" } }))
}

fn bearer(token: &'static str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("authorization", HeaderValue::from_static(token));
    headers
}

fn transient() -> ToolError {
    ToolError::Upstream(UpstreamError::new("UNAVAILABLE"))
}

// =============================================================================
// Negotiation
// =============================================================================

#[tokio::test]
async fn test_initialize_rounds_down_to_supported_version() {
    let d = dispatcher(&Config::default(), Arc::new(ScriptedBackend::default()));
    let out = send(&d, &request(1, "initialize", json!({"protocolVersion": "2025-06-18"}))).await;

    let body = out.body.unwrap();
    assert_eq!(body["id"], 1);
    assert_eq!(body["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(body["result"]["serverInfo"]["name"], "ads-mcp-gateway");
    assert_eq!(body["result"]["capabilities"]["tools"]["listChanged"], false);
    assert_eq!(out.session.negotiated_version, "2024-11-05");
    assert_eq!(out.session.requested_version.as_deref(), Some("2025-06-18"));
}

#[tokio::test]
async fn test_initialize_without_version_gets_latest() {
    let cfg = config(json!({"protocol": {"supported_versions": ["2024-11-05", "2025-03-26"]}}));
    let d = dispatcher(&cfg, Arc::new(ScriptedBackend::default()));
    let out = send(&d, &request(1, "initialize", json!({}))).await;

    assert_eq!(out.body.unwrap()["result"]["protocolVersion"], "2025-03-26");
}

#[tokio::test]
async fn test_initialize_older_than_supported_is_rejected() {
    let d = dispatcher(&Config::default(), Arc::new(ScriptedBackend::default()));
    let out = send(&d, &request(7, "initialize", json!({"protocolVersion": "2023-01-01"}))).await;

    let body = out.body.unwrap();
    assert_eq!(body["id"], 7);
    assert_eq!(body["error"]["code"], ErrorCode::InvalidParams.code());
    assert_eq!(body["error"]["message"], "Unsupported protocolVersion");
    assert_eq!(body["error"]["data"]["requested"], "2023-01-01");
    assert_eq!(body["error"]["data"]["supportedVersions"], json!(["2024-11-05"]));
    assert_eq!(out.session.negotiated_version, "2024-11-05");
}

#[tokio::test]
async fn test_initialize_malformed_version_reports_latest_in_header() {
    let cfg = config(json!({"protocol": {"supported_versions": ["2024-11-05", "2025-03-26"]}}));
    let d = dispatcher(&cfg, Arc::new(ScriptedBackend::default()));
    let out = send(&d, &request(1, "initialize", json!({"protocolVersion": "2025-13-40"}))).await;

    let body = out.body.unwrap();
    assert_eq!(body["error"]["code"], ErrorCode::InvalidParams.code());
    assert_eq!(body["error"]["message"], "Invalid protocolVersion format");
    assert_eq!(out.session.negotiated_version, "2025-03-26");
}

// =============================================================================
// Envelope handling
// =============================================================================

#[tokio::test]
async fn test_parse_error_has_null_id() {
    let d = dispatcher(&Config::default(), Arc::new(ScriptedBackend::default()));
    let out = d.handle(&HeaderMap::new(), b"{not json").await;

    let body = out.body.unwrap();
    assert_eq!(body["id"], Value::Null);
    assert_eq!(body["error"]["code"], ErrorCode::ParseError.code());
}

#[tokio::test]
async fn test_single_notification_has_no_body() {
    let d = dispatcher(&Config::default(), Arc::new(ScriptedBackend::default()));
    let out = send(&d, &json!({"jsonrpc": "2.0", "method": "notifications/initialized"})).await;

    assert!(out.body.is_none());
    assert_eq!(out.session.negotiated_version, "2024-11-05");
}

#[tokio::test]
async fn test_batch_of_notifications_is_empty_array() {
    let d = dispatcher(&Config::default(), Arc::new(ScriptedBackend::default()));
    let body = json!([
        {"jsonrpc": "2.0", "method": "notifications/initialized"},
        {"jsonrpc": "2.0", "method": "ping"}
    ]);

    assert_eq!(send(&d, &body).await.body, Some(json!([])));
}

#[tokio::test]
async fn test_empty_batch_is_empty_array() {
    let d = dispatcher(&Config::default(), Arc::new(ScriptedBackend::default()));
    assert_eq!(send(&d, &json!([])).await.body, Some(json!([])));
}

#[tokio::test]
async fn test_mixed_batch_keeps_order_and_drops_notifications() {
    let d = dispatcher(&Config::default(), Arc::new(ScriptedBackend::default()));
    let body = json!([
        request(1, "initialize", json!({"protocolVersion": "2024-11-05"})),
        {"jsonrpc": "2.0", "method": "notifications/initialized"},
        42,
        request(2, "tools/list", json!({})),
        request(3, "no/such/method", json!({}))
    ]);

    let out = send(&d, &body).await;
    let replies = out.body.unwrap();
    let replies = replies.as_array().unwrap();
    assert_eq!(replies.len(), 4);
    assert_eq!(replies[0]["id"], 1);
    assert_eq!(replies[1]["id"], Value::Null);
    assert_eq!(replies[1]["error"]["code"], ErrorCode::InvalidRequest.code());
    assert_eq!(replies[2]["id"], 2);
    assert!(replies[2]["result"]["tools"].is_array());
    assert_eq!(replies[3]["error"]["code"], ErrorCode::MethodNotFound.code());
    assert_eq!(out.session.negotiated_version, "2024-11-05");
}

#[tokio::test]
async fn test_string_ids_are_echoed() {
    let d = dispatcher(&Config::default(), Arc::new(ScriptedBackend::default()));
    let body = json!({"jsonrpc": "2.0", "id": "abc-1", "method": "ping"});

    let reply = send(&d, &body).await.body.unwrap();
    assert_eq!(reply["id"], "abc-1");
    assert_eq!(reply["result"], json!({}));
}

#[tokio::test]
async fn test_non_integer_numeric_ids_are_echoed() {
    let d = dispatcher(&Config::default(), Arc::new(ScriptedBackend::default()));

    let reply = send(&d, &json!({"jsonrpc": "2.0", "id": 1.5, "method": "ping"})).await.body.unwrap();
    assert_eq!(reply["id"], json!(1.5));
    assert_eq!(reply["result"], json!({}));

    let body = br#"{"jsonrpc": "2.0", "id": 18446744073709551615, "method": "ping"}"#;
    let out = d.handle(&HeaderMap::new(), body).await;
    let reply = out.body.unwrap();
    assert_eq!(reply["id"], json!(u64::MAX));
    assert!(reply.get("error").is_none());
}

#[tokio::test]
async fn test_tools_list_aliases() {
    let d = dispatcher(&Config::default(), Arc::new(ScriptedBackend::default()));
    for method in ["tools/list", "tools.list", "list_tools", "tools.index"] {
        let reply = send(&d, &request(1, method, json!({}))).await.body.unwrap();
        assert_eq!(reply["result"]["tools"].as_array().unwrap().len(), 10, "{method}");
    }
}

// =============================================================================
// Authorisation
// =============================================================================

#[tokio::test]
async fn test_unauthenticated_list_shows_only_public_tools() {
    let d = dispatcher(&locked_config(), Arc::new(ScriptedBackend::default()));
    let reply = send(&d, &request(1, "tools/list", json!({}))).await.body.unwrap();

    let names: Vec<&str> = reply["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["ping", "echo_short", "noop_ok"]);
}

#[tokio::test]
async fn test_unauthenticated_private_call_is_rejected() {
    let backend = Arc::new(ScriptedBackend::default());
    let d = dispatcher(&locked_config(), backend.clone());
    let body = tool_call(5, "fetch_metrics", json!({"customer_id": "1234567890"}));

    let reply = send(&d, &body).await.body.unwrap();
    assert_eq!(reply["id"], 5);
    assert_eq!(reply["error"]["code"], ErrorCode::Unauthorized.code());
    assert_eq!(reply["error"]["data"]["tool"], "fetch_metrics");
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_public_tool_needs_no_secret() {
    let d = dispatcher(&locked_config(), Arc::new(ScriptedBackend::default()));
    let reply = send(&d, &tool_call(1, "noop_ok", json!({}))).await.body.unwrap();

    assert_eq!(reply["result"]["content"][0]["type"], "text");
    assert_eq!(reply["result"]["content"][0]["text"], r#"{"ok":true}"#);
}

#[tokio::test]
async fn test_bearer_secret_unlocks_private_tools() {
    let backend = Arc::new(ScriptedBackend::new([Ok(json!({"rows": [1, 2]}))]));
    let d = dispatcher(&locked_config(), backend.clone());
    let body = tool_call(1, "fetch_metrics", json!({"customer_id": "123-456-7890"}));

    let reply = send_with(&d, &bearer("Bearer s3cret"), &body).await.body.unwrap();
    assert_eq!(reply["result"]["content"][0]["text"], r#"{"rows":[1,2]}"#);
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_unknown_tool_is_method_not_found_even_when_locked() {
    let d = dispatcher(&locked_config(), Arc::new(ScriptedBackend::default()));
    let reply = send(&d, &tool_call(1, "drop_tables", json!({}))).await.body.unwrap();

    assert_eq!(reply["error"]["code"], ErrorCode::MethodNotFound.code());
    assert!(reply["error"]["message"].as_str().unwrap().contains("drop_tables"));
}

// =============================================================================
// Tool calls
// =============================================================================

#[tokio::test]
async fn test_missing_tool_name_is_invalid_params() {
    let d = dispatcher(&Config::default(), Arc::new(ScriptedBackend::default()));
    let reply = send(&d, &request(1, "tools/call", json!({"arguments": {}}))).await.body.unwrap();

    assert_eq!(reply["error"]["code"], ErrorCode::InvalidParams.code());
}

#[tokio::test]
async fn test_schema_violations_are_invalid_params() {
    let backend = Arc::new(ScriptedBackend::default());
    let d = dispatcher(&Config::default(), backend.clone());

    let too_long = "x".repeat(81);
    let reply = send(&d, &tool_call(1, "echo_short", json!({"msg": too_long}))).await.body.unwrap();
    assert_eq!(reply["error"]["code"], ErrorCode::InvalidParams.code());

    let reply = send(&d, &tool_call(2, "fetch_metrics", json!({"customer_id": "1234567890", "bogus": 1})))
        .await
        .body
        .unwrap();
    assert_eq!(reply["error"]["code"], ErrorCode::InvalidParams.code());
    assert!(reply["error"]["message"].as_str().unwrap().contains("bogus"));

    let reply = send(&d, &tool_call(3, "fetch_change_history", json!({"customer_id": "1234567890"})))
        .await
        .body
        .unwrap();
    assert_eq!(reply["error"]["code"], ErrorCode::InvalidParams.code());
    assert!(reply["error"]["message"].as_str().unwrap().contains("time_range"));

    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_account_and_partial_range_are_optional() {
    let backend = Arc::new(ScriptedBackend::default());
    let d = dispatcher(&Config::default(), backend.clone());

    let args = json!({"time_range": {"since": "2025-01-01"}});
    let reply = send(&d, &tool_call(1, "fetch_metrics", args)).await.body.unwrap();
    assert!(reply.get("result").is_some(), "{reply}");

    let args = json!({"month": "2025-05", "target_spend": 100});
    let reply = send(&d, &tool_call(2, "fetch_budget_pacing", args)).await.body.unwrap();
    assert!(reply.get("result").is_some(), "{reply}");

    assert_eq!(backend.calls(), 2);
    assert_eq!(backend.hierarchy_calls(), 0);
}

#[tokio::test]
async fn test_echo_short_trims_and_rejects_blank() {
    let d = dispatcher(&Config::default(), Arc::new(ScriptedBackend::default()));

    let reply = send(&d, &tool_call(1, "echo_short", json!({"msg": "  hello  "}))).await.body.unwrap();
    assert_eq!(reply["result"]["content"][0]["text"], r#"{"msg":"hello"}"#);

    let reply = send(&d, &tool_call(2, "echo_short", json!({"msg": "   "}))).await.body.unwrap();
    assert_eq!(reply["error"]["code"], ErrorCode::InvalidParams.code());
    assert_eq!(reply["error"]["message"], "msg required");
}

#[tokio::test]
async fn test_string_results_are_passed_verbatim() {
    let backend = Arc::new(ScriptedBackend::new([Ok(json!("already text"))]));
    let d = dispatcher(&Config::default(), backend);

    let reply = send(&d, &tool_call(1, "list_resources", json!({}))).await.body.unwrap();
    assert_eq!(reply["result"]["content"][0]["text"], "already text");
}

#[tokio::test]
async fn test_debug_login_header_reports_configured_manager() {
    let cfg = config(json!({"upstream": {"login_customer_id": "111-222-3333"}}));
    let d = dispatcher(&cfg, Arc::new(ScriptedBackend::default()));

    let reply = send(&d, &tool_call(1, "debug_login_header", json!({}))).await.body.unwrap();
    assert_eq!(
        reply["result"]["content"][0]["text"],
        r#"{"login_customer_id":"1112223333"}"#
    );
}

// =============================================================================
// Retry
// =============================================================================

#[tokio::test]
async fn test_transient_failures_are_retried_until_success() {
    let backend = Arc::new(ScriptedBackend::new([
        Err(transient()),
        Err(transient()),
        Ok(json!({"rows": []})),
    ]));
    let d = dispatcher(&Config::default(), backend.clone());

    let reply = send(&d, &tool_call(1, "list_resources", json!({}))).await.body.unwrap();
    assert!(reply.get("result").is_some());
    assert_eq!(backend.calls(), 3);
}

#[tokio::test]
async fn test_exhausted_retries_surface_the_last_failure() {
    let backend = Arc::new(ScriptedBackend::new([
        Err(transient()),
        Err(transient()),
        Err(transient()),
        Ok(json!({"rows": []})),
    ]));
    let d = dispatcher(&Config::default(), backend.clone());

    let reply = send(&d, &tool_call(1, "list_resources", json!({}))).await.body.unwrap();
    assert_eq!(reply["error"]["code"], ErrorCode::ToolFailure.code());
    assert_eq!(reply["error"]["data"]["status"], "UNAVAILABLE");
    assert_eq!(backend.calls(), 3);
}

#[tokio::test]
async fn test_permission_denied_is_terminal_with_hint() {
    let denied = UpstreamError::new("PERMISSION_DENIED")
        .with_request_id("req-9")
        .with_error("User doesn't have permission to access customer.");
    let backend = Arc::new(ScriptedBackend::new([Err(ToolError::Upstream(denied))]));
    let d = dispatcher(&Config::default(), backend.clone());

    let reply = send(&d, &tool_call(1, "fetch_metrics", json!({"customer_id": "1234567890"})))
        .await
        .body
        .unwrap();
    let data = &reply["error"]["data"];
    assert_eq!(reply["error"]["code"], ErrorCode::ToolFailure.code());
    assert_eq!(data["status"], "PERMISSION_DENIED");
    assert_eq!(data["request_id"], "req-9");
    assert_eq!(
        data["errors"][0]["message"],
        "User doesn't have permission to access customer."
    );
    assert_eq!(data["hint"], PERMISSION_DENIED_HINT);
    assert_eq!(backend.calls(), 1);
}

// =============================================================================
// Identifier resolution
// =============================================================================

#[tokio::test]
async fn test_account_names_resolve_through_hierarchy_once() {
    let cfg = config(json!({"upstream": {"login_customer_id": "111-222-3333"}}));
    let backend = Arc::new(
        ScriptedBackend::default().with_accounts(&[("4444444444", "Acme Shoes"), ("5555555555", "Globex")]),
    );
    let d = dispatcher(&cfg, backend.clone());

    let reply = send(&d, &tool_call(1, "fetch_metrics", json!({"customer_id": "ACME shoes"})))
        .await
        .body
        .unwrap();
    assert!(reply.get("result").is_some(), "{reply}");
    let sent = backend.last_arguments.lock().unwrap().clone().unwrap();
    assert_eq!(sent["customer_id"], "4444444444");

    send(&d, &tool_call(2, "fetch_metrics", json!({"customer_id": "globex"}))).await;
    let sent = backend.last_arguments.lock().unwrap().clone().unwrap();
    assert_eq!(sent["customer_id"], "5555555555");

    assert_eq!(backend.hierarchy_calls(), 1);
}

#[tokio::test]
async fn test_dashed_ids_are_canonicalised_before_the_call() {
    let backend = Arc::new(ScriptedBackend::default());
    let d = dispatcher(&Config::default(), backend.clone());

    send(
        &d,
        &tool_call(
            1,
            "fetch_metrics",
            json!({"customer_id": "123-456-7890", "login_customer_id": "111 222 3333"}),
        ),
    )
    .await;

    let sent = backend.last_arguments.lock().unwrap().clone().unwrap();
    assert_eq!(sent["customer_id"], "1234567890");
    assert_eq!(sent["login_customer_id"], "1112223333");
    assert_eq!(backend.hierarchy_calls(), 0);
}

#[tokio::test]
async fn test_configured_alias_resolves_without_upstream() {
    let cfg = config(json!({"resolver": {"aliases": {"Acme Shoes": "123-456-7890"}}}));
    let backend = Arc::new(ScriptedBackend::default());
    let d = dispatcher(&cfg, backend.clone());

    send(&d, &tool_call(1, "fetch_metrics", json!({"customer_id": "acme-shoes"}))).await;

    let sent = backend.last_arguments.lock().unwrap().clone().unwrap();
    assert_eq!(sent["customer_id"], "1234567890");
}

// =============================================================================
// Fault isolation
// =============================================================================

#[tokio::test]
async fn test_panicking_handler_becomes_dispatch_error() {
    let d = dispatcher(&Config::default(), Arc::new(PanickingBackend));
    let body = json!([
        tool_call(1, "list_resources", json!({})),
        request(2, "ping", json!({}))
    ]);

    let replies = send(&d, &body).await.body.unwrap();
    assert_eq!(replies[0]["id"], 1);
    assert_eq!(replies[0]["error"]["code"], ErrorCode::DispatchError.code());
    assert_eq!(replies[1]["id"], 2);
    assert_eq!(replies[1]["result"], json!({}));
}
