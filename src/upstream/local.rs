//! In-process diagnostic tools.
//!
//! These never touch the reporting API, so they keep working when the
//! upstream collaborator is not configured.

use serde_json::{json, Map, Value};

use super::ToolError;

/// Maximum length of an `echo_short` message, in characters.
pub const ECHO_MAX_CHARS: usize = 80;

/// Runs the local tool `name`.
///
/// `login_customer_id` is the configured manager account, reported by
/// `debug_login_header`.
///
/// # Errors
///
/// Returns [`ToolError::InvalidArguments`] for bad input and
/// [`ToolError::Transport`] if `name` has no local handler.
pub fn call_local(
    name: &str,
    arguments: &Map<String, Value>,
    login_customer_id: Option<&str>,
) -> Result<Value, ToolError> {
    match name {
        "ping" | "noop_ok" => Ok(json!({ "ok": true })),
        "echo_short" => echo_short(arguments),
        "debug_login_header" => Ok(json!({ "login_customer_id": login_customer_id })),
        other => Err(ToolError::Transport(format!("No local handler for tool '{other}'"))),
    }
}

fn echo_short(arguments: &Map<String, Value>) -> Result<Value, ToolError> {
    let msg = arguments
        .get("msg")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();

    if msg.is_empty() {
        return Err(ToolError::InvalidArguments("msg required".to_string()));
    }
    if msg.chars().count() > ECHO_MAX_CHARS {
        return Err(ToolError::InvalidArguments(format!(
            "msg must be at most {ECHO_MAX_CHARS} characters"
        )));
    }
    Ok(json!({ "msg": msg }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn ping_and_noop() {
        assert_eq!(call_local("ping", &Map::new(), None).unwrap(), json!({"ok": true}));
        assert_eq!(call_local("noop_ok", &Map::new(), None).unwrap(), json!({"ok": true}));
    }

    #[test]
    fn echo_trims() {
        let out = call_local("echo_short", &args(json!({"msg": "  hi  "})), None).unwrap();
        assert_eq!(out, json!({"msg": "hi"}));
    }

    #[test]
    fn echo_rejects_empty_and_long() {
        for bad in [json!({}), json!({"msg": "   "}), json!({"msg": "x".repeat(81)})] {
            let err = call_local("echo_short", &args(bad), None).unwrap_err();
            assert!(matches!(err, ToolError::InvalidArguments(_)));
        }
        assert!(call_local("echo_short", &args(json!({"msg": "é".repeat(80)})), None).is_ok());
    }

    #[test]
    fn login_header_reports_configuration() {
        let out = call_local("debug_login_header", &Map::new(), Some("1112223333")).unwrap();
        assert_eq!(out["login_customer_id"], "1112223333");
        let out = call_local("debug_login_header", &Map::new(), None).unwrap();
        assert!(out["login_customer_id"].is_null());
    }

    #[test]
    fn unknown_local_tool_is_an_error() {
        assert!(call_local("fetch_metrics", &Map::new(), None).is_err());
    }
}
