//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use ads_mcp_gateway::config::Config;
use ads_mcp_gateway::mcp::RpcDispatcher;
use ads_mcp_gateway::upstream::retry::classify_error;
use ads_mcp_gateway::upstream::{AccountNode, RetryPolicy, ToolBackend, ToolError};

/// A backend that replays scripted outcomes and counts calls.
#[derive(Default)]
pub struct ScriptedBackend {
    outcomes: Mutex<VecDeque<Result<Value, ToolError>>>,
    accounts: Vec<AccountNode>,
    pub calls: AtomicUsize,
    pub hierarchy_calls: AtomicUsize,
    pub last_arguments: Mutex<Option<Map<String, Value>>>,
}

impl ScriptedBackend {
    pub fn new(outcomes: impl IntoIterator<Item = Result<Value, ToolError>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn with_accounts(mut self, accounts: &[(&str, &str)]) -> Self {
        self.accounts = accounts
            .iter()
            .map(|(id, name)| AccountNode {
                id: (*id).to_string(),
                name: (*name).to_string(),
            })
            .collect();
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn hierarchy_calls(&self) -> usize {
        self.hierarchy_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolBackend for ScriptedBackend {
    async fn call_tool(
        &self,
        _name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_arguments.lock().unwrap() = Some(arguments.clone());
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(json!({"rows": []})))
    }

    async fn account_hierarchy(&self, _root_id: &str) -> Result<Vec<AccountNode>, ToolError> {
        self.hierarchy_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.accounts.clone())
    }
}

/// A backend whose reporting calls panic.
pub struct PanickingBackend;

#[async_trait]
impl ToolBackend for PanickingBackend {
    async fn call_tool(
        &self,
        name: &str,
        _arguments: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        panic!("backend exploded while running {name}");
    }

    async fn account_hierarchy(&self, _root_id: &str) -> Result<Vec<AccountNode>, ToolError> {
        Ok(Vec::new())
    }
}

/// Default retry classification without any waiting.
pub fn instant_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, classify_error, |_| Duration::ZERO)
}

pub fn config(value: Value) -> Config {
    serde_json::from_value(value).unwrap()
}

pub fn dispatcher(config: &Config, backend: Arc<dyn ToolBackend>) -> RpcDispatcher {
    RpcDispatcher::from_config(config, backend).with_retry_policy(instant_retry(3))
}

pub fn request(id: u64, method: &str, params: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params})
}

pub fn tool_call(id: u64, name: &str, arguments: Value) -> Value {
    request(id, "tools/call", json!({"name": name, "arguments": arguments}))
}
