//! Tool catalog.
//!
//! The registry is fixed at startup and keeps tools in declaration order, so
//! `tools/list` output is stable. Each descriptor says whether the tool is
//! public (callable without the shared secret), whether it runs in-process
//! or upstream, and which arguments carry account identifiers.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use jsonschema::Validator;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{error, warn};

/// Where a tool runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    /// In-process diagnostic tool.
    Local,
    /// Forwarded to the reporting API.
    Upstream,
}

/// One entry in the catalog.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// Unique, case-sensitive tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the tool's arguments.
    pub input_schema: Value,
    /// Callable without credentials.
    #[serde(skip)]
    pub is_public: bool,
    /// Where the tool runs.
    #[serde(skip)]
    pub kind: ToolKind,
    /// Arguments that hold account ids or names.
    #[serde(skip)]
    pub identifier_arguments: Vec<String>,
    /// Set when the tool is registered.
    #[serde(skip)]
    pub validator: Option<CompiledSchema>,
}

impl ToolDescriptor {
    /// Checks `arguments` against the input schema.
    ///
    /// Uses the validator compiled at registration; a descriptor that was
    /// never registered compiles its schema on the spot.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first offending argument.
    pub fn validate_arguments(&self, arguments: &Map<String, Value>) -> Result<(), String> {
        let compiled;
        let validator = match &self.validator {
            Some(schema) => schema.0.as_ref(),
            None => {
                compiled = compile(&self.name, &self.input_schema)?;
                &compiled
            }
        };

        let instance = Value::Object(arguments.clone());
        let Some(error) = validator.iter_errors(&instance).next() else {
            return Ok(());
        };

        let path = error.instance_path.to_string();
        let path = path.trim_start_matches('/').replace('/', ".");
        Err(if path.is_empty() {
            format!("Invalid arguments: {error}")
        } else {
            format!("Invalid argument {path}: {error}")
        })
    }
}

/// A tool's input schema, compiled once.
#[derive(Clone)]
pub struct CompiledSchema(Arc<Validator>);

impl fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CompiledSchema")
    }
}

fn compile(name: &str, schema: &Value) -> Result<Validator, String> {
    jsonschema::validator_for(schema).map_err(|e| format!("Invalid input schema for tool {name}: {e}"))
}

/// The ordered, immutable tool catalog.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: IndexMap<String, ToolDescriptor>,
}

impl ToolRegistry {
    /// Builds a registry, compiling each input schema once.
    ///
    /// A repeated name keeps its first declaration. A tool whose schema does
    /// not compile is left out.
    #[must_use]
    pub fn new(tools: impl IntoIterator<Item = ToolDescriptor>) -> Self {
        let mut map = IndexMap::new();
        for mut tool in tools {
            if map.contains_key(&tool.name) {
                warn!(tool = %tool.name, "Duplicate tool name ignored");
                continue;
            }
            match compile(&tool.name, &tool.input_schema) {
                Ok(validator) => tool.validator = Some(CompiledSchema(Arc::new(validator))),
                Err(message) => {
                    error!(tool = %tool.name, %message, "Tool schema rejected");
                    continue;
                }
            }
            map.insert(tool.name.clone(), tool);
        }
        Self { tools: map }
    }

    /// The gateway's built-in catalog.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(builtin_tools())
    }

    /// Tools in declaration order; private tools only when `include_private`.
    #[must_use]
    pub fn list(&self, include_private: bool) -> Vec<&ToolDescriptor> {
        self.tools
            .values()
            .filter(|t| include_private || t.is_public)
            .collect()
    }

    /// Looks up a tool by exact name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    /// Names of the public tools.
    pub fn public_names(&self) -> impl Iterator<Item = &str> {
        self.tools
            .values()
            .filter(|t| t.is_public)
            .map(|t| t.name.as_str())
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` if no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

const DATE_PRESETS: [&str; 6] = [
    "TODAY",
    "YESTERDAY",
    "LAST_7_DAYS",
    "LAST_30_DAYS",
    "THIS_MONTH",
    "LAST_MONTH",
];

fn account_id_schema(description: &str) -> Value {
    json!({ "type": "string", "maxLength": 64, "description": description })
}

fn time_range_schema() -> Value {
    let day = json!({ "type": "string", "maxLength": 10, "pattern": r"^\d{4}-\d{2}-\d{2}$" });
    json!({
        "type": "object",
        "additionalProperties": false,
        "properties": { "since": day.clone(), "until": day }
    })
}

fn id_list_schema() -> Value {
    json!({
        "type": "array",
        "maxItems": 200,
        "items": { "type": "string", "maxLength": 30, "pattern": "^[0-9-]*$" }
    })
}

fn upstream(
    name: &str,
    description: &str,
    mut properties: Map<String, Value>,
    required: &[&str],
) -> ToolDescriptor {
    if name != "list_resources" {
        properties.insert(
            "customer_id".to_string(),
            account_id_schema("Account id (dashes allowed) or account name"),
        );
    }
    properties.insert(
        "login_customer_id".to_string(),
        account_id_schema("Optional manager account override, id or name"),
    );
    ToolDescriptor {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: json!({
            "type": "object",
            "additionalProperties": false,
            "properties": properties,
            "required": required,
        }),
        is_public: false,
        kind: ToolKind::Upstream,
        identifier_arguments: vec!["customer_id".to_string(), "login_customer_id".to_string()],
        validator: None,
    }
}

fn local(name: &str, description: &str, is_public: bool, input_schema: Value) -> ToolDescriptor {
    ToolDescriptor {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
        is_public,
        kind: ToolKind::Local,
        identifier_arguments: Vec::new(),
        validator: None,
    }
}

fn props(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[allow(clippy::too_many_lines)]
fn builtin_tools() -> Vec<ToolDescriptor> {
    let empty = json!({ "type": "object", "additionalProperties": false, "properties": {} });
    vec![
        upstream(
            "fetch_campaign_summary",
            "Per-campaign KPIs with computed ctr/cpc/cpa/roas. \
             Supports min_spend to filter by spend in the date range.",
            props(json!({
                "date_preset": { "type": "string", "enum": DATE_PRESETS },
                "time_range": time_range_schema(),
                "min_spend": {
                    "type": "number",
                    "minimum": 1,
                    "description": "Minimum spend (account currency) in the selected time range."
                }
            })),
            &[],
        ),
        upstream(
            "fetch_metrics",
            "Generic metrics for account/campaign/ad_group/ad. Optional min_spend filter.",
            props(json!({
                "entity": {
                    "type": "string",
                    "enum": ["account", "campaign", "ad_group", "ad"],
                    "default": "campaign"
                },
                "ids": id_list_schema(),
                "fields": {
                    "type": "array",
                    "maxItems": 100,
                    "items": { "type": "string", "maxLength": 64 }
                },
                "date_preset": { "type": "string", "enum": DATE_PRESETS },
                "time_range": time_range_schema(),
                "min_spend": { "type": "number", "minimum": 1 }
            })),
            &[],
        ),
        upstream(
            "fetch_search_terms",
            "Top search terms by spend (and optional filters).",
            props(json!({
                "date_preset": { "type": "string", "enum": DATE_PRESETS },
                "time_range": time_range_schema(),
                "min_spend": { "type": "number", "minimum": 1 },
                "min_clicks": { "type": "integer", "minimum": 0 },
                "campaign_ids": id_list_schema(),
                "ad_group_ids": id_list_schema(),
                "limit": { "type": "integer", "minimum": 1, "maximum": 1000, "default": 100 }
            })),
            &[],
        ),
        upstream(
            "fetch_change_history",
            "Change events within a date range (ordered by most recent).",
            props(json!({
                "time_range": time_range_schema(),
                "resource_types": {
                    "type": "array",
                    "maxItems": 50,
                    "items": { "type": "string", "maxLength": 64 }
                },
                "limit": { "type": "integer", "minimum": 1, "maximum": 1000, "default": 200 }
            })),
            &["time_range"],
        ),
        upstream(
            "fetch_budget_pacing",
            "Month-to-date spend and projected end-of-month spend against a target.",
            props(json!({
                "month": {
                    "type": "string",
                    "description": "YYYY-MM",
                    "maxLength": 7,
                    "pattern": r"^\d{4}-\d{2}$"
                },
                "target_spend": {
                    "type": "number",
                    "description": "Target for the month in account currency"
                }
            })),
            &["month", "target_spend"],
        ),
        upstream(
            "list_resources",
            "List the customer accounts accessible to the authenticated user.",
            Map::new(),
            &[],
        ),
        local("ping", "Health check (public).", true, empty.clone()),
        local(
            "debug_login_header",
            "Show which login_customer_id (manager account) the server will use.",
            false,
            empty.clone(),
        ),
        local(
            "echo_short",
            "Echo a short string. Use only for debugging tool calls.",
            true,
            json!({
                "type": "object",
                "additionalProperties": false,
                "properties": { "msg": { "type": "string", "maxLength": 80 } },
                "required": ["msg"]
            }),
        ),
        local("noop_ok", "Returns a tiny fixed JSON object.", true, empty),
    ]
}
