//! Tool trait and types.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Name prefix that marks a tool as backed by an external MCP server.
///
/// Everything else is a *local* tool and executes in the host process.
pub const MCP_TOOL_PREFIX: &str = "mcp_";

/// Whether the given tool name denotes an MCP tool.
pub fn is_mcp_tool(name: &str) -> bool {
    name.starts_with(MCP_TOOL_PREFIX)
}

/// Error type for tool execution.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("{0}")]
    CircuitOpen(String),
}

impl ToolError {
    /// Whether this error came from argument validation.
    ///
    /// The MCP bridge appends the original and normalized arguments to
    /// validation errors so the model can see what it actually sent.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidParameters(_))
    }
}

/// Trait for tools the runtime can bind into generated programs.
///
/// MCP descriptors and local tools share this shape; the `mcp_` name prefix
/// is what routes a call through the bridge instead of the local registry.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Stable tool identifier. Must be a valid identifier in the worker's
    /// language, since a callable with this exact name is generated.
    fn name(&self) -> &str;

    /// Human-readable description, surfaced in tool documentation.
    fn description(&self) -> &str;

    /// JSON Schema for the tool's input.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, args: Value) -> Result<Value, ToolError>;
}

/// Extract a required string parameter from a JSON object.
pub fn require_str<'a>(params: &'a Value, name: &str) -> Result<&'a str, ToolError> {
    params
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidParameters(format!("missing '{name}' parameter")))
}

/// Lenient structural validation of a tool's `parameters_schema()`.
///
/// Applied at registration time to catch declared-schema mistakes before a
/// generated program ever calls the tool. Returns a list of problems; an
/// empty list means the schema is usable.
///
/// Rules: the top level must be `"type": "object"` with an object
/// `"properties"`; every `"required"` entry must name a declared property;
/// nested objects follow the same rules; array properties should declare
/// `"items"`. Properties without a `"type"` are allowed (freeform).
pub fn validate_tool_schema(schema: &Value, path: &str) -> Vec<String> {
    let mut problems = Vec::new();

    match schema.get("type").and_then(|t| t.as_str()) {
        Some("object") => {}
        Some(other) => {
            problems.push(format!("{path}: expected type \"object\", got \"{other}\""));
            return problems;
        }
        None => {
            problems.push(format!("{path}: missing \"type\": \"object\""));
            return problems;
        }
    }

    let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) else {
        problems.push(format!("{path}: missing or non-object \"properties\""));
        return problems;
    };

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for entry in required {
            if let Some(key) = entry.as_str()
                && !properties.contains_key(key)
            {
                problems.push(format!(
                    "{path}: required key \"{key}\" not found in properties"
                ));
            }
        }
    }

    for (key, prop) in properties {
        let prop_path = format!("{path}.{key}");
        match prop.get("type").and_then(|t| t.as_str()) {
            Some("object") => problems.extend(validate_tool_schema(prop, &prop_path)),
            Some("array") => match prop.get("items") {
                Some(items) if items.get("type").and_then(|t| t.as_str()) == Some("object") => {
                    problems.extend(validate_tool_schema(items, &format!("{prop_path}.items")));
                }
                Some(_) => {}
                None => problems.push(format!("{prop_path}: array property missing \"items\"")),
            },
            _ => {}
        }
    }

    problems
}
