//! Tool registry.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::tools::tool::{Tool, ToolError, is_mcp_tool, validate_tool_schema};

/// Registry of tools, split into local and MCP by the `mcp_` name prefix.
///
/// Declaration order is preserved; lookups are by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    by_name: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, validating its declared schema.
    ///
    /// Rejects duplicate names and structurally broken schemas so problems
    /// surface at wiring time rather than mid-execution.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.by_name.contains_key(&name) {
            return Err(ToolError::InvalidParameters(format!(
                "duplicate tool name '{name}'"
            )));
        }

        let problems = validate_tool_schema(&tool.parameters_schema(), &name);
        if !problems.is_empty() {
            tracing::warn!(tool = %name, ?problems, "rejecting tool with invalid schema");
            return Err(ToolError::InvalidParameters(format!(
                "schema for '{name}' is invalid: {}",
                problems.join("; ")
            )));
        }

        self.by_name.insert(name, Arc::clone(&tool));
        self.tools.push(tool);
        Ok(())
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.by_name.get(name).cloned()
    }

    /// The declared input schema for a tool, if registered.
    pub fn schema_for(&self, name: &str) -> Option<Value> {
        self.by_name.get(name).map(|t| t.parameters_schema())
    }

    /// All tool names in declaration order.
    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    /// Local tool names in declaration order.
    pub fn local_names(&self) -> Vec<String> {
        self.tools
            .iter()
            .map(|t| t.name().to_string())
            .filter(|n| !is_mcp_tool(n))
            .collect()
    }

    /// MCP tool names in declaration order.
    pub fn mcp_names(&self) -> Vec<String> {
        self.tools
            .iter()
            .map(|t| t.name().to_string())
            .filter(|n| is_mcp_tool(n))
            .collect()
    }

    /// All tools in declaration order.
    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    /// MCP tools in declaration order.
    pub fn mcp_tools(&self) -> Vec<Arc<dyn Tool>> {
        self.tools
            .iter()
            .filter(|t| is_mcp_tool(t.name()))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubTool;
    use serde_json::json;

    #[test]
    fn registration_preserves_declaration_order() {
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(StubTool::fixed("zeta", json!(1))))
            .unwrap();
        registry
            .register(Arc::new(StubTool::fixed("mcp_alpha", json!(2))))
            .unwrap();
        registry
            .register(Arc::new(StubTool::fixed("beta", json!(3))))
            .unwrap();

        assert_eq!(registry.names(), vec!["zeta", "mcp_alpha", "beta"]);
        assert_eq!(registry.local_names(), vec!["zeta", "beta"]);
        assert_eq!(registry.mcp_names(), vec!["mcp_alpha"]);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(StubTool::fixed("echo", json!(null))))
            .unwrap();
        let err = registry
            .register(Arc::new(StubTool::fixed("echo", json!(null))))
            .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn broken_schema_is_rejected() {
        let tool = StubTool::fixed("bad", json!(null)).with_schema(json!({"type": "string"}));
        let mut registry = ToolRegistry::new();
        let err = registry.register(Arc::new(tool)).unwrap_err();
        assert!(err.to_string().contains("schema for 'bad' is invalid"));
    }

    #[test]
    fn lookup_and_schema() {
        let mut registry = ToolRegistry::new();
        let schema = json!({
            "type": "object",
            "properties": { "id": { "type": "string" } },
            "required": ["id"]
        });
        registry
            .register(Arc::new(
                StubTool::fixed("getUser", json!({"id": "1"})).with_schema(schema.clone()),
            ))
            .unwrap();

        assert!(registry.get("getUser").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.schema_for("getUser"), Some(schema));
    }
}
