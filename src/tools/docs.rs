//! LLM-facing tool documentation.

use std::sync::Arc;

use serde_json::Value;

use crate::tools::tool::Tool;

/// Render `name: description` plus parameter lines for each tool.
///
/// The output is meant to be embedded verbatim into the `code_execution`
/// tool description so the model knows what callables exist and what they
/// take.
pub fn generate_tool_documentation(tools: &[Arc<dyn Tool>]) -> String {
    let mut out = String::new();
    for tool in tools {
        out.push_str(tool.name());
        out.push_str(": ");
        out.push_str(tool.description());
        out.push('\n');

        let schema = tool.parameters_schema();
        let required = required_names(&schema);
        if let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) {
            for (name, prop) in properties {
                describe_property(name, prop, required.contains(&name.as_str()), 1, &mut out);
            }
        }
    }
    out
}

fn required_names(schema: &Value) -> Vec<&str> {
    schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|entries| entries.iter().filter_map(|e| e.as_str()).collect())
        .unwrap_or_default()
}

fn describe_property(name: &str, prop: &Value, required: bool, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    let requirement = if required { "required" } else { "optional" };
    let description = prop
        .get("description")
        .and_then(|d| d.as_str())
        .unwrap_or("");

    out.push_str(&format!(
        "{indent}- {name} ({}, {requirement})",
        type_label(prop)
    ));
    if !description.is_empty() {
        out.push_str(": ");
        out.push_str(description);
    }
    out.push('\n');

    // Expand nested object shapes one level at a time.
    let nested = match prop.get("type").and_then(|t| t.as_str()) {
        Some("object") => prop.get("properties"),
        Some("array") => prop
            .get("items")
            .filter(|i| i.get("type").and_then(|t| t.as_str()) == Some("object"))
            .and_then(|i| i.get("properties")),
        _ => None,
    };
    if let Some(properties) = nested.and_then(|p| p.as_object()) {
        let nested_required = prop
            .get("items")
            .map(required_names)
            .unwrap_or_else(|| required_names(prop));
        for (child, child_prop) in properties {
            describe_property(
                child,
                child_prop,
                nested_required.contains(&child.as_str()),
                depth + 1,
                out,
            );
        }
    }
}

fn type_label(prop: &Value) -> String {
    match prop.get("type").and_then(|t| t.as_str()) {
        Some("array") => {
            let item = prop
                .get("items")
                .and_then(|i| i.get("type"))
                .and_then(|t| t.as_str())
                .unwrap_or("any");
            format!("array of {item}")
        }
        Some(other) => other.to_string(),
        None => "any".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubTool;
    use serde_json::json;

    #[test]
    fn documents_parameters_with_requirement() {
        let tool = StubTool::fixed("getUser", json!(null))
            .with_description("Fetch a user by id.")
            .with_schema(json!({
                "type": "object",
                "properties": {
                    "id": { "type": "string", "description": "User identifier" },
                    "verbose": { "type": "boolean" }
                },
                "required": ["id"]
            }));
        let docs = generate_tool_documentation(&[Arc::new(tool) as Arc<dyn Tool>]);

        assert!(docs.contains("getUser: Fetch a user by id."));
        assert!(docs.contains("- id (string, required): User identifier"));
        assert!(docs.contains("- verbose (boolean, optional)"));
    }

    #[test]
    fn documents_array_item_and_nested_object_shapes() {
        let tool = StubTool::fixed("mcp_extract", json!(null)).with_schema(json!({
            "type": "object",
            "properties": {
                "urls": { "type": "array", "items": { "type": "string" } },
                "options": {
                    "type": "object",
                    "properties": {
                        "depth": { "type": "number" }
                    }
                }
            },
            "required": ["urls"]
        }));
        let docs = generate_tool_documentation(&[Arc::new(tool) as Arc<dyn Tool>]);

        assert!(docs.contains("- urls (array of string, required)"));
        assert!(docs.contains("- options (object, optional)"));
        assert!(docs.contains("  - depth (number, optional)"));
    }
}
