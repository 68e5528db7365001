//! Programmatic tool caller.
//!
//! Wraps a user tool set with the `code_execution` meta-tool: one model
//! generation orchestrates any number of tool calls inside the sandbox, and
//! only the aggregate result plus metadata re-enters the model's context.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};

use crate::config::{Config, SavingsConfig};
use crate::context::CODE_EXECUTION_TOOL_NAME;
use crate::estimation::{SavingsBreakdown, compute_savings};
use crate::mcp::McpBridge;
use crate::runtime::serialize::safe_json;
use crate::sandbox::{HELPER_NAMES, SandboxController, SandboxError, WorkerProvider};
use crate::tools::{
    Tool, ToolCallRecord, ToolError, ToolRegistry, generate_tool_documentation, require_str,
};

/// Cap on per-call result previews in the metadata envelope.
const RESULT_PREVIEW_LIMIT: usize = 200;

/// One tool call, summarized for the metadata envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxCallSummary {
    pub tool_name: String,
    #[serde(rename = "isMCP")]
    pub is_mcp: bool,
    pub success: bool,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_preview: Option<String>,
}

impl From<&ToolCallRecord> for SandboxCallSummary {
    fn from(record: &ToolCallRecord) -> Self {
        let result_preview = record.result.as_ref().map(|r| {
            let mut text = r.to_string();
            if text.len() > RESULT_PREVIEW_LIMIT {
                let mut cut = RESULT_PREVIEW_LIMIT;
                while !text.is_char_boundary(cut) {
                    cut -= 1;
                }
                text.truncate(cut);
                text.push_str("...");
            }
            text
        });
        Self {
            tool_name: record.tool_name.clone(),
            is_mcp: record.is_mcp,
            success: record.is_success(),
            elapsed_ms: record.elapsed_ms,
            error: record.error.clone(),
            result_preview,
        }
    }
}

/// Metadata returned alongside every `code_execution` result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMetadata {
    pub tool_call_count: usize,
    pub local_tool_call_count: usize,
    pub mcp_tool_call_count: usize,
    pub intermediate_tokens_saved: u64,
    pub total_tokens_saved: u64,
    pub token_savings_breakdown: SavingsBreakdown,
    pub savings_explanation: String,
    pub tools_used: Vec<String>,
    pub mcp_tools_used: Vec<String>,
    pub local_tools_used: Vec<String>,
    pub execution_time_ms: u64,
    pub sandbox_tool_calls: Vec<SandboxCallSummary>,
}

/// Build the metadata envelope from the observed tool calls.
pub fn build_metadata(
    records: &[ToolCallRecord],
    execution_time_ms: u64,
    savings: &SavingsConfig,
) -> ExecutionMetadata {
    let report = compute_savings(records, savings);

    let mut tools_used = Vec::new();
    for record in records {
        if !tools_used.contains(&record.tool_name) {
            tools_used.push(record.tool_name.clone());
        }
    }
    let mcp_tools_used: Vec<String> = tools_used
        .iter()
        .filter(|n| crate::tools::is_mcp_tool(n))
        .cloned()
        .collect();
    let local_tools_used: Vec<String> = tools_used
        .iter()
        .filter(|n| !crate::tools::is_mcp_tool(n))
        .cloned()
        .collect();

    let mcp_count = records.iter().filter(|r| r.is_mcp).count();

    ExecutionMetadata {
        tool_call_count: records.len(),
        local_tool_call_count: records.len() - mcp_count,
        mcp_tool_call_count: mcp_count,
        intermediate_tokens_saved: report.breakdown.intermediate_results,
        total_tokens_saved: report.total,
        token_savings_breakdown: report.breakdown,
        savings_explanation: report.explanation,
        tools_used,
        mcp_tools_used,
        local_tools_used,
        execution_time_ms,
        sandbox_tool_calls: records.iter().map(SandboxCallSummary::from).collect(),
    }
}

/// Splits a tool set into local and MCP halves and exposes the
/// `code_execution` meta-tool over both.
pub struct ProgrammaticToolCaller {
    tools: Vec<Arc<dyn Tool>>,
    registry: Arc<ToolRegistry>,
    bridge: Arc<McpBridge>,
    controller: Arc<SandboxController>,
    savings: SavingsConfig,
    execution_timeout: Duration,
}

impl ProgrammaticToolCaller {
    /// Wire a tool set to a worker provider.
    pub fn new(
        tools: Vec<Arc<dyn Tool>>,
        provider: Arc<dyn WorkerProvider>,
        config: Config,
    ) -> Result<Self, ToolError> {
        let mut registry = ToolRegistry::new();
        for tool in &tools {
            registry.register(Arc::clone(tool))?;
        }
        let registry = Arc::new(registry);

        let bridge = Arc::new(McpBridge::new(registry.mcp_tools(), config.bridge.clone()));
        let controller = Arc::new(SandboxController::new(
            provider,
            Arc::clone(&registry),
            Arc::clone(&bridge),
            config.sandbox.clone(),
            config.bridge.timeout,
        ));

        Ok(Self {
            tools,
            registry,
            bridge,
            controller,
            savings: config.savings,
            execution_timeout: config.sandbox.execution_timeout,
        })
    }

    /// Local and MCP tool names, in declaration order.
    pub fn all_tool_names(&self) -> Vec<String> {
        let mut names = self.registry.local_names();
        names.extend(self.registry.mcp_names());
        names
    }

    /// Human-readable documentation for every wrapped tool.
    pub fn generate_tool_documentation(&self) -> String {
        generate_tool_documentation(self.registry.tools())
    }

    /// The `code_execution` meta-tool descriptor.
    pub fn create_code_execution_tool(&self) -> Arc<dyn Tool> {
        Arc::new(CodeExecutionTool {
            controller: Arc::clone(&self.controller),
            description: self.describe_code_execution(),
            savings: self.savings.clone(),
            execution_timeout: self.execution_timeout,
        })
    }

    /// The original tools plus `code_execution`.
    pub fn create_enhanced_tool_set(&self) -> Vec<Arc<dyn Tool>> {
        let mut set = self.tools.clone();
        set.push(self.create_code_execution_tool());
        set
    }

    /// The sandbox controller backing `code_execution`.
    pub fn controller(&self) -> &Arc<SandboxController> {
        &self.controller
    }

    /// The MCP bridge backing `code_execution`.
    pub fn bridge(&self) -> &Arc<McpBridge> {
        &self.bridge
    }

    fn describe_code_execution(&self) -> String {
        let local = self.registry.local_names();
        let mcp = self.registry.mcp_names();
        format!(
            "Execute a JavaScript program in an isolated sandbox with your tools bound as \
             async functions. Call several tools, combine their results, and return one \
             aggregate value; only that value re-enters your context.\n\
             \n\
             Local tools (variadic arguments): {local}\n\
             MCP tools (call with exactly ONE parameters object, e.g. \
             mcp_tool({{url: \"...\"}})): {mcp}\n\
             \n\
             Helper functions available for defensive access to variable response \
             shapes: {helpers}. Prefer extractData/extractText over direct property \
             chains; MCP responses vary.\n\
             \n\
             Use `return` for the final value. `await` is allowed at the top level. \
             Promise.all runs tool calls in parallel.\n\
             \n\
             Tool reference:\n{docs}",
            local = if local.is_empty() {
                "(none)".to_string()
            } else {
                local.join(", ")
            },
            mcp = if mcp.is_empty() {
                "(none)".to_string()
            } else {
                mcp.join(", ")
            },
            helpers = HELPER_NAMES.join(", "),
            docs = self.generate_tool_documentation(),
        )
    }
}

/// The meta-tool itself.
struct CodeExecutionTool {
    controller: Arc<SandboxController>,
    description: String,
    savings: SavingsConfig,
    execution_timeout: Duration,
}

#[async_trait]
impl Tool for CodeExecutionTool {
    fn name(&self) -> &str {
        CODE_EXECUTION_TOOL_NAME
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "JavaScript program to run in the sandbox"
                }
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let code = require_str(&args, "code")?;
        let started = Instant::now();

        let outcome = tokio::time::timeout(self.execution_timeout, self.controller.execute(code))
            .await;
        let execution_time_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Err(_) => {
                let observed = self.controller.last_tool_calls().await.len();
                tracing::warn!(
                    observed_calls = observed,
                    "code_execution hit the outer timeout"
                );
                Err(map_sandbox_error(SandboxError::ExecutionTimeout {
                    timeout: self.execution_timeout,
                }))
            }
            Ok(Err(e)) => Err(map_sandbox_error(e)),
            Ok(Ok(result)) => {
                let metadata =
                    build_metadata(&result.tool_calls, execution_time_ms, &self.savings);
                Ok(json!({
                    "result": safe_json(&result.output),
                    "metadata": safe_json(&metadata),
                }))
            }
        }
    }
}

fn map_sandbox_error(e: SandboxError) -> ToolError {
    match e {
        SandboxError::ExecutionFailed {
            error,
            partial_result: Some(partial),
        } => ToolError::ExecutionFailed(format!(
            "{error} (partial results: {})",
            safe_json(&partial)
        )),
        SandboxError::ExecutionTimeout { timeout } => ToolError::Timeout(timeout),
        syntax @ SandboxError::SyntaxInvalid { .. } => {
            ToolError::InvalidParameters(syntax.to_string())
        }
        other => ToolError::ExecutionFailed(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedWorkerProvider, StubTool};
    use chrono::Utc;

    fn record(name: &str, result: Option<Value>, is_mcp: bool) -> ToolCallRecord {
        let r = ToolCallRecord::begin(name, json!({}), is_mcp);
        match result {
            Some(value) => r.succeed(value, 3),
            None => r.fail("nope", 3),
        }
    }

    #[test]
    fn metadata_counts_are_consistent() {
        let records = vec![
            record("getUser", Some(json!({"id": "1"})), false),
            record("getUser", Some(json!({"id": "2"})), false),
            record("mcp_scrape", Some(json!({"markdown": "x"})), true),
            record("average", None, false),
        ];
        let metadata = build_metadata(&records, 120, &SavingsConfig::default());

        assert_eq!(metadata.tool_call_count, 4);
        assert_eq!(metadata.local_tool_call_count, 3);
        assert_eq!(metadata.mcp_tool_call_count, 1);
        assert_eq!(metadata.sandbox_tool_calls.len(), metadata.tool_call_count);
        assert_eq!(metadata.tools_used, vec!["getUser", "mcp_scrape", "average"]);
        assert_eq!(metadata.mcp_tools_used, vec!["mcp_scrape"]);
        assert_eq!(metadata.local_tools_used, vec!["getUser", "average"]);
        assert_eq!(metadata.execution_time_ms, 120);
        assert_eq!(
            metadata.token_savings_breakdown.total(),
            metadata.total_tokens_saved
        );
    }

    #[test]
    fn metadata_serializes_with_wire_names() {
        let records = vec![
            record("a", Some(json!(1)), false),
            record("mcp_b", Some(json!(2)), true),
        ];
        let metadata = build_metadata(&records, 10, &SavingsConfig::default());
        let wire = serde_json::to_value(&metadata).unwrap();

        assert!(wire.get("toolCallCount").is_some());
        assert!(wire.get("mcpToolCallCount").is_some());
        assert!(wire.get("intermediateTokensSaved").is_some());
        assert!(wire.get("tokenSavingsBreakdown").is_some());
        assert!(wire["tokenSavingsBreakdown"].get("roundTripContext").is_some());
        assert!(wire.get("savingsExplanation").is_some());
        assert!(wire.get("sandboxToolCalls").is_some());
        assert_eq!(wire["sandboxToolCalls"][1]["isMCP"], true);
    }

    #[test]
    fn long_results_are_previewed() {
        let big = "x".repeat(1000);
        let records = vec![record("a", Some(json!(big)), false)];
        let metadata = build_metadata(&records, 1, &SavingsConfig::default());
        let preview = metadata.sandbox_tool_calls[0]
            .result_preview
            .as_ref()
            .unwrap();
        assert!(preview.len() <= RESULT_PREVIEW_LIMIT + 3);
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn record_timestamps_order_summaries() {
        // Observation order survives into the summaries.
        let first = record("a", Some(json!(1)), false);
        let second = record("b", Some(json!(2)), false);
        assert!(first.started_at <= Utc::now());
        let metadata = build_metadata(&[first, second], 1, &SavingsConfig::default());
        assert_eq!(metadata.sandbox_tool_calls[0].tool_name, "a");
        assert_eq!(metadata.sandbox_tool_calls[1].tool_name, "b");
    }

    #[tokio::test]
    async fn caller_splits_tools_and_describes_them() {
        let provider = Arc::new(ScriptedWorkerProvider::returning(json!(null)));
        let caller = ProgrammaticToolCaller::new(
            vec![
                Arc::new(StubTool::fixed("getUser", json!({}))) as Arc<dyn Tool>,
                Arc::new(StubTool::fixed("mcp_scrape", json!({}))) as Arc<dyn Tool>,
            ],
            provider,
            Config::default(),
        )
        .unwrap();

        assert_eq!(caller.all_tool_names(), vec!["getUser", "mcp_scrape"]);

        let meta_tool = caller.create_code_execution_tool();
        assert_eq!(meta_tool.name(), "code_execution");
        assert!(meta_tool.description().contains("getUser"));
        assert!(meta_tool.description().contains("mcp_scrape"));
        assert!(meta_tool.description().contains("extractText"));

        let enhanced = caller.create_enhanced_tool_set();
        assert_eq!(enhanced.len(), 3);
        assert_eq!(enhanced[2].name(), "code_execution");
    }

    #[test]
    fn outer_timeout_maps_through_the_sandbox_taxonomy() {
        let err = map_sandbox_error(SandboxError::ExecutionTimeout {
            timeout: Duration::from_secs(25),
        });
        assert!(matches!(err, ToolError::Timeout(d) if d == Duration::from_secs(25)));
    }

    #[tokio::test]
    async fn code_execution_requires_code() {
        let provider = Arc::new(ScriptedWorkerProvider::returning(json!(null)));
        let caller =
            ProgrammaticToolCaller::new(vec![], provider, Config::default()).unwrap();
        let tool = caller.create_code_execution_tool();
        let err = tool.execute(json!({})).await.unwrap_err();
        assert!(err.to_string().contains("missing 'code'"));
    }
}
