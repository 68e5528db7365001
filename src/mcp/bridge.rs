//! MCP bridge: the per-tool dispatcher between generated programs and
//! external MCP tools.
//!
//! Every call is normalized on the way in, timeout-guarded, normalized on
//! the way out, and recorded. Repeated failures of the same
//! (tool, normalized arguments) signature open a circuit breaker so a
//! misbehaving program cannot hammer an external server with an invocation
//! that is never going to work.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::config::BridgeConfig;
use crate::mcp::params::normalize_parameters;
use crate::mcp::response::normalize_response;
use crate::mcp::schema::{OutputSchema, infer_output_schema, is_more_detailed};
use crate::tools::{Tool, ToolCallRecord, ToolError};

#[derive(Default)]
struct BridgeState {
    records: Vec<ToolCallRecord>,
    failure_counts: HashMap<String, u32>,
    warnings: Vec<String>,
    learned: HashMap<String, OutputSchema>,
}

/// Dispatcher for MCP-prefixed tools.
pub struct McpBridge {
    tools: HashMap<String, Arc<dyn Tool>>,
    /// Declared input schemas, cached at construction.
    input_schemas: HashMap<String, Value>,
    config: BridgeConfig,
    state: Mutex<BridgeState>,
}

impl McpBridge {
    /// Build a bridge over the given MCP tool descriptors.
    pub fn new(tools: Vec<Arc<dyn Tool>>, config: BridgeConfig) -> Self {
        let input_schemas = tools
            .iter()
            .map(|t| (t.name().to_string(), t.parameters_schema()))
            .collect();
        let tools = tools
            .into_iter()
            .map(|t| (t.name().to_string(), t))
            .collect();
        Self {
            tools,
            input_schemas,
            config,
            state: Mutex::new(BridgeState::default()),
        }
    }

    /// Handle one MCP tool call.
    pub async fn handle(&self, tool_name: &str, args: Value) -> Result<Value, ToolError> {
        let started = Instant::now();

        let schema = self.input_schemas.get(tool_name);
        let normalized = normalize_parameters(tool_name, &args, schema);
        let signature = call_signature(tool_name, &normalized.normalized);

        {
            let mut state = self.state.lock().await;
            for warning in &normalized.warnings {
                state.warnings.push(format!("{tool_name}: {warning}"));
            }
            let failures = state.failure_counts.get(&signature).copied().unwrap_or(0);
            if failures >= self.config.max_retries {
                tracing::warn!(tool = tool_name, failures, "circuit open, refusing call");
                return Err(ToolError::CircuitOpen(format!(
                    "{tool_name} failed {failures} times with the same parameters; \
                     not retrying (change the arguments or reset the bridge)"
                )));
            }
        }

        let mut record = ToolCallRecord::begin(tool_name, args.clone(), true)
            .with_normalized_args(normalized.normalized.clone());

        let outcome = self
            .execute_tool(tool_name, normalized.normalized.clone())
            .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let mut state = self.state.lock().await;
        match outcome {
            Ok(raw) => {
                let transformed = normalize_response(&raw);
                record = record
                    .with_raw_result(raw)
                    .succeed(transformed.clone(), elapsed_ms);
                state.failure_counts.remove(&signature);
                self.learn(&mut state, tool_name, &transformed);
                state.records.push(record);
                Ok(transformed)
            }
            Err(e) => {
                *state.failure_counts.entry(signature).or_insert(0) += 1;
                let message = if e.is_validation() {
                    format!(
                        "{e} (original arguments: {}, normalized arguments: {})",
                        args, normalized.normalized
                    )
                } else {
                    e.to_string()
                };
                tracing::debug!(tool = tool_name, error = %message, "MCP call failed");
                record = record.fail(message.clone(), elapsed_ms);
                state.records.push(record);
                Err(ToolError::ExecutionFailed(message))
            }
        }
    }

    async fn execute_tool(&self, tool_name: &str, args: Value) -> Result<Value, ToolError> {
        let Some(tool) = self.tools.get(tool_name) else {
            return Err(ToolError::UnknownTool(tool_name.to_string()));
        };
        match tokio::time::timeout(self.config.timeout, tool.execute(args)).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout(self.config.timeout)),
        }
    }

    /// Refine the learned output schema for a tool, keeping the most
    /// detailed observation.
    fn learn(&self, state: &mut BridgeState, tool_name: &str, transformed: &Value) {
        let successful = transformed.get("success").and_then(|s| s.as_bool()) != Some(false)
            && transformed.get("error").is_none();
        if !successful {
            return;
        }
        let observed = infer_output_schema(transformed);
        match state.learned.get(tool_name) {
            Some(known) if !is_more_detailed(&observed, known) => {}
            _ => {
                state.learned.insert(tool_name.to_string(), observed);
            }
        }
    }

    /// Fan out a batch of calls concurrently; results come back in input
    /// order.
    pub async fn execute_batch(
        &self,
        requests: Vec<(String, Value)>,
    ) -> Vec<Result<Value, ToolError>> {
        join_all(
            requests
                .into_iter()
                .map(|(name, args)| async move { self.handle(&name, args).await }),
        )
        .await
    }

    /// Records of every call since the last reset, in observation order.
    pub async fn records(&self) -> Vec<ToolCallRecord> {
        self.state.lock().await.records.clone()
    }

    /// Normalization warnings accumulated since the last reset.
    pub async fn warnings(&self) -> Vec<String> {
        self.state.lock().await.warnings.clone()
    }

    /// The learned output schema for a tool, if any call has succeeded.
    pub async fn learned_schema(&self, tool_name: &str) -> Option<OutputSchema> {
        self.state.lock().await.learned.get(tool_name).cloned()
    }

    /// Current failure count for a (tool, normalized arguments) signature.
    pub async fn failure_count(&self, tool_name: &str, normalized_args: &Value) -> u32 {
        let signature = call_signature(tool_name, normalized_args);
        self.state
            .lock()
            .await
            .failure_counts
            .get(&signature)
            .copied()
            .unwrap_or(0)
    }

    /// Clear records, failure counts, and warnings. Learned schemas are
    /// kept: they describe the tools, not the execution.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.records.clear();
        state.failure_counts.clear();
        state.warnings.clear();
    }

    /// Names of the bridged tools, in no particular order.
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }
}

fn call_signature(tool_name: &str, normalized_args: &Value) -> String {
    match serde_json::to_string(normalized_args) {
        Ok(json) => format!("{tool_name}::{json}"),
        Err(_) => format!("{tool_name}::unserializable::{:?}", Instant::now()),
    }
}
