//! Tool-call records.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// One physical tool call observed by the runtime.
///
/// Created when a request is observed and appended once per call; treated
/// as immutable afterwards.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRecord {
    pub tool_name: String,
    /// Arguments exactly as the program passed them.
    pub args: Value,
    /// Arguments after MCP parameter normalization, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized_args: Option<Value>,
    /// Raw result before response normalization, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_result: Option<Value>,
    /// Result as returned into the program.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "isMCP")]
    pub is_mcp: bool,
    pub elapsed_ms: u64,
    pub started_at: DateTime<Utc>,
}

impl ToolCallRecord {
    /// Start a record for a call observed now.
    pub fn begin(tool_name: impl Into<String>, args: Value, is_mcp: bool) -> Self {
        Self {
            tool_name: tool_name.into(),
            args,
            normalized_args: None,
            raw_result: None,
            result: None,
            error: None,
            is_mcp,
            elapsed_ms: 0,
            started_at: Utc::now(),
        }
    }

    /// Finish the record with a successful result.
    pub fn succeed(mut self, result: Value, elapsed_ms: u64) -> Self {
        self.result = Some(result);
        self.elapsed_ms = elapsed_ms;
        self
    }

    /// Finish the record with an error.
    pub fn fail(mut self, error: impl Into<String>, elapsed_ms: u64) -> Self {
        self.error = Some(error.into());
        self.elapsed_ms = elapsed_ms;
        self
    }

    /// Attach the normalized arguments that were actually sent.
    pub fn with_normalized_args(mut self, normalized: Value) -> Self {
        self.normalized_args = Some(normalized);
        self
    }

    /// Attach the raw result before response normalization.
    pub fn with_raw_result(mut self, raw: Value) -> Self {
        self.raw_result = Some(raw);
        self
    }

    /// Whether the call completed without error.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
