//! Wire types and path conventions for the host–worker file protocol.
//!
//! The worker's only ABI is the filesystem: it writes one request document
//! per tool call and polls for the matching response document. Identifiers
//! are generated by the worker and unique per call, so neither side needs
//! locks and no two stubs can consume the same response.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Generated program, installed by the host.
pub const SCRIPT_FILE: &str = "execute.js";

/// Output document, written by the worker exactly once per run.
pub const OUTPUT_FILE: &str = "sandbox_output.json";

const LOCAL_REQUEST_PREFIX: &str = "tool_call_";
const LOCAL_RESPONSE_PREFIX: &str = "tool_result_";
const MCP_REQUEST_PREFIX: &str = "mcp_call_";
const MCP_RESPONSE_PREFIX: &str = "mcp_result_";
const JSON_SUFFIX: &str = ".json";

/// Which side of the tool registry a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Local,
    Mcp,
}

/// Request envelope, worker to host. One document per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcRequest {
    pub tool_name: String,
    #[serde(default)]
    pub args: Value,
    /// Present for MCP calls; local calls carry the id in the filename only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: RequestKind,
}

/// Response envelope, host to worker: `{data}` on success, `{error}` on
/// failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcResponse {
    Data { data: Value },
    Error { error: String },
}

impl RpcResponse {
    pub fn data(value: Value) -> Self {
        Self::Data { data: value }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }
}

/// The worker's output document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutput {
    pub success: bool,
    #[serde(default)]
    pub result: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_result: Option<PartialResult>,
}

/// Tool results collected before a program failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialResult {
    pub error: String,
    #[serde(default)]
    pub completed_results: Vec<Value>,
}

/// Parse a scratch-directory file name into a request kind and call id.
///
/// Response files and unrelated files yield `None`.
pub fn parse_request_filename(name: &str) -> Option<(RequestKind, &str)> {
    let stem = name.strip_suffix(JSON_SUFFIX)?;
    if let Some(id) = stem.strip_prefix(LOCAL_REQUEST_PREFIX) {
        return Some((RequestKind::Local, id));
    }
    if let Some(id) = stem.strip_prefix(MCP_REQUEST_PREFIX) {
        return Some((RequestKind::Mcp, id));
    }
    None
}

/// File name the worker writes a request to.
pub fn request_filename(kind: RequestKind, id: &str) -> String {
    match kind {
        RequestKind::Local => format!("{LOCAL_REQUEST_PREFIX}{id}{JSON_SUFFIX}"),
        RequestKind::Mcp => format!("{MCP_REQUEST_PREFIX}{id}{JSON_SUFFIX}"),
    }
}

/// File name the host writes the matching response to.
pub fn response_filename(kind: RequestKind, id: &str) -> String {
    match kind {
        RequestKind::Local => format!("{LOCAL_RESPONSE_PREFIX}{id}{JSON_SUFFIX}"),
        RequestKind::Mcp => format!("{MCP_RESPONSE_PREFIX}{id}{JSON_SUFFIX}"),
    }
}

/// Whether a scratch file belongs to the RPC protocol (request or
/// response). Used to sweep leftovers from an aborted run before reusing a
/// worker.
pub fn is_rpc_file(name: &str) -> bool {
    parse_request_filename(name).is_some()
        || (name.ends_with(JSON_SUFFIX)
            && (name.starts_with(LOCAL_RESPONSE_PREFIX) || name.starts_with(MCP_RESPONSE_PREFIX)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn local_request_wire_shape() {
        let request = RpcRequest {
            tool_name: "getUser".to_string(),
            args: json!([{"id": "1"}]),
            call_id: None,
            kind: RequestKind::Local,
        };
        let wire = serde_json::to_value(&request).unwrap();
        assert_eq!(
            wire,
            json!({"toolName": "getUser", "args": [{"id": "1"}], "type": "local"})
        );
    }

    #[test]
    fn mcp_request_wire_shape() {
        let wire: RpcRequest = serde_json::from_value(json!({
            "toolName": "mcp_scrape",
            "args": {"url": "https://e.com"},
            "callId": "a1",
            "type": "mcp"
        }))
        .unwrap();
        assert_eq!(wire.kind, RequestKind::Mcp);
        assert_eq!(wire.call_id.as_deref(), Some("a1"));
    }

    #[test]
    fn response_envelopes_are_bit_exact() {
        assert_eq!(
            serde_json::to_value(RpcResponse::data(json!({"avg": 20}))).unwrap(),
            json!({"data": {"avg": 20}})
        );
        assert_eq!(
            serde_json::to_value(RpcResponse::error("Unknown local tool: nope")).unwrap(),
            json!({"error": "Unknown local tool: nope"})
        );

        // And they parse back into the right variant.
        let parsed: RpcResponse = serde_json::from_value(json!({"error": "x"})).unwrap();
        assert!(matches!(parsed, RpcResponse::Error { .. }));
        let parsed: RpcResponse = serde_json::from_value(json!({"data": null})).unwrap();
        assert!(matches!(parsed, RpcResponse::Data { .. }));
    }

    #[test]
    fn filename_round_trip() {
        for kind in [RequestKind::Local, RequestKind::Mcp] {
            let name = request_filename(kind, "abc123");
            let (parsed_kind, id) = parse_request_filename(&name).unwrap();
            assert_eq!(parsed_kind, kind);
            assert_eq!(id, "abc123");
        }
    }

    #[test]
    fn response_and_foreign_files_are_not_requests() {
        assert!(parse_request_filename("tool_result_a.json").is_none());
        assert!(parse_request_filename("mcp_result_a.json").is_none());
        assert!(parse_request_filename("execute.js").is_none());
        assert!(parse_request_filename("sandbox_output.json").is_none());
        assert!(parse_request_filename("tool_call_a.txt").is_none());
    }

    #[test]
    fn rpc_file_classification() {
        assert!(is_rpc_file("tool_call_a.json"));
        assert!(is_rpc_file("tool_result_a.json"));
        assert!(is_rpc_file("mcp_call_a.json"));
        assert!(is_rpc_file("mcp_result_a.json"));
        assert!(!is_rpc_file("execute.js"));
        assert!(!is_rpc_file("sandbox_output.json"));
        assert!(!is_rpc_file("notes.txt"));
    }

    #[test]
    fn execution_output_with_partials() {
        let wire = json!({
            "success": false,
            "error": "getUser: boom",
            "stack": "Error: boom\n  at ...",
            "partialResult": {
                "error": "getUser: boom",
                "completedResults": [{"tool": "getUser", "result": {"id": "1"}}]
            }
        });
        let output: ExecutionOutput = serde_json::from_value(wire).unwrap();
        assert!(!output.success);
        let partial = output.partial_result.unwrap();
        assert_eq!(partial.completed_results.len(), 1);
    }
}
