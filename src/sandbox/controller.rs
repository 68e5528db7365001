//! Sandbox controller: worker lifecycle, RPC monitoring, and output
//! collection.
//!
//! One worker instance is cached per controller and reused across
//! executions. Errors from the worker endpoint that look like a dead
//! session ("Gone", "410", "ECONNRESET") invalidate the cache and trigger
//! exactly one retry with a fresh worker. Concurrent `execute` calls on the
//! same controller are serialized by an internal lock.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::config::SandboxConfig;
use crate::mcp::McpBridge;
use crate::sandbox::error::{Result, SandboxError};
use crate::sandbox::protocol::{
    ExecutionOutput, OUTPUT_FILE, RequestKind, RpcRequest, RpcResponse, SCRIPT_FILE,
    is_rpc_file, parse_request_filename, response_filename,
};
use crate::sandbox::script::{ScriptOptions, generate_execution_script, validate_syntax};
use crate::sandbox::worker::{WorkerProvider, WorkerSession};
use crate::tools::{ToolCallRecord, ToolRegistry};

/// Output of one program execution.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// The value the program returned.
    pub output: Value,
    /// Every tool call observed, in observation order.
    pub tool_calls: Vec<ToolCallRecord>,
}

/// Orchestrates program execution in a sandboxed worker.
pub struct SandboxController {
    provider: Arc<dyn WorkerProvider>,
    registry: Arc<ToolRegistry>,
    bridge: Arc<McpBridge>,
    config: SandboxConfig,
    /// Per-call deadline handed to the generated stubs; equal to the
    /// bridge timeout.
    stub_timeout: std::time::Duration,
    /// Single-slot worker cache.
    worker: Mutex<Option<Arc<dyn WorkerSession>>>,
    /// Serializes executions; the worker is a singleton.
    exec_lock: Mutex<()>,
    /// Tool calls observed by the most recent execution.
    last_calls: Mutex<Vec<ToolCallRecord>>,
}

impl SandboxController {
    pub fn new(
        provider: Arc<dyn WorkerProvider>,
        registry: Arc<ToolRegistry>,
        bridge: Arc<McpBridge>,
        config: SandboxConfig,
        stub_timeout: std::time::Duration,
    ) -> Self {
        Self {
            provider,
            registry,
            bridge,
            config,
            stub_timeout,
            worker: Mutex::new(None),
            exec_lock: Mutex::new(()),
            last_calls: Mutex::new(Vec::new()),
        }
    }

    /// Execute a program in the worker, mediating its tool calls.
    pub async fn execute(&self, program: &str) -> Result<ExecutionResult> {
        let _guard = self.exec_lock.lock().await;
        self.last_calls.lock().await.clear();
        self.bridge.reset().await;
        validate_syntax(program)?;

        let execution_id = Uuid::new_v4();
        let local_records = Arc::new(Mutex::new(Vec::new()));
        let mut retried = false;
        loop {
            let worker = self.ensure_worker().await?;
            let script = generate_execution_script(
                program,
                &self.registry.local_names(),
                &self.registry.mcp_names(),
                &ScriptOptions {
                    scratch_dir: worker.scratch_dir().to_string(),
                    stub_poll: self.config.stub_poll,
                    call_timeout: self.stub_timeout,
                },
            )?;

            match self.run_once(&worker, &script, &local_records).await {
                Ok(result) => {
                    tracing::info!(
                        %execution_id,
                        tool_calls = result.tool_calls.len(),
                        "execution completed"
                    );
                    return Ok(result);
                }
                Err(e) => {
                    let e = e.classify();
                    if e.is_stale_session() && !retried {
                        retried = true;
                        tracing::warn!(
                            %execution_id,
                            error = %e,
                            "stale worker session, provisioning a fresh worker"
                        );
                        *self.worker.lock().await = None;
                        continue;
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Tool calls observed by the most recent `execute`, including failed
    /// ones. Useful when `execute` itself returned an error.
    pub async fn last_tool_calls(&self) -> Vec<ToolCallRecord> {
        self.last_calls.lock().await.clone()
    }

    /// Drop the cached worker, forcing the next execution to provision.
    pub async fn reset_worker(&self) {
        *self.worker.lock().await = None;
    }

    async fn ensure_worker(&self) -> Result<Arc<dyn WorkerSession>> {
        let mut slot = self.worker.lock().await;
        if let Some(worker) = slot.as_ref() {
            return Ok(Arc::clone(worker));
        }
        let worker = self.provider.provision().await?;
        *slot = Some(Arc::clone(&worker));
        Ok(worker)
    }

    async fn run_once(
        &self,
        worker: &Arc<dyn WorkerSession>,
        script: &str,
        local_records: &Arc<Mutex<Vec<ToolCallRecord>>>,
    ) -> Result<ExecutionResult> {
        // Leftovers from an aborted run must not be mistaken for this
        // run's traffic: sweep the output document and any RPC files.
        worker.delete_file(OUTPUT_FILE).await.ok();
        if let Ok(files) = worker.list_files().await {
            for name in files.iter().filter(|n| is_rpc_file(n)) {
                worker.delete_file(name).await.ok();
            }
        }
        worker.write_file(SCRIPT_FILE, script).await?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let monitor = tokio::spawn(run_monitor(
            Arc::clone(worker),
            Arc::clone(&self.registry),
            Arc::clone(&self.bridge),
            Arc::clone(local_records),
            stop_rx,
            self.config.monitor_poll,
        ));

        let command_result = worker
            .run_command(&self.config.runtime_command, &[SCRIPT_FILE.to_string()])
            .await;

        let _ = stop_tx.send(true);
        let _ = monitor.await;

        let calls = self.collect_calls(local_records).await;

        let command = command_result?;
        if !command.stderr.trim().is_empty() {
            tracing::debug!(stderr = %command.stderr.trim(), "worker stderr");
        }

        let output_text = worker.read_file(OUTPUT_FILE).await?;

        // Best-effort cleanup; the files are worthless once read.
        worker.delete_file(SCRIPT_FILE).await.ok();
        worker.delete_file(OUTPUT_FILE).await.ok();

        let Some(text) = output_text else {
            return Err(SandboxError::NoOutput);
        };
        if text.trim().is_empty() {
            return Err(SandboxError::NoOutput);
        }
        let parsed: ExecutionOutput =
            serde_json::from_str(&text).map_err(|e| SandboxError::MalformedOutput {
                reason: e.to_string(),
            })?;

        if !parsed.success {
            return Err(SandboxError::ExecutionFailed {
                error: parsed
                    .error
                    .unwrap_or_else(|| "unknown program error".to_string()),
                partial_result: parsed.partial_result,
            });
        }

        Ok(ExecutionResult {
            output: parsed.result,
            tool_calls: calls,
        })
    }

    /// Merge locally-observed records with the bridge's, restore
    /// observation order, and remember them for `last_tool_calls`.
    async fn collect_calls(
        &self,
        local_records: &Arc<Mutex<Vec<ToolCallRecord>>>,
    ) -> Vec<ToolCallRecord> {
        let mut calls = local_records.lock().await.clone();
        calls.extend(self.bridge.records().await);
        calls.sort_by_key(|r| r.started_at);
        *self.last_calls.lock().await = calls.clone();
        calls
    }
}

/// Cooperative task that services RPC request files until stopped.
///
/// Requests found in one listing tick are dispatched concurrently, so a
/// program's `Promise.all(...)` fan-out is serviced in parallel. In-flight
/// tool executions are allowed to finish after the stop signal.
async fn run_monitor(
    worker: Arc<dyn WorkerSession>,
    registry: Arc<ToolRegistry>,
    bridge: Arc<McpBridge>,
    records: Arc<Mutex<Vec<ToolCallRecord>>>,
    mut stop_rx: watch::Receiver<bool>,
    poll: std::time::Duration,
) {
    let mut seen: HashSet<String> = HashSet::new();
    let mut inflight = JoinSet::new();

    loop {
        if *stop_rx.borrow() {
            break;
        }
        match worker.list_files().await {
            Ok(files) => {
                for name in files {
                    let Some((kind, id)) = parse_request_filename(&name) else {
                        continue;
                    };
                    // Requests stay on disk until the worker consumes the
                    // response, so remember what has been dispatched.
                    if seen.contains(&name) {
                        continue;
                    }
                    let text = match worker.read_file(&name).await {
                        Ok(Some(text)) => text,
                        Ok(None) => continue,
                        Err(e) => {
                            tracing::warn!(file = %name, error = %e, "could not read request");
                            continue;
                        }
                    };
                    // A request mid-write parses as garbage; leave it for
                    // the next tick.
                    let Ok(request) = serde_json::from_str::<RpcRequest>(&text) else {
                        continue;
                    };
                    let id = id.to_string();
                    seen.insert(name);
                    inflight.spawn(service_request(
                        Arc::clone(&worker),
                        Arc::clone(&registry),
                        Arc::clone(&bridge),
                        Arc::clone(&records),
                        kind,
                        id,
                        request,
                    ));
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "monitor could not list scratch directory");
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(poll) => {}
            changed = stop_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    while inflight.join_next().await.is_some() {}
}

async fn service_request(
    worker: Arc<dyn WorkerSession>,
    registry: Arc<ToolRegistry>,
    bridge: Arc<McpBridge>,
    records: Arc<Mutex<Vec<ToolCallRecord>>>,
    kind: RequestKind,
    id: String,
    request: RpcRequest,
) {
    let response = match kind {
        RequestKind::Local => dispatch_local(&registry, &records, &request).await,
        RequestKind::Mcp => match bridge.handle(&request.tool_name, request.args).await {
            Ok(value) => RpcResponse::data(value),
            Err(e) => RpcResponse::error(e.to_string()),
        },
    };

    let body = match serde_json::to_string(&response) {
        Ok(body) => body,
        Err(e) => {
            tracing::error!(error = %e, "could not encode response envelope");
            return;
        }
    };
    if let Err(e) = worker
        .write_file(&response_filename(kind, &id), &body)
        .await
    {
        tracing::warn!(tool = %request.tool_name, error = %e, "could not write response");
    }
}

/// Execute a local tool and record the call.
async fn dispatch_local(
    registry: &ToolRegistry,
    records: &Mutex<Vec<ToolCallRecord>>,
    request: &RpcRequest,
) -> RpcResponse {
    let started = Instant::now();
    let record = ToolCallRecord::begin(&request.tool_name, request.args.clone(), false);

    let Some(tool) = registry.get(&request.tool_name) else {
        let message = format!("Unknown local tool: {}", request.tool_name);
        records
            .lock()
            .await
            .push(record.fail(&message, started.elapsed().as_millis() as u64));
        return RpcResponse::error(message);
    };

    let params = local_params(&request.args);
    match tool.execute(params).await {
        Ok(value) => {
            let elapsed = started.elapsed().as_millis() as u64;
            records
                .lock()
                .await
                .push(record.succeed(value.clone(), elapsed));
            RpcResponse::data(value)
        }
        Err(e) => {
            let elapsed = started.elapsed().as_millis() as u64;
            let message = e.to_string();
            records.lock().await.push(record.fail(&message, elapsed));
            RpcResponse::error(message)
        }
    }
}

/// Local stubs are variadic; a single argument is passed through as
/// itself, anything else as the argument list.
fn local_params(args: &Value) -> Value {
    match args {
        Value::Array(items) if items.len() == 1 => items[0].clone(),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_argument_is_unwrapped() {
        assert_eq!(local_params(&json!([{"id": "1"}])), json!({"id": "1"}));
        assert_eq!(local_params(&json!([1, 2])), json!([1, 2]));
        assert_eq!(local_params(&json!([])), json!([]));
        assert_eq!(local_params(&json!({"direct": true})), json!({"direct": true}));
    }
}
