//! Test harness: stub tools and a scripted worker.
//!
//! Provides:
//! - [`StubTool`]: a configurable tool (fixed result, closure-backed,
//!   failing, hanging, sequenced responses)
//! - [`ScriptedWorker`] / [`ScriptedWorkerProvider`]: a worker whose
//!   "program" is a Rust closure driving the real file protocol against a
//!   real temp directory, so controller and monitor behavior is exercised
//!   without a JavaScript runtime
//!
//! Use these instead of ad-hoc stubs in tests.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{Value, json};
use tempfile::TempDir;

use crate::sandbox::{
    CommandOutput, ExecutionOutput, OUTPUT_FILE, RequestKind, RpcRequest, RpcResponse,
    SandboxError, WorkerProvider, WorkerSession, request_filename, response_filename,
};
use crate::tools::{Tool, ToolError};

// ---------------------------------------------------------------------------
// Stub tools
// ---------------------------------------------------------------------------

type ToolFn = Arc<dyn Fn(Value) -> Result<Value, ToolError> + Send + Sync>;

enum Behavior {
    Fixed(Value),
    Func(ToolFn),
    Fail(String),
    FailValidation(String),
    FailThenSucceed {
        failures_remaining: AtomicU32,
        error: String,
        value: Value,
    },
    Sequence(Mutex<VecDeque<Value>>),
    Hang,
}

/// A configurable tool stub.
pub struct StubTool {
    name: String,
    description: String,
    schema: Value,
    behavior: Behavior,
    calls: AtomicU32,
}

impl StubTool {
    fn with_behavior(name: impl Into<String>, behavior: Behavior) -> Self {
        Self {
            name: name.into(),
            description: "stub tool".to_string(),
            schema: json!({ "type": "object", "properties": {} }),
            behavior,
            calls: AtomicU32::new(0),
        }
    }

    /// Always returns the given value.
    pub fn fixed(name: impl Into<String>, value: Value) -> Self {
        Self::with_behavior(name, Behavior::Fixed(value))
    }

    /// Computes the result from the (possibly normalized) arguments.
    pub fn with_fn(
        name: impl Into<String>,
        f: impl Fn(Value) -> Result<Value, ToolError> + Send + Sync + 'static,
    ) -> Self {
        Self::with_behavior(name, Behavior::Func(Arc::new(f)))
    }

    /// Always fails with an execution error.
    pub fn failing(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_behavior(name, Behavior::Fail(message.into()))
    }

    /// Always fails with a validation error.
    pub fn failing_validation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_behavior(name, Behavior::FailValidation(message.into()))
    }

    /// Fails `failures` times, then succeeds with `value`.
    pub fn fail_then_succeed(
        name: impl Into<String>,
        error: impl Into<String>,
        failures: u32,
        value: Value,
    ) -> Self {
        Self::with_behavior(
            name,
            Behavior::FailThenSucceed {
                failures_remaining: AtomicU32::new(failures),
                error: error.into(),
                value,
            },
        )
    }

    /// Returns the queued values in order; the last one repeats.
    pub fn sequence(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self::with_behavior(name, Behavior::Sequence(Mutex::new(values.into())))
    }

    /// Never completes. Pair with a timeout.
    pub fn hanging(name: impl Into<String>) -> Self {
        Self::with_behavior(name, Behavior::Hang)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }

    /// How many times `execute` has been called.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Tool for StubTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        match &self.behavior {
            Behavior::Fixed(value) => Ok(value.clone()),
            Behavior::Func(f) => f(args),
            Behavior::Fail(message) => Err(ToolError::ExecutionFailed(message.clone())),
            Behavior::FailValidation(message) => {
                Err(ToolError::InvalidParameters(message.clone()))
            }
            Behavior::FailThenSucceed {
                failures_remaining,
                error,
                value,
            } => {
                let remaining = failures_remaining.load(Ordering::Relaxed);
                if remaining > 0 {
                    failures_remaining.store(remaining - 1, Ordering::Relaxed);
                    Err(ToolError::ExecutionFailed(error.clone()))
                } else {
                    Ok(value.clone())
                }
            }
            Behavior::Sequence(queue) => {
                let mut queue = queue.lock().expect("sequence lock");
                if queue.len() > 1 {
                    Ok(queue.pop_front().expect("non-empty"))
                } else {
                    Ok(queue.front().cloned().unwrap_or(Value::Null))
                }
            }
            Behavior::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Scripted worker
// ---------------------------------------------------------------------------

/// What a scripted program uses to speak the worker side of the file
/// protocol.
#[derive(Clone)]
pub struct WorkerIo {
    scratch: PathBuf,
    stub_poll: Duration,
    stub_timeout: Duration,
    counter: Arc<AtomicU64>,
}

impl WorkerIo {
    /// Call a local tool with a variadic argument list.
    pub async fn call_local(&self, tool: &str, args: Value) -> Result<Value, String> {
        self.call(RequestKind::Local, tool, args).await
    }

    /// Call an MCP tool with a single parameters value.
    pub async fn call_mcp(&self, tool: &str, params: Value) -> Result<Value, String> {
        self.call(RequestKind::Mcp, tool, params).await
    }

    /// Write the output document verbatim, for malformed-output scenarios.
    pub async fn write_raw_output(&self, text: &str) {
        tokio::fs::write(self.scratch.join(OUTPUT_FILE), text)
            .await
            .expect("write raw output");
    }

    async fn call(&self, kind: RequestKind, tool: &str, args: Value) -> Result<Value, String> {
        let id = format!("c{}", self.counter.fetch_add(1, Ordering::SeqCst));
        let request = RpcRequest {
            tool_name: tool.to_string(),
            args,
            call_id: matches!(kind, RequestKind::Mcp).then(|| id.clone()),
            kind,
        };
        let request_path = self.scratch.join(request_filename(kind, &id));
        tokio::fs::write(
            &request_path,
            serde_json::to_string(&request).expect("request encodes"),
        )
        .await
        .expect("write request");

        let response_path = self.scratch.join(response_filename(kind, &id));
        let deadline = Instant::now() + self.stub_timeout;
        loop {
            // A partially-written response parses as garbage; keep polling
            // until a complete envelope appears.
            if let Ok(text) = tokio::fs::read_to_string(&response_path).await
                && let Ok(response) = serde_json::from_str::<RpcResponse>(&text)
            {
                let _ = tokio::fs::remove_file(&response_path).await;
                let _ = tokio::fs::remove_file(&request_path).await;
                return match response {
                    RpcResponse::Data { data } => Ok(data),
                    RpcResponse::Error { error } => Err(error),
                };
            }
            if Instant::now() >= deadline {
                return Err(format!("{tool}: timed out waiting for a response"));
            }
            tokio::time::sleep(self.stub_poll).await;
        }
    }
}

/// The scripted program: runs against [`WorkerIo`] and produces the output
/// document, or `None` to simulate a worker that wrote nothing.
pub type ProgramFn =
    Arc<dyn Fn(WorkerIo) -> BoxFuture<'static, Option<ExecutionOutput>> + Send + Sync>;

/// Build a successful output document.
pub fn success_output(result: Value) -> ExecutionOutput {
    ExecutionOutput {
        success: true,
        result,
        error: None,
        stack: None,
        partial_result: None,
    }
}

/// Worker whose `run_command` runs a Rust closure instead of a process.
pub struct ScriptedWorker {
    scratch: TempDir,
    scratch_path: String,
    program: ProgramFn,
    stub_poll: Duration,
    stub_timeout: Duration,
    command_failures: Arc<Mutex<VecDeque<String>>>,
}

impl ScriptedWorker {
    fn io(&self) -> WorkerIo {
        WorkerIo {
            scratch: self.scratch.path().to_path_buf(),
            stub_poll: self.stub_poll,
            stub_timeout: self.stub_timeout,
            counter: Arc::new(AtomicU64::new(0)),
        }
    }
}

#[async_trait]
impl WorkerSession for ScriptedWorker {
    fn scratch_dir(&self) -> &str {
        &self.scratch_path
    }

    async fn write_file(&self, name: &str, contents: &str) -> Result<(), SandboxError> {
        tokio::fs::write(self.scratch.path().join(name), contents)
            .await
            .map_err(|e| SandboxError::Worker {
                reason: format!("write {name}: {e}"),
            })
    }

    async fn read_file(&self, name: &str) -> Result<Option<String>, SandboxError> {
        match tokio::fs::read_to_string(self.scratch.path().join(name)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SandboxError::Worker {
                reason: format!("read {name}: {e}"),
            }),
        }
    }

    async fn delete_file(&self, name: &str) -> Result<(), SandboxError> {
        match tokio::fs::remove_file(self.scratch.path().join(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SandboxError::Worker {
                reason: format!("delete {name}: {e}"),
            }),
        }
    }

    async fn list_files(&self) -> Result<Vec<String>, SandboxError> {
        let mut entries = tokio::fs::read_dir(self.scratch.path())
            .await
            .map_err(|e| SandboxError::Worker {
                reason: format!("list scratch: {e}"),
            })?;
        let mut names = Vec::new();
        while let Some(entry) =
            entries
                .next_entry()
                .await
                .map_err(|e| SandboxError::Worker {
                    reason: format!("list scratch: {e}"),
                })?
        {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    async fn run_command(&self, _cmd: &str, _args: &[String]) -> Result<CommandOutput, SandboxError> {
        if let Some(reason) = self.command_failures.lock().expect("failures lock").pop_front() {
            return Err(SandboxError::Worker { reason });
        }
        let output = (self.program)(self.io()).await;
        if let Some(output) = output {
            self.write_file(
                OUTPUT_FILE,
                &serde_json::to_string(&output).expect("output encodes"),
            )
            .await?;
        }
        Ok(CommandOutput {
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

/// Provider of [`ScriptedWorker`]s, with fault injection for provisioning
/// and command execution.
pub struct ScriptedWorkerProvider {
    program: ProgramFn,
    stub_poll: Duration,
    stub_timeout: Duration,
    command_failures: Arc<Mutex<VecDeque<String>>>,
    provision_failures: Arc<Mutex<VecDeque<SandboxError>>>,
    provisions: Arc<AtomicU32>,
}

impl ScriptedWorkerProvider {
    /// A provider whose workers run the given program.
    pub fn new(program: ProgramFn) -> Self {
        Self {
            program,
            stub_poll: Duration::from_millis(5),
            stub_timeout: Duration::from_secs(5),
            command_failures: Arc::new(Mutex::new(VecDeque::new())),
            provision_failures: Arc::new(Mutex::new(VecDeque::new())),
            provisions: Arc::new(AtomicU32::new(0)),
        }
    }

    /// A provider whose workers make no tool calls and return `value`.
    pub fn returning(value: Value) -> Self {
        Self::scripted(move |_io| {
            let value = value.clone();
            async move { Some(success_output(value)) }
        })
    }

    /// A provider whose workers run the given async closure.
    pub fn scripted<F, Fut>(program: F) -> Self
    where
        F: Fn(WorkerIo) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Option<ExecutionOutput>> + Send + 'static,
    {
        Self::new(Arc::new(
            move |io| -> BoxFuture<'static, Option<ExecutionOutput>> { Box::pin(program(io)) },
        ))
    }

    /// Make the next `run_command` fail with the given provider message.
    pub fn fail_next_command(&self, reason: impl Into<String>) {
        self.command_failures
            .lock()
            .expect("failures lock")
            .push_back(reason.into());
    }

    /// Make the next `provision` fail with the given error.
    pub fn fail_next_provision(&self, error: SandboxError) {
        self.provision_failures
            .lock()
            .expect("provision lock")
            .push_back(error);
    }

    /// How many workers have been provisioned.
    pub fn provision_count(&self) -> u32 {
        self.provisions.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl WorkerProvider for ScriptedWorkerProvider {
    async fn provision(&self) -> Result<Arc<dyn WorkerSession>, SandboxError> {
        if let Some(error) = self
            .provision_failures
            .lock()
            .expect("provision lock")
            .pop_front()
        {
            return Err(error);
        }
        self.provisions.fetch_add(1, Ordering::Relaxed);
        let scratch = tempfile::tempdir().map_err(|e| SandboxError::ProvisioningFailed {
            reason: format!("could not create scratch directory: {e}"),
        })?;
        let scratch_path = scratch.path().display().to_string();
        Ok(Arc::new(ScriptedWorker {
            scratch,
            scratch_path,
            program: Arc::clone(&self.program),
            stub_poll: self.stub_poll,
            stub_timeout: self.stub_timeout,
            command_failures: Arc::clone(&self.command_failures),
        }))
    }
}
