//! Sandbox orchestration.
//!
//! The controller provisions an isolated worker, installs a generated
//! program that exposes the registered tools as callables, services the
//! worker's file-RPC tool calls, and collects the program's output.

mod controller;
mod error;
mod helpers;
mod protocol;
mod script;
mod worker;

pub use controller::{ExecutionResult, SandboxController};
pub use error::{Result, SandboxError};
pub use helpers::{HELPER_LIBRARY, HELPER_NAMES};
pub use protocol::{
    ExecutionOutput, OUTPUT_FILE, PartialResult, RequestKind, RpcRequest, RpcResponse,
    SCRIPT_FILE, is_rpc_file, parse_request_filename, request_filename, response_filename,
};
pub use script::{ScriptOptions, generate_execution_script, validate_syntax};
pub use worker::{
    CommandOutput, SubprocessWorker, SubprocessWorkerProvider, WorkerProvider, WorkerSession,
};
