//! sandcall - programmatic tool calling for LLM agents.
//!
//! Instead of the conventional loop (one tool call per model generation,
//! every intermediate result re-entering context), the runtime exposes a
//! single `code_execution` meta-tool whose input is a short JavaScript
//! program. The program runs in an isolated worker with the user's tools
//! bound as async functions; each call is routed back to the host over a
//! file-based RPC protocol, and only the final aggregate result returns to
//! the model.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │ ProgrammaticToolCaller                                               │
//! │   code_execution({code})                                             │
//! │        │                                                             │
//! │        ▼                                                             │
//! │ ┌──────────────────┐  script   ┌─────────────────────────────────┐   │
//! │ │ SandboxController│──────────▶│ worker: runs generated program  │   │
//! │ │  (RPC monitor)   │◀──────────│  tool stubs write request files │   │
//! │ └───────┬──────────┘  requests └─────────────────────────────────┘   │
//! │         │ local                │ mcp                                 │
//! │         ▼                      ▼                                     │
//! │   ToolRegistry            McpBridge (normalize, learn, circuit)      │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The [`context::ContextFilter`] keeps intermediate tool results out of
//! the model's message history, and [`estimation`] reports the tokens that
//! suppression saved.

pub mod config;
pub mod context;
pub mod error;
pub mod estimation;
pub mod mcp;
pub mod runtime;
pub mod sandbox;
pub mod testing;
pub mod tools;

pub use config::Config;
pub use context::{CODE_EXECUTION_TOOL_NAME, ChatMessage, ContextFilter};
pub use runtime::{ExecutionMetadata, ProgrammaticToolCaller};
pub use sandbox::{ExecutionResult, SandboxController, SandboxError};
pub use tools::{Tool, ToolCallRecord, ToolError, ToolRegistry};
