//! Programmatic tool calling.

mod caller;
mod serialize;

pub use caller::{
    ExecutionMetadata, ProgrammaticToolCaller, SandboxCallSummary, build_metadata,
};
pub use serialize::safe_json;
