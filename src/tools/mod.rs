//! Extensible tool system.
//!
//! Tools are the callables the runtime binds into generated programs. Local
//! tools execute in the host process; tools whose name carries the `mcp_`
//! prefix are dispatched through the MCP bridge.

mod docs;
mod record;
mod registry;
mod tool;

pub use docs::generate_tool_documentation;
pub use record::ToolCallRecord;
pub use registry::ToolRegistry;
pub use tool::{
    MCP_TOOL_PREFIX, Tool, ToolError, is_mcp_tool, require_str, validate_tool_schema,
};
