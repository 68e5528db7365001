//! MCP bridge: parameter normalization, response normalization, output
//! schema learning, and the circuit breaker that makes external MCP tools
//! usable from model-generated code.

mod bridge;
mod params;
mod response;
mod schema;

pub use bridge::McpBridge;
pub use params::{NormalizedArguments, normalize_parameters};
pub use response::normalize_response;
pub use schema::{OutputSchema, infer_output_schema, is_more_detailed};
