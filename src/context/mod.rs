//! Conversation-context mediation.

mod filter;

pub use filter::{CODE_EXECUTION_TOOL_NAME, ChatMessage, ContextFilter, MessageRole};
