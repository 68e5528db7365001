//! Message-history mediation.
//!
//! The whole point of programmatic execution is that intermediate tool
//! results never re-enter the model's context. This filter sits between
//! the model caller and the message store and admits tool results only for
//! the `code_execution` meta-tool; everything else is dropped and counted
//! as saved tokens.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::estimation::estimate_value_tokens;

/// Name of the meta-tool whose results are allowed through.
pub const CODE_EXECUTION_TOOL_NAME: &str = "code_execution";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
}

/// One conversation message as the filter sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    /// Set for tool-result messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    pub content: Value,
}

impl ChatMessage {
    pub fn user(content: impl Into<Value>) -> Self {
        Self {
            role: MessageRole::User,
            tool_name: None,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<Value>) -> Self {
        Self {
            role: MessageRole::Assistant,
            tool_name: None,
            content: content.into(),
        }
    }

    pub fn tool_result(tool_name: impl Into<String>, content: impl Into<Value>) -> Self {
        Self {
            role: MessageRole::Tool,
            tool_name: Some(tool_name.into()),
            content: content.into(),
        }
    }
}

/// Per-conversation message filter. Reset explicitly between conversations.
#[derive(Debug, Default)]
pub struct ContextFilter {
    tokens_saved: u64,
    dropped_messages: u64,
}

impl ContextFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a message may enter the history. Dropped tool results bump
    /// the savings counter by their estimated token size.
    pub fn admit(&mut self, message: &ChatMessage) -> bool {
        match message.role {
            MessageRole::User | MessageRole::Assistant => true,
            MessageRole::Tool => {
                if message.tool_name.as_deref() == Some(CODE_EXECUTION_TOOL_NAME) {
                    true
                } else {
                    self.tokens_saved += estimate_value_tokens(&message.content);
                    self.dropped_messages += 1;
                    tracing::debug!(
                        tool = message.tool_name.as_deref().unwrap_or("<unnamed>"),
                        "suppressing intermediate tool result"
                    );
                    false
                }
            }
        }
    }

    /// Filter a message stream, keeping admitted messages in order.
    pub fn filter(&mut self, messages: &[ChatMessage]) -> Vec<ChatMessage> {
        messages
            .iter()
            .filter(|m| self.admit(m))
            .cloned()
            .collect()
    }

    /// Tokens saved by suppression so far.
    pub fn tokens_saved(&self) -> u64 {
        self.tokens_saved
    }

    /// Number of messages dropped so far.
    pub fn dropped_messages(&self) -> u64 {
        self.dropped_messages
    }

    /// Compact summary line for assistant narration.
    pub fn summary(&self, tool_name: &str, call_count: usize) -> String {
        format!(
            "Executed {tool_name}: {call_count} tool calls, saved {} tokens",
            self.tokens_saved
        )
    }

    pub fn reset(&mut self) {
        self.tokens_saved = 0;
        self.dropped_messages = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_and_assistant_pass_through() {
        let mut filter = ContextFilter::new();
        assert!(filter.admit(&ChatMessage::user("hi")));
        assert!(filter.admit(&ChatMessage::assistant("hello")));
        assert_eq!(filter.tokens_saved(), 0);
    }

    #[test]
    fn only_code_execution_results_pass() {
        let mut filter = ContextFilter::new();
        assert!(filter.admit(&ChatMessage::tool_result(
            CODE_EXECUTION_TOOL_NAME,
            json!({"result": 42})
        )));
        assert!(!filter.admit(&ChatMessage::tool_result("getUser", json!({"id": "1"}))));
        assert_eq!(filter.dropped_messages(), 1);
    }

    #[test]
    fn dropped_result_counts_its_tokens() {
        let mut filter = ContextFilter::new();
        let content = json!({"id": "1", "score": 10});
        let expected = estimate_value_tokens(&content);
        filter.admit(&ChatMessage::tool_result("getUser", content));
        assert_eq!(filter.tokens_saved(), expected);
    }

    #[test]
    fn filtered_stream_is_an_ordered_subsequence() {
        let mut filter = ContextFilter::new();
        let messages = vec![
            ChatMessage::user("run it"),
            ChatMessage::assistant("running"),
            ChatMessage::tool_result("getUser", json!({"id": "1"})),
            ChatMessage::tool_result(CODE_EXECUTION_TOOL_NAME, json!({"result": 20})),
            ChatMessage::assistant("done"),
        ];
        let kept = filter.filter(&messages);

        assert_eq!(kept.len(), 4);
        assert_eq!(kept[0].role, MessageRole::User);
        assert_eq!(kept[1].role, MessageRole::Assistant);
        assert_eq!(kept[2].tool_name.as_deref(), Some(CODE_EXECUTION_TOOL_NAME));
        assert_eq!(kept[3].role, MessageRole::Assistant);
        assert!(filter.tokens_saved() > 0);
    }

    #[test]
    fn summary_and_reset() {
        let mut filter = ContextFilter::new();
        filter.admit(&ChatMessage::tool_result("getUser", json!({"a": 1})));
        let summary = filter.summary(CODE_EXECUTION_TOOL_NAME, 4);
        assert!(summary.starts_with("Executed code_execution: 4 tool calls, saved "));

        filter.reset();
        assert_eq!(filter.tokens_saved(), 0);
        assert_eq!(filter.dropped_messages(), 0);
    }
}
