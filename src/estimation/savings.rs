//! Token-savings accounting.
//!
//! A quantitative model of what a conventional tool loop would have cost:
//! every intermediate result entering context, the accumulated context
//! re-sent on each round trip, per-call protocol overhead, and the model
//! output spent deciding each next call. The constants are calibration
//! parameters (see [`SavingsConfig`]), not measurements.

use serde::Serialize;
use serde_json::Value;

use crate::config::SavingsConfig;
use crate::tools::ToolCallRecord;

/// Estimated tokens for a JSON value: one token per four serialized bytes,
/// rounded up.
pub fn estimate_value_tokens(value: &Value) -> u64 {
    let len = serde_json::to_string(value).map(|s| s.len()).unwrap_or(0) as u64;
    len.div_ceil(4)
}

/// The four-category savings split. Every term is non-negative and the
/// terms sum to the reported total.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingsBreakdown {
    pub intermediate_results: u64,
    pub round_trip_context: u64,
    pub tool_call_overhead: u64,
    pub llm_decisions: u64,
}

impl SavingsBreakdown {
    pub fn total(&self) -> u64 {
        self.intermediate_results
            + self.round_trip_context
            + self.tool_call_overhead
            + self.llm_decisions
    }
}

/// Savings computed for one execution.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingsReport {
    pub total: u64,
    pub breakdown: SavingsBreakdown,
    pub explanation: String,
}

/// Compute the tokens avoided by running `records.len()` tool calls
/// programmatically instead of through the conventional loop.
pub fn compute_savings(records: &[ToolCallRecord], config: &SavingsConfig) -> SavingsReport {
    let n = records.len() as u64;
    if n <= 1 {
        return SavingsReport {
            total: 0,
            breakdown: SavingsBreakdown::default(),
            explanation: "No savings (single tool call)".to_string(),
        };
    }

    let sizes: Vec<u64> = records
        .iter()
        .map(|r| {
            r.result
                .as_ref()
                .map(estimate_value_tokens)
                .unwrap_or(config.unknown_result_tokens)
        })
        .collect();

    let intermediate_results: u64 = sizes.iter().sum();

    // Round trips 1..N-1 each re-send the base context plus every result
    // produced so far.
    let mut round_trip_context = 0u64;
    let mut accumulated = 0u64;
    for size in sizes.iter().take(records.len() - 1) {
        accumulated += size;
        round_trip_context += config.base_context_tokens + accumulated;
    }

    let tool_call_overhead = config.tool_call_overhead_tokens * n;
    let llm_decisions = config.llm_decision_tokens * (n - 1);

    let breakdown = SavingsBreakdown {
        intermediate_results,
        round_trip_context,
        tool_call_overhead,
        llm_decisions,
    };
    let total = breakdown.total();

    let local = records.iter().filter(|r| !r.is_mcp).count();
    let mcp = records.len() - local;
    let explanation = format!(
        "Combined {n} tool calls ({local} local, {mcp} MCP) into one request. \
         Avoided ~{intermediate_results} tokens of intermediate results, \
         ~{round_trip_context} tokens of re-sent context, \
         ~{tool_call_overhead} tokens of tool-call overhead, and \
         ~{llm_decisions} tokens of model decisions: ~{total} tokens total."
    );

    SavingsReport {
        total,
        breakdown,
        explanation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(result: Option<Value>, is_mcp: bool) -> ToolCallRecord {
        let r = ToolCallRecord::begin(if is_mcp { "mcp_x" } else { "local_x" }, json!({}), is_mcp);
        match result {
            Some(value) => r.succeed(value, 1),
            None => r.fail("error", 1),
        }
    }

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_value_tokens(&json!(null)), 1); // "null" = 4 bytes
        assert_eq!(estimate_value_tokens(&json!("abc")), 2); // "\"abc\"" = 5 bytes
        assert_eq!(estimate_value_tokens(&json!({})), 1); // "{}" = 2 bytes
    }

    #[test]
    fn single_call_saves_nothing() {
        let config = SavingsConfig::default();
        let report = compute_savings(&[record(Some(json!({"a": 1})), false)], &config);
        assert_eq!(report.total, 0);
        assert_eq!(report.breakdown, SavingsBreakdown::default());
        assert_eq!(report.explanation, "No savings (single tool call)");

        let report = compute_savings(&[], &config);
        assert_eq!(report.total, 0);
    }

    #[test]
    fn categories_sum_to_total() {
        let config = SavingsConfig::default();
        let records = vec![
            record(Some(json!({"id": "1", "score": 10})), false),
            record(Some(json!({"id": "2", "score": 20})), false),
            record(None, true),
            record(Some(json!({"avg": 20})), false),
        ];
        let report = compute_savings(&records, &config);
        assert_eq!(report.breakdown.total(), report.total);
        assert!(report.total > 0);
    }

    #[test]
    fn round_trip_context_accumulates_prior_results() {
        let config = SavingsConfig {
            base_context_tokens: 100,
            tool_call_overhead_tokens: 0,
            llm_decision_tokens: 0,
            unknown_result_tokens: 50,
        };
        // Two results of known size s1, s2 and a third call.
        let records = vec![
            record(Some(json!("aaaa")), false), // "\"aaaa\"" = 6 bytes -> 2 tokens
            record(Some(json!("bb")), false),   // "\"bb\"" = 4 bytes -> 1 token
            record(Some(json!(1)), false),
        ];
        let report = compute_savings(&records, &config);
        // Trip 1: 100 + 2; trip 2: 100 + 2 + 1.
        assert_eq!(report.breakdown.round_trip_context, 205);
    }

    #[test]
    fn unknown_result_sizes_use_the_configured_estimate() {
        let config = SavingsConfig {
            base_context_tokens: 0,
            tool_call_overhead_tokens: 0,
            llm_decision_tokens: 0,
            unknown_result_tokens: 50,
        };
        let records = vec![record(None, false), record(None, false)];
        let report = compute_savings(&records, &config);
        assert_eq!(report.breakdown.intermediate_results, 100);
        assert_eq!(report.breakdown.round_trip_context, 50);
    }

    #[test]
    fn overhead_and_decision_terms() {
        let config = SavingsConfig::default();
        let records = vec![
            record(Some(json!(1)), false),
            record(Some(json!(2)), false),
            record(Some(json!(3)), false),
        ];
        let report = compute_savings(&records, &config);
        assert_eq!(report.breakdown.tool_call_overhead, 40 * 3);
        assert_eq!(report.breakdown.llm_decisions, 80 * 2);
    }

    #[test]
    fn explanation_includes_local_mcp_split() {
        let config = SavingsConfig::default();
        let records = vec![
            record(Some(json!(1)), false),
            record(Some(json!(2)), true),
            record(Some(json!(3)), true),
        ];
        let report = compute_savings(&records, &config);
        assert!(report.explanation.contains("3 tool calls"));
        assert!(report.explanation.contains("1 local"));
        assert!(report.explanation.contains("2 MCP"));
    }
}
