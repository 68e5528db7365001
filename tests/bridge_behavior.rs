//! MCP bridge behavior: argument wrapping, envelope flattening, and the
//! circuit breaker, exercised through the public bridge surface.

use std::sync::{Arc, Mutex};

use serde_json::{Value, json};

use sandcall::config::BridgeConfig;
use sandcall::mcp::{McpBridge, normalize_parameters, normalize_response};
use sandcall::testing::StubTool;
use sandcall::tools::{Tool, ToolError};

/// Scenario: a bare string reaches a tool that declares `{url}`; the
/// executor must receive the wrapped record.
#[tokio::test]
async fn string_argument_is_wrapped_for_the_executor() {
    let received: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&received);

    let scrape = StubTool::with_fn("mcp_firecrawl_scrape", move |args| {
        seen.lock().unwrap().push(args);
        Ok(json!({ "markdown": "ok" }))
    })
    .with_schema(json!({
        "type": "object",
        "properties": { "url": { "type": "string" } },
        "required": ["url"]
    }));

    let bridge = McpBridge::new(
        vec![Arc::new(scrape) as Arc<dyn Tool>],
        BridgeConfig::default(),
    );

    bridge
        .handle("mcp_firecrawl_scrape", json!("https://e.com"))
        .await
        .unwrap();

    assert_eq!(
        received.lock().unwrap().as_slice(),
        &[json!({ "url": "https://e.com" })]
    );
    let warnings = bridge.warnings().await;
    assert!(
        warnings
            .iter()
            .any(|w| w.contains("Wrapped string as { url: ... }")),
        "warnings: {warnings:?}"
    );
}

/// Scenario: the MCP envelope is flattened into a plain record.
#[tokio::test]
async fn envelope_is_flattened() {
    let scrape = StubTool::fixed(
        "mcp_firecrawl_scrape",
        json!({
            "content": [
                { "type": "text", "text": "{\"markdown\":\"hi\",\"metadata\":{\"title\":\"T\"}}" }
            ],
            "isError": false
        }),
    );
    let bridge = McpBridge::new(
        vec![Arc::new(scrape) as Arc<dyn Tool>],
        BridgeConfig::default(),
    );

    let out = bridge
        .handle("mcp_firecrawl_scrape", json!({ "url": "https://e.com" }))
        .await
        .unwrap();

    assert_eq!(out["markdown"], "hi");
    assert_eq!(out["metadata"]["title"], "T");
    assert_eq!(out["success"], true);
}

/// Scenario: three identical failures open the circuit; the fourth call is
/// refused without touching the tool.
#[tokio::test]
async fn circuit_breaker_short_circuits_the_fourth_call() {
    let flaky = Arc::new(StubTool::failing("mcp_flaky", "upstream exploded"));
    let bridge = McpBridge::new(
        vec![Arc::clone(&flaky) as Arc<dyn Tool>],
        BridgeConfig::default(),
    );

    for _ in 0..3 {
        let err = bridge.handle("mcp_flaky", json!({ "x": 1 })).await.unwrap_err();
        assert!(err.to_string().contains("upstream exploded"));
    }
    assert_eq!(flaky.calls(), 3);
    assert_eq!(bridge.failure_count("mcp_flaky", &json!({ "x": 1 })).await, 3);

    let err = bridge.handle("mcp_flaky", json!({ "x": 1 })).await.unwrap_err();
    assert!(matches!(err, ToolError::CircuitOpen(_)), "{err}");
    // The tool was not invoked again.
    assert_eq!(flaky.calls(), 3);
    assert_eq!(bridge.failure_count("mcp_flaky", &json!({ "x": 1 })).await, 3);
}

/// Equivalent arguments after normalization share one failure signature.
#[tokio::test]
async fn normalized_arguments_share_the_signature() {
    let flaky = Arc::new(
        StubTool::failing("mcp_scrape", "boom").with_schema(json!({
            "type": "object",
            "properties": { "url": { "type": "string" } },
            "required": ["url"]
        })),
    );
    let bridge = McpBridge::new(
        vec![Arc::clone(&flaky) as Arc<dyn Tool>],
        BridgeConfig::default(),
    );

    // A bare string and its wrapped form normalize identically.
    let _ = bridge.handle("mcp_scrape", json!("https://e.com")).await;
    let _ = bridge.handle("mcp_scrape", json!({ "url": "https://e.com" })).await;
    assert_eq!(
        bridge
            .failure_count("mcp_scrape", &json!({ "url": "https://e.com" }))
            .await,
        2
    );
}

#[tokio::test]
async fn batch_fan_out_returns_in_input_order() {
    let bridge = McpBridge::new(
        vec![
            Arc::new(StubTool::fixed("mcp_one", json!({ "n": 1 }))) as Arc<dyn Tool>,
            Arc::new(StubTool::fixed("mcp_two", json!({ "n": 2 }))) as Arc<dyn Tool>,
        ],
        BridgeConfig::default(),
    );

    let results = bridge
        .execute_batch(vec![
            ("mcp_two".to_string(), json!({})),
            ("mcp_one".to_string(), json!({})),
            ("mcp_missing".to_string(), json!({})),
        ])
        .await;

    assert_eq!(results[0].as_ref().unwrap()["n"], 2);
    assert_eq!(results[1].as_ref().unwrap()["n"], 1);
    assert!(results[2].is_err());
}

// ---------------------------------------------------------------------------
// Normalizer laws
// ---------------------------------------------------------------------------

#[test]
fn response_normalization_is_idempotent() {
    let inputs = [
        json!({ "content": [{ "type": "text", "text": "plain" }], "isError": false }),
        json!({ "content": [{ "type": "text", "text": "{\"a\":1}" }], "isError": false }),
        json!({ "content": [{ "type": "text", "text": "bad" }], "isError": true }),
        json!({ "data": [1, 2, 3], "output": "done" }),
        json!([1, 2, 3]),
        json!("text"),
        json!(12.5),
        json!(null),
        json!({ "success": false, "error": "x" }),
    ];
    for input in inputs {
        let once = normalize_response(&input);
        assert_eq!(once, normalize_response(&once), "input: {input}");
    }
}

#[test]
fn parameter_normalization_is_idempotent() {
    let schema = json!({
        "type": "object",
        "properties": {
            "url": { "type": "string" },
            "count": { "type": "number" },
            "urls": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["url"]
    });
    let inputs = [
        json!(null),
        json!("https://e.com"),
        json!(17),
        json!(["a", "b"]),
        json!({ "url": 1, "count": "5", "urls": "solo" }),
        json!({ "unrelated": true }),
    ];
    for input in inputs {
        let once = normalize_parameters("mcp_scrape", &input, Some(&schema));
        let twice = normalize_parameters("mcp_scrape", &once.normalized, Some(&schema));
        assert_eq!(once.normalized, twice.normalized, "input: {input}");
    }
}

/// After normalization, the value either satisfies the declared property
/// types or a warning names the offending field.
#[test]
fn normalization_satisfies_schema_or_warns() {
    let schema = json!({
        "type": "object",
        "properties": {
            "url": { "type": "string" },
            "count": { "type": "number" }
        },
        "required": ["url"]
    });
    let inputs = [
        json!({ "url": "https://e.com", "count": 2 }),
        json!({ "url": true, "count": "many" }),
        json!({ "count": 3 }),
        json!(99),
    ];
    for input in inputs {
        let out = normalize_parameters("mcp_fetch", &input, Some(&schema));
        let object = out.normalized.as_object().unwrap();

        let url_ok = object.get("url").map(|v| v.is_string()).unwrap_or(false);
        if !url_ok {
            assert!(
                out.warnings.iter().any(|w| w.contains("url")),
                "no warning names url for input {input}: {:?}",
                out.warnings
            );
        }
        let count_ok = object.get("count").map(|v| v.is_number()).unwrap_or(true);
        if !count_ok {
            assert!(
                out.warnings.iter().any(|w| w.contains("count")),
                "no warning names count for input {input}: {:?}",
                out.warnings
            );
        }
    }
}
