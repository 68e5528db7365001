//! MCP response normalization.
//!
//! MCP tools answer with an envelope of typed content parts; plain tools
//! answer with whatever shape they like. Both are flattened here into a
//! record with predictable accessors: `success` is always a boolean,
//! `items` is always a sequence, and `_raw` holds the original value.

use serde_json::{Map, Value, json};

/// Marker attached to normalized records. Its presence makes normalization
/// idempotent: a second pass returns the value unchanged.
const NORMALIZED_MARKER: &str = "_normalized";

/// Field holding the untouched original response.
const RAW_FIELD: &str = "_raw";

/// Flatten a raw tool response into a predictable record.
pub fn normalize_response(raw: &Value) -> Value {
    if raw
        .get(NORMALIZED_MARKER)
        .and_then(|m| m.as_bool())
        .unwrap_or(false)
    {
        return raw.clone();
    }

    let mut out = match mcp_content_parts(raw) {
        Some(parts) => flatten_envelope(raw, parts),
        None => structure_normalize(raw),
    };
    if let Some(object) = out.as_object_mut() {
        object.insert(RAW_FIELD.to_string(), raw.clone());
    }
    out
}

/// The `content` array of an MCP envelope, if `raw` is one.
fn mcp_content_parts(raw: &Value) -> Option<&Vec<Value>> {
    raw.get("content")?.as_array()
}

fn flatten_envelope(raw: &Value, parts: &[Value]) -> Value {
    let is_error = raw
        .get("isError")
        .map(|e| e.as_bool().unwrap_or(true))
        .unwrap_or(false);

    let texts: Vec<&str> = parts
        .iter()
        .filter(|p| p.get("type").and_then(|t| t.as_str()) == Some("text"))
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();

    if is_error {
        return structure_normalize(&json!({
            "success": false,
            "error": texts.join("\n"),
        }));
    }

    match texts.len() {
        0 => structure_normalize(&json!({
            "success": true,
            "content": raw.get("content").cloned().unwrap_or(Value::Null),
        })),
        1 => match serde_json::from_str::<Value>(texts[0]) {
            Ok(Value::Object(mut parsed)) => {
                parsed
                    .entry("success".to_string())
                    .or_insert(Value::Bool(true));
                structure_normalize(&Value::Object(parsed))
            }
            Ok(other) => structure_normalize(&other),
            Err(_) => structure_normalize(&json!({
                "success": true,
                "text": texts[0],
            })),
        },
        _ => {
            let results: Vec<Value> = texts
                .iter()
                .map(|t| {
                    serde_json::from_str::<Value>(t).unwrap_or_else(|_| Value::String(t.to_string()))
                })
                .collect();
            structure_normalize(&json!({
                "success": true,
                "results": results,
            }))
        }
    }
}

/// Attach consistent accessors to an arbitrary value.
///
/// The result is always an object carrying `success`, an `items` sequence
/// alias, textual aliases where text exists, and the normalization marker.
/// Existing fields are never overwritten.
fn structure_normalize(value: &Value) -> Value {
    let mut out = match value {
        Value::Object(object) => object.clone(),
        Value::Array(items) => {
            let mut object = Map::new();
            object.insert("items".to_string(), Value::Array(items.clone()));
            object
        }
        other => {
            let mut object = Map::new();
            object.insert("value".to_string(), other.clone());
            if let Value::String(s) = other {
                object.insert("text".to_string(), Value::String(s.clone()));
            }
            object
        }
    };

    let success = out.get("success").and_then(|s| s.as_bool()).unwrap_or_else(|| {
        !truthy(out.get("error")) && !truthy(out.get("isError"))
    });
    out.insert("success".to_string(), Value::Bool(success));

    // Alias the most-informative container field as `items`.
    if !out.contains_key("items") {
        let container = ["items", "data", "results", "content"]
            .iter()
            .find_map(|key| out.get(*key).and_then(|v| v.as_array()).cloned());
        out.insert(
            "items".to_string(),
            Value::Array(container.unwrap_or_default()),
        );
    }
    if let Some(items) = out.get("items").and_then(|v| v.as_array()).cloned() {
        if !out.contains_key("length") {
            out.insert("length".to_string(), json!(items.len()));
        }
        if let Some(first) = items.first()
            && !out.contains_key("first")
        {
            out.insert("first".to_string(), first.clone());
        }
        if let Some(last) = items.last()
            && !out.contains_key("last")
        {
            out.insert("last".to_string(), last.clone());
        }
    }

    // Textual alias: the first string field among the usual suspects.
    if !out.contains_key("text") {
        let text = ["output", "stdout", "content", "markdown", "value"]
            .iter()
            .find_map(|key| out.get(*key).and_then(|v| v.as_str()).map(String::from));
        if let Some(text) = text {
            out.insert("text".to_string(), Value::String(text));
        }
    }

    out.insert(NORMALIZED_MARKER.to_string(), Value::Bool(true));
    Value::Object(out)
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_envelope_joins_text_parts() {
        let raw = json!({
            "content": [
                { "type": "text", "text": "rate limit" },
                { "type": "text", "text": "try later" }
            ],
            "isError": true
        });
        let out = normalize_response(&raw);
        assert_eq!(out["success"], false);
        assert_eq!(out["error"], "rate limit\ntry later");
        assert_eq!(out["_raw"], raw);
    }

    #[test]
    fn single_json_text_part_is_parsed() {
        let raw = json!({
            "content": [
                { "type": "text", "text": "{\"markdown\":\"hi\",\"metadata\":{\"title\":\"T\"}}" }
            ],
            "isError": false
        });
        let out = normalize_response(&raw);
        assert_eq!(out["markdown"], "hi");
        assert_eq!(out["metadata"]["title"], "T");
        assert_eq!(out["success"], true);
    }

    #[test]
    fn single_plain_text_part_stays_text() {
        let raw = json!({
            "content": [{ "type": "text", "text": "just words" }],
            "isError": false
        });
        let out = normalize_response(&raw);
        assert_eq!(out["success"], true);
        assert_eq!(out["text"], "just words");
    }

    #[test]
    fn many_text_parts_become_results() {
        let raw = json!({
            "content": [
                { "type": "text", "text": "{\"a\":1}" },
                { "type": "text", "text": "not json" }
            ],
            "isError": false
        });
        let out = normalize_response(&raw);
        assert_eq!(out["results"], json!([{"a": 1}, "not json"]));
        assert_eq!(out["items"], json!([{"a": 1}, "not json"]));
    }

    #[test]
    fn non_text_parts_preserve_content() {
        let raw = json!({
            "content": [{ "type": "image", "data": "...base64..." }],
            "isError": false
        });
        let out = normalize_response(&raw);
        assert_eq!(out["success"], true);
        assert_eq!(out["content"], raw["content"]);
    }

    #[test]
    fn plain_object_gets_accessors() {
        let raw = json!({ "data": [1, 2, 3], "stdout": "done" });
        let out = normalize_response(&raw);
        assert_eq!(out["success"], true);
        assert_eq!(out["items"], json!([1, 2, 3]));
        assert_eq!(out["length"], 3);
        assert_eq!(out["first"], 1);
        assert_eq!(out["last"], 3);
        assert_eq!(out["text"], "done");
    }

    #[test]
    fn top_level_error_means_failure() {
        let out = normalize_response(&json!({ "error": "nope" }));
        assert_eq!(out["success"], false);
        assert_eq!(out["error"], "nope");
    }

    #[test]
    fn explicit_success_false_is_kept() {
        let out = normalize_response(&json!({ "success": false, "data": [] }));
        assert_eq!(out["success"], false);
    }

    #[test]
    fn primitives_and_arrays_are_wrapped() {
        let out = normalize_response(&json!("hello"));
        assert_eq!(out["success"], true);
        assert_eq!(out["text"], "hello");
        assert_eq!(out["value"], "hello");
        assert_eq!(out["items"], json!([]));

        let out = normalize_response(&json!([1, 2]));
        assert_eq!(out["items"], json!([1, 2]));
        assert_eq!(out["length"], 2);
    }

    #[test]
    fn normalization_is_idempotent() {
        let inputs = [
            json!({
                "content": [{ "type": "text", "text": "{\"x\":1}" }],
                "isError": false
            }),
            json!({ "data": ["a"] }),
            json!("plain"),
            json!({ "error": "bad" }),
            json!(null),
        ];
        for input in inputs {
            let once = normalize_response(&input);
            let twice = normalize_response(&once);
            assert_eq!(once, twice, "input: {input}");
        }
    }

    #[test]
    fn invariant_accessors_always_present() {
        let inputs = [
            json!({"anything": 1}),
            json!([true]),
            json!(7),
            json!({"content": [], "isError": false}),
        ];
        for input in inputs {
            let out = normalize_response(&input);
            assert!(out["success"].is_boolean(), "input: {input}");
            assert!(out["items"].is_array(), "input: {input}");
            assert!(out.get("_raw").is_some(), "input: {input}");
        }
    }
}
