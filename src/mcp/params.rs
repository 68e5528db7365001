//! Argument normalization toward a declared input schema.
//!
//! Model-generated code passes arguments loosely: bare strings where a
//! record is declared, scalars where arrays are declared, numbers where
//! strings are declared. This module coerces such values toward the tool's
//! declared schema. No coercion is silent; every rewrite appends a warning.

use serde_json::{Map, Value, json};

/// Outcome of normalizing one argument value.
#[derive(Debug, Clone)]
pub struct NormalizedArguments {
    /// The coerced arguments, always a JSON object.
    pub normalized: Value,
    /// One entry per coercion or validation problem.
    pub warnings: Vec<String>,
    /// False iff a required property is missing after coercion.
    pub is_valid: bool,
}

/// Normalize `args` for the tool `tool_name` against an optional declared
/// JSON Schema. Idempotent: normalizing an already-normalized value changes
/// nothing.
pub fn normalize_parameters(
    tool_name: &str,
    args: &Value,
    schema: Option<&Value>,
) -> NormalizedArguments {
    let mut warnings = Vec::new();

    let mut normalized = match args {
        Value::Null => {
            warnings.push("No arguments provided, using empty object".to_string());
            json!({})
        }
        Value::Object(_) => args.clone(),
        Value::Array(items) => {
            let key = if name_contains_any(tool_name, &["extract", "batch"]) {
                "urls"
            } else {
                "items"
            };
            warnings.push(format!("Wrapped array as {{ {key}: ... }}"));
            json!({ key: items })
        }
        scalar => wrap_scalar(tool_name, scalar, &mut warnings),
    };

    // Deep clone through serialization to shed any aliasing surprises.
    match serde_json::to_string(&normalized).and_then(|s| serde_json::from_str::<Value>(&s)) {
        Ok(cloned) => normalized = cloned,
        Err(e) => warnings.push(format!("Arguments could not be round-trip serialized: {e}")),
    }

    if let Some(schema) = schema {
        apply_schema(&mut normalized, schema, &mut warnings);
    }

    let is_valid = !warnings.iter().any(|w| w.starts_with("Missing required"));

    NormalizedArguments {
        normalized,
        warnings,
        is_valid,
    }
}

/// Heuristic wrapping of a bare scalar, keyed off the tool name.
fn wrap_scalar(tool_name: &str, scalar: &Value, warnings: &mut Vec<String>) -> Value {
    let key = if name_contains_any(tool_name, &["scrape", "crawl"]) {
        "url"
    } else if name_contains_any(tool_name, &["search"]) {
        "query"
    } else if name_contains_any(tool_name, &["extract"]) {
        warnings.push(format!(
            "Wrapped {} as {{ urls: [...] }}",
            json_type_name(scalar)
        ));
        return json!({ "urls": [scalar] });
    } else {
        "input"
    };
    warnings.push(format!(
        "Wrapped {} as {{ {key}: ... }}",
        json_type_name(scalar)
    ));
    json!({ key: scalar })
}

fn name_contains_any(name: &str, needles: &[&str]) -> bool {
    let lower = name.to_lowercase();
    needles.iter().any(|n| lower.contains(n))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Coerce each declared property toward its declared type.
fn apply_schema(args: &mut Value, schema: &Value, warnings: &mut Vec<String>) {
    let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) else {
        return;
    };
    let required: Vec<&str> = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|entries| entries.iter().filter_map(|e| e.as_str()).collect())
        .unwrap_or_default();

    let Some(object) = args.as_object_mut() else {
        return;
    };

    for (name, declared) in properties {
        match object.get_mut(name) {
            None => {
                if required.contains(&name.as_str()) {
                    warnings.push(format!("Missing required parameter: {name}"));
                }
            }
            Some(value) => coerce_property(name, value, declared, warnings),
        }
    }
}

fn coerce_property(name: &str, value: &mut Value, declared: &Value, warnings: &mut Vec<String>) {
    let declared_type = declared.get("type").and_then(|t| t.as_str());
    match declared_type {
        Some("string") => {
            if let Some(coerced) = to_declared_string(value) {
                warnings.push(format!(
                    "Coerced {name} from {} to string",
                    json_type_name(value)
                ));
                *value = coerced;
            } else if !value.is_string() {
                warnings.push(format!(
                    "Parameter {name} should be a string, got {}",
                    json_type_name(value)
                ));
            }
        }
        Some("number") | Some("integer") => {
            if let Some(coerced) = to_declared_number(value) {
                warnings.push(format!("Coerced {name} from string to number"));
                *value = coerced;
            } else if !value.is_number() {
                warnings.push(format!(
                    "Parameter {name} should be a number, got {}",
                    json_type_name(value)
                ));
            }
        }
        Some("boolean") => {
            if let Some(coerced) = to_declared_bool(value) {
                warnings.push(format!("Coerced {name} from string to boolean"));
                *value = coerced;
            } else if !value.is_boolean() {
                warnings.push(format!(
                    "Parameter {name} should be a boolean, got {}",
                    json_type_name(value)
                ));
            }
        }
        Some("array") => coerce_array_property(name, value, declared, warnings),
        _ => {}
    }
}

fn to_declared_string(value: &Value) -> Option<Value> {
    match value {
        Value::Number(n) => Some(Value::String(n.to_string())),
        Value::Bool(b) => Some(Value::String(b.to_string())),
        _ => None,
    }
}

fn to_declared_number(value: &Value) -> Option<Value> {
    let s = value.as_str()?;
    if let Ok(i) = s.parse::<i64>() {
        return Some(json!(i));
    }
    s.parse::<f64>().ok().and_then(|f| {
        serde_json::Number::from_f64(f).map(Value::Number)
    })
}

fn to_declared_bool(value: &Value) -> Option<Value> {
    match value.as_str()? {
        "true" => Some(Value::Bool(true)),
        "false" => Some(Value::Bool(false)),
        _ => None,
    }
}

fn coerce_array_property(name: &str, value: &mut Value, declared: &Value, warnings: &mut Vec<String>) {
    if !value.is_array() {
        warnings.push(format!("Wrapped scalar {name} in an array"));
        *value = Value::Array(vec![value.take()]);
    }

    // Declared array-of-object with observed scalar items: wrap each scalar
    // as a singleton record, picking the target key from the item schema.
    let items_schema = declared.get("items");
    let declares_objects =
        items_schema.and_then(|i| i.get("type")).and_then(|t| t.as_str()) == Some("object");
    if !declares_objects {
        return;
    }
    let key = items_schema
        .map(|i| pick_wrapping_key(i))
        .unwrap_or_else(|| "value".to_string());

    if let Some(items) = value.as_array_mut() {
        for item in items.iter_mut() {
            if !item.is_object() && !item.is_array() {
                let mut wrapped = Map::new();
                wrapped.insert(key.clone(), item.take());
                *item = Value::Object(wrapped);
                warnings.push(format!(
                    "Wrapped scalar item of {name} as {{ {key}: ... }}"
                ));
            }
        }
    }
}

/// Choose the key to wrap a scalar item under, from an item schema.
///
/// Preference order: a required string property, then a property named
/// `type`/`value`/`url`/`name`, then the first string property, then any
/// property, falling back to `value`.
fn pick_wrapping_key(item_schema: &Value) -> String {
    let Some(properties) = item_schema.get("properties").and_then(|p| p.as_object()) else {
        return "value".to_string();
    };
    let required: Vec<&str> = item_schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|entries| entries.iter().filter_map(|e| e.as_str()).collect())
        .unwrap_or_default();

    let is_string = |prop: &Value| prop.get("type").and_then(|t| t.as_str()) == Some("string");

    if let Some((name, _)) = properties
        .iter()
        .find(|(name, prop)| required.contains(&name.as_str()) && is_string(prop))
    {
        return name.clone();
    }
    for preferred in ["type", "value", "url", "name"] {
        if properties.contains_key(preferred) {
            return preferred.to_string();
        }
    }
    if let Some((name, _)) = properties.iter().find(|(_, prop)| is_string(prop)) {
        return name.clone();
    }
    properties
        .keys()
        .next()
        .cloned()
        .unwrap_or_else(|| "value".to_string())
}
