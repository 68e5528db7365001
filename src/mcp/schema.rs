//! Learned output schemas.
//!
//! The bridge observes successful tool responses and infers a coarse shape
//! for each tool: what kind of value it returns and, for containers, what
//! it contains. Schemas only ever get more detailed; a sparser observation
//! never replaces a richer one. The detail ordering is deliberately coarse
//! (property count for objects, sampled length for arrays) and is not
//! strictly monotonic under every refinement; that is tolerated.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

/// Recursion limit for inference.
const MAX_DEPTH: usize = 3;

/// Fields the normalizer attaches for its own bookkeeping.
const INTERNAL_FIELDS: [&str; 2] = ["_raw", "_normalized"];

/// Inferred shape of a tool's successful responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum OutputSchema {
    Null,
    Array {
        item_type: Box<OutputSchema>,
        sampled_len: usize,
    },
    Object {
        properties: BTreeMap<String, OutputSchema>,
    },
    Primitive {
        type_name: String,
    },
}

/// Infer the shape of a value, depth-limited.
pub fn infer_output_schema(value: &Value) -> OutputSchema {
    infer_at_depth(value, MAX_DEPTH)
}

fn infer_at_depth(value: &Value, depth: usize) -> OutputSchema {
    match value {
        Value::Null => OutputSchema::Null,
        Value::Bool(_) => OutputSchema::Primitive {
            type_name: "boolean".to_string(),
        },
        Value::Number(_) => OutputSchema::Primitive {
            type_name: "number".to_string(),
        },
        Value::String(_) => OutputSchema::Primitive {
            type_name: "string".to_string(),
        },
        Value::Array(items) => {
            if depth == 0 {
                return OutputSchema::Primitive {
                    type_name: "array".to_string(),
                };
            }
            let item_type = items
                .first()
                .map(|item| infer_at_depth(item, depth - 1))
                .unwrap_or(OutputSchema::Null);
            OutputSchema::Array {
                item_type: Box::new(item_type),
                sampled_len: items.len(),
            }
        }
        Value::Object(object) => {
            if depth == 0 {
                return OutputSchema::Primitive {
                    type_name: "object".to_string(),
                };
            }
            let properties = object
                .iter()
                .filter(|(key, _)| !INTERNAL_FIELDS.contains(&key.as_str()))
                .map(|(key, child)| (key.clone(), infer_at_depth(child, depth - 1)))
                .collect();
            OutputSchema::Object { properties }
        }
    }
}

/// Whether `candidate` describes the tool's output in strictly more detail
/// than `current`.
pub fn is_more_detailed(candidate: &OutputSchema, current: &OutputSchema) -> bool {
    match (candidate, current) {
        (OutputSchema::Null, _) => false,
        (_, OutputSchema::Null) => true,
        (
            OutputSchema::Object { properties: new },
            OutputSchema::Object {
                properties: known,
            },
        ) => new.len() > known.len(),
        (
            OutputSchema::Array {
                sampled_len: new, ..
            },
            OutputSchema::Array {
                sampled_len: known, ..
            },
        ) => new > known,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn infers_primitive_kinds() {
        assert_eq!(infer_output_schema(&json!(null)), OutputSchema::Null);
        assert_eq!(
            infer_output_schema(&json!("x")),
            OutputSchema::Primitive {
                type_name: "string".to_string()
            }
        );
        assert_eq!(
            infer_output_schema(&json!(1.5)),
            OutputSchema::Primitive {
                type_name: "number".to_string()
            }
        );
    }

    #[test]
    fn infers_object_properties_skipping_internal_fields() {
        let schema = infer_output_schema(&json!({
            "markdown": "hi",
            "length": 2,
            "_raw": { "anything": true },
            "_normalized": true
        }));
        let OutputSchema::Object { properties } = schema else {
            panic!("expected object schema");
        };
        assert_eq!(properties.len(), 2);
        assert!(properties.contains_key("markdown"));
        assert!(!properties.contains_key("_raw"));
    }

    #[test]
    fn infers_array_item_type_and_sample() {
        let schema = infer_output_schema(&json!([{"a": 1}, {"a": 2}, {"a": 3}]));
        let OutputSchema::Array {
            item_type,
            sampled_len,
        } = schema
        else {
            panic!("expected array schema");
        };
        assert_eq!(sampled_len, 3);
        assert!(matches!(*item_type, OutputSchema::Object { .. }));
    }

    #[test]
    fn depth_limit_collapses_to_primitive_tag() {
        let deep = json!({"a": {"b": {"c": {"d": 1}}}});
        let schema = infer_output_schema(&deep);
        // Depth 3 reaches "c"; its object value is tagged, not expanded.
        let OutputSchema::Object { properties } = schema else {
            panic!()
        };
        let OutputSchema::Object { properties: b } = &properties["a"] else {
            panic!()
        };
        let OutputSchema::Object { properties: c } = &b["b"] else {
            panic!()
        };
        assert_eq!(
            c["c"],
            OutputSchema::Primitive {
                type_name: "object".to_string()
            }
        );
    }

    #[test]
    fn detail_ordering() {
        let two_props = infer_output_schema(&json!({"a": 1, "b": 2}));
        let three_props = infer_output_schema(&json!({"a": 1, "b": 2, "c": 3}));
        assert!(is_more_detailed(&three_props, &two_props));
        assert!(!is_more_detailed(&two_props, &three_props));
        assert!(!is_more_detailed(&two_props, &two_props));

        let short = infer_output_schema(&json!([1]));
        let long = infer_output_schema(&json!([1, 2, 3]));
        assert!(is_more_detailed(&long, &short));

        // Anything beats a null observation; null never replaces detail.
        assert!(is_more_detailed(&two_props, &OutputSchema::Null));
        assert!(!is_more_detailed(&OutputSchema::Null, &two_props));

        // Kind changes are not treated as refinements.
        assert!(!is_more_detailed(&long, &two_props));
    }
}
