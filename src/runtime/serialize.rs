//! Graceful serialization degradation.
//!
//! Values that refuse to serialize degrade through three tiers instead of
//! aborting the call: per-key cloning (one bad field cannot poison the
//! rest), then stringification, then a stub record whose shape is
//! deterministic given the value's type and key names.

use serde::Serialize;
use serde::ser::{Impossible, SerializeMap, SerializeStruct, Serializer};
use serde_json::{Map, Value, json};

/// Serialize a value, degrading instead of failing.
pub fn safe_json<T: Serialize>(value: &T) -> Value {
    let first = match serde_json::to_value(value) {
        Ok(v) => return v,
        Err(e) => e,
    };

    // Tier 2: per-key clone. Re-serialize each top-level field on its own
    // and stub the ones that fail, keeping their key names in place.
    if let Ok(ProbedFields(fields)) = value.serialize(FieldProbe) {
        tracing::warn!(error = %first, "value degraded to per-key clone");
        let mut object = Map::new();
        for (key, cloned) in fields {
            object.insert(
                key,
                cloned.unwrap_or_else(|()| json!({ "__unserializable": true })),
            );
        }
        return Value::Object(object);
    }

    // Tier 3: stringification.
    if let Ok(s) = serde_json::to_string(value) {
        tracing::warn!(error = %first, "value degraded to string form");
        return Value::String(s);
    }

    // Tier 4: a stub recording the value's type and key names. A value
    // that reaches this tier has no probeable fields, so `keys` is empty.
    tracing::warn!(error = %first, "value degraded to stub record");
    json!({
        "__unserializable": true,
        "type": std::any::type_name::<T>(),
        "keys": [],
    })
}

/// Top-level fields captured by [`FieldProbe`]: each key with its cloned
/// value, or `Err` if that field alone refused to serialize.
struct ProbedFields(Vec<(String, Result<Value, ()>)>);

/// Error for values the probe cannot treat as an object.
#[derive(Debug)]
struct NotAnObject;

impl std::fmt::Display for NotAnObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("value has no top-level fields")
    }
}

impl std::error::Error for NotAnObject {}

impl serde::ser::Error for NotAnObject {
    fn custom<T: std::fmt::Display>(_msg: T) -> Self {
        NotAnObject
    }
}

/// Serializer that accepts only a top-level map or struct and collects its
/// fields, serializing each value independently.
struct FieldProbe;

impl Serializer for FieldProbe {
    type Ok = ProbedFields;
    type Error = NotAnObject;
    type SerializeSeq = Impossible<ProbedFields, NotAnObject>;
    type SerializeTuple = Impossible<ProbedFields, NotAnObject>;
    type SerializeTupleStruct = Impossible<ProbedFields, NotAnObject>;
    type SerializeTupleVariant = Impossible<ProbedFields, NotAnObject>;
    type SerializeMap = FieldCollector;
    type SerializeStruct = FieldCollector;
    type SerializeStructVariant = Impossible<ProbedFields, NotAnObject>;

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, Self::Error> {
        Ok(FieldCollector::default())
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, Self::Error> {
        Ok(FieldCollector::default())
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<Self::Ok, Self::Error> {
        value.serialize(FieldProbe)
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Self::Ok, Self::Error> {
        value.serialize(FieldProbe)
    }

    fn serialize_bool(self, _v: bool) -> Result<Self::Ok, Self::Error> {
        Err(NotAnObject)
    }

    fn serialize_i8(self, _v: i8) -> Result<Self::Ok, Self::Error> {
        Err(NotAnObject)
    }

    fn serialize_i16(self, _v: i16) -> Result<Self::Ok, Self::Error> {
        Err(NotAnObject)
    }

    fn serialize_i32(self, _v: i32) -> Result<Self::Ok, Self::Error> {
        Err(NotAnObject)
    }

    fn serialize_i64(self, _v: i64) -> Result<Self::Ok, Self::Error> {
        Err(NotAnObject)
    }

    fn serialize_u8(self, _v: u8) -> Result<Self::Ok, Self::Error> {
        Err(NotAnObject)
    }

    fn serialize_u16(self, _v: u16) -> Result<Self::Ok, Self::Error> {
        Err(NotAnObject)
    }

    fn serialize_u32(self, _v: u32) -> Result<Self::Ok, Self::Error> {
        Err(NotAnObject)
    }

    fn serialize_u64(self, _v: u64) -> Result<Self::Ok, Self::Error> {
        Err(NotAnObject)
    }

    fn serialize_f32(self, _v: f32) -> Result<Self::Ok, Self::Error> {
        Err(NotAnObject)
    }

    fn serialize_f64(self, _v: f64) -> Result<Self::Ok, Self::Error> {
        Err(NotAnObject)
    }

    fn serialize_char(self, _v: char) -> Result<Self::Ok, Self::Error> {
        Err(NotAnObject)
    }

    fn serialize_str(self, _v: &str) -> Result<Self::Ok, Self::Error> {
        Err(NotAnObject)
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<Self::Ok, Self::Error> {
        Err(NotAnObject)
    }

    fn serialize_none(self) -> Result<Self::Ok, Self::Error> {
        Err(NotAnObject)
    }

    fn serialize_unit(self) -> Result<Self::Ok, Self::Error> {
        Err(NotAnObject)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Self::Ok, Self::Error> {
        Err(NotAnObject)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
    ) -> Result<Self::Ok, Self::Error> {
        Err(NotAnObject)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<Self::Ok, Self::Error> {
        Err(NotAnObject)
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq, Self::Error> {
        Err(NotAnObject)
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, Self::Error> {
        Err(NotAnObject)
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct, Self::Error> {
        Err(NotAnObject)
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, Self::Error> {
        Err(NotAnObject)
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, Self::Error> {
        Err(NotAnObject)
    }
}

/// Collects (key, cloned value) pairs for a map or struct being probed.
#[derive(Default)]
struct FieldCollector {
    fields: Vec<(String, Result<Value, ()>)>,
    pending_key: Option<String>,
}

impl SerializeMap for FieldCollector {
    type Ok = ProbedFields;
    type Error = NotAnObject;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<(), Self::Error> {
        let key = match serde_json::to_value(key) {
            Ok(Value::String(s)) => s,
            Ok(other) => other.to_string(),
            Err(_) => return Err(NotAnObject),
        };
        self.pending_key = Some(key);
        Ok(())
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
        let key = self.pending_key.take().unwrap_or_default();
        self.fields
            .push((key, serde_json::to_value(value).map_err(|_| ())));
        Ok(())
    }

    fn end(self) -> Result<Self::Ok, Self::Error> {
        Ok(ProbedFields(self.fields))
    }
}

impl SerializeStruct for FieldCollector {
    type Ok = ProbedFields;
    type Error = NotAnObject;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        self.fields
            .push((key.to_string(), serde_json::to_value(value).map_err(|_| ())));
        Ok(())
    }

    fn end(self) -> Result<Self::Ok, Self::Error> {
        Ok(ProbedFields(self.fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializable_values_pass_through() {
        assert_eq!(safe_json(&42), json!(42));
        assert_eq!(safe_json(&json!({"a": [1, 2]})), json!({"a": [1, 2]}));
    }

    struct NeverSerializes;

    impl Serialize for NeverSerializes {
        fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("refuses to serialize"))
        }
    }

    #[derive(Serialize)]
    struct PartlySerializable {
        good: u32,
        bad: NeverSerializes,
        tail: String,
    }

    fn partly() -> PartlySerializable {
        PartlySerializable {
            good: 7,
            bad: NeverSerializes,
            tail: "kept".to_string(),
        }
    }

    #[test]
    fn per_key_clone_stubs_only_the_bad_field() {
        let out = safe_json(&partly());
        assert_eq!(out["good"], 7);
        assert_eq!(out["tail"], "kept");
        assert_eq!(out["bad"], json!({ "__unserializable": true }));
    }

    #[test]
    fn per_key_clone_sees_through_option() {
        let out = safe_json(&Some(partly()));
        assert_eq!(out["good"], 7);
        assert_eq!(out["bad"]["__unserializable"], true);
    }

    #[test]
    fn unserializable_value_degrades_to_deterministic_stub() {
        let out = safe_json(&NeverSerializes);
        assert_eq!(out["__unserializable"], true);
        assert!(out["type"].as_str().unwrap().contains("NeverSerializes"));
        assert_eq!(out["keys"], json!([]));

        // Same input shape, same output shape.
        assert_eq!(out, safe_json(&NeverSerializes));
    }
}
