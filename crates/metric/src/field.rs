//! Dynamic field values and the coercion rules that turn them into one of
//! the four scalar kinds the serializer understands.

use std::collections::BTreeMap;

/// The pre-coercion, dynamically-typed value a module can hand to
/// `Metric::field`. Modules that talk to MQTT brokers, HTTP/REST APIs or
/// WebSocket feeds commonly decode JSON payloads whose field values may be
/// null, a bare scalar, a short array, or a nested object; `RawFieldValue`
/// models exactly that boundary, and coercion (§4.1) resolves it down to a
/// `FieldValue` before serialization.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum RawFieldValue {
    /// An absent or JSON `null` value.
    Null,
    /// A signed integer.
    Int(i64),
    /// A floating-point number.
    Float(f64),
    /// A boolean.
    Bool(bool),
    /// A string.
    Str(String),
    /// A sequence of values.
    Seq(Vec<RawFieldValue>),
    /// A mapping of string keys to values.
    Map(BTreeMap<String, RawFieldValue>),
}

/// The type-coerced, serializable field value. Exactly one of these four
/// kinds is emitted per field in the line-protocol output.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum FieldValue {
    /// A signed integer, encoded with a trailing `i`.
    Int(i64),
    /// A floating-point number, encoded with its fractional part.
    Float(f64),
    /// A boolean, encoded as `t` or `f`.
    Bool(bool),
    /// A string, encoded double-quoted with embedded `"` escaped.
    Str(String),
}

impl From<i64> for RawFieldValue {
    fn from(v: i64) -> Self {
        RawFieldValue::Int(v)
    }
}

impl From<i32> for RawFieldValue {
    fn from(v: i32) -> Self {
        RawFieldValue::Int(v as i64)
    }
}

impl From<f64> for RawFieldValue {
    fn from(v: f64) -> Self {
        RawFieldValue::Float(v)
    }
}

impl From<bool> for RawFieldValue {
    fn from(v: bool) -> Self {
        RawFieldValue::Bool(v)
    }
}

impl From<String> for RawFieldValue {
    fn from(v: String) -> Self {
        RawFieldValue::Str(v)
    }
}

impl From<&str> for RawFieldValue {
    fn from(v: &str) -> Self {
        RawFieldValue::Str(v.to_string())
    }
}

impl From<FieldValue> for RawFieldValue {
    fn from(v: FieldValue) -> Self {
        match v {
            FieldValue::Int(v) => RawFieldValue::Int(v),
            FieldValue::Float(v) => RawFieldValue::Float(v),
            FieldValue::Bool(v) => RawFieldValue::Bool(v),
            FieldValue::Str(v) => RawFieldValue::Str(v),
        }
    }
}

impl From<serde_json::Value> for RawFieldValue {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => RawFieldValue::Null,
            serde_json::Value::Bool(b) => RawFieldValue::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    RawFieldValue::Int(i)
                } else {
                    RawFieldValue::Float(n.as_f64().unwrap_or_default())
                }
            }
            serde_json::Value::String(s) => RawFieldValue::Str(s),
            serde_json::Value::Array(a) => RawFieldValue::Seq(a.into_iter().map(RawFieldValue::from).collect()),
            serde_json::Value::Object(o) => {
                RawFieldValue::Map(o.into_iter().map(|(k, v)| (k, RawFieldValue::from(v))).collect())
            }
        }
    }
}

/// Coerces a raw field value into its serializable form, per the rules of
/// §4.1: null becomes an empty string, a one-element sequence unwraps to its
/// element, a multi-element sequence joins its coerced elements with commas,
/// a mapping joins `k=v` pairs with commas, and anything else falls back to
/// its human-readable textual form.
pub(crate) fn coerce(raw: &RawFieldValue) -> FieldValue {
    match raw {
        RawFieldValue::Null => FieldValue::Str(String::new()),
        RawFieldValue::Int(v) => FieldValue::Int(*v),
        RawFieldValue::Float(v) => FieldValue::Float(*v),
        RawFieldValue::Bool(v) => FieldValue::Bool(*v),
        RawFieldValue::Str(v) => FieldValue::Str(v.clone()),
        RawFieldValue::Seq(items) => match items.as_slice() {
            [single] => coerce(single),
            _ => FieldValue::Str(items.iter().map(coerce_to_string).collect::<Vec<_>>().join(",")),
        },
        RawFieldValue::Map(entries) => FieldValue::Str(
            entries
                .iter()
                .map(|(k, v)| format!("{}={}", k, coerce_to_string(v)))
                .collect::<Vec<_>>()
                .join(","),
        ),
    }
}

/// Renders a coerced value as human-readable text, used when flattening
/// sequences and mappings into a single string field.
fn coerce_to_string(raw: &RawFieldValue) -> String {
    match coerce(raw) {
        FieldValue::Int(v) => v.to_string(),
        FieldValue::Float(v) => v.to_string(),
        FieldValue::Bool(v) => v.to_string(),
        FieldValue::Str(v) => v,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_coerces_to_empty_string() {
        assert_eq!(coerce(&RawFieldValue::Null), FieldValue::Str(String::new()));
    }

    #[test]
    fn single_element_sequence_unwraps() {
        assert_eq!(coerce(&RawFieldValue::Seq(vec![RawFieldValue::Int(42)])), FieldValue::Int(42));
    }

    #[test]
    fn multi_element_sequence_joins() {
        let seq = RawFieldValue::Seq(vec![RawFieldValue::Int(1), RawFieldValue::Str("a".into())]);
        assert_eq!(coerce(&seq), FieldValue::Str("1,a".to_string()));
    }

    #[test]
    fn mapping_joins_key_value_pairs() {
        let mut map = BTreeMap::new();
        let _ = map.insert("a".to_string(), RawFieldValue::Int(1));
        let _ = map.insert("b".to_string(), RawFieldValue::Bool(true));
        assert_eq!(coerce(&RawFieldValue::Map(map)), FieldValue::Str("a=1,b=true".to_string()));
    }

    #[test]
    fn nested_single_element_sequence_of_mapping() {
        let mut map = BTreeMap::new();
        let _ = map.insert("k".to_string(), RawFieldValue::Float(1.5));
        let seq = RawFieldValue::Seq(vec![RawFieldValue::Map(map)]);
        assert_eq!(coerce(&seq), FieldValue::Str("k=1.5".to_string()));
    }
}
