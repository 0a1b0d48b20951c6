//! The deterministic line-protocol serializer.
//!
//! Grammar (see crate docs): `<name>[,<tag>=<val>]* <field>=<typed-val>[,<field>=<typed-val>]* [<timestamp-ns>]`

use crate::{field, Error, FieldValue, Metric};

pub(crate) fn serialize(metric: &Metric) -> Result<String, Error> {
    if metric.name.is_empty() {
        return Err(Error::EmptyName);
    }

    let mut coerced = Vec::with_capacity(metric.fields.len());
    for (key, raw) in &metric.fields {
        coerced.push((key.clone(), field::coerce(raw)));
    }

    if coerced.is_empty() {
        return Err(Error::NoValidFields { name: metric.name.clone() });
    }

    let mut line = escape(&metric.name);

    for (key, value) in &metric.tags {
        line.push(',');
        line.push_str(&escape(key));
        line.push('=');
        line.push_str(&escape(value));
    }

    line.push(' ');

    for (idx, (key, value)) in coerced.iter().enumerate() {
        if idx > 0 {
            line.push(',');
        }
        line.push_str(&escape(key));
        line.push('=');
        line.push_str(&encode_field_value(value, &metric.name, key)?);
    }

    if let Some(ts) = metric.timestamp {
        line.push(' ');
        line.push_str(&ts.to_string());
    }

    Ok(line)
}

/// Escapes `,`, space, and `=` by prefixing each with a backslash. Used for
/// the metric name, tag keys, tag values, and field keys.
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == ',' || c == ' ' || c == '=' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn encode_field_value(value: &FieldValue, metric_name: &str, field_name: &str) -> Result<String, Error> {
    match value {
        FieldValue::Int(v) => Ok(format!("{v}i")),
        FieldValue::Float(v) => Ok(format_float(*v)),
        FieldValue::Bool(v) => Ok(if *v { "t".to_string() } else { "f".to_string() }),
        FieldValue::Str(v) => Ok(format!("\"{}\"", v.replace('"', "\\\""))),
        #[allow(unreachable_patterns)]
        _ => Err(Error::UnsupportedFieldType {
            name: metric_name.to_string(),
            field: field_name.to_string(),
        }),
    }
}

/// Renders a float with an explicit fractional part, even when the value is
/// integral (e.g. `42.0`, never bare `42`).
fn format_float(v: f64) -> String {
    let rendered = v.to_string();
    if rendered.contains('.') || rendered.contains('e') || rendered.contains("inf") || rendered.contains("NaN") {
        rendered
    } else {
        format!("{rendered}.0")
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_field_value() -> impl Strategy<Value = FieldValue> {
        prop_oneof![
            any::<i64>().prop_map(FieldValue::Int),
            any::<f64>().prop_filter("finite", |v| v.is_finite()).prop_map(FieldValue::Float),
            any::<bool>().prop_map(FieldValue::Bool),
            "[a-zA-Z0-9 ]{0,16}".prop_map(FieldValue::Str),
        ]
    }

    proptest! {
        /// §8 property 1: escaping is injective on the reserved characters,
        /// so `encode_field_value`/`escape` never produce a line a reader
        /// would parse back into different tag/field boundaries.
        #[test]
        fn escape_never_emits_an_unescaped_reserved_character(s in ".{0,32}") {
            let escaped = escape(&s);
            let mut chars = escaped.chars().peekable();
            while let Some(c) = chars.next() {
                if c == '\\' {
                    prop_assert!(chars.next().is_some());
                } else {
                    prop_assert!(c != ',' && c != ' ' && c != '=');
                }
            }
        }

        /// Round-trip stability: serializing the same metric twice always
        /// produces byte-identical output, regardless of field value shape.
        #[test]
        fn encode_field_value_round_trips_through_format(value in arb_field_value()) {
            let encoded_once = encode_field_value(&value, "m", "v").unwrap();
            let encoded_again = encode_field_value(&value, "m", "v").unwrap();
            prop_assert_eq!(encoded_once, encoded_again);
        }

        #[test]
        fn float_encoding_always_has_a_fractional_part(v in any::<f64>().prop_filter("finite", |v| v.is_finite())) {
            let encoded = encode_field_value(&FieldValue::Float(v), "m", "v").unwrap();
            prop_assert!(encoded.contains('.') || encoded.contains('e'));
        }
    }
}
