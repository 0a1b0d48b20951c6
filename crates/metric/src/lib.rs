#![deny(
    trivial_numeric_casts,
    missing_docs,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications,
    unused_extern_crates,
    unused_results
)]
#![warn(rust_2021_compatibility, unreachable_pub)]

//! A `Metric` is a single measurement produced by a collector module. This
//! crate defines the type, the coercion rules that turn loosely-typed field
//! values (e.g. JSON decoded from an external API) into one of four scalar
//! kinds, and the deterministic line-protocol serializer that turns a
//! validated metric into the single text line emitted on standard output.

use std::collections::BTreeMap;

pub use field::{FieldValue, RawFieldValue};

mod field;
mod serialize;

/// All the errors that can occur while building or serializing a `Metric`.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The metric name is empty.
    #[error("metric name is empty")]
    EmptyName,

    /// After coercion, the metric has no valid fields left.
    #[error("metric '{name}' has no valid fields")]
    NoValidFields {
        /// The name of the metric.
        name: String,
    },

    /// A field value, after coercion, is not one of the four supported
    /// scalar kinds.
    #[error("field '{field}' of metric '{name}' has an unsupported type")]
    UnsupportedFieldType {
        /// The name of the metric.
        name: String,
        /// The name of the offending field.
        field: String,
    },
}

/// A single measurement: a name, a set of tags, a set of typed fields, and an
/// optional nanosecond-resolution timestamp.
///
/// Tags and fields are kept in a `BTreeMap` so that iteration order is always
/// ascending by key, which gives the serializer its determinism for free
/// instead of requiring an explicit sort at serialization time.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    name: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, RawFieldValue>,
    timestamp: Option<i64>,
}

impl Metric {
    /// Creates a new, empty metric with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp: None,
        }
    }

    /// Adds a tag. A tag with an empty key or an empty value is silently
    /// dropped, per the invariant that every tag key/value must be a
    /// non-empty string.
    #[must_use]
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        if !key.is_empty() && !value.is_empty() {
            let _ = self.tags.insert(key, value);
        }
        self
    }

    /// Adds a field. A field with an empty key is silently dropped, per the
    /// invariant that every field key must be a non-empty string.
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: impl Into<RawFieldValue>) -> Self {
        let key = key.into();
        if !key.is_empty() {
            let _ = self.fields.insert(key, value.into());
        }
        self
    }

    /// Sets the timestamp, in nanoseconds since the Unix epoch.
    #[must_use]
    pub fn timestamp(mut self, nanos: i64) -> Self {
        self.timestamp = Some(nanos);
        self
    }

    /// Returns the name of this metric.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true if this metric currently has no fields at all (before
    /// coercion). Modules can use this to skip emitting an empty reading.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Validates and coerces this metric, serializing it to a single
    /// line-protocol text line (see the `serialize` module for the
    /// grammar). Returns `Error::EmptyName` if the name is empty, or
    /// `Error::NoValidFields` if no field survives coercion.
    pub fn serialize(&self) -> Result<String, Error> {
        serialize::serialize(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_skips_empty_tag_and_field_keys() {
        let m = Metric::new("cpu").tag("", "x").tag("host", "").field("", 1).field("ok", 2);
        assert!(m.tags.is_empty());
        assert_eq!(m.fields.len(), 1);
    }
}
