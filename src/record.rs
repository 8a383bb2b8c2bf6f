//! Records are JSON objects; how their fields read as text.

use std::borrow::Cow;

use serde_json::Value;

pub type Record = serde_json::Map<String, Value>;

/// What a missing field renders as.
pub const UNDEFINED: &str = "undefined";

/// Strings verbatim, everything else as compact JSON.
pub fn value_text(value: &Value) -> Cow<str> {
    match value {
        Value::String(s) => Cow::Borrowed(s),
        v => Cow::Owned(v.to_string()),
    }
}

pub fn field_text<'r>(record: &'r Record, field: &str) -> Cow<'r, str> {
    match record.get(field) {
        Some(v) => value_text(v),
        None => Cow::Borrowed(UNDEFINED),
    }
}

/// The objects among `values`; anything else is skipped.
pub fn records_of(values: &[Value]) -> Vec<Record> {
    values.iter()
        .filter_map(|v| v.as_object().cloned())
        .collect()
}
