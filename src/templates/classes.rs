//! CSS class resolution for components.
//!
//! A `class` argument may be a string, a list of class specs, or a mapping of
//! class name to a condition. All of them collapse to one space-separated
//! string.

use serde_json::{Map, Value};

/// The shapes a class argument can take.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClassSpec<'a> {
    Empty,
    Scalar(&'a Value),
    Sequence(&'a [Value]),
    Mapping(&'a Map<String, Value>),
}

impl<'a> From<&'a Value> for ClassSpec<'a> {
    fn from(value: &'a Value) -> Self {
        match value {
            Value::Null => ClassSpec::Empty,
            Value::Array(items) => ClassSpec::Sequence(items),
            Value::Object(map) => ClassSpec::Mapping(map),
            other => ClassSpec::Scalar(other),
        }
    }
}

impl ClassSpec<'_> {
    pub fn resolve(&self) -> String {
        match self {
            ClassSpec::Empty => String::new(),
            ClassSpec::Scalar(Value::String(s)) => s.clone(),
            ClassSpec::Scalar(other) => other.to_string(),
            ClassSpec::Sequence(items) => items
                .iter()
                .map(|item| ClassSpec::from(item).resolve())
                .collect::<Vec<_>>()
                .join(" ")
                .trim()
                .to_string(),
            ClassSpec::Mapping(map) => map
                .iter()
                .filter(|(_, enabled)| is_truthy(enabled))
                .map(|(name, _)| name.as_str())
                .collect::<Vec<_>>()
                .join(" ")
                .trim()
                .to_string(),
        }
    }
}

/// Resolve any JSON value to a class string.
pub fn resolve_class(value: &Value) -> String {
    ClassSpec::from(value).resolve()
}

/// Truthiness the way template conditions see it: empty containers, empty
/// strings, zero, `false` and null are all false.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
