use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A single field value. Blocks store every value as text; the tag is
/// recovered on decode by the inference ladder in [`crate::grid`].
///
/// The serde representation is untagged, so a record maps 1:1 onto a JSON
/// object: numbers, booleans and strings pass straight through.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int64(i64),
    Float64(f64),
    Bool(bool),
    Text(String),
}

/// An unordered mapping from field name to value. Every record persisted by
/// the engine must carry an `id` field; its textual rendering is the primary
/// key. Field names must not contain `,`, `{`, `}`, `[`, `]`, `:` or
/// newlines, since those delimit the block header.
pub type Record = HashMap<String, Value>;

impl Value {
    /// Renders the value as block text. Integers are minimal decimal,
    /// floats use the shortest round-trip form, booleans are lower-case.
    pub fn render(&self) -> String {
        match self {
            Value::Int64(i) => i.to_string(),
            Value::Float64(f) => f.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Text(s) => s.clone(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int64(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float64(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

/// Returns the primary key of a record: the textual rendering of its `id`
/// field, or None when the field is absent.
pub fn key_of(record: &Record) -> Option<String> {
    record.get("id").map(Value::render)
}
