use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Keyed payload carried by results, step outputs and named arguments.
///
/// Uses `BTreeMap` so that equality, `Debug` output and serialization are
/// deterministic regardless of insertion order.
pub type Data = BTreeMap<String, Value>;

/// Generic runtime value flowing between steps.
///
/// Supports all JSON-compatible types. Serializes untagged, so a `Value`
/// renders as plain JSON.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// JSON null.
    #[default]
    Null,
    /// JSON boolean.
    Bool(bool),
    /// JSON integer (signed 64-bit).
    Int(i64),
    /// JSON floating-point (64-bit IEEE 754).
    Float(f64),
    /// JSON string (UTF-8).
    String(String),
    /// JSON array (ordered sequence of values).
    Array(Vec<Value>),
    /// JSON object (ordered map of string keys to values).
    Map(Data),
}

impl Value {
    /// Short lowercase name of the variant, used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer view. Floats with no fractional part are accepted.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.trunc() == *f => Some(*f as i64),
            _ => None,
        }
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&Data> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "<{}>", self.type_name()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Value::Int(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Data> for Value {
    fn from(map: Data) -> Self {
        Value::Map(map)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(i) => serde_json::Value::from(i),
            Value::Float(f) => serde_json::Number::from_f64(f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::String(s) => serde_json::Value::String(s),
            Value::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ),
        }
    }
}

/// Builds a [`Data`] map from `key => value` pairs.
///
/// ```
/// use servitor_core::{data, Value};
///
/// let d = data! { "x" => 1, "name" => "ada" };
/// assert_eq!(d["x"], Value::Int(1));
/// ```
#[macro_export]
macro_rules! data {
    () => {
        $crate::Data::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut data = $crate::Data::new();
        $(
            data.insert(::std::string::String::from($key), $crate::Value::from($value));
        )+
        data
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_macro_builds_ordered_map() {
        let d = data! { "b" => 2, "a" => "one" };
        let keys: Vec<&str> = d.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(d["b"], Value::Int(2));
        assert_eq!(d["a"], Value::String("one".to_string()));
    }

    #[test]
    fn empty_data_macro() {
        let d = data! {};
        assert!(d.is_empty());
    }

    #[test]
    fn integer_view_accepts_whole_floats() {
        assert_eq!(Value::Float(4.0).as_i64(), Some(4));
        assert_eq!(Value::Float(4.5).as_i64(), None);
        assert_eq!(Value::from("4").as_i64(), None);
    }

    #[test]
    fn option_converts_to_null() {
        let none: Option<i64> = None;
        assert!(Value::from(none).is_null());
        assert_eq!(Value::from(Some(3)), Value::Int(3));
    }

    #[test]
    fn json_roundtrip_preserves_structure() {
        let json = serde_json::json!({"x": 1, "tags": ["a", "b"], "ok": true, "ratio": 0.5});
        let value = Value::from(json.clone());
        assert_eq!(value.as_map().map(Data::len), Some(4));
        let back: serde_json::Value = value.into();
        assert_eq!(back, json);
    }

    #[test]
    fn untagged_serialization_is_plain_json() {
        let value = Value::Map(data! { "x" => 1 });
        assert_eq!(serde_json::to_string(&value).unwrap(), r#"{"x":1}"#);
        assert_eq!(value.to_string(), r#"{"x":1}"#);
    }
}
