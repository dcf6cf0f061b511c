//! Dynamic Values
//!
//! Atoms hold a [`Value`], a small dynamically typed tree that can be
//! compared for equality (the write path's change check), walked by dotted
//! rule paths, and serialized for bulk import/export.
//!
//! Each atom also carries a declared [`ValueKind`]. The kind supplies the
//! atom's default (numeric → 0, text → empty, boolean → false, collection →
//! empty) and is checked on every write. Writes are never coerced; numeric
//! coercion only happens inside rule comparators and `To` transforms, and
//! there it fails closed.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A dynamically typed atom value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
}

/// The declared type of an atom or computed atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Text,
    List,
    Map,
    /// Accepts any value; defaults to `Null`.
    Any,
}

impl ValueKind {
    /// The default value an atom of this kind starts with.
    pub fn default_value(self) -> Value {
        match self {
            ValueKind::Bool => Value::Bool(false),
            ValueKind::Int => Value::Int(0),
            ValueKind::Float => Value::Float(0.0),
            ValueKind::Text => Value::Text(String::new()),
            ValueKind::List => Value::List(Vec::new()),
            ValueKind::Map => Value::Map(IndexMap::new()),
            ValueKind::Any => Value::Null,
        }
    }

    /// Whether `value` may be stored in a slot of this kind.
    ///
    /// `Null` is accepted everywhere so optional state can be cleared.
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (ValueKind::Any, _) | (_, Value::Null) => true,
            (ValueKind::Bool, Value::Bool(_))
            | (ValueKind::Int, Value::Int(_))
            | (ValueKind::Float, Value::Float(_))
            | (ValueKind::Text, Value::Text(_))
            | (ValueKind::List, Value::List(_))
            | (ValueKind::Map, Value::Map(_)) => true,
            _ => false,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Text => "text",
            ValueKind::List => "list",
            ValueKind::Map => "map",
            ValueKind::Any => "any",
        }
    }
}

impl Value {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Safe numeric coercion.
    ///
    /// Numbers and booleans convert directly; text is trimmed and parsed.
    /// Everything else (and unparsable text) yields `None`.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) if f.is_nan() => None,
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Text(s) => s.trim().parse::<f64>().ok().filter(|f| !f.is_nan()),
            _ => None,
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
        }
    }

    /// Length of text (in chars) or of a collection.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Text(s) => Some(s.chars().count()),
            Value::List(items) => Some(items.len()),
            Value::Map(map) => Some(map.len()),
            _ => None,
        }
    }

    /// Null, empty text and empty collections count as "empty".
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            other => other.len() == Some(0),
        }
    }

    /// Text rendering used by string comparators and transforms.
    pub fn to_text(&self) -> String {
        match self {
            Value::Text(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Equality that treats `Int(1)` and `Float(1.0)` as equal.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(_), Value::Float(_)) | (Value::Float(_), Value::Int(_)) => {
                self.as_number() == other.as_number()
            }
            _ => self == other,
        }
    }

    /// Membership test: substring for text, element for lists, key for maps.
    pub fn contains(&self, needle: &Value) -> Option<bool> {
        match self {
            Value::Text(s) => needle.as_str().map(|n| s.contains(n)),
            Value::List(items) => Some(items.iter().any(|item| item.loose_eq(needle))),
            Value::Map(map) => Some(map.contains_key(&needle.to_text())),
            _ => None,
        }
    }

    /// Mapping-key lookup: map keys, or list indices given as decimal text.
    pub fn get_key(&self, key: &str) -> Option<Value> {
        match self {
            Value::Map(map) => map.get(key).cloned(),
            Value::List(items) => key.parse::<usize>().ok().and_then(|i| items.get(i).cloned()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::List(_) | Value::Map(_) => {
                let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
                f.write_str(&json)
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
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

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
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

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(map: IndexMap<String, Value>) -> Self {
        Value::Map(map)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}

/// Rust types that map onto a single [`ValueKind`].
///
/// Used by typed accessors to convert in and out of the dynamic model.
pub trait AtomType: Sized + Into<Value> {
    const KIND: ValueKind;

    fn from_value(value: Value) -> Option<Self>;
}

impl AtomType for bool {
    const KIND: ValueKind = ValueKind::Bool;

    fn from_value(value: Value) -> Option<Self> {
        value.as_bool()
    }
}

impl AtomType for i64 {
    const KIND: ValueKind = ValueKind::Int;

    fn from_value(value: Value) -> Option<Self> {
        value.as_i64()
    }
}

impl AtomType for f64 {
    const KIND: ValueKind = ValueKind::Float;

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Float(x) => Some(x),
            _ => None,
        }
    }
}

impl AtomType for String {
    const KIND: ValueKind = ValueKind::Text;

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl AtomType for Vec<Value> {
    const KIND: ValueKind = ValueKind::List;

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::List(items) => Some(items),
            _ => None,
        }
    }
}

impl AtomType for IndexMap<String, Value> {
    const KIND: ValueKind = ValueKind::Map;

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_defaults() {
        assert_eq!(ValueKind::Int.default_value(), Value::Int(0));
        assert_eq!(ValueKind::Text.default_value(), Value::Text(String::new()));
        assert_eq!(ValueKind::Bool.default_value(), Value::Bool(false));
        assert_eq!(ValueKind::List.default_value(), Value::List(vec![]));
        assert!(ValueKind::Map.default_value().is_empty());
        assert!(ValueKind::Any.default_value().is_null());
    }

    #[test]
    fn kind_checks_are_strict() {
        assert!(ValueKind::Int.accepts(&Value::Int(3)));
        assert!(!ValueKind::Int.accepts(&Value::Float(3.0)));
        assert!(!ValueKind::Float.accepts(&Value::Int(3)));
        assert!(ValueKind::Text.accepts(&Value::Null));
        assert!(ValueKind::Any.accepts(&Value::from(vec![1, 2])));
    }

    #[test]
    fn numeric_coercion_fails_closed() {
        assert_eq!(Value::from(" 42 ").as_number(), Some(42.0));
        assert_eq!(Value::from("4x2").as_number(), None);
        assert_eq!(Value::Null.as_number(), None);
        assert_eq!(Value::from(vec![1]).as_number(), None);
        assert_eq!(Value::Bool(true).as_number(), Some(1.0));
    }

    #[test]
    fn loose_equality_crosses_int_and_float() {
        assert!(Value::Int(1).loose_eq(&Value::Float(1.0)));
        assert_ne!(Value::Int(1), Value::Float(1.0));
        assert!(!Value::Int(1).loose_eq(&Value::from("1")));
    }

    #[test]
    fn containment() {
        assert_eq!(Value::from("hello").contains(&Value::from("ell")), Some(true));
        assert_eq!(Value::from(vec![1, 2]).contains(&Value::Float(2.0)), Some(true));
        assert_eq!(Value::Int(5).contains(&Value::Int(5)), None);
    }

    #[test]
    fn key_lookup() {
        let mut map = IndexMap::new();
        map.insert("city".to_string(), Value::from("Lima"));
        let value = Value::Map(map);

        assert_eq!(value.get_key("city"), Some(Value::from("Lima")));
        assert_eq!(value.get_key("zip"), None);
        assert_eq!(Value::from(vec!["a", "b"]).get_key("1"), Some(Value::from("b")));
    }

    #[test]
    fn json_round_trip_keeps_number_kinds() {
        let value = Value::from(vec![Value::Int(1), Value::Float(1.0), Value::Null]);
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, "[1,1.0,null]");

        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }
}
