//! Variables and path resolution.
//!
//! A [`Var`] names a dotted path (`profile.address.city`) and an optional
//! chain of [`To`] transforms. Each path segment is resolved by trying a
//! mapping-key lookup first and an attribute lookup second, which is the
//! whole read contract a host object has to honour ([`PathSource`]).

use crate::error::{ReactiveError, Result};
use crate::value::Value;

/// Duck-typed read access for rule evaluation.
pub trait PathSource {
    /// Mapping-key lookup (`obj["key"]`).
    fn lookup_key(&self, key: &str) -> Result<Option<Value>>;

    /// Attribute lookup (`obj.name`).
    fn lookup_attr(&self, name: &str) -> Result<Option<Value>>;
}

impl PathSource for Value {
    fn lookup_key(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.get_key(key))
    }

    fn lookup_attr(&self, name: &str) -> Result<Option<Value>> {
        Ok(match (self, name) {
            (Value::Map(map), _) => map.get(name).cloned(),
            (_, "len") => self.len().map(|n| Value::Int(n as i64)),
            _ => None,
        })
    }
}

/// Resolve `path` against `source`.
///
/// The root segment goes through `source` and may fail (an Origin reports
/// `AtomNotFound`); a missing nested segment resolves to `Null`.
pub fn resolve_path(source: &dyn PathSource, path: &str) -> Result<Value> {
    let mut segments = path.split('.');
    let root = segments.next().unwrap_or_default();

    let mut current = match source.lookup_key(root)? {
        Some(value) => value,
        None => source.lookup_attr(root)?.unwrap_or_default(),
    };

    for segment in segments {
        if current.is_null() {
            break;
        }
        current = match current.lookup_key(segment)? {
            Some(value) => value,
            None => current.lookup_attr(segment)?.unwrap_or_default(),
        };
    }
    Ok(current)
}

/// Value transforms applied after resolution, left to right.
///
/// Every transform is total: inputs it cannot handle become `Null`.
#[derive(Debug, Clone, PartialEq)]
pub enum To {
    Upper,
    Lower,
    Strip,
    Title,
    /// Keep alphabetic characters only.
    Alpha,
    /// Keep decimal digits only.
    Digits,
    /// Keep alphanumeric characters only.
    Alnum,
    /// Absolute value.
    Positive,
    /// Length of text or collection.
    Count,
    Round,
    Int,
    Float,
    Bool,
    /// Substitute a default when the value is null or empty.
    OrElse(Value),
}

impl To {
    pub fn apply(&self, value: Value) -> Value {
        match self {
            To::Upper => map_text(value, |s| s.to_uppercase()),
            To::Lower => map_text(value, |s| s.to_lowercase()),
            To::Strip => map_text(value, |s| s.trim().to_string()),
            To::Title => map_text(value, title_case),
            To::Alpha => map_text(value, |s| s.chars().filter(|c| c.is_alphabetic()).collect()),
            To::Digits => map_text(value, |s| s.chars().filter(|c| c.is_ascii_digit()).collect()),
            To::Alnum => map_text(value, |s| s.chars().filter(|c| c.is_alphanumeric()).collect()),
            To::Positive => match value {
                Value::Int(i) => Value::Int(i.saturating_abs()),
                Value::Float(x) => Value::Float(x.abs()),
                _ => Value::Null,
            },
            To::Count => value.len().map_or(Value::Null, |n| Value::Int(n as i64)),
            To::Round => value
                .as_number()
                .map_or(Value::Null, |x| Value::Int(x.round() as i64)),
            To::Int => value
                .as_number()
                .map_or(Value::Null, |x| Value::Int(x.trunc() as i64)),
            To::Float => value.as_number().map_or(Value::Null, Value::Float),
            To::Bool => Value::Bool(value.truthy()),
            To::OrElse(default) => {
                if value.is_empty() {
                    default.clone()
                } else {
                    value
                }
            }
        }
    }
}

fn map_text(value: Value, f: impl FnOnce(&str) -> String) -> Value {
    match value {
        Value::Null => Value::Null,
        other => Value::Text(f(&other.to_text())),
    }
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}

/// A tracked read of a dotted path, with optional transforms.
#[derive(Debug, Clone, PartialEq)]
pub struct Var {
    path: String,
    transforms: Vec<To>,
}

impl Var {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            transforms: Vec::new(),
        }
    }

    /// Append a transform to the chain.
    pub fn then(mut self, transform: To) -> Self {
        self.transforms.push(transform);
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// First path segment: the atom this variable reads on an Origin.
    pub fn root(&self) -> &str {
        self.path.split('.').next().unwrap_or_default()
    }

    pub fn transforms(&self) -> &[To] {
        &self.transforms
    }

    pub fn resolve(&self, source: &dyn PathSource) -> Result<Value> {
        let raw = resolve_path(source, &self.path)?;
        Ok(self.transforms.iter().fold(raw, |value, t| t.apply(value)))
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.path.split('.').any(str::is_empty) {
            return Err(ReactiveError::InvalidRule(format!(
                "malformed variable path '{}'",
                self.path
            )));
        }
        Ok(())
    }
}

impl From<&str> for Var {
    fn from(path: &str) -> Self {
        Var::new(path)
    }
}

impl From<String> for Var {
    fn from(path: String) -> Self {
        Var::new(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn profile() -> Value {
        let mut address = IndexMap::new();
        address.insert("city".to_string(), Value::from("  Quito "));
        let mut root = IndexMap::new();
        root.insert("address".to_string(), Value::Map(address));
        root.insert("tags".to_string(), Value::from(vec!["a", "b", "c"]));
        Value::Map(root)
    }

    #[test]
    fn resolves_nested_keys() {
        let value = resolve_path(&profile(), "address.city").unwrap();
        assert_eq!(value, Value::from("  Quito "));
    }

    #[test]
    fn missing_segments_resolve_to_null() {
        assert!(resolve_path(&profile(), "address.zip").unwrap().is_null());
        assert!(resolve_path(&profile(), "nothing.at.all").unwrap().is_null());
    }

    #[test]
    fn attribute_lookup_falls_back_after_keys() {
        assert_eq!(resolve_path(&profile(), "tags.len").unwrap(), Value::Int(3));
        assert_eq!(resolve_path(&profile(), "tags.1").unwrap(), Value::from("b"));
    }

    #[test]
    fn transforms_chain_left_to_right() {
        let var = Var::new("address.city").then(To::Strip).then(To::Upper);
        assert_eq!(var.resolve(&profile()).unwrap(), Value::from("QUITO"));

        let count = Var::new("address.city").then(To::Strip).then(To::Count);
        assert_eq!(count.resolve(&profile()).unwrap(), Value::Int(5));
    }

    #[test]
    fn character_filters() {
        let raw = Value::from("a1-b2 C3");
        assert_eq!(To::Alpha.apply(raw.clone()), Value::from("abC"));
        assert_eq!(To::Digits.apply(raw.clone()), Value::from("123"));
        assert_eq!(To::Alnum.apply(raw), Value::from("a1b2C3"));
        assert_eq!(To::Title.apply(Value::from("hello wORLD")), Value::from("Hello World"));
    }

    #[test]
    fn numeric_transforms_are_safe() {
        assert_eq!(To::Int.apply(Value::from("12.9")), Value::Int(12));
        assert_eq!(To::Int.apply(Value::from("twelve")), Value::Null);
        assert_eq!(To::Round.apply(Value::Float(2.5)), Value::Int(3));
        assert_eq!(To::Positive.apply(Value::Int(-4)), Value::Int(4));
        assert_eq!(To::Positive.apply(Value::from("x")), Value::Null);
        assert_eq!(To::Count.apply(Value::Int(4)), Value::Null);
    }

    #[test]
    fn or_else_substitutes_on_null_and_empty() {
        let fallback = To::OrElse(Value::from("guest"));
        assert_eq!(fallback.apply(Value::Null), Value::from("guest"));
        assert_eq!(fallback.apply(Value::from("")), Value::from("guest"));
        assert_eq!(fallback.apply(Value::from("ana")), Value::from("ana"));
    }

    #[test]
    fn malformed_paths_are_invalid() {
        assert!(Var::new("a..b").validate().is_err());
        assert!(Var::new("").validate().is_err());
        assert!(Var::new("a.b").validate().is_ok());
        assert_eq!(Var::new("a.b").root(), "a");
    }
}
