//! Typed accessors.
//!
//! An [`Accessor`] is a statically typed handle to one declared name. It is
//! produced from a [`Schema`](super::Schema) after the declared kind has
//! been checked, and routes every read and write through the Origin's
//! normal path, so tracking and propagation behave exactly as with
//! [`Origin::get`] and [`Origin::set`].

use std::fmt;
use std::marker::PhantomData;

use super::origin::Origin;
use crate::error::{PropagationReport, ReactiveError, Result};
use crate::value::AtomType;

pub struct Accessor<T: AtomType> {
    name: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T: AtomType> Accessor<T> {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read and convert. A value of another kind (including `Null`) is a
    /// `TypeMismatch`.
    pub fn get(&self, origin: &Origin) -> Result<T> {
        let value = origin.get(&self.name)?;
        let found = value.kind_name();
        T::from_value(value).ok_or_else(|| ReactiveError::TypeMismatch {
            name: self.name.clone(),
            expected: T::KIND.name(),
            found,
        })
    }

    pub fn set(&self, origin: &Origin, value: T) -> Result<PropagationReport> {
        origin.set(&self.name, value)
    }
}

impl<T: AtomType> Clone for Accessor<T> {
    fn clone(&self) -> Self {
        Self::new(self.name.clone())
    }
}

impl<T: AtomType> fmt::Debug for Accessor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accessor")
            .field("name", &self.name)
            .field("kind", &T::KIND)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ReactiveError;
    use crate::reactive::{Origin, Schema};
    use crate::value::{Value, ValueKind};

    #[test]
    fn typed_round_trip() {
        let schema = Schema::builder("Counter")
            .atom("count", ValueKind::Int)
            .atom("label", ValueKind::Text)
            .computed("even", ValueKind::Bool, |o| {
                Ok(Value::Bool(o.get("count")?.as_i64().unwrap_or(0) % 2 == 0))
            })
            .build()
            .unwrap();
        let count = schema.accessor::<i64>("count").unwrap();
        let label = schema.accessor::<String>("label").unwrap();
        let even = schema.accessor::<bool>("even").unwrap();
        let origin = Origin::builder(schema, "typed-round-trip").build().unwrap();

        count.set(&origin, 3).unwrap();
        label.set(&origin, "three".to_string()).unwrap();
        assert_eq!(count.get(&origin).unwrap(), 3);
        assert_eq!(label.get(&origin).unwrap(), "three");
        assert!(!even.get(&origin).unwrap());
        assert!(matches!(
            even.set(&origin, true),
            Err(ReactiveError::ReadOnly { .. })
        ));
    }

    #[test]
    fn null_reads_are_type_mismatches() {
        let schema = Schema::builder("T").atom("n", ValueKind::Int).build().unwrap();
        let n = schema.accessor::<i64>("n").unwrap();
        let origin = Origin::builder(schema, "null-reads-are-type-mismatches").build().unwrap();
        origin.set("n", Value::Null).unwrap();
        assert!(matches!(
            n.get(&origin),
            Err(ReactiveError::TypeMismatch { found: "null", .. })
        ));
    }
}
