//! Origin Schemas
//!
//! A schema is the descriptor table of an Origin type: every atom with its
//! declared kind and default, every computed atom with its function, and
//! every reaction and effect with its handler. It is built once per type
//! and shared (`Arc<Schema>`) by all instances. Hot-swapping an Origin means
//! handing it a new schema.
//!
//! # Example
//!
//! ```rust,ignore
//! let schema = Schema::builder("User")
//!     .atom("age", ValueKind::Int)
//!     .atom_default("name", ValueKind::Text, "guest")
//!     .computed("is_adult", ValueKind::Bool, |o| {
//!         Ok(Value::Bool(o.get("age")?.as_i64().unwrap_or(0) >= 18))
//!     })
//!     .effect("unlock", If::at_least("age", 18), |o| {
//!         tracing::info!(user = o.ref_id(), "unlocked");
//!         Ok(())
//!     })
//!     .build()?;
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use super::accessor::Accessor;
use super::origin::Origin;
use crate::error::{HandlerError, ReactiveError, Result};
use crate::rules::Rule;
use crate::value::{AtomType, Value, ValueKind};

/// Function deriving a computed atom's value.
pub type ComputeFn = Arc<dyn Fn(&Origin) -> Result<Value> + Send + Sync>;

/// Reaction or effect handler. Receives the Origin, no payload.
pub type HandlerFn = Arc<dyn Fn(&Origin) -> std::result::Result<(), HandlerError> + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct AtomDecl {
    pub name: String,
    pub kind: ValueKind,
    pub default: Value,
}

#[derive(Clone)]
pub struct ComputedDecl {
    pub name: String,
    pub kind: ValueKind,
    pub compute: ComputeFn,
}

#[derive(Clone)]
pub struct ReactionDecl {
    pub name: String,
    pub atoms: Vec<String>,
    /// Skip the fire-on-registration run.
    pub lazy: bool,
    pub handler: HandlerFn,
}

#[derive(Clone)]
pub struct EffectDecl {
    pub name: String,
    pub rule: Arc<Rule>,
    pub handler: HandlerFn,
}

impl fmt::Debug for ComputedDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedDecl")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for ReactionDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactionDecl")
            .field("name", &self.name)
            .field("atoms", &self.atoms)
            .field("lazy", &self.lazy)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for EffectDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectDecl")
            .field("name", &self.name)
            .field("rule", &self.rule)
            .finish_non_exhaustive()
    }
}

/// Descriptor table for one Origin type.
#[derive(Debug)]
pub struct Schema {
    type_name: String,
    atoms: Vec<AtomDecl>,
    computeds: Vec<ComputedDecl>,
    reactions: Vec<ReactionDecl>,
    effects: Vec<EffectDecl>,
}

impl Schema {
    pub fn builder(type_name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            schema: Schema {
                type_name: type_name.into(),
                atoms: Vec::new(),
                computeds: Vec::new(),
                reactions: Vec::new(),
                effects: Vec::new(),
            },
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn atoms(&self) -> &[AtomDecl] {
        &self.atoms
    }

    pub fn computeds(&self) -> &[ComputedDecl] {
        &self.computeds
    }

    pub fn reactions(&self) -> &[ReactionDecl] {
        &self.reactions
    }

    pub fn effects(&self) -> &[EffectDecl] {
        &self.effects
    }

    pub fn atom(&self, name: &str) -> Option<&AtomDecl> {
        self.atoms.iter().find(|a| a.name == name)
    }

    pub fn computed(&self, name: &str) -> Option<&ComputedDecl> {
        self.computeds.iter().find(|c| c.name == name)
    }

    /// Whether `name` is a declared atom or computed atom.
    pub fn declares(&self, name: &str) -> bool {
        self.atom(name).is_some() || self.computed(name).is_some()
    }

    /// Declared kind of an atom or computed atom.
    pub fn kind_of(&self, name: &str) -> Option<ValueKind> {
        self.atom(name)
            .map(|a| a.kind)
            .or_else(|| self.computed(name).map(|c| c.kind))
    }

    /// A typed accessor for `name`.
    ///
    /// Fails if the name is undeclared or its declared kind is neither
    /// `T::KIND` nor `Any`.
    pub fn accessor<T: AtomType>(&self, name: &str) -> Result<Accessor<T>> {
        let kind = self.kind_of(name).ok_or_else(|| ReactiveError::AtomNotFound {
            origin: self.type_name.clone(),
            name: name.to_string(),
        })?;
        if kind != T::KIND && kind != ValueKind::Any {
            return Err(ReactiveError::TypeMismatch {
                name: name.to_string(),
                expected: T::KIND.name(),
                found: kind.name(),
            });
        }
        Ok(Accessor::new(name))
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        let names = self
            .atoms
            .iter()
            .map(|a| a.name.as_str())
            .chain(self.computeds.iter().map(|c| c.name.as_str()));
        for name in names {
            if name.is_empty() || name.contains('.') {
                return Err(ReactiveError::InvalidRule(format!(
                    "'{name}' is not a valid atom name"
                )));
            }
            if !seen.insert(name) {
                return Err(ReactiveError::DuplicateName(name.to_string()));
            }
        }

        for atom in &self.atoms {
            if !atom.kind.accepts(&atom.default) {
                return Err(ReactiveError::TypeMismatch {
                    name: atom.name.clone(),
                    expected: atom.kind.name(),
                    found: atom.default.kind_name(),
                });
            }
        }

        for reaction in &self.reactions {
            for name in &reaction.atoms {
                if !seen.contains(name.as_str()) {
                    return Err(self.not_found(name));
                }
            }
        }

        for effect in &self.effects {
            effect.rule.validate()?;
            for root in effect.rule.root_atoms() {
                if !seen.contains(root.as_str()) {
                    return Err(self.not_found(&root));
                }
            }
        }
        Ok(())
    }

    fn not_found(&self, name: &str) -> ReactiveError {
        ReactiveError::AtomNotFound {
            origin: self.type_name.clone(),
            name: name.to_string(),
        }
    }
}

/// Declarative construction of a [`Schema`].
pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    /// Declare an atom starting at its kind's default.
    pub fn atom(self, name: impl Into<String>, kind: ValueKind) -> Self {
        let default = kind.default_value();
        self.atom_default(name, kind, default)
    }

    /// Declare an atom with an explicit default.
    pub fn atom_default(
        mut self,
        name: impl Into<String>,
        kind: ValueKind,
        default: impl Into<Value>,
    ) -> Self {
        self.schema.atoms.push(AtomDecl {
            name: name.into(),
            kind,
            default: default.into(),
        });
        self
    }

    pub fn computed<F>(mut self, name: impl Into<String>, kind: ValueKind, compute: F) -> Self
    where
        F: Fn(&Origin) -> Result<Value> + Send + Sync + 'static,
    {
        self.schema.computeds.push(ComputedDecl {
            name: name.into(),
            kind,
            compute: Arc::new(compute),
        });
        self
    }

    /// Declare a reaction to explicit atom names.
    ///
    /// It fires once when the Origin is built and then once per relevant
    /// write or flush.
    pub fn reaction<F>(self, name: impl Into<String>, atoms: &[&str], handler: F) -> Self
    where
        F: Fn(&Origin) -> std::result::Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.push_reaction(name.into(), atoms, false, Arc::new(handler))
    }

    /// Like [`SchemaBuilder::reaction`] without the initial run.
    pub fn lazy_reaction<F>(self, name: impl Into<String>, atoms: &[&str], handler: F) -> Self
    where
        F: Fn(&Origin) -> std::result::Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.push_reaction(name.into(), atoms, true, Arc::new(handler))
    }

    fn push_reaction(mut self, name: String, atoms: &[&str], lazy: bool, handler: HandlerFn) -> Self {
        self.schema.reactions.push(ReactionDecl {
            name,
            atoms: atoms.iter().map(|a| a.to_string()).collect(),
            lazy,
            handler,
        });
        self
    }

    /// Declare an effect gated by `rule`.
    pub fn effect<F>(mut self, name: impl Into<String>, rule: Rule, handler: F) -> Self
    where
        F: Fn(&Origin) -> std::result::Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.schema.effects.push(EffectDecl {
            name: name.into(),
            rule: Arc::new(rule),
            handler: Arc::new(handler),
        });
        self
    }

    pub fn build(self) -> Result<Arc<Schema>> {
        self.schema.validate()?;
        Ok(Arc::new(self.schema))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{If, Is};

    #[test]
    fn builds_descriptor_table() {
        let schema = Schema::builder("User")
            .atom("age", ValueKind::Int)
            .atom_default("name", ValueKind::Text, "guest")
            .computed("adult", ValueKind::Bool, |_| Ok(Value::Bool(false)))
            .reaction("log", &["age", "adult"], |_| Ok(()))
            .effect("unlock", If::at_least("age", 18), |_| Ok(()))
            .build()
            .unwrap();

        assert_eq!(schema.type_name(), "User");
        assert_eq!(schema.atom("age").unwrap().default, Value::Int(0));
        assert_eq!(schema.atom("name").unwrap().default, Value::from("guest"));
        assert_eq!(schema.kind_of("adult"), Some(ValueKind::Bool));
        assert!(schema.declares("adult"));
        assert!(!schema.declares("log"));
        assert_eq!(schema.reactions().len(), 1);
        assert_eq!(schema.effects().len(), 1);
    }

    #[test]
    fn duplicate_names_are_refused() {
        let err = Schema::builder("T")
            .atom("a", ValueKind::Int)
            .computed("a", ValueKind::Int, |_| Ok(Value::Int(1)))
            .build()
            .unwrap_err();
        assert_eq!(err, ReactiveError::DuplicateName("a".into()));
    }

    #[test]
    fn defaults_must_match_kind() {
        let err = Schema::builder("T")
            .atom_default("a", ValueKind::Int, "nope")
            .build()
            .unwrap_err();
        assert!(matches!(err, ReactiveError::TypeMismatch { .. }));
    }

    #[test]
    fn subscriptions_must_name_declared_atoms() {
        let err = Schema::builder("T")
            .atom("a", ValueKind::Int)
            .reaction("r", &["b"], |_| Ok(()))
            .build()
            .unwrap_err();
        assert!(matches!(err, ReactiveError::AtomNotFound { ref name, .. } if name == "b"));

        let err = Schema::builder("T")
            .atom("a", ValueKind::Int)
            .effect("e", Is::positive("missing"), |_| Ok(()))
            .build()
            .unwrap_err();
        assert!(matches!(err, ReactiveError::AtomNotFound { .. }));
    }

    #[test]
    fn effect_rules_are_validated() {
        let err = Schema::builder("T")
            .atom("a", ValueKind::Text)
            .effect("e", If::matches("a", "(unclosed"), |_| Ok(()))
            .build()
            .unwrap_err();
        assert!(matches!(err, ReactiveError::InvalidRule(_)));
    }

    #[test]
    fn accessors_check_declared_kind() {
        let schema = Schema::builder("T")
            .atom("n", ValueKind::Int)
            .atom("any", ValueKind::Any)
            .build()
            .unwrap();

        assert!(schema.accessor::<i64>("n").is_ok());
        assert!(schema.accessor::<bool>("any").is_ok());
        assert!(matches!(
            schema.accessor::<String>("n"),
            Err(ReactiveError::TypeMismatch { .. })
        ));
        assert!(schema.accessor::<i64>("zzz").is_err());
    }
}
