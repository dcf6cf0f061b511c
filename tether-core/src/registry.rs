//! Instance Registry
//!
//! Maps `ref` strings to live Origins so external code can find an instance
//! by identity and hot-swap its behaviour without resetting its state.
//!
//! # Lifecycle
//!
//! - An entry is created when an Origin is built:
//!   [`OriginBuilder::build`](crate::reactive::OriginBuilder::build) uses
//!   the global registry and
//!   [`OriginBuilder::build_in`](crate::reactive::OriginBuilder::build_in)
//!   a given one. A ref held by a live Origin cannot be built again.
//! - A hot-swap keeps the entry and the Origin; only the schema changes.
//! - An entry is removed only by [`Registry::dispose`].
//!
//! Lookups are concurrent (`DashMap`). Registration and hot-swap should be
//! treated as single-writer operations by the embedding application.
//!
//! Tests build isolated registries with [`Registry::new`]; the process-wide
//! instance is [`Registry::global`].

use std::sync::{Arc, OnceLock};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::error::{PropagationReport, ReactiveError, Result};
use crate::reactive::{Origin, Schema};

static GLOBAL: OnceLock<Registry> = OnceLock::new();

#[derive(Debug, Default)]
pub struct Registry {
    origins: DashMap<String, Origin>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static Registry {
        GLOBAL.get_or_init(Registry::new)
    }

    /// Bind `origin` under its ref.
    ///
    /// Registering the same Origin again is a no-op. A ref held by a
    /// disposed Origin may be taken over; a ref held by a different live
    /// Origin is a `DuplicateRef`.
    pub fn register(&self, origin: &Origin) -> Result<()> {
        match self.origins.entry(origin.ref_id().to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().ptr_eq(origin) {
                    return Ok(());
                }
                if !entry.get().is_disposed() {
                    return Err(ReactiveError::DuplicateRef(origin.ref_id().to_string()));
                }
                entry.insert(origin.clone());
            }
            Entry::Vacant(entry) => {
                entry.insert(origin.clone());
            }
        }
        debug!(origin = %origin.ref_id(), "origin registered");
        Ok(())
    }

    pub fn lookup(&self, ref_id: &str) -> Option<Origin> {
        self.origins.get(ref_id).map(|entry| entry.value().clone())
    }

    /// Whether `ref_id` is held by a live Origin.
    pub fn is_bound(&self, ref_id: &str) -> bool {
        self.lookup(ref_id).is_some_and(|origin| !origin.is_disposed())
    }

    /// Replace the behaviour of the Origin registered under `ref_id`,
    /// preserving its atom values and listeners.
    pub fn hot_swap(&self, ref_id: &str, schema: Arc<Schema>) -> Result<PropagationReport> {
        let origin = self
            .lookup(ref_id)
            .ok_or_else(|| ReactiveError::UnknownRef(ref_id.to_string()))?;
        debug!(origin = ref_id, type_name = schema.type_name(), "hot swap");
        origin.swap_schema(schema)
    }

    /// Remove and dispose the Origin registered under `ref_id`.
    ///
    /// Returns false if nothing was registered.
    pub fn dispose(&self, ref_id: &str) -> bool {
        match self.origins.remove(ref_id) {
            Some((_, origin)) => {
                origin.dispose();
                debug!(origin = ref_id, "origin removed from registry");
                true
            }
            None => false,
        }
    }

    /// Registered refs, sorted.
    pub fn refs(&self) -> Vec<String> {
        let mut refs: Vec<String> = self.origins.iter().map(|e| e.key().clone()).collect();
        refs.sort();
        refs
    }

    pub fn len(&self) -> usize {
        self.origins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Value, ValueKind};

    fn schema() -> Arc<Schema> {
        Schema::builder("Item")
            .atom("qty", ValueKind::Int)
            .build()
            .unwrap()
    }

    #[test]
    fn register_and_lookup() {
        let registry = Registry::new();
        let origin = Origin::builder(schema(), "i1").build_in(&registry).unwrap();

        assert_eq!(registry.len(), 1);
        assert!(registry.lookup("i1").unwrap().ptr_eq(&origin));
        assert!(registry.lookup("i2").is_none());
        // Same origin twice is fine.
        registry.register(&origin).unwrap();
        assert_eq!(registry.refs(), vec!["i1"]);
    }

    #[test]
    fn duplicate_refs_are_refused() {
        let registry = Registry::new();
        Origin::builder(schema(), "dup").build_in(&registry).unwrap();

        let err = Origin::builder(schema(), "dup").build_in(&registry).unwrap_err();
        assert_eq!(err, ReactiveError::DuplicateRef("dup".into()));

        let other = Origin::builder(schema(), "dup")
            .build_in(&Registry::new())
            .unwrap();
        assert!(registry.register(&other).is_err());
    }

    #[test]
    fn disposed_refs_can_be_reused() {
        let registry = Registry::new();
        let first = Origin::builder(schema(), "r").build_in(&registry).unwrap();
        first.dispose();

        let second = Origin::builder(schema(), "r")
            .build_in(&Registry::new())
            .unwrap();
        registry.register(&second).unwrap();
        assert!(registry.lookup("r").unwrap().ptr_eq(&second));
    }

    #[test]
    fn dispose_removes_entry() {
        let registry = Registry::new();
        let origin = Origin::builder(schema(), "gone").build_in(&registry).unwrap();
        assert!(registry.dispose("gone"));
        assert!(!registry.dispose("gone"));
        assert!(registry.is_empty());
        assert!(origin.is_disposed());
    }

    #[test]
    fn hot_swap_unknown_ref_fails() {
        let registry = Registry::new();
        assert_eq!(
            registry.hot_swap("ghost", schema()).unwrap_err(),
            ReactiveError::UnknownRef("ghost".into())
        );
    }

    #[test]
    fn hot_swap_preserves_values() {
        let registry = Registry::new();
        let origin = Origin::builder(schema(), "hs").set("qty", 4).build_in(&registry).unwrap();

        let v2 = Schema::builder("Item")
            .atom("qty", ValueKind::Int)
            .atom("note", ValueKind::Text)
            .computed("double", ValueKind::Int, |o| {
                Ok(Value::Int(o.get("qty")?.as_i64().unwrap_or(0) * 2))
            })
            .build()
            .unwrap();
        registry.hot_swap("hs", v2).unwrap();

        assert_eq!(origin.get("qty").unwrap(), Value::Int(4));
        assert_eq!(origin.get("note").unwrap(), Value::from(""));
        assert_eq!(origin.get("double").unwrap(), Value::Int(8));
    }

    #[test]
    fn global_registry_is_shared() {
        let a = Registry::global() as *const Registry;
        let b = Registry::global() as *const Registry;
        assert_eq!(a, b);
    }
}
