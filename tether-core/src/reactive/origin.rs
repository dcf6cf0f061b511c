//! Origin Implementation
//!
//! An Origin is an observable object: an ordered set of named atoms, the
//! computed atoms, reactions and effects its [`Schema`] declares, and the
//! dependency graph that connects them.
//!
//! # How It Works
//!
//! 1. Reading an atom records `(origin, name)` into the innermost
//!    dependency-collection frame, if one is active.
//!
//! 2. Writing an atom compares the new value with the old one. Equal
//!    values stop right there. Otherwise the value is stored, every
//!    computed atom downstream is marked dirty and every reaction or effect
//!    downstream is queued.
//!
//! 3. Outside a batch the queue is flushed immediately: subscribers resolve
//!    in subscription order, then change listeners are called once with
//!    the set of changed names.
//!
//! Building an Origin registers it under its ref, in the global
//! [`Registry`] unless another one is given. Computed atoms that a
//! reaction or effect subscribes to run once at that point so their edges
//! exist before the first write.
//!
//! # Locking
//!
//! State sits behind one `parking_lot::Mutex`. The lock is never held while
//! user code runs (computed functions, handlers, listeners), so that code
//! is free to read and write the same Origin.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::{IndexMap, IndexSet};
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, warn};

use super::batch::{self, Batch};
use super::computed::ComputedSlot;
use super::context::ReactiveContext;
use super::reaction::SubscriberSlot;
use super::schema::Schema;
use crate::config::Settings;
use crate::error::{HandlerFailure, PropagationReport, ReactiveError, Result};
use crate::graph::{DependencyGraph, Node, NodeId};
use crate::registry::Registry;
use crate::rules::PathSource;
use crate::value::{Value, ValueKind};

/// Key 0 is reserved for untracked frames.
static ORIGIN_KEY: AtomicU64 = AtomicU64::new(1);

/// Handle returned by [`Origin::on_change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Names that changed during one write or flush.
///
/// Contains the written atoms and the computed atoms they dirtied, in the
/// order they changed.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet {
    pub origin: String,
    pub names: IndexSet<String>,
}

impl ChangeSet {
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}

pub(crate) type Listener = Arc<dyn Fn(&ChangeSet) + Send + Sync>;
pub(crate) type ErrorHook = Arc<dyn Fn(&HandlerFailure) + Send + Sync>;

pub(crate) struct AtomSlot {
    pub(crate) node: NodeId,
    pub(crate) kind: ValueKind,
    pub(crate) default: Value,
    pub(crate) value: Value,
}

pub(crate) struct OriginState {
    pub(crate) schema: Arc<Schema>,
    pub(crate) settings: Settings,
    pub(crate) atoms: IndexMap<String, AtomSlot>,
    pub(crate) computeds: IndexMap<String, ComputedSlot>,
    pub(crate) subscribers: IndexMap<NodeId, SubscriberSlot>,
    pub(crate) graph: DependencyGraph,

    /// Subscribers queued for resolution.
    pub(crate) pending: IndexSet<NodeId>,

    /// Names changed since the last listener notification.
    pub(crate) changed: IndexSet<String>,

    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
    pub(crate) error_hook: Option<ErrorHook>,
    pub(crate) disposed: bool,
}

impl OriginState {
    fn new(schema: &Arc<Schema>, settings: Settings, error_hook: Option<ErrorHook>) -> Self {
        Self {
            schema: Arc::clone(schema),
            settings,
            atoms: IndexMap::new(),
            computeds: IndexMap::new(),
            subscribers: IndexMap::new(),
            graph: DependencyGraph::new(),
            pending: IndexSet::new(),
            changed: IndexSet::new(),
            listeners: Vec::new(),
            next_listener: 0,
            error_hook,
            disposed: false,
        }
    }

    /// Rebuild atoms, behaviour and graph from `schema`.
    ///
    /// Atoms named in `values` keep that value if their declared kind still
    /// accepts it; everything else starts at its default. Listeners, hook and
    /// settings are untouched.
    fn install(&mut self, schema: &Arc<Schema>, mut values: IndexMap<String, Value>) {
        self.graph.clear();
        self.atoms.clear();
        self.computeds.clear();
        self.subscribers.clear();
        self.pending.clear();
        self.changed.clear();

        for decl in schema.atoms() {
            let node = Node::atom(&decl.name);
            let id = node.id();
            self.graph.add_node(node);
            let value = match values.shift_remove(&decl.name) {
                Some(value) if decl.kind.accepts(&value) => value,
                Some(value) => {
                    debug!(
                        atom = %decl.name,
                        found = value.kind_name(),
                        "dropping value that no longer matches declared kind"
                    );
                    decl.default.clone()
                }
                None => decl.default.clone(),
            };
            self.atoms.insert(
                decl.name.clone(),
                AtomSlot {
                    node: id,
                    kind: decl.kind,
                    default: decl.default.clone(),
                    value,
                },
            );
        }

        for decl in schema.computeds() {
            let node = Node::computed(&decl.name);
            let id = node.id();
            self.graph.add_node(node);
            self.computeds.insert(decl.name.clone(), ComputedSlot::new(id, decl));
        }

        for decl in schema.reactions() {
            let node = Node::reaction(&decl.name);
            let id = node.id();
            self.graph.add_node(node);
            let deps: Vec<NodeId> = decl
                .atoms
                .iter()
                .filter_map(|name| self.graph.lookup(name))
                .collect();
            if let Err(edge) = self.graph.subscribe(id, &deps) {
                warn!(reaction = %decl.name, ?edge, "refused subscription edge");
            }
            self.subscribers.insert(id, SubscriberSlot::reaction(decl));
        }

        for decl in schema.effects() {
            let node = Node::effect(&decl.name);
            let id = node.id();
            self.graph.add_node(node);
            let deps: Vec<NodeId> = decl
                .rule
                .root_atoms()
                .iter()
                .filter_map(|name| self.graph.lookup(name))
                .collect();
            if let Err(edge) = self.graph.subscribe(id, &deps) {
                warn!(effect = %decl.name, ?edge, "refused subscription edge");
            }
            self.subscribers.insert(id, SubscriberSlot::effect(decl));
        }

        self.schema = Arc::clone(schema);
    }
}

pub(crate) struct OriginInner {
    pub(crate) key: u64,
    pub(crate) ref_id: String,
    pub(crate) state: Mutex<OriginState>,
}

/// An observable object instance.
///
/// Cloning is cheap and yields another handle to the same instance.
#[derive(Clone)]
pub struct Origin {
    inner: Arc<OriginInner>,
}

impl Origin {
    /// Start building an instance of `schema` identified by `ref_id`.
    pub fn builder(schema: Arc<Schema>, ref_id: impl Into<String>) -> OriginBuilder {
        OriginBuilder::new(schema, ref_id)
    }

    /// The process-unique identity string.
    pub fn ref_id(&self) -> &str {
        &self.inner.ref_id
    }

    pub fn schema(&self) -> Arc<Schema> {
        Arc::clone(&self.state().schema)
    }

    pub fn type_name(&self) -> String {
        self.state().schema.type_name().to_string()
    }

    pub fn settings(&self) -> Settings {
        self.state().settings.clone()
    }

    /// Whether both handles point at the same instance.
    pub fn ptr_eq(&self, other: &Origin) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn key(&self) -> u64 {
        self.inner.key
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, OriginState> {
        self.inner.state.lock()
    }

    pub(crate) fn downgrade(&self) -> Weak<OriginInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn from_inner(inner: Arc<OriginInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn not_found(&self, name: &str) -> ReactiveError {
        ReactiveError::AtomNotFound {
            origin: self.inner.ref_id.clone(),
            name: name.to_string(),
        }
    }

    pub(crate) fn cycle(&self, name: &str) -> ReactiveError {
        ReactiveError::CyclicDependency {
            origin: self.inner.ref_id.clone(),
            name: name.to_string(),
        }
    }

    fn read_only(&self, name: &str) -> ReactiveError {
        ReactiveError::ReadOnly {
            origin: self.inner.ref_id.clone(),
            name: name.to_string(),
        }
    }

    /// Atom names in declaration order, followed by computed names.
    pub fn names(&self) -> Vec<String> {
        let state = self.state();
        state
            .atoms
            .keys()
            .chain(state.computeds.keys())
            .cloned()
            .collect()
    }

    /// Whether `name` is a declared atom or computed atom.
    pub fn has(&self, name: &str) -> bool {
        let state = self.state();
        state.atoms.contains_key(name) || state.computeds.contains_key(name)
    }

    pub fn is_atom(&self, name: &str) -> bool {
        self.state().atoms.contains_key(name)
    }

    /// Read an atom or computed atom.
    ///
    /// Inside a computed function or rule evaluation the read is recorded
    /// as a dependency. Dirty computed atoms recompute before returning.
    pub fn get(&self, name: &str) -> Result<Value> {
        let node = {
            let state = self.state();
            if let Some(slot) = state.atoms.get(name) {
                ReactiveContext::track_read(self.key(), name);
                return Ok(slot.value.clone());
            }
            let slot = state.computeds.get(name).ok_or_else(|| self.not_found(name))?;
            let fresh = state.graph.get_node(slot.node).is_some_and(|n| n.is_clean());
            match &slot.cache {
                Some(value) if fresh => {
                    ReactiveContext::track_read(self.key(), name);
                    return Ok(value.clone());
                }
                _ => slot.node,
            }
        };
        ReactiveContext::track_read(self.key(), name);
        self.recompute(name, node)
    }

    /// Write an atom.
    ///
    /// Equal values are a no-op. Outside a batch, queued subscribers and
    /// listeners run before this returns; the report lists any handler
    /// that failed.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<PropagationReport> {
        let value = value.into();
        {
            let mut guard = self.state();
            let state = &mut *guard;
            if state.disposed {
                return Ok(PropagationReport::new());
            }
            if state.computeds.contains_key(name) {
                return Err(self.read_only(name));
            }
            let slot = state.atoms.get_mut(name).ok_or_else(|| self.not_found(name))?;
            if !slot.kind.accepts(&value) {
                return Err(ReactiveError::TypeMismatch {
                    name: name.to_string(),
                    expected: slot.kind.name(),
                    found: value.kind_name(),
                });
            }
            if slot.value == value {
                return Ok(PropagationReport::new());
            }

            debug!(origin = %self.inner.ref_id, atom = name, value = %value, "atom written");
            slot.value = value;
            let node = slot.node;

            state.changed.insert(name.to_string());
            for id in state.graph.mark_changed(node) {
                if state.subscribers.contains_key(&id) {
                    state.pending.insert(id);
                } else if let Some(computed) = state.graph.name_of(id) {
                    state.changed.insert(computed.to_string());
                }
            }
        }

        if Batch::is_open() {
            batch::touch(self);
            return Ok(PropagationReport::new());
        }
        Ok(self.flush())
    }

    /// Resolve queued subscribers, then notify listeners once.
    pub(crate) fn flush(&self) -> PropagationReport {
        let mut report = PropagationReport::new();
        loop {
            let mut pending: Vec<NodeId> = self.state().pending.drain(..).collect();
            if pending.is_empty() {
                break;
            }
            // Ids follow registration order.
            pending.sort();
            debug!(origin = %self.inner.ref_id, count = pending.len(), "flushing subscribers");
            for id in pending {
                report.merge(self.resolve(id));
            }
        }

        let (names, listeners) = {
            let mut state = self.state();
            let names = std::mem::take(&mut state.changed);
            let listeners: Vec<Listener> = state.listeners.iter().map(|(_, l)| l.clone()).collect();
            (names, listeners)
        };
        if !names.is_empty() {
            let change = ChangeSet {
                origin: self.inner.ref_id.clone(),
                names,
            };
            for listener in listeners {
                listener(&change);
            }
        }
        report
    }

    /// Log a subscriber failure and hand it to the error hook.
    pub(crate) fn report_failure(&self, failure: &HandlerFailure) {
        warn!(
            origin = %failure.origin,
            subscriber = %failure.subscriber,
            error = %failure.message,
            "subscriber failed"
        );
        let hook = self.state().error_hook.clone();
        if let Some(hook) = hook {
            hook(failure);
        }
    }

    /// Atom values keyed by name, in declaration order.
    pub fn to_mapping(&self) -> IndexMap<String, Value> {
        self.state()
            .atoms
            .iter()
            .map(|(name, slot)| (name.clone(), slot.value.clone()))
            .collect()
    }

    /// Bulk import: one write per differing key.
    ///
    /// Keys that are not declared atoms are skipped. Wrap the call in a
    /// [`Batch`] to coalesce notifications.
    pub fn update(&self, mapping: &IndexMap<String, Value>) -> Result<PropagationReport> {
        let mut report = PropagationReport::new();
        for (name, value) in mapping {
            if !self.is_atom(name) {
                debug!(origin = %self.inner.ref_id, key = %name, "ignoring undeclared key");
                continue;
            }
            report.merge(self.set(name, value.clone())?);
        }
        Ok(report)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_mapping())?)
    }

    pub fn update_from_json(&self, json: &str) -> Result<PropagationReport> {
        let mapping: IndexMap<String, Value> = serde_json::from_str(json)?;
        self.update(&mapping)
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(&self.to_mapping())?)
    }

    pub fn update_from_msgpack(&self, bytes: &[u8]) -> Result<PropagationReport> {
        let mapping: IndexMap<String, Value> = rmp_serde::from_slice(bytes)?;
        self.update(&mapping)
    }

    fn default_of(&self, name: &str) -> Result<Value> {
        let state = self.state();
        match state.atoms.get(name) {
            Some(slot) => Ok(slot.default.clone()),
            None if state.computeds.contains_key(name) => Err(self.read_only(name)),
            None => Err(self.not_found(name)),
        }
    }

    /// Write the declared defaults of `names` back.
    pub fn reset(&self, names: &[&str]) -> Result<PropagationReport> {
        let mut report = PropagationReport::new();
        for name in names {
            let default = self.default_of(name)?;
            report.merge(self.set(name, default)?);
        }
        Ok(report)
    }

    pub fn reset_all(&self) -> Result<PropagationReport> {
        let defaults: Vec<(String, Value)> = self
            .state()
            .atoms
            .iter()
            .map(|(name, slot)| (name.clone(), slot.default.clone()))
            .collect();
        let mut report = PropagationReport::new();
        for (name, default) in defaults {
            report.merge(self.set(&name, default)?);
        }
        Ok(report)
    }

    /// Invert a boolean atom.
    pub fn toggle(&self, name: &str) -> Result<PropagationReport> {
        match self.get(name)? {
            Value::Bool(b) => self.set(name, !b),
            other => Err(ReactiveError::TypeMismatch {
                name: name.to_string(),
                expected: ValueKind::Bool.name(),
                found: other.kind_name(),
            }),
        }
    }

    /// Mutate a copy of the current value and write it back.
    ///
    /// This is how collections change in place: the write only propagates
    /// if `f` actually changed something.
    pub fn modify(&self, name: &str, f: impl FnOnce(&mut Value)) -> Result<PropagationReport> {
        let mut value = self.get(name)?;
        f(&mut value);
        self.set(name, value)
    }

    /// Register a change listener.
    pub fn on_change(&self, listener: impl Fn(&ChangeSet) + Send + Sync + 'static) -> ListenerId {
        let mut state = self.state();
        let id = ListenerId(state.next_listener);
        state.next_listener += 1;
        state.listeners.push((id, Arc::new(listener)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut state = self.state();
        let before = state.listeners.len();
        state.listeners.retain(|(lid, _)| *lid != id);
        state.listeners.len() != before
    }

    /// Install the hook that receives every subscriber failure.
    pub fn on_error(&self, hook: impl Fn(&HandlerFailure) + Send + Sync + 'static) {
        self.state().error_hook = Some(Arc::new(hook));
    }

    /// Drop behaviour, graph and listeners.
    ///
    /// Atom values stay readable; writes become no-ops and snapshots of a
    /// disposed Origin no longer restore.
    pub fn dispose(&self) {
        let mut state = self.state();
        if state.disposed {
            return;
        }
        state.disposed = true;
        state.graph.clear();
        state.computeds.clear();
        state.subscribers.clear();
        state.listeners.clear();
        state.pending.clear();
        state.changed.clear();
        state.error_hook = None;
        debug!(origin = %self.inner.ref_id, "origin disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.state().disposed
    }

    /// Replace computed atoms, reactions and effects with those of `schema`.
    ///
    /// Atom values survive for names the new schema still declares with a
    /// compatible kind. Listeners and the error hook are kept. Non-lazy
    /// reactions and effects run once afterwards when `fire_on_register`
    /// is set.
    pub fn swap_schema(&self, schema: Arc<Schema>) -> Result<PropagationReport> {
        let fire = {
            let mut state = self.state();
            if state.disposed {
                return Err(ReactiveError::UnknownRef(self.inner.ref_id.clone()));
            }
            let values: IndexMap<String, Value> = state
                .atoms
                .iter()
                .map(|(name, slot)| (name.clone(), slot.value.clone()))
                .collect();
            state.install(&schema, values);
            state.settings.fire_on_register
        };
        debug!(origin = %self.inner.ref_id, type_name = schema.type_name(), "schema swapped");
        self.prime_subscribed();
        Ok(if fire {
            self.fire_registered()
        } else {
            PropagationReport::new()
        })
    }

    /// Names `name` reads from.
    pub fn dependencies_of(&self, name: &str) -> Result<Vec<String>> {
        let state = self.state();
        let id = state.graph.lookup(name).ok_or_else(|| self.not_found(name))?;
        Ok(state.graph.dependency_names(id))
    }

    /// Names of the computed atoms, reactions and effects that read `name`.
    pub fn dependents_of(&self, name: &str) -> Result<Vec<String>> {
        let state = self.state();
        let id = state.graph.lookup(name).ok_or_else(|| self.not_found(name))?;
        Ok(state.graph.dependent_names(id))
    }
}

impl PathSource for Origin {
    fn lookup_key(&self, _key: &str) -> Result<Option<Value>> {
        Ok(None)
    }

    fn lookup_attr(&self, name: &str) -> Result<Option<Value>> {
        self.get(name).map(Some)
    }
}

impl fmt::Debug for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Origin")
            .field("ref", &self.inner.ref_id)
            .finish_non_exhaustive()
    }
}

/// Construction of an [`Origin`].
pub struct OriginBuilder {
    schema: Arc<Schema>,
    ref_id: String,
    values: IndexMap<String, Value>,
    settings: Settings,
    error_hook: Option<ErrorHook>,
}

impl OriginBuilder {
    pub fn new(schema: Arc<Schema>, ref_id: impl Into<String>) -> Self {
        Self {
            schema,
            ref_id: ref_id.into(),
            values: IndexMap::new(),
            settings: Settings::default(),
            error_hook: None,
        }
    }

    /// Initial value for an atom, overriding its default.
    pub fn set(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Error hook, installed before registration-time handlers run.
    pub fn on_error(mut self, hook: impl Fn(&HandlerFailure) + Send + Sync + 'static) -> Self {
        self.error_hook = Some(Arc::new(hook));
        self
    }

    fn check(&self) -> Result<()> {
        if self.ref_id.trim().is_empty() {
            return Err(ReactiveError::MissingRef);
        }
        for (name, value) in &self.values {
            match self.schema.atom(name) {
                Some(decl) if !decl.kind.accepts(value) => {
                    return Err(ReactiveError::TypeMismatch {
                        name: name.clone(),
                        expected: decl.kind.name(),
                        found: value.kind_name(),
                    });
                }
                Some(_) => {}
                None if self.schema.computed(name).is_some() => {
                    return Err(ReactiveError::ReadOnly {
                        origin: self.ref_id.clone(),
                        name: name.clone(),
                    });
                }
                None => {
                    return Err(ReactiveError::AtomNotFound {
                        origin: self.ref_id.clone(),
                        name: name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Build and register in the process-wide [`Registry`].
    ///
    /// Fails with `DuplicateRef` if a live Origin already holds the ref.
    /// Failures of registration-time handlers are logged and sent to the
    /// error hook; [`build_reported`](Self::build_reported) also returns
    /// them.
    pub fn build(self) -> Result<Origin> {
        self.build_in(Registry::global())
    }

    /// Build and register in `registry` instead of the global one.
    pub fn build_in(self, registry: &Registry) -> Result<Origin> {
        self.build_reported(registry).map(|(origin, _)| origin)
    }

    /// Build, register in `registry`, and return the report of the
    /// handlers that ran at registration.
    ///
    /// The ref is checked first, so no registration-time handler runs for
    /// an Origin the registry would refuse.
    pub fn build_reported(self, registry: &Registry) -> Result<(Origin, PropagationReport)> {
        self.check()?;
        if registry.is_bound(&self.ref_id) {
            return Err(ReactiveError::DuplicateRef(self.ref_id));
        }

        let mut state = OriginState::new(&self.schema, self.settings, self.error_hook);
        state.install(&self.schema, self.values);
        let fire = state.settings.fire_on_register;

        let origin = Origin {
            inner: Arc::new(OriginInner {
                key: ORIGIN_KEY.fetch_add(1, Ordering::Relaxed),
                ref_id: self.ref_id,
                state: Mutex::new(state),
            }),
        };
        if let Err(err) = registry.register(&origin) {
            // Lost a race for the ref.
            origin.dispose();
            return Err(err);
        }
        debug!(
            origin = %origin.ref_id(),
            type_name = self.schema.type_name(),
            "origin built"
        );

        origin.prime_subscribed();
        let report = if fire {
            origin.fire_registered()
        } else {
            PropagationReport::new()
        };
        Ok((origin, report))
    }
}
