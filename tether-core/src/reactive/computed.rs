//! Computed Atoms
//!
//! A computed atom is a cached value derived from other atoms.
//!
//! # How It Works
//!
//! 1. On first read, the function runs under a dependency-collection frame
//!    and the result is cached. Every same-origin name it read becomes an
//!    edge in the graph.
//!
//! 2. A write to any dependency marks the computed atom dirty. Nothing is
//!    recomputed at that point.
//!
//! 3. The next read recomputes once and caches again. Several writes (or a
//!    whole batch) between two reads still cost a single recomputation.
//!
//! # Edges Are Additive
//!
//! Recomputation only ever adds edges. A computed atom that read `b` once
//! keeps `b` as a trigger even after a later run takes a branch that no
//! longer reads it. Effects behave differently: their rule dependencies are
//! replaced on every evaluation.
//!
//! Reads of other Origins are tracked but create no edge; a computed atom
//! should derive from its own Origin's atoms.

use tracing::{trace, warn};

use super::context::ReactiveContext;
use super::origin::Origin;
use super::schema::{ComputeFn, ComputedDecl};
use crate::error::{ReactiveError, Result};
use crate::graph::NodeId;
use crate::value::{Value, ValueKind};

pub(crate) struct ComputedSlot {
    pub(crate) node: NodeId,
    pub(crate) kind: ValueKind,
    pub(crate) compute: ComputeFn,
    pub(crate) cache: Option<Value>,
    pub(crate) recomputes: usize,
}

impl ComputedSlot {
    pub(crate) fn new(node: NodeId, decl: &ComputedDecl) -> Self {
        Self {
            node,
            kind: decl.kind,
            compute: decl.compute.clone(),
            cache: None,
            recomputes: 0,
        }
    }
}

impl Origin {
    /// Run the function of computed atom `name` and cache the result.
    ///
    /// Fails with `CyclicDependency` if `name` is already resolving further
    /// up the call stack, or if an edge it discovered would close a cycle.
    /// A failed run leaves the cache untouched.
    pub(crate) fn recompute(&self, name: &str, node: NodeId) -> Result<Value> {
        let key = self.key();
        if ReactiveContext::is_resolving(key, node) {
            warn!(origin = %self.ref_id(), computed = name, "cyclic dependency");
            return Err(self.cycle(name));
        }

        let compute = match self.state().computeds.get(name) {
            Some(slot) => slot.compute.clone(),
            None => return Err(self.not_found(name)),
        };

        let (result, reads) = {
            let ctx = ReactiveContext::enter(key, node);
            let result = compute(self);
            (result, ctx.take_reads())
        };
        let value = result?;

        let mut guard = self.state();
        let state = &mut *guard;
        let kind = match state.computeds.get(name) {
            Some(slot) => slot.kind,
            // Swapped out while running.
            None => return Err(self.not_found(name)),
        };
        if !kind.accepts(&value) {
            return Err(ReactiveError::TypeMismatch {
                name: name.to_string(),
                expected: kind.name(),
                found: value.kind_name(),
            });
        }

        for (origin, read) in reads {
            if origin != key {
                continue;
            }
            let Some(dependency) = state.graph.lookup(&read) else {
                continue;
            };
            match state.graph.add_edge(dependency, node) {
                Ok(true) => trace!(origin = %self.ref_id(), computed = name, reads = %read, "edge added"),
                Ok(false) => {}
                Err(_) => {
                    warn!(origin = %self.ref_id(), computed = name, reads = %read, "cyclic dependency");
                    return Err(self.cycle(name));
                }
            }
        }

        if let Some(graph_node) = state.graph.get_node_mut(node) {
            graph_node.mark_clean();
        }
        if let Some(slot) = state.computeds.get_mut(name) {
            slot.cache = Some(value.clone());
            slot.recomputes += 1;
        }
        trace!(origin = %self.ref_id(), computed = name, "recomputed");
        Ok(value)
    }

    /// Run, once, every computed atom a reaction or effect is subscribed to.
    ///
    /// A computed atom only learns its edges by running. Until then a write
    /// to one of its atoms cannot reach the subscribers behind it. Failures
    /// leave the atom uncached; the next read tries again.
    pub(crate) fn prime_subscribed(&self) {
        let candidates: Vec<(String, NodeId)> = {
            let state = self.state();
            state
                .computeds
                .iter()
                .filter(|(_, slot)| {
                    state
                        .graph
                        .get_node(slot.node)
                        .is_some_and(|node| !node.dependents().is_empty())
                })
                .map(|(name, slot)| (name.clone(), slot.node))
                .collect()
        };

        for (name, node) in candidates {
            // An earlier candidate may have pulled this one in already.
            let cached = self
                .state()
                .computeds
                .get(&name)
                .is_some_and(|slot| slot.cache.is_some());
            if cached {
                continue;
            }
            if let Err(err) = self.recompute(&name, node) {
                warn!(origin = %self.ref_id(), computed = %name, error = %err, "computed atom failed to prime");
            }
        }
    }

    /// How many times computed atom `name` has run its function.
    pub fn recompute_count(&self, name: &str) -> Result<usize> {
        self.state()
            .computeds
            .get(name)
            .map(|slot| slot.recomputes)
            .ok_or_else(|| self.not_found(name))
    }
}
