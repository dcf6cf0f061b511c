//! Reactions and Effects
//!
//! Subscribers are the leaves of an Origin's graph. They are resolved by
//! invocation, never cached.
//!
//! - A reaction is bound to an explicit list of names and runs its handler
//!   once per relevant write or flush.
//! - An effect is gated by a [`Rule`]. Each resolution re-evaluates the
//!   rule, replaces the effect's dependencies with the paths the rule
//!   referenced, and runs the handler only when the result flips from false
//!   to true (or on every true result under `TriggerMode::Level`).
//!
//! Handlers run inside a non-collecting frame that still marks the
//! subscriber as in progress. A handler whose own writes come back around
//! to it is reported as a `CyclicDependency` failure instead of recursing.
//!
//! Failures are isolated per subscriber: they are logged, handed to the
//! error hook and returned in the [`PropagationReport`], and the remaining
//! subscribers still run.

use std::sync::Arc;

use indexmap::IndexSet;
use tracing::{trace, warn};

use super::context::ReactiveContext;
use super::origin::Origin;
use super::schema::{EffectDecl, HandlerFn, ReactionDecl};
use crate::config::TriggerMode;
use crate::error::{HandlerFailure, PropagationReport};
use crate::graph::NodeId;
use crate::rules::{Evaluation, Rule};

#[derive(Clone)]
pub(crate) enum SubscriberKind {
    Reaction { lazy: bool },
    Effect { rule: Arc<Rule>, last_result: bool },
}

pub(crate) struct SubscriberSlot {
    pub(crate) name: String,
    pub(crate) handler: HandlerFn,
    pub(crate) kind: SubscriberKind,
}

impl SubscriberSlot {
    pub(crate) fn reaction(decl: &ReactionDecl) -> Self {
        Self {
            name: decl.name.clone(),
            handler: decl.handler.clone(),
            kind: SubscriberKind::Reaction { lazy: decl.lazy },
        }
    }

    pub(crate) fn effect(decl: &EffectDecl) -> Self {
        Self {
            name: decl.name.clone(),
            handler: decl.handler.clone(),
            kind: SubscriberKind::Effect {
                rule: decl.rule.clone(),
                last_result: false,
            },
        }
    }

    fn fires_on_register(&self) -> bool {
        !matches!(self.kind, SubscriberKind::Reaction { lazy: true })
    }

    fn rule(&self) -> Option<Arc<Rule>> {
        match &self.kind {
            SubscriberKind::Effect { rule, .. } => Some(rule.clone()),
            SubscriberKind::Reaction { .. } => None,
        }
    }
}

impl Origin {
    /// Resolve every non-lazy reaction and every effect once.
    pub(crate) fn fire_registered(&self) -> PropagationReport {
        let ids: Vec<NodeId> = self
            .state()
            .subscribers
            .iter()
            .filter(|(_, slot)| slot.fires_on_register())
            .map(|(id, _)| *id)
            .collect();

        let mut report = PropagationReport::new();
        for id in ids {
            report.merge(self.resolve(id));
        }
        report
    }

    /// Resolve one subscriber.
    pub(crate) fn resolve(&self, id: NodeId) -> PropagationReport {
        let entry = self
            .state()
            .subscribers
            .get(&id)
            .map(|slot| (slot.name.clone(), slot.handler.clone(), slot.rule()));
        let Some((name, handler, rule)) = entry else {
            // Swapped out or disposed since it was queued.
            return PropagationReport::new();
        };

        let outcome = if ReactiveContext::is_resolving(self.key(), id) {
            warn!(origin = %self.ref_id(), subscriber = %name, "cyclic dependency");
            Err(HandlerFailure::from_engine(
                self.ref_id(),
                &name,
                self.cycle(&name),
            ))
        } else {
            match rule {
                None => self.invoke(id, &name, &handler),
                Some(rule) => self.run_effect(id, &name, &rule, &handler),
            }
        };

        if let Some(node) = self.state().graph.get_node_mut(id) {
            node.mark_clean();
        }

        let mut report = PropagationReport::new();
        if let Err(failure) = outcome {
            self.report_failure(&failure);
            report.push(failure);
        }
        report
    }

    fn invoke(&self, id: NodeId, name: &str, handler: &HandlerFn) -> Result<(), HandlerFailure> {
        let _ctx = ReactiveContext::enter_untracked(self.key(), Some(id));
        handler(self).map_err(|err| HandlerFailure::from_handler(self.ref_id(), name, err))
    }

    fn run_effect(
        &self,
        id: NodeId,
        name: &str,
        rule: &Rule,
        handler: &HandlerFn,
    ) -> Result<(), HandlerFailure> {
        let key = self.key();
        let (evaluation, reads) = {
            let ctx = ReactiveContext::enter(key, id);
            let evaluation = rule.evaluate(self);
            (evaluation, ctx.take_reads())
        };

        let fire = {
            let mut guard = self.state();
            let state = &mut *guard;

            // Replace, never accumulate: the new set is whatever this
            // evaluation referenced.
            let roots: IndexSet<String> = match &evaluation {
                Ok(Evaluation { paths, .. }) => paths
                    .iter()
                    .map(|p| p.split('.').next().unwrap_or_default().to_string())
                    .collect(),
                Err(_) => rule.root_atoms(),
            };
            state.graph.unsubscribe_all(id);
            let read_names = reads
                .into_iter()
                .filter(|(origin, _)| *origin == key)
                .map(|(_, read)| read);
            for dep_name in roots.into_iter().chain(read_names) {
                if let Some(dependency) = state.graph.lookup(&dep_name) {
                    if let Err(edge) = state.graph.add_edge(dependency, id) {
                        warn!(effect = name, ?edge, "refused subscription edge");
                    }
                }
            }

            let mode = state.settings.effect_trigger;
            match (&evaluation, state.subscribers.get_mut(&id).map(|s| &mut s.kind)) {
                (Ok(eval), Some(SubscriberKind::Effect { last_result, .. })) => {
                    let fire = match mode {
                        TriggerMode::Edge => eval.result && !*last_result,
                        TriggerMode::Level => eval.result,
                    };
                    *last_result = eval.result;
                    fire
                }
                _ => false,
            }
        };

        let evaluation =
            evaluation.map_err(|err| HandlerFailure::from_engine(self.ref_id(), name, err))?;
        trace!(
            origin = %self.ref_id(),
            effect = name,
            result = evaluation.result,
            fire,
            "effect evaluated"
        );

        if fire {
            self.invoke(id, name, handler)
        } else {
            Ok(())
        }
    }
}
