//! Reactive Primitives
//!
//! This module implements the observable object model:
//!
//! - [`Origin`]: an observable object owning atoms and its dependency graph
//! - Computed atoms: lazily recomputed derived values
//! - Reactions and effects: side-effect subscriptions, effects gated by a
//!   [`Rule`](crate::rules::Rule)
//! - [`Batch`]: scoped coalescing of notifications
//! - [`Schema`]: the descriptor table an Origin is built from
//!
//! # Architecture
//!
//! Every Origin owns a [`DependencyGraph`](crate::graph::DependencyGraph).
//! When a computed atom or an effect rule runs, a frame is pushed on a
//! thread-local context stack and every atom read is recorded into it. The
//! recorded names become graph edges. When an atom is written, the graph
//! marks downstream computed atoms dirty and queues downstream reactions
//! and effects for the next flush.
//!
//! Propagation is synchronous and single-threaded per Origin. Origins are
//! `Send + Sync` so they can be shared through a registry, but concurrent
//! writes to one Origin must be serialized by the caller.

mod accessor;
mod batch;
mod computed;
mod context;
mod origin;
mod reaction;
mod schema;

pub use accessor::Accessor;
pub use batch::{batch, Batch};
pub use context::untracked;
pub use origin::{ChangeSet, ListenerId, Origin, OriginBuilder};
pub use schema::{
    AtomDecl, ComputeFn, ComputedDecl, EffectDecl, HandlerFn, ReactionDecl, Schema, SchemaBuilder,
};

pub(crate) use origin::OriginInner;
