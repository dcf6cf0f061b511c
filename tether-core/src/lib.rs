//! Tether Core
//!
//! This crate provides the core runtime for the Tether reactive state
//! engine. It implements:
//!
//! - Observable objects ([`Origin`]) with named, typed atoms
//! - Lazily recomputed computed atoms with automatic dependency discovery
//! - Reactions, and effects gated by a declarative rule DSL
//! - Batched writes with a single notification per Origin
//! - Snapshots, diffs and undo/redo history
//! - A ref-keyed instance registry with state-preserving hot-swap
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `value`: the dynamic value model atoms hold
//! - `graph`: the per-Origin dependency graph
//! - `reactive`: Origins, schemas, computed atoms, subscribers and batches
//! - `rules`: the predicate DSL (`If`, `Is`, `Var`, `To`)
//! - `history`: snapshots and the undo/redo tracker
//! - `registry`: process-wide lookup by ref
//!
//! # Example
//!
//! ```rust,ignore
//! use tether_core::prelude::*;
//!
//! let schema = Schema::builder("User")
//!     .atom("age", ValueKind::Int)
//!     .effect("unlock", If::at_least("age", 18), |o| {
//!         tracing::info!(user = o.ref_id(), "unlocked");
//!         Ok(())
//!     })
//!     .build()?;
//!
//! let user = Origin::builder(schema, "u1").set("age", 17).build()?;
//! user.set("age", 18)?; // unlock runs
//! user.set("age", 19)?; // still true, unlock does not run again
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod history;
pub mod reactive;
pub mod registry;
pub mod rules;
pub mod value;

pub use config::{Settings, TriggerMode};
pub use error::{HandlerError, HandlerFailure, PropagationReport, ReactiveError, Result};
pub use reactive::{batch, Batch, ChangeSet, Origin, OriginBuilder, Schema};
pub use registry::Registry;
pub use value::{Value, ValueKind};

/// Everything needed to declare and drive Origins.
pub mod prelude {
    pub use crate::config::{Settings, TriggerMode};
    pub use crate::error::{HandlerError, PropagationReport, ReactiveError, Result};
    pub use crate::history::{Snapshot, Tracker};
    pub use crate::reactive::{batch, untracked, Accessor, Batch, ChangeSet, Origin, Schema};
    pub use crate::registry::Registry;
    pub use crate::rules::{If, Is, Rule, To, Var};
    pub use crate::value::{Value, ValueKind};
}
