//! Dependency Graph
//!
//! This module implements the per-Origin dependency graph that tracks
//! relationships between atoms and the computations that read them.
//!
//! # Overview
//!
//! The graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes are atoms, computed atoms, reactions and effects
//! - Edges are dependencies: if A reads B, there is an edge from B to A
//!
//! When an atom changes, we traverse the graph to find all affected nodes,
//! mark computed atoms dirty and collect the subscribers that must run.
//!
//! # Design Decisions
//!
//! 1. The graph is indexed by node ID for O(1) lookups, with a name index
//!    for atoms and computed atoms.
//!
//! 2. We maintain both forward (dependencies) and reverse (dependents)
//!    edges to enable traversal in both directions.
//!
//! 3. Cycle refusal happens at edge insertion, so propagation never loops.

mod node;
mod propagation;

pub use node::{DirtyState, Node, NodeId, NodeKind};
pub use propagation::{CycleEdge, DependencyGraph};
