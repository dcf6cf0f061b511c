//! Graph Nodes
//!
//! This module defines the node types that live in an Origin's dependency
//! graph.

use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexSet;

/// Unique identifier for a node in the dependency graph.
///
/// Ids are handed out from a process-wide counter, so they also encode
/// registration order: a reaction registered earlier has a smaller id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A plain atom. Roots of the graph: dependents only.
    Atom,

    /// A computed atom. Has dependencies and may have dependents.
    Computed,

    /// A reaction bound to an explicit list of names. Leaf.
    Reaction,

    /// A rule-gated effect. Leaf.
    Effect,
}

impl NodeKind {
    /// Leaves are resolved by invocation rather than recomputation.
    pub fn is_subscriber(self) -> bool {
        matches!(self, NodeKind::Reaction | NodeKind::Effect)
    }
}

/// Dirty state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyState {
    /// The node's cached result is up to date.
    Clean,

    /// A dependency was written since the node last resolved.
    Dirty,
}

/// A node in the dependency graph.
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    kind: NodeKind,
    name: String,
    dirty: DirtyState,

    /// Nodes this node reads from.
    dependencies: IndexSet<NodeId>,

    /// Nodes that read from this node.
    dependents: IndexSet<NodeId>,
}

impl Node {
    pub fn new(kind: NodeKind, name: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(),
            kind,
            name: name.into(),
            dirty: match kind {
                NodeKind::Atom => DirtyState::Clean,
                // Never resolved yet.
                NodeKind::Computed | NodeKind::Reaction | NodeKind::Effect => DirtyState::Dirty,
            },
            dependencies: IndexSet::new(),
            dependents: IndexSet::new(),
        }
    }

    pub fn atom(name: impl Into<String>) -> Self {
        Self::new(NodeKind::Atom, name)
    }

    pub fn computed(name: impl Into<String>) -> Self {
        Self::new(NodeKind::Computed, name)
    }

    pub fn reaction(name: impl Into<String>) -> Self {
        Self::new(NodeKind::Reaction, name)
    }

    pub fn effect(name: impl Into<String>) -> Self {
        Self::new(NodeKind::Effect, name)
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dirty_state(&self) -> DirtyState {
        self.dirty
    }

    pub fn is_clean(&self) -> bool {
        self.dirty == DirtyState::Clean
    }

    pub fn mark_clean(&mut self) {
        self.dirty = DirtyState::Clean;
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = DirtyState::Dirty;
    }

    pub fn add_dependency(&mut self, node_id: NodeId) -> bool {
        self.dependencies.insert(node_id)
    }

    pub fn remove_dependency(&mut self, node_id: NodeId) {
        self.dependencies.shift_remove(&node_id);
    }

    pub fn dependencies(&self) -> &IndexSet<NodeId> {
        &self.dependencies
    }

    pub fn add_dependent(&mut self, node_id: NodeId) {
        self.dependents.insert(node_id);
    }

    pub fn remove_dependent(&mut self, node_id: NodeId) {
        self.dependents.shift_remove(&node_id);
    }

    pub fn dependents(&self) -> &IndexSet<NodeId> {
        &self.dependents
    }
}
