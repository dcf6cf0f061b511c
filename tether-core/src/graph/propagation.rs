//! Dependency Graph
//!
//! One graph per Origin. Atoms are roots, computed atoms are interior nodes
//! and reactions/effects are leaves.
//!
//! # Algorithm
//!
//! 1. When an atom changes, walk its dependents breadth-first.
//! 2. Every computed atom reached is marked dirty (it recomputes lazily on
//!    its next read); every reaction or effect reached is collected.
//! 3. The collected nodes are returned in topological order, dependencies
//!    before dependents.
//!
//! Edges are additive. A computation keeps every edge it ever discovered
//! unless its owner explicitly calls [`DependencyGraph::unsubscribe_all`]
//! (effects do this before each rule evaluation). Edges that would close a
//! cycle, including self-edges, are refused.

use std::collections::{HashMap, HashSet, VecDeque};

use super::node::{Node, NodeId, NodeKind};

/// An edge refused because it would make the graph cyclic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleEdge {
    pub dependency: NodeId,
    pub dependent: NodeId,
}

#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: HashMap<NodeId, Node>,

    /// Atom and computed names. Subscriber names are labels only and may
    /// repeat across hot-swaps, so they are not indexed.
    by_name: HashMap<String, NodeId>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, returning its id.
    ///
    /// Returns `None` if an atom or computed with the same name exists.
    pub fn add_node(&mut self, node: Node) -> Option<NodeId> {
        let id = node.id();
        if !node.kind().is_subscriber() {
            if self.by_name.contains_key(node.name()) {
                return None;
            }
            self.by_name.insert(node.name().to_string(), id);
        }
        self.nodes.insert(id, node);
        Some(id)
    }

    /// Remove a node and every edge touching it.
    pub fn remove_node(&mut self, node_id: NodeId) {
        if let Some(node) = self.nodes.remove(&node_id) {
            for dep_id in node.dependencies() {
                if let Some(dep) = self.nodes.get_mut(dep_id) {
                    dep.remove_dependent(node_id);
                }
            }
            for dependent_id in node.dependents() {
                if let Some(dependent) = self.nodes.get_mut(dependent_id) {
                    dependent.remove_dependency(node_id);
                }
            }
            if !node.kind().is_subscriber() {
                self.by_name.remove(node.name());
            }
        }
    }

    pub fn lookup(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    pub fn get_node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    pub fn get_node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    pub fn name_of(&self, node_id: NodeId) -> Option<&str> {
        self.nodes.get(&node_id).map(Node::name)
    }

    /// Add a dependency edge: `dependent` reads `dependency`.
    ///
    /// Returns `Ok(true)` if the edge is new, `Ok(false)` if it already
    /// existed.
    pub fn add_edge(&mut self, dependency: NodeId, dependent: NodeId) -> Result<bool, CycleEdge> {
        let refused = CycleEdge {
            dependency,
            dependent,
        };
        if dependency == dependent || self.reaches(dependent, dependency) {
            return Err(refused);
        }

        let is_new = match self.nodes.get_mut(&dependent) {
            Some(node) => node.add_dependency(dependency),
            None => return Ok(false),
        };
        if let Some(dep_node) = self.nodes.get_mut(&dependency) {
            dep_node.add_dependent(dependent);
        }
        Ok(is_new)
    }

    pub fn remove_edge(&mut self, dependency: NodeId, dependent: NodeId) {
        if let Some(dep_node) = self.nodes.get_mut(&dependency) {
            dep_node.remove_dependent(dependent);
        }
        if let Some(dependent_node) = self.nodes.get_mut(&dependent) {
            dependent_node.remove_dependency(dependency);
        }
    }

    /// Bind `dependent` to every node in `dependencies`.
    pub fn subscribe(&mut self, dependent: NodeId, dependencies: &[NodeId]) -> Result<(), CycleEdge> {
        for &dependency in dependencies {
            self.add_edge(dependency, dependent)?;
        }
        Ok(())
    }

    /// Drop every dependency edge of `dependent`.
    pub fn unsubscribe_all(&mut self, dependent: NodeId) {
        let deps: Vec<NodeId> = match self.nodes.get(&dependent) {
            Some(node) => node.dependencies().iter().copied().collect(),
            None => return,
        };
        for dependency in deps {
            self.remove_edge(dependency, dependent);
        }
    }

    /// Whether `to` is reachable from `from` along dependent edges.
    fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let mut stack = vec![from];
        let mut visited = HashSet::new();
        while let Some(node_id) = stack.pop() {
            if node_id == to {
                return true;
            }
            if !visited.insert(node_id) {
                continue;
            }
            if let Some(node) = self.nodes.get(&node_id) {
                stack.extend(node.dependents().iter().copied());
            }
        }
        false
    }

    /// Mark a node as changed and propagate dirty flags.
    ///
    /// Returns every reached node (computed atoms and subscribers) in
    /// topological order.
    pub fn mark_changed(&mut self, source_id: NodeId) -> Vec<NodeId> {
        let mut reached = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();

        if let Some(source) = self.nodes.get(&source_id) {
            queue.extend(source.dependents().iter().copied());
        }

        while let Some(node_id) = queue.pop_front() {
            if !visited.insert(node_id) {
                continue;
            }
            if let Some(node) = self.nodes.get_mut(&node_id) {
                node.mark_dirty();
                reached.push(node_id);
                queue.extend(node.dependents().iter().copied());
            }
        }

        self.topological_sort(reached)
    }

    /// Kahn's algorithm over the subgraph induced by `nodes`.
    fn topological_sort(&self, nodes: Vec<NodeId>) -> Vec<NodeId> {
        let node_set: HashSet<_> = nodes.iter().copied().collect();
        let mut in_degree: HashMap<NodeId, usize> = HashMap::new();
        let mut result = Vec::with_capacity(nodes.len());
        let mut queue = VecDeque::new();

        for &node_id in &nodes {
            if let Some(node) = self.nodes.get(&node_id) {
                let degree = node
                    .dependencies()
                    .iter()
                    .filter(|d| node_set.contains(d))
                    .count();
                in_degree.insert(node_id, degree);
                if degree == 0 {
                    queue.push_back(node_id);
                }
            }
        }

        while let Some(node_id) = queue.pop_front() {
            result.push(node_id);

            if let Some(node) = self.nodes.get(&node_id) {
                for dependent_id in node.dependents() {
                    if let Some(degree) = in_degree.get_mut(dependent_id) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            queue.push_back(*dependent_id);
                        }
                    }
                }
            }
        }

        result
    }

    /// Names of the atoms and computeds `node_id` reads from.
    pub fn dependency_names(&self, node_id: NodeId) -> Vec<String> {
        self.nodes
            .get(&node_id)
            .map(|node| {
                node.dependencies()
                    .iter()
                    .filter_map(|id| self.name_of(*id).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Names of the nodes that read from `node_id`.
    pub fn dependent_names(&self, node_id: NodeId) -> Vec<String> {
        self.nodes
            .get(&node_id)
            .map(|node| {
                node.dependents()
                    .iter()
                    .filter_map(|id| self.name_of(*id).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Ids of every node of the given kind.
    pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|node| node.kind() == kind)
            .map(Node::id)
            .collect();
        ids.sort();
        ids
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.by_name.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::DirtyState;

    fn chain() -> (DependencyGraph, NodeId, NodeId, NodeId) {
        let mut graph = DependencyGraph::new();
        let a = graph.add_node(Node::atom("a")).unwrap();
        let c = graph.add_node(Node::computed("c")).unwrap();
        let r = graph.add_node(Node::reaction("r")).unwrap();
        graph.add_edge(a, c).unwrap();
        graph.add_edge(c, r).unwrap();
        (graph, a, c, r)
    }

    #[test]
    fn add_and_remove_nodes() {
        let mut graph = DependencyGraph::new();
        let id1 = graph.add_node(Node::atom("a")).unwrap();
        let id2 = graph.add_node(Node::computed("b")).unwrap();
        assert_eq!(graph.node_count(), 2);

        graph.remove_node(id1);
        assert_eq!(graph.node_count(), 1);
        assert!(graph.get_node(id1).is_none());
        assert!(graph.lookup("a").is_none());
        assert_eq!(graph.lookup("b"), Some(id2));
    }

    #[test]
    fn duplicate_names_are_refused() {
        let mut graph = DependencyGraph::new();
        graph.add_node(Node::atom("a")).unwrap();
        assert!(graph.add_node(Node::computed("a")).is_none());
        // Subscriber labels are not unique keys.
        assert!(graph.add_node(Node::reaction("a")).is_some());
    }

    #[test]
    fn edges_are_recorded_both_ways() {
        let (graph, a, c, _) = chain();
        assert!(graph.get_node(a).unwrap().dependents().contains(&c));
        assert!(graph.get_node(c).unwrap().dependencies().contains(&a));
        assert_eq!(graph.dependency_names(c), vec!["a".to_string()]);
    }

    #[test]
    fn self_edges_and_cycles_are_refused() {
        let (mut graph, a, c, _) = chain();
        assert_eq!(
            graph.add_edge(c, c),
            Err(CycleEdge {
                dependency: c,
                dependent: c
            })
        );

        let d = graph.add_node(Node::computed("d")).unwrap();
        graph.add_edge(c, d).unwrap();
        // d -> c would close c -> d -> c.
        assert!(graph.add_edge(d, c).is_err());
        // Re-adding an existing edge is fine.
        assert_eq!(graph.add_edge(a, c), Ok(false));
    }

    #[test]
    fn mark_changed_propagates_in_topological_order() {
        let (mut graph, a, c, r) = chain();
        graph.get_node_mut(c).unwrap().mark_clean();

        let reached = graph.mark_changed(a);
        assert_eq!(reached, vec![c, r]);
        assert_eq!(graph.get_node(c).unwrap().dirty_state(), DirtyState::Dirty);
    }

    #[test]
    fn unsubscribe_all_drops_every_edge() {
        let (mut graph, a, c, r) = chain();
        graph.add_edge(a, r).unwrap();

        graph.unsubscribe_all(r);
        assert!(graph.get_node(r).unwrap().dependencies().is_empty());
        assert!(!graph.get_node(a).unwrap().dependents().contains(&r));
        assert!(!graph.get_node(c).unwrap().dependents().contains(&r));
    }
}
