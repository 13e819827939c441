//! Directed lane graph the vehicles navigate
//!
//! Nodes are lane endpoints produced by placed road pieces, arcs are the
//! drivable connections discovered between them by the network builder.

use anyhow::{Context, Result};
use glam::Vec3;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::types::{EntityId, NodeCategory, NodeId, Pose, SimId};

/// A lane endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct StreetNode {
    pub id: NodeId,
    pub pose: Pose,
    pub category: NodeCategory,
    /// Road piece that spawned this node
    pub owner: EntityId,
    /// Collider marking the node on the network layer
    pub marker: EntityId,
}

impl StreetNode {
    pub fn position(&self) -> Vec3 {
        self.pose.position
    }
}

/// Lane graph backed by a stable petgraph so node indices survive removals
#[derive(Default)]
pub struct NetworkGraph {
    graph: StableDiGraph<NodeId, ()>,
    node_to_index: HashMap<NodeId, NodeIndex>,
    nodes: BTreeMap<NodeId, StreetNode>,
    next_id: usize,
}

impl NetworkGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node at the origin; call [`NetworkGraph::initialize_node`]
    /// before discovering its arcs
    pub fn add_node(&mut self, category: NodeCategory, owner: EntityId, marker: EntityId) -> NodeId {
        let id = NodeId(SimId(self.next_id));
        self.next_id += 1;

        let index = self.graph.add_node(id);
        self.node_to_index.insert(id, index);
        self.nodes.insert(
            id,
            StreetNode {
                id,
                pose: Pose::default(),
                category,
                owner,
                marker,
            },
        );
        id
    }

    /// Give a node its world pose
    pub fn initialize_node(&mut self, id: NodeId, pose: Pose) -> Result<()> {
        let node = self
            .nodes
            .get_mut(&id)
            .with_context(|| format!("Node {:?} not found", id))?;
        node.pose = pose;
        Ok(())
    }

    /// Removes a node together with every arc touching it
    pub fn remove_node(&mut self, id: NodeId) -> Option<StreetNode> {
        let index = self.node_to_index.remove(&id)?;
        self.graph.remove_node(index);
        self.nodes.remove(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node(&self, id: NodeId) -> Option<&StreetNode> {
        self.nodes.get(&id)
    }

    pub fn position(&self, id: NodeId) -> Option<Vec3> {
        self.nodes.get(&id).map(StreetNode::position)
    }

    /// All nodes ordered by id
    pub fn nodes(&self) -> impl Iterator<Item = &StreetNode> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn arc_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Drop every outgoing arc of a node. Returns how many were removed.
    pub fn clear_arcs(&mut self, id: NodeId) -> Result<usize> {
        let index = *self
            .node_to_index
            .get(&id)
            .with_context(|| format!("Node {:?} not found", id))?;

        let outgoing: Vec<_> = self.graph.edges(index).map(|edge| edge.id()).collect();
        for edge in &outgoing {
            self.graph.remove_edge(*edge);
        }
        Ok(outgoing.len())
    }

    /// Adds `from -> to` unless that arc already exists.
    /// Returns true when a new arc was inserted.
    pub fn add_arc(&mut self, from: NodeId, to: NodeId) -> Result<bool> {
        let from_index = *self
            .node_to_index
            .get(&from)
            .with_context(|| format!("Arc source {:?} not found", from))?;
        let to_index = *self
            .node_to_index
            .get(&to)
            .with_context(|| format!("Arc target {:?} not found", to))?;

        if self.graph.find_edge(from_index, to_index).is_some() {
            return Ok(false);
        }

        self.graph.add_edge(from_index, to_index, ());
        Ok(true)
    }

    /// Targets of a node's outgoing arcs, ordered by id
    pub fn successors(&self, id: NodeId) -> Vec<NodeId> {
        let Some(index) = self.node_to_index.get(&id) else {
            return Vec::new();
        };
        let mut targets: Vec<NodeId> = self
            .graph
            .edges(*index)
            .filter_map(|edge| self.graph.node_weight(edge.target()).copied())
            .collect();
        targets.sort();
        targets
    }

    pub fn has_arc(&self, from: NodeId, to: NodeId) -> bool {
        match (self.node_to_index.get(&from), self.node_to_index.get(&to)) {
            (Some(a), Some(b)) => self.graph.find_edge(*a, *b).is_some(),
            _ => false,
        }
    }

    /// Snapshot of every arc as `(source, target)` pairs
    pub fn arcs(&self) -> BTreeSet<(NodeId, NodeId)> {
        self.graph
            .edge_indices()
            .filter_map(|edge| {
                let (source, target) = self.graph.edge_endpoints(edge)?;
                Some((*self.graph.node_weight(source)?, *self.graph.node_weight(target)?))
            })
            .collect()
    }
}
