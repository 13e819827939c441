//! Registry of placed pieces and the nodes they own

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::intersection::IntersectionKind;
use super::pieces::{NodeTemplate, PieceKind};
use super::types::{EntityId, NodeCategory, NodeId, Pose};

/// A node owned by a piece
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PieceNode {
    pub node: NodeId,
    pub marker: EntityId,
    pub template: NodeTemplate,
}

/// A placed segment, intersection or building
#[derive(Debug, Clone, PartialEq)]
pub struct Piece {
    pub entity: EntityId,
    pub kind: PieceKind,
    pub pose: Pose,
    pub nodes: Vec<PieceNode>,
}

/// Typed index of everything the builder has placed
#[derive(Debug, Default)]
pub struct NetworkRegistry {
    pieces: BTreeMap<EntityId, Piece>,
    nodes_by_category: BTreeMap<NodeCategory, BTreeSet<NodeId>>,
    node_by_marker: HashMap<EntityId, NodeId>,
    owner_by_node: HashMap<NodeId, EntityId>,
}

impl NetworkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, piece: Piece) {
        for slot in &piece.nodes {
            self.nodes_by_category
                .entry(slot.template.category)
                .or_default()
                .insert(slot.node);
            self.node_by_marker.insert(slot.marker, slot.node);
            self.owner_by_node.insert(slot.node, piece.entity);
        }
        self.pieces.insert(piece.entity, piece);
    }

    /// Forget a piece and all of its nodes
    pub fn remove(&mut self, entity: EntityId) -> Option<Piece> {
        let piece = self.pieces.remove(&entity)?;
        for slot in &piece.nodes {
            if let Some(nodes) = self.nodes_by_category.get_mut(&slot.template.category) {
                nodes.remove(&slot.node);
            }
            self.node_by_marker.remove(&slot.marker);
            self.owner_by_node.remove(&slot.node);
        }
        Some(piece)
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.pieces.contains_key(&entity)
    }

    pub fn get(&self, entity: EntityId) -> Option<&Piece> {
        self.pieces.get(&entity)
    }

    pub fn pieces(&self) -> impl Iterator<Item = &Piece> {
        self.pieces.values()
    }

    pub fn segments(&self) -> impl Iterator<Item = &Piece> {
        self.pieces
            .values()
            .filter(|piece| matches!(piece.kind, PieceKind::Segment))
    }

    pub fn intersections(&self) -> impl Iterator<Item = &Piece> {
        self.pieces
            .values()
            .filter(|piece| matches!(piece.kind, PieceKind::Intersection(_)))
    }

    pub fn buildings(&self) -> impl Iterator<Item = &Piece> {
        self.pieces
            .values()
            .filter(|piece| matches!(piece.kind, PieceKind::Building(_)))
    }

    pub fn segment_count(&self) -> usize {
        self.segments().count()
    }

    /// Number of intersections of the given kind
    pub fn intersection_count(&self, kind: IntersectionKind) -> usize {
        self.intersections()
            .filter(|piece| matches!(piece.kind, PieceKind::Intersection(shape) if shape.kind == kind))
            .count()
    }

    pub fn nodes_in(&self, category: NodeCategory) -> BTreeSet<NodeId> {
        self.nodes_by_category
            .get(&category)
            .cloned()
            .unwrap_or_default()
    }

    /// Node marked by a network-layer collider
    pub fn node_for_marker(&self, marker: EntityId) -> Option<NodeId> {
        self.node_by_marker.get(&marker).copied()
    }

    pub fn owner_of(&self, node: NodeId) -> Option<&Piece> {
        self.owner_by_node
            .get(&node)
            .and_then(|entity| self.pieces.get(entity))
    }
}
