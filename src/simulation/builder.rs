//! Network graph builder
//!
//! Turns placement traces into road pieces, resolves overlapping segments
//! into intersections and discovers arcs between lane nodes with spatial
//! probes. A build runs in three passes separated by physics ticks:
//! [`NetworkBuilder::confirm_placement`], [`NetworkBuilder::resolve_overlaps`]
//! and [`NetworkBuilder::complete_build`].

use anyhow::{anyhow, Context, Result};
use glam::Vec3;
use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use super::config::NetworkConfig;
use super::intersection::{ArmHits, IntersectionShape};
use super::pieces::{BuildingKind, PieceKind};
use super::registry::{NetworkRegistry, Piece, PieceNode};
use super::road_network::NetworkGraph;
use super::spatial::{PhysicsScene, Shape, SpatialQuery};
use super::types::{flatten, EntityId, Layer, LayerMask, NodeCategory, NodeId, Pose};

/// Probe offsets (right, up, forward) around an intersection node
pub const CROSS_PROBE_OFFSETS: [Vec3; 7] = [
    Vec3::new(0.0, 0.0, 10.0),
    Vec3::new(0.0, 0.0, 8.0),
    Vec3::new(-3.0, -3.0, -3.0),
    Vec3::new(-3.0, 3.0, 3.0),
    Vec3::new(-3.0, 3.0, -3.0),
    Vec3::new(3.0, 3.0, 3.0),
    Vec3::new(3.0, 3.0, -3.0),
];

/// Errors a build caller is expected to handle
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkError {
    /// A network-layer collider is not backed by a registered node
    MissingNodeData { entity: EntityId },
    /// The token does not belong to the build currently in flight
    StaleToken { build: u64 },
    /// A build pass was resumed before the physics tick advanced
    TickNotAdvanced { issued_at: u64, now: u64 },
    BuildInProgress,
    NoPlacementInProgress,
    NotInDeleteMode,
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::MissingNodeData { entity } => {
                write!(f, "network entity {:?} has no node data", entity)
            }
            NetworkError::StaleToken { build } => {
                write!(f, "build token {} is not the active build", build)
            }
            NetworkError::TickNotAdvanced { issued_at, now } => write!(
                f,
                "build resumed at tick {} but was suspended at tick {}",
                now, issued_at
            ),
            NetworkError::BuildInProgress => write!(f, "a build is already in progress"),
            NetworkError::NoPlacementInProgress => write!(f, "no placement in progress"),
            NetworkError::NotInDeleteMode => write!(f, "delete mode is not active"),
        }
    }
}

impl std::error::Error for NetworkError {}

/// Commands accepted from the placement tooling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildCommand {
    StartRoadPlacement,
    CancelPlacement,
    EnterDeleteMode,
    ExitDeleteMode,
    SpawnBuilding(BuildingKind),
}

impl FromStr for BuildCommand {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "road" => Ok(BuildCommand::StartRoadPlacement),
            "cancel" => Ok(BuildCommand::CancelPlacement),
            "delete" => Ok(BuildCommand::EnterDeleteMode),
            "back" => Ok(BuildCommand::ExitDeleteMode),
            "garbage-office" => Ok(BuildCommand::SpawnBuilding(BuildingKind::GarbageOffice)),
            "house-block" => Ok(BuildCommand::SpawnBuilding(BuildingKind::HouseBlock)),
            other => Err(anyhow!("Unknown build command '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Applied,
    /// Rejected because a placement is in progress
    Ignored,
}

/// What a trace turns into once confirmed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceKind {
    Road,
    Building(BuildingKind),
}

/// Placeholder for a piece that has not been confirmed yet
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingTrace {
    pub kind: TraceKind,
    pub pose: Pose,
}

/// Traces being laid out by the placement pointer
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementSession {
    pub kind: TraceKind,
    /// Either 0 or 90 degrees
    pub pointer_yaw: f32,
    pub traces: Vec<PendingTrace>,
}

impl PlacementSession {
    fn new(kind: TraceKind) -> Self {
        Self {
            kind,
            pointer_yaw: 0.0,
            traces: Vec::new(),
        }
    }
}

/// Nodes waiting for arc discovery, split by discovery strategy
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingNodes {
    pub street: BTreeSet<NodeId>,
    /// Cross and curve nodes
    pub intersection: BTreeSet<NodeId>,
}

impl PendingNodes {
    pub fn insert(&mut self, node: NodeId, category: NodeCategory) {
        match category {
            NodeCategory::Street => self.street.insert(node),
            NodeCategory::Cross | NodeCategory::Curve => self.intersection.insert(node),
        };
    }

    fn forget(&mut self, piece: &Piece) {
        for slot in &piece.nodes {
            self.street.remove(&slot.node);
            self.intersection.remove(&slot.node);
        }
    }

    pub fn len(&self) -> usize {
        self.street.len() + self.intersection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of resolving one confirmed segment
#[derive(Debug, Clone, PartialEq)]
pub enum PlacementOutcome {
    /// Kept as a plain segment
    Segment(EntityId),
    Intersection {
        entity: EntityId,
        shape: IntersectionShape,
    },
    /// Overlapping segments were removed but no shape matched the neighbours
    Unsupported { position: Vec3, hits: ArmHits },
    /// Removed because it landed on a building
    Collided(EntityId),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildReport {
    pub outcomes: Vec<PlacementOutcome>,
    pub buildings: Vec<EntityId>,
    pub nodes_processed: usize,
    pub arcs_added: usize,
}

impl BuildReport {
    pub fn unsupported(&self) -> impl Iterator<Item = &PlacementOutcome> {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome, PlacementOutcome::Unsupported { .. }))
    }

    pub fn intersections(&self) -> impl Iterator<Item = (EntityId, IntersectionShape)> + '_ {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            PlacementOutcome::Intersection { entity, shape } => Some((*entity, *shape)),
            _ => None,
        })
    }
}

/// Continuation of a build waiting one tick before overlap resolution
#[derive(Debug)]
pub struct SettleToken {
    build: u64,
    issued_at: u64,
    candidates: Vec<EntityId>,
    pending: PendingNodes,
    report: BuildReport,
}

impl SettleToken {
    pub fn is_ready(&self, tick: u64) -> bool {
        tick > self.issued_at
    }

    pub fn candidates(&self) -> &[EntityId] {
        &self.candidates
    }
}

/// Continuation of a build waiting one tick before arc discovery
#[derive(Debug)]
pub struct RebuildToken {
    build: u64,
    issued_at: u64,
    pending: PendingNodes,
    report: BuildReport,
}

impl RebuildToken {
    pub fn is_ready(&self, tick: u64) -> bool {
        tick > self.issued_at
    }

    pub fn pending(&self) -> &PendingNodes {
        &self.pending
    }

    pub fn report(&self) -> &BuildReport {
        &self.report
    }
}

/// Owns the lane graph and the registry of placed pieces
pub struct NetworkBuilder {
    config: NetworkConfig,
    graph: NetworkGraph,
    registry: NetworkRegistry,
    session: Option<PlacementSession>,
    deleting: bool,
    next_build: u64,
    active_build: Option<u64>,
}

impl NetworkBuilder {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            graph: NetworkGraph::new(),
            registry: NetworkRegistry::new(),
            session: None,
            deleting: false,
            next_build: 0,
            active_build: None,
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn graph(&self) -> &NetworkGraph {
        &self.graph
    }

    pub fn registry(&self) -> &NetworkRegistry {
        &self.registry
    }

    pub fn session(&self) -> Option<&PlacementSession> {
        self.session.as_ref()
    }

    pub fn is_placing(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_deleting(&self) -> bool {
        self.deleting
    }

    pub fn is_building(&self) -> bool {
        self.active_build.is_some()
    }

    /// Apply a tooling command. Everything except cancel is ignored while
    /// a placement is in progress.
    pub fn execute(&mut self, command: BuildCommand) -> CommandOutcome {
        if command != BuildCommand::CancelPlacement && self.session.is_some() {
            debug!("Ignoring {:?}: placement in progress", command);
            return CommandOutcome::Ignored;
        }

        match command {
            BuildCommand::StartRoadPlacement => {
                self.deleting = false;
                self.session = Some(PlacementSession::new(TraceKind::Road));
            }
            BuildCommand::SpawnBuilding(kind) => {
                self.deleting = false;
                self.session = Some(PlacementSession::new(TraceKind::Building(kind)));
            }
            BuildCommand::CancelPlacement => {
                if self.session.take().is_none() {
                    return CommandOutcome::Ignored;
                }
            }
            BuildCommand::EnterDeleteMode => self.deleting = true,
            BuildCommand::ExitDeleteMode => self.deleting = false,
        }
        CommandOutcome::Applied
    }

    /// Toggle the placement pointer between 0 and 90 degrees
    pub fn rotate_pointer(&mut self) -> Result<f32> {
        let session = self
            .session
            .as_mut()
            .ok_or(NetworkError::NoPlacementInProgress)?;
        session.pointer_yaw = if session.pointer_yaw == 0.0 { 90.0 } else { 0.0 };
        Ok(session.pointer_yaw)
    }

    /// Center of the grid cell containing `position`, at ground height
    pub fn snap_to_grid(&self, position: Vec3) -> Vec3 {
        let cell = self.config.cell_size;
        Vec3::new(
            (position.x / cell).round() * cell,
            0.0,
            (position.z / cell).round() * cell,
        )
    }

    /// Drop a trace at the snapped position using the pointer yaw
    pub fn add_trace(&mut self, position: Vec3) -> Result<Pose> {
        let snapped = self.snap_to_grid(position);
        let session = self
            .session
            .as_mut()
            .ok_or(NetworkError::NoPlacementInProgress)?;

        let trace = PendingTrace {
            kind: session.kind,
            pose: Pose::new(snapped, session.pointer_yaw),
        };
        session.traces.push(trace);
        Ok(trace.pose)
    }

    /// Drag the pointer from `start` toward `end` along its own axis,
    /// leaving one trace per cell. Returns the number of traces added.
    pub fn drag_traces(&mut self, start: Vec3, end: Vec3) -> Result<usize> {
        let cell = self.config.cell_size;
        let start = self.snap_to_grid(start);
        let end = self.snap_to_grid(end);
        let yaw = self
            .session
            .as_ref()
            .ok_or(NetworkError::NoPlacementInProgress)?
            .pointer_yaw;

        let axis = Pose::new(Vec3::ZERO, yaw).forward().round();
        let steps = ((end - start).dot(axis) / cell).round() as i32;
        let direction = axis * steps.signum() as f32;

        for step in 0..=steps.abs() {
            self.add_trace(start + direction * (step as f32 * cell))?;
        }
        Ok(steps.unsigned_abs() as usize + 1)
    }

    /// Convert every pending trace into a placed piece.
    ///
    /// Segments become overlap candidates and their nodes are queued for arc
    /// discovery. Resume with [`NetworkBuilder::resolve_overlaps`] after the
    /// scene has stepped.
    pub fn confirm_placement(&mut self, scene: &mut PhysicsScene) -> Result<SettleToken> {
        if self.active_build.is_some() {
            return Err(NetworkError::BuildInProgress.into());
        }
        let session = self
            .session
            .take()
            .ok_or(NetworkError::NoPlacementInProgress)?;

        let build = self.next_build;
        self.next_build += 1;

        let mut candidates = Vec::new();
        let mut pending = PendingNodes::default();
        let mut report = BuildReport::default();

        for trace in session.traces {
            let pose = Pose::new(flatten(trace.pose.position), trace.pose.yaw);
            match trace.kind {
                TraceKind::Road => {
                    let entity = self.spawn_piece(scene, PieceKind::Segment, pose)?;
                    self.queue_piece_nodes(entity, &mut pending);
                    candidates.push(entity);
                }
                TraceKind::Building(kind) => {
                    let entity = self.spawn_piece(scene, PieceKind::Building(kind), pose)?;
                    report.buildings.push(entity);
                }
            }
        }

        info!(
            "Build {}: confirmed {} segments and {} buildings",
            build,
            candidates.len(),
            report.buildings.len()
        );

        self.active_build = Some(build);
        Ok(SettleToken {
            build,
            issued_at: scene.tick(),
            candidates,
            pending,
            report,
        })
    }

    /// Second pass: drop segments that landed on buildings and replace
    /// overlapping segments with intersections
    pub fn resolve_overlaps(
        &mut self,
        token: SettleToken,
        scene: &mut PhysicsScene,
    ) -> Result<RebuildToken> {
        self.check_token(token.build, token.issued_at, scene.tick())?;

        let SettleToken {
            build,
            candidates,
            mut pending,
            mut report,
            ..
        } = token;

        if let Err(err) = self.resolve_candidates(scene, &candidates, &mut pending, &mut report) {
            self.active_build = None;
            return Err(err);
        }

        info!(
            "Build {}: {} intersections placed, {} unsupported, {} nodes pending",
            build,
            report.intersections().count(),
            report.unsupported().count(),
            pending.len()
        );

        Ok(RebuildToken {
            build,
            issued_at: scene.tick(),
            pending,
            report,
        })
    }

    /// Final pass: rebuild the arcs of every pending node
    pub fn complete_build(
        &mut self,
        token: RebuildToken,
        scene: &mut PhysicsScene,
    ) -> Result<BuildReport> {
        self.check_token(token.build, token.issued_at, scene.tick())?;
        self.active_build = None;

        let RebuildToken {
            build,
            pending,
            mut report,
            ..
        } = token;

        report.nodes_processed = pending.len();
        report.arcs_added = self
            .rebuild_network(scene, &pending)
            .with_context(|| format!("Failed to complete build {}", build))?;

        info!(
            "Build {} complete: {} nodes processed, {} arcs added ({} nodes, {} arcs total)",
            build,
            report.nodes_processed,
            report.arcs_added,
            self.graph.node_count(),
            self.graph.arc_count()
        );
        Ok(report)
    }

    /// Reinitialize each pending node that is still alive, clear its arcs
    /// and rediscover them. Returns the number of arcs added.
    pub fn rebuild_network(&mut self, scene: &PhysicsScene, pending: &PendingNodes) -> Result<usize> {
        self.check_network_layer(scene)?;

        let mut added = 0;
        for node in pending.street.iter().chain(pending.intersection.iter()) {
            if !self.graph.contains(*node) || !self.reinitialize_node(*node)? {
                debug!("Skipping node {:?}: no longer in the network", node);
                continue;
            }

            self.graph.clear_arcs(*node)?;
            for target in self.discover_arcs(scene, *node) {
                if self.graph.add_arc(*node, target)? {
                    added += 1;
                }
            }
        }
        Ok(added)
    }

    /// Rebuild the arcs of every registered node
    pub fn rebuild_entire_network(&mut self, scene: &PhysicsScene) -> Result<usize> {
        let mut pending = PendingNodes {
            street: self.registry.nodes_in(NodeCategory::Street),
            intersection: self.registry.nodes_in(NodeCategory::Cross),
        };
        pending
            .intersection
            .extend(self.registry.nodes_in(NodeCategory::Curve));

        let added = self.rebuild_network(scene, &pending)?;
        info!(
            "Rebuilt entire network: {} nodes, {} arcs",
            pending.len(),
            added
        );
        Ok(added)
    }

    /// Place a piece directly, as if it was part of the loaded scene.
    /// No arcs are discovered until a rebuild runs.
    pub fn spawn_prefab(
        &mut self,
        scene: &mut PhysicsScene,
        kind: PieceKind,
        pose: Pose,
    ) -> Result<EntityId> {
        self.spawn_piece(scene, kind, Pose::new(flatten(pose.position), pose.yaw))
    }

    /// Connect every piece already present in the scene
    pub fn build_initial_network(&mut self, scene: &PhysicsScene) -> Result<usize> {
        info!(
            "Building initial network over {} pieces",
            self.registry.pieces().count()
        );
        self.rebuild_entire_network(scene)
    }

    /// Remove the piece under `point` and rebuild the whole network.
    /// Terrain is never deleted.
    pub fn delete_at(&mut self, scene: &mut PhysicsScene, point: Vec3) -> Result<Option<EntityId>> {
        if !self.deleting {
            return Err(NetworkError::NotInDeleteMode.into());
        }
        if self.active_build.is_some() {
            return Err(NetworkError::BuildInProgress.into());
        }

        let mask = LayerMask::of(Layer::Street)
            .with(Layer::Building)
            .with(Layer::Terrain);
        let hits = scene.overlap_sphere(point, self.config.overlap_radius, mask);

        let Some(target) = hits
            .iter()
            .copied()
            .find(|entity| self.registry.contains(*entity))
        else {
            if !hits.is_empty() {
                debug!("Nothing deletable at {:?}", point);
            }
            return Ok(None);
        };

        self.destroy_piece(scene, target);
        self.rebuild_entire_network(scene)?;
        info!("Deleted {:?}", target);
        Ok(Some(target))
    }

    fn check_token(&mut self, build: u64, issued_at: u64, now: u64) -> Result<()> {
        if self.active_build != Some(build) {
            return Err(NetworkError::StaleToken { build }.into());
        }
        if now <= issued_at {
            self.active_build = None;
            return Err(NetworkError::TickNotAdvanced { issued_at, now }.into());
        }
        Ok(())
    }

    fn resolve_candidates(
        &mut self,
        scene: &mut PhysicsScene,
        candidates: &[EntityId],
        pending: &mut PendingNodes,
        report: &mut BuildReport,
    ) -> Result<()> {
        let street = LayerMask::of(Layer::Street);

        for candidate in candidates {
            let Some(anchor) = self.registry.get(*candidate).map(|piece| piece.pose.position) else {
                debug!("Candidate {:?} was removed before resolution", candidate);
                continue;
            };

            if self.collides_with_building(scene, anchor) {
                if let Some(removed) = self.destroy_piece(scene, *candidate) {
                    pending.forget(&removed);
                }
                debug!("Removed {:?}: placed on a building", candidate);
                report.outcomes.push(PlacementOutcome::Collided(*candidate));
                continue;
            }

            let overlapping = scene.overlap_sphere(anchor, self.config.overlap_radius, street);
            if overlapping.len() < 2 {
                self.queue_nearby(scene, anchor, pending, false);
                report.outcomes.push(PlacementOutcome::Segment(*candidate));
                continue;
            }

            for entity in overlapping {
                match self.destroy_piece(scene, entity) {
                    Some(removed) => pending.forget(&removed),
                    None => {
                        scene.despawn(entity);
                    }
                }
            }

            let outcome = self.place_intersection(scene, anchor, pending)?;
            report.outcomes.push(outcome);
        }
        Ok(())
    }

    fn place_intersection(
        &mut self,
        scene: &mut PhysicsScene,
        anchor: Vec3,
        pending: &mut PendingNodes,
    ) -> Result<PlacementOutcome> {
        let hits = ArmHits::probe(&*scene, anchor, &self.config);

        let Some(shape) = hits.classify() else {
            warn!(
                "Unsupported intersection topology at ({:.1}, {:.1}): {:?}",
                anchor.x, anchor.z, hits
            );
            return Ok(PlacementOutcome::Unsupported {
                position: anchor,
                hits,
            });
        };

        let entity = self.spawn_piece(
            scene,
            PieceKind::Intersection(shape),
            Pose::new(anchor, shape.yaw),
        )?;
        self.queue_piece_nodes(entity, pending);
        self.queue_nearby(scene, anchor, pending, true);

        debug!(
            "Placed {:?} at ({:.1}, {:.1}) rotated {}",
            shape.kind, anchor.x, anchor.z, shape.yaw
        );
        Ok(PlacementOutcome::Intersection { entity, shape })
    }

    fn collides_with_building(&self, scene: &PhysicsScene, anchor: Vec3) -> bool {
        let radius = self.config.cell_size / 2.0 - 0.5;
        !scene
            .overlap_sphere(anchor, radius, LayerMask::of(Layer::Building))
            .is_empty()
    }

    /// Queue nodes near `center`; only street nodes when `street_only`
    fn queue_nearby(
        &self,
        scene: &PhysicsScene,
        center: Vec3,
        pending: &mut PendingNodes,
        street_only: bool,
    ) {
        let markers = scene.overlap_sphere(
            center,
            self.config.refresh_radius,
            LayerMask::of(Layer::Network),
        );
        for marker in markers {
            let Some(node) = self
                .registry
                .node_for_marker(marker)
                .and_then(|node| self.graph.node(node))
            else {
                continue;
            };
            if street_only && node.category != NodeCategory::Street {
                continue;
            }
            pending.insert(node.id, node.category);
        }
    }

    fn queue_piece_nodes(&self, entity: EntityId, pending: &mut PendingNodes) {
        if let Some(piece) = self.registry.get(entity) {
            for slot in &piece.nodes {
                pending.insert(slot.node, slot.template.category);
            }
        }
    }

    fn spawn_piece(&mut self, scene: &mut PhysicsScene, kind: PieceKind, pose: Pose) -> Result<EntityId> {
        let entity = scene.spawn(kind.layer(), pose.position, kind.footprint(&self.config));
        let marker_shape = Shape::Cylinder {
            radius: self.config.marker_radius,
            half_height: self.config.marker_half_height,
        };

        let mut nodes = Vec::new();
        for template in kind.node_templates(&self.config) {
            let node_pose = template.place(&pose);
            let marker = scene.spawn(Layer::Network, node_pose.position, marker_shape);
            let node = self.graph.add_node(template.category, entity, marker);
            self.graph.initialize_node(node, node_pose)?;
            nodes.push(PieceNode {
                node,
                marker,
                template,
            });
        }

        self.registry.insert(Piece {
            entity,
            kind,
            pose,
            nodes,
        });
        Ok(entity)
    }

    fn destroy_piece(&mut self, scene: &mut PhysicsScene, entity: EntityId) -> Option<Piece> {
        let piece = self.registry.remove(entity)?;
        scene.despawn(entity);
        for slot in &piece.nodes {
            self.graph.remove_node(slot.node);
            scene.despawn(slot.marker);
        }
        Some(piece)
    }

    /// Every network-layer collider must map to a live node
    fn check_network_layer(&self, scene: &PhysicsScene) -> Result<()> {
        for marker in scene.entities_on(Layer::Network) {
            let known = self
                .registry
                .node_for_marker(marker)
                .is_some_and(|node| self.graph.contains(node));
            if !known {
                return Err(NetworkError::MissingNodeData { entity: marker }.into());
            }
        }
        Ok(())
    }

    /// Re-derive a node's pose from its owning piece
    fn reinitialize_node(&mut self, node: NodeId) -> Result<bool> {
        let Some(pose) = self.registry.owner_of(node).and_then(|piece| {
            piece
                .nodes
                .iter()
                .find(|slot| slot.node == node)
                .map(|slot| slot.template.place(&piece.pose))
        }) else {
            return Ok(false);
        };

        self.graph.initialize_node(node, pose)?;
        Ok(true)
    }

    fn discover_arcs(&self, scene: &PhysicsScene, node: NodeId) -> Vec<NodeId> {
        let Some(street_node) = self.graph.node(node) else {
            return Vec::new();
        };
        let pose = street_node.pose;

        match street_node.category {
            NodeCategory::Street => self.discover_street_arcs(scene, node, &pose),
            NodeCategory::Cross => {
                let radius = self.config.cross_probe_radius;
                self.probe_offsets(scene, node, &pose, &CROSS_PROBE_OFFSETS, radius)
            }
            NodeCategory::Curve => {
                let probe = self.config.curve_probe;
                let offset = [Vec3::new(0.0, 0.0, probe.distance)];
                self.probe_offsets(scene, node, &pose, &offset, probe.radius)
            }
        }
    }

    /// Far probe, then near probe; a node with neither is a dead end and
    /// turns around into whatever lies to its left
    fn discover_street_arcs(&self, scene: &PhysicsScene, node: NodeId, pose: &Pose) -> Vec<NodeId> {
        for probe in [self.config.street_far_probe, self.config.street_near_probe] {
            let hits = self.probe_nodes(
                scene,
                pose.position + pose.forward() * probe.distance,
                probe.radius,
                node,
            );
            if !hits.is_empty() {
                return hits;
            }
        }

        let u_turn = self.config.u_turn_probe;
        debug!("Node {:?} is a dead end", node);
        self.probe_nodes(
            scene,
            pose.position - pose.right() * u_turn.distance,
            u_turn.radius,
            node,
        )
    }

    fn probe_offsets(
        &self,
        scene: &PhysicsScene,
        node: NodeId,
        pose: &Pose,
        offsets: &[Vec3],
        radius: f32,
    ) -> Vec<NodeId> {
        let mut found = Vec::new();
        for offset in offsets {
            for hit in self.probe_nodes(scene, pose.transform_point(*offset), radius, node) {
                if !found.contains(&hit) {
                    found.push(hit);
                }
            }
        }
        found
    }

    /// Live nodes whose markers touch the probe sphere
    fn probe_nodes(&self, scene: &PhysicsScene, center: Vec3, radius: f32, exclude: NodeId) -> Vec<NodeId> {
        scene
            .overlap_sphere(center, radius, LayerMask::of(Layer::Network))
            .into_iter()
            .filter_map(|marker| self.registry.node_for_marker(marker))
            .filter(|hit| *hit != exclude && self.graph.contains(*hit))
            .collect()
    }
}
