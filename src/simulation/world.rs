//! Main simulation world that ties everything together
//!
//! Owns the spatial scene, the network builder, the vehicles and the traffic
//! lights, and advances them in fixed ticks.

use anyhow::{bail, Context, Result};
use glam::Vec3;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;

use super::builder::{
    BuildCommand, BuildReport, CommandOutcome, NetworkBuilder, RebuildToken, SettleToken,
};
use super::car_manager::{self, SimVehicle};
use super::config::SimConfig;
use super::intersection::IntersectionKind;
use super::pieces::{BuildingKind, PieceKind};
use super::road_network::NetworkGraph;
use super::route::{DespawnAtEnd, NextAction, RouteStrategy};
use super::spatial::{PhysicsScene, Shape, SpatialQuery};
use super::traffic_light::{LightPhase, TrafficLight};
use super::types::{
    EntityId, Layer, LayerMask, LightId, NodeCategory, NodeId, Pose, SimId, VehicleId,
};

/// Cells between parallel streets of the test world
const TEST_BLOCK_CELLS: i32 = 3;
/// Waypoints in a random demo route
const DEMO_ROUTE_LENGTH: usize = 24;
const SPAWN_CLEARANCE: f32 = 3.0;

/// Running totals for the end-of-run summary
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorldStats {
    pub ticks: u64,
    pub vehicles_spawned: usize,
    pub vehicles_completed: usize,
    pub respawns: usize,
    pub builds_completed: usize,
    pub unsupported_topologies: usize,
}

/// A build suspended between physics ticks
enum InFlightBuild {
    Settling(SettleToken),
    Rebuilding(RebuildToken),
}

/// The main simulation world
pub struct SimWorld {
    pub config: SimConfig,

    /// Colliders of every piece, node marker and vehicle
    pub scene: PhysicsScene,

    /// Lane graph and piece registry
    pub builder: NetworkBuilder,

    pub vehicles: BTreeMap<VehicleId, SimVehicle>,

    pub lights: BTreeMap<LightId, TrafficLight>,

    in_flight: Option<InFlightBuild>,

    /// Vehicles that reached a waypoint last tick
    pending_recalculations: Vec<VehicleId>,

    last_report: Option<BuildReport>,

    pub stats: WorldStats,

    /// Vehicles kept alive with random routes
    demo_population: usize,

    next_id: usize,

    /// Simulation time
    pub time: f32,

    /// Optional seeded RNG for reproducible simulations
    rng: Option<StdRng>,
}

impl SimWorld {
    fn new_internal(config: SimConfig, rng: Option<StdRng>) -> Self {
        let mut scene = PhysicsScene::new();
        scene.spawn(
            Layer::Terrain,
            Vec3::new(0.0, -1.0, 0.0),
            Shape::Box {
                half_extents: Vec3::new(10_000.0, 1.0, 10_000.0),
            },
        );

        Self {
            builder: NetworkBuilder::new(config.network.clone()),
            config,
            scene,
            vehicles: BTreeMap::new(),
            lights: BTreeMap::new(),
            in_flight: None,
            pending_recalculations: Vec::new(),
            last_report: None,
            stats: WorldStats::default(),
            demo_population: 0,
            next_id: 0,
            time: 0.0,
            rng,
        }
    }

    pub fn new(config: SimConfig) -> Self {
        Self::new_internal(config, None)
    }

    /// Create a new SimWorld with a seeded RNG for reproducible simulations
    pub fn new_with_seed(config: SimConfig, seed: u64) -> Self {
        Self::new_internal(config, Some(StdRng::seed_from_u64(seed)))
    }

    /// Choose a random element from a slice, using seeded RNG if available
    fn choose_random<'a, T>(&mut self, slice: &'a [T]) -> Option<&'a T> {
        if slice.is_empty() {
            return None;
        }
        match &mut self.rng {
            Some(rng) => slice.choose(rng),
            None => slice.choose(&mut rand::rng()),
        }
    }

    fn next_sim_id(&mut self) -> SimId {
        let id = SimId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn graph(&self) -> &NetworkGraph {
        self.builder.graph()
    }

    pub fn is_building(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Report of the most recently completed build
    pub fn last_report(&self) -> Option<&BuildReport> {
        self.last_report.as_ref()
    }

    pub fn execute(&mut self, command: BuildCommand) -> CommandOutcome {
        self.builder.execute(command)
    }

    pub fn add_trace(&mut self, position: Vec3) -> Result<Pose> {
        self.builder.add_trace(position)
    }

    pub fn rotate_pointer(&mut self) -> Result<f32> {
        self.builder.rotate_pointer()
    }

    /// Confirm the current placement; the build completes over the next ticks
    pub fn confirm_placement(&mut self) -> Result<()> {
        if self.in_flight.is_some() {
            bail!("Cannot confirm placement while a build is in flight");
        }
        let token = self.builder.confirm_placement(&mut self.scene)?;
        self.in_flight = Some(InFlightBuild::Settling(token));
        Ok(())
    }

    /// Lay a straight road between two points and confirm it.
    /// `yaw` must be 0 (along Z) or 90 (along X).
    pub fn place_road(&mut self, start: Vec3, end: Vec3, yaw: f32) -> Result<()> {
        self.begin_road(yaw)?;
        self.builder.drag_traces(start, end)?;
        self.confirm_placement()
    }

    /// Lay several straight roads sharing one yaw in a single placement
    pub fn place_roads(&mut self, lines: &[(Vec3, Vec3)], yaw: f32) -> Result<()> {
        self.begin_road(yaw)?;
        for (start, end) in lines {
            self.builder.drag_traces(*start, *end)?;
        }
        self.confirm_placement()
    }

    fn begin_road(&mut self, yaw: f32) -> Result<()> {
        if self.execute(BuildCommand::StartRoadPlacement) == CommandOutcome::Ignored {
            bail!("A placement is already in progress");
        }
        if yaw != 0.0 {
            self.rotate_pointer()?;
        }
        Ok(())
    }

    pub fn place_building(&mut self, kind: BuildingKind, position: Vec3) -> Result<()> {
        if self.execute(BuildCommand::SpawnBuilding(kind)) == CommandOutcome::Ignored {
            bail!("A placement is already in progress");
        }
        self.add_trace(position)?;
        self.confirm_placement()
    }

    /// Delete the piece under `point` (delete mode must be active)
    pub fn delete_at(&mut self, point: Vec3) -> Result<Option<EntityId>> {
        if self.in_flight.is_some() {
            bail!("Cannot delete while a build is in flight");
        }
        self.builder.delete_at(&mut self.scene, point)
    }

    /// Step physics until the in-flight build (if any) has completed
    pub fn finish_build(&mut self) -> Result<Option<&BuildReport>> {
        while self.in_flight.is_some() {
            self.scene.step();
            self.advance_build()?;
        }
        Ok(self.last_report.as_ref())
    }

    /// Resume the in-flight build if the scene has stepped since it paused
    fn advance_build(&mut self) -> Result<()> {
        let tick = self.scene.tick();
        self.in_flight = match self.in_flight.take() {
            None => None,
            Some(InFlightBuild::Settling(token)) if token.is_ready(tick) => Some(
                InFlightBuild::Rebuilding(self.builder.resolve_overlaps(token, &mut self.scene)?),
            ),
            Some(InFlightBuild::Rebuilding(token)) if token.is_ready(tick) => {
                let report = self.builder.complete_build(token, &mut self.scene)?;
                self.stats.builds_completed += 1;
                self.stats.unsupported_topologies += report.unsupported().count();
                self.last_report = Some(report);
                None
            }
            waiting => waiting,
        };
        Ok(())
    }

    pub fn add_traffic_light(
        &mut self,
        stop_position: Vec3,
        approach: Vec3,
        phase: LightPhase,
    ) -> LightId {
        let id = LightId(self.next_sim_id());
        self.lights.insert(
            id,
            TrafficLight::new(id, stop_position, approach, phase, self.config.lights.clone()),
        );
        id
    }

    pub fn spawn_vehicle(
        &mut self,
        route: &[NodeId],
        strategy: Box<dyn RouteStrategy>,
    ) -> Result<VehicleId> {
        let id = VehicleId(self.next_sim_id());
        let vehicle = car_manager::spawn_vehicle(
            id,
            route,
            strategy,
            self.builder.graph(),
            &mut self.scene,
            &self.config,
        )?;
        self.vehicles.insert(id, vehicle);
        self.stats.vehicles_spawned += 1;
        Ok(id)
    }

    pub fn despawn_vehicle(&mut self, id: VehicleId) -> bool {
        self.pending_recalculations.retain(|pending| *pending != id);
        car_manager::despawn_vehicle(id, &mut self.vehicles, &mut self.scene).is_some()
    }

    /// Follow random outgoing arcs from `start`
    pub fn random_route(&mut self, start: NodeId, max_len: usize) -> Vec<NodeId> {
        let mut route = vec![start];
        let mut current = start;
        while route.len() < max_len {
            let successors = self.builder.graph().successors(current);
            let Some(next) = self.choose_random(&successors).copied() else {
                break;
            };
            route.push(next);
            current = next;
        }
        route
    }

    /// Spawn a vehicle on a free street node with a random route
    pub fn spawn_random_vehicle(&mut self) -> Result<VehicleId> {
        let starts: Vec<NodeId> = self
            .builder
            .registry()
            .nodes_in(NodeCategory::Street)
            .into_iter()
            .filter(|node| !self.builder.graph().successors(*node).is_empty())
            .filter(|node| self.is_clear(*node))
            .collect();

        let start = *self
            .choose_random(&starts)
            .context("No free street node to spawn a vehicle on")?;
        let route = self.random_route(start, DEMO_ROUTE_LENGTH);
        self.spawn_vehicle(&route, Box::new(DespawnAtEnd))
    }

    fn is_clear(&self, node: NodeId) -> bool {
        self.builder.graph().position(node).is_some_and(|position| {
            self.scene
                .overlap_sphere(position, SPAWN_CLEARANCE, LayerMask::of(Layer::Vehicle))
                .is_empty()
        })
    }

    /// Keep this many random-route vehicles alive
    pub fn set_demo_population(&mut self, vehicles: usize) {
        self.demo_population = vehicles;
    }

    /// Advance the world by one fixed step
    pub fn tick(&mut self, delta_secs: f32) -> Result<()> {
        self.time += delta_secs;
        self.stats.ticks += 1;
        self.scene.step();

        self.advance_build()?;

        // Vehicles only consume the graph once builds have settled
        if self.in_flight.is_some() {
            return Ok(());
        }

        self.process_recalculations();
        self.update_lights(delta_secs);
        self.update_vehicles(delta_secs);
        self.replenish_population();
        Ok(())
    }

    fn process_recalculations(&mut self) {
        let pending = std::mem::take(&mut self.pending_recalculations);
        let actions = car_manager::run_recalculations(
            &pending,
            &mut self.vehicles,
            self.builder.graph(),
            &mut self.scene,
        );

        for (id, action) in actions {
            match action {
                NextAction::Continue => {}
                NextAction::Idle => debug!("Vehicle {:?} finished its route", id),
                NextAction::Respawn { .. } => self.stats.respawns += 1,
                NextAction::Despawn => {
                    if self.despawn_vehicle(id) {
                        self.stats.vehicles_completed += 1;
                    }
                }
            }
        }
    }

    fn update_lights(&mut self, delta_secs: f32) {
        for light in self.lights.values_mut() {
            if light.update_timer(delta_secs) {
                debug!("Light {:?} turned {:?}", light.id, light.phase());
            }

            let signals = light.signals(self.vehicles.values().map(|vehicle| {
                let kinematics = vehicle.body.kinematics();
                (vehicle.id, kinematics.position, kinematics.forward)
            }));

            for signal in signals {
                if let Some(vehicle) = self.vehicles.get_mut(&signal.vehicle) {
                    vehicle
                        .controller
                        .stop_at_traffic_light(signal.stop_position, signal.stop);
                }
            }
        }
    }

    fn update_vehicles(&mut self, delta_secs: f32) {
        let decisions =
            car_manager::decide_all(&mut self.vehicles, self.builder.graph(), &self.scene);

        self.pending_recalculations.extend(
            decisions
                .iter()
                .filter(|(_, decision)| decision.waypoint_reached)
                .map(|(id, _)| *id),
        );

        car_manager::apply_decisions(
            &decisions,
            &mut self.vehicles,
            &mut self.scene,
            &self.config.motor,
            delta_secs,
        );
    }

    fn replenish_population(&mut self) {
        if self.vehicles.len() >= self.demo_population {
            return;
        }
        if let Err(err) = self.spawn_random_vehicle() {
            debug!("Could not spawn demo vehicle: {:#}", err);
        }
    }

    /// Create the default test world
    pub fn create_test_world(config: SimConfig, blocks: usize) -> Result<Self> {
        Self::build_test_world(SimWorld::new(config), blocks)
    }

    /// Create a default test world with a seeded RNG for reproducible simulations
    pub fn create_test_world_with_seed(config: SimConfig, blocks: usize, seed: u64) -> Result<Self> {
        Self::build_test_world(SimWorld::new_with_seed(config, seed), blocks)
    }

    /// Street grid of `blocks` x `blocks` blocks: curves at the corners,
    /// three-way crossings along the edges and four-way crossings inside,
    /// with a few buildings and traffic lights on the four-way crossings
    pub fn build_test_world(mut world: SimWorld, blocks: usize) -> Result<Self> {
        if blocks == 0 {
            bail!("The test world needs at least one block");
        }

        let cell = world.config.network.cell_size;
        let span = blocks as i32 * TEST_BLOCK_CELLS;
        let at = |x: i32, z: i32| Vec3::new(x as f32 * cell, 0.0, z as f32 * cell);

        let lines: Vec<i32> = (0..=blocks as i32).map(|k| k * TEST_BLOCK_CELLS).collect();

        let east_west: Vec<_> = lines.iter().map(|z| (at(0, *z), at(span, *z))).collect();
        world.place_roads(&east_west, 90.0)?;
        world.finish_build()?;

        let north_south: Vec<_> = lines.iter().map(|x| (at(*x, 0), at(*x, span))).collect();
        world.place_roads(&north_south, 0.0)?;
        world.finish_build()?;

        for bx in 0..blocks as i32 {
            for bz in 0..blocks as i32 {
                let kind = if (bx + bz) % 2 == 0 {
                    BuildingKind::HouseBlock
                } else {
                    BuildingKind::GarbageOffice
                };
                world.place_building(kind, at(bx * TEST_BLOCK_CELLS + 1, bz * TEST_BLOCK_CELLS + 1))?;
                world.finish_build()?;
            }
        }

        world.add_crossing_lights();

        info!(
            "Test world ready: {} segments, {} intersections, {} nodes, {} arcs, {} lights",
            world.builder.registry().segment_count(),
            world.builder.registry().intersections().count(),
            world.graph().node_count(),
            world.graph().arc_count(),
            world.lights.len()
        );
        Ok(world)
    }

    /// One light per entry lane of every four-way crossing. North-south
    /// traffic starts green, east-west traffic starts red.
    fn add_crossing_lights(&mut self) {
        let entries: Vec<Pose> = self
            .builder
            .registry()
            .intersections()
            .filter(|piece| {
                matches!(piece.kind, PieceKind::Intersection(shape) if shape.kind == IntersectionKind::FourWay)
            })
            .flat_map(|piece| piece.nodes.iter())
            .filter(|slot| slot.template.category == NodeCategory::Cross)
            .filter_map(|slot| self.builder.graph().node(slot.node).map(|node| node.pose))
            .collect();

        for pose in entries {
            let approach = pose.forward();
            let phase = if approach.z.abs() > approach.x.abs() {
                LightPhase::Green
            } else {
                LightPhase::Red
            };
            self.add_traffic_light(pose.position, approach, phase);
        }
    }

    /// Log the end-of-run summary
    pub fn log_summary(&self) {
        let registry = self.builder.registry();
        let completion = if self.stats.vehicles_spawned > 0 {
            self.stats.vehicles_completed as f32 / self.stats.vehicles_spawned as f32 * 100.0
        } else {
            0.0
        };

        info!("=== SIMULATION COMPLETE ===");
        info!("Elapsed time: {:.2}s", self.time);
        info!("Ticks: {}", self.stats.ticks);
        info!("Total segments: {}", registry.segment_count());
        info!(
            "Total intersections: {} (four-way {}, three-way {}, curves {})",
            registry.intersections().count(),
            registry.intersection_count(IntersectionKind::FourWay),
            registry.intersection_count(IntersectionKind::ThreeWay),
            registry.intersection_count(IntersectionKind::Curve)
        );
        info!("Total buildings: {}", registry.buildings().count());
        info!("Total nodes: {}", self.graph().node_count());
        info!("Total arcs: {}", self.graph().arc_count());
        info!("Total vehicles spawned: {}", self.stats.vehicles_spawned);
        info!("Total vehicles completed: {}", self.stats.vehicles_completed);
        info!("Active vehicles: {}", self.vehicles.len());
        info!("Unsupported topologies: {}", self.stats.unsupported_topologies);
        info!("Completion rate: {:.1}%", completion);
    }

    /// One-line progress report
    pub fn log_progress(&self) {
        let average_speed = if self.vehicles.is_empty() {
            0.0
        } else {
            self.vehicles
                .values()
                .map(|vehicle| vehicle.controller.speed_kmh())
                .sum::<f32>()
                / self.vehicles.len() as f32
        };
        debug!(
            "t={:.1}s vehicles={} completed={} avg_speed={:.1}km/h",
            self.time,
            self.vehicles.len(),
            self.stats.vehicles_completed,
            average_speed
        );
    }

    /// Render the placed pieces and vehicles as a character grid, one
    /// character per cell, north up
    pub fn draw_map(&self) -> String {
        let cell = self.config.network.cell_size;
        let to_cell = |position: Vec3| {
            (
                (position.x / cell).round() as i32,
                (position.z / cell).round() as i32,
            )
        };

        let mut glyphs: BTreeMap<(i32, i32), char> = BTreeMap::new();
        for piece in self.builder.registry().pieces() {
            let glyph = match piece.kind {
                PieceKind::Segment if piece.pose.yaw % 180.0 == 0.0 => '|',
                PieceKind::Segment => '-',
                PieceKind::Intersection(shape) => match shape.kind {
                    IntersectionKind::FourWay => '+',
                    IntersectionKind::ThreeWay => 'T',
                    IntersectionKind::Curve => 'o',
                },
                PieceKind::Building(BuildingKind::HouseBlock) => 'H',
                PieceKind::Building(BuildingKind::GarbageOffice) => 'G',
            };
            glyphs.insert(to_cell(piece.pose.position), glyph);
        }
        for vehicle in self.vehicles.values() {
            glyphs.insert(to_cell(vehicle.body.position), '*');
        }

        let Some(min_x) = glyphs.keys().map(|(x, _)| *x).min() else {
            return String::from("(empty map)\n");
        };
        let max_x = glyphs.keys().map(|(x, _)| *x).max().unwrap_or(min_x);
        let min_z = glyphs.keys().map(|(_, z)| *z).min().unwrap_or(0);
        let max_z = glyphs.keys().map(|(_, z)| *z).max().unwrap_or(min_z);

        let mut map = String::new();
        map.push_str("Legend: |,- =Segment, +=Four-way, T=Three-way, o=Curve, H=House, G=Garbage office, *=Vehicle\n");
        for z in (min_z..=max_z).rev() {
            let row: String = (min_x..=max_x)
                .map(|x| glyphs.get(&(x, z)).copied().unwrap_or(' '))
                .collect();
            map.push_str(row.trim_end());
            map.push('\n');
        }
        map
    }

    /// Warn about vehicles whose next waypoint vanished from the graph
    pub fn check_routes(&self) -> usize {
        let broken = self
            .vehicles
            .values()
            .filter(|vehicle| {
                vehicle
                    .controller
                    .next_waypoint()
                    .is_some_and(|node| !self.graph().contains(node))
            })
            .count();
        if broken > 0 {
            warn!("{} vehicles are heading for removed nodes", broken);
        }
        broken
    }
}
