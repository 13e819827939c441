//! Vehicle spawning, kinematics and per-tick updates
//!
//! This module keeps the vehicle bookkeeping out of the world coordination:
//! spawning bodies on the vehicle layer, collecting controller decisions and
//! integrating the simple body model.

use anyhow::{bail, Context, Result};
use glam::Vec3;
use log::debug;
use std::collections::BTreeMap;

use super::car::{DriveState, Kinematics, MotionCommand, TickDecision, VehicleController};
use super::config::{MotorProfile, SimConfig};
use super::road_network::NetworkGraph;
use super::route::{NextAction, RouteStrategy};
use super::spatial::{PhysicsScene, Shape};
use super::types::{normalize_yaw, EntityId, Layer, NodeId, Pose, VehicleId};

/// Minimum speed (m/s) at which steering is fully effective
const FULL_STEER_SPEED: f32 = 2.0;

/// Point-mass body with a heading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleBody {
    pub position: Vec3,
    /// Degrees
    pub yaw: f32,
    /// Meters per second along the heading
    pub speed: f32,
}

impl VehicleBody {
    pub fn new(pose: Pose) -> Self {
        Self {
            position: pose.position,
            yaw: pose.yaw,
            speed: 0.0,
        }
    }

    pub fn kinematics(&self) -> Kinematics {
        Kinematics::new(self.position, self.yaw, self.speed)
    }

    /// Integrate one command over `delta_secs`
    pub fn apply(&mut self, decision: &TickDecision, motor: &MotorProfile, delta_secs: f32) {
        match decision.command {
            MotionCommand::None => {}
            MotionCommand::Drive { throttle, steering } => {
                self.speed += throttle * motor.engine_power / motor.mass * delta_secs;
                let grip = (self.speed / FULL_STEER_SPEED).min(1.0);
                self.yaw = normalize_yaw(
                    self.yaw + steering.clamp(-1.0, 1.0) * motor.max_steer_rate * grip * delta_secs,
                );
            }
            MotionCommand::Brake { magnitude } => {
                let decel = (magnitude / motor.mass).min(motor.max_brake_decel);
                self.speed = (self.speed - decel * delta_secs).max(0.0);
            }
        }

        self.speed -= self.speed * motor.drag * delta_secs;
        self.speed = (self.speed * decision.velocity_scale).max(0.0);
        self.position += Pose::new(self.position, self.yaw).forward() * self.speed * delta_secs;
    }

    /// Place the body on a node, at rest
    pub fn teleport(&mut self, pose: Pose) {
        self.position = pose.position;
        self.yaw = pose.yaw;
        self.speed = 0.0;
    }
}

/// A vehicle in the simulation
pub struct SimVehicle {
    pub id: VehicleId,
    /// Collider on the vehicle layer
    pub entity: EntityId,
    pub body: VehicleBody,
    pub controller: VehicleController,
    pub state: DriveState,
    pub distance_travelled: f32,
}

/// Spawn a vehicle on the first node of `route`, heading for the rest of it
pub fn spawn_vehicle(
    id: VehicleId,
    route: &[NodeId],
    strategy: Box<dyn RouteStrategy>,
    graph: &NetworkGraph,
    scene: &mut PhysicsScene,
    config: &SimConfig,
) -> Result<SimVehicle> {
    let Some((start, waypoints)) = route.split_first() else {
        bail!("Cannot spawn vehicle {:?} on an empty route", id);
    };

    let pose = graph
        .node(*start)
        .map(|node| node.pose)
        .with_context(|| format!("Start node {:?} not found", start))?;

    let entity = scene.spawn(
        Layer::Vehicle,
        pose.position,
        Shape::Sphere {
            radius: config.motor.collider_radius,
        },
    );

    let controller = VehicleController::new(
        config.vehicle.clone(),
        config.motor.turn_power,
        waypoints.iter().copied(),
        strategy,
    );
    debug!(
        "Spawned vehicle {:?} at {:?} with {} waypoints ({})",
        id,
        start,
        waypoints.len(),
        controller.strategy_name()
    );

    Ok(SimVehicle {
        id,
        entity,
        body: VehicleBody::new(pose),
        controller,
        state: DriveState::Idle,
        distance_travelled: 0.0,
    })
}

/// Remove a vehicle and its collider
pub fn despawn_vehicle(
    id: VehicleId,
    vehicles: &mut BTreeMap<VehicleId, SimVehicle>,
    scene: &mut PhysicsScene,
) -> Option<SimVehicle> {
    let vehicle = vehicles.remove(&id)?;
    scene.despawn(vehicle.entity);
    Some(vehicle)
}

/// Run every controller against the current scene. Bodies are not moved
/// here, so all decisions see the same world state.
pub fn decide_all(
    vehicles: &mut BTreeMap<VehicleId, SimVehicle>,
    graph: &NetworkGraph,
    scene: &PhysicsScene,
) -> Vec<(VehicleId, TickDecision)> {
    vehicles
        .values_mut()
        .map(|vehicle| {
            let decision = vehicle
                .controller
                .tick(&vehicle.body.kinematics(), graph, scene);
            vehicle.state = decision.state;
            (vehicle.id, decision)
        })
        .collect()
}

/// Integrate the decided commands and move the colliders along
pub fn apply_decisions(
    decisions: &[(VehicleId, TickDecision)],
    vehicles: &mut BTreeMap<VehicleId, SimVehicle>,
    scene: &mut PhysicsScene,
    motor: &MotorProfile,
    delta_secs: f32,
) {
    for (id, decision) in decisions {
        let Some(vehicle) = vehicles.get_mut(id) else {
            continue;
        };
        let before = vehicle.body.position;
        vehicle.body.apply(decision, motor, delta_secs);
        vehicle.distance_travelled += before.distance(vehicle.body.position);
        scene.set_position(vehicle.entity, vehicle.body.position);
    }
}

/// Consume reached waypoints for the given vehicles. Vehicles removed in the
/// meantime are skipped.
pub fn run_recalculations(
    pending: &[VehicleId],
    vehicles: &mut BTreeMap<VehicleId, SimVehicle>,
    graph: &NetworkGraph,
    scene: &mut PhysicsScene,
) -> Vec<(VehicleId, NextAction)> {
    let mut actions = Vec::new();

    for id in pending {
        let Some(vehicle) = vehicles.get_mut(id) else {
            continue;
        };

        let action = vehicle.controller.recalculate();
        if let NextAction::Respawn { at } = action {
            match graph.node(at) {
                Some(node) => {
                    vehicle.body.teleport(node.pose);
                    scene.set_position(vehicle.entity, node.pose.position);
                }
                None => {
                    actions.push((*id, NextAction::Despawn));
                    continue;
                }
            }
        }
        actions.push((*id, action));
    }

    actions
}
