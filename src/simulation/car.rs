//! Vehicle navigation controller
//!
//! Decides one vehicle's motion every tick from its waypoint list, what its
//! ray sensors see on the vehicle layer and the traffic light state it was
//! last told about. The controller never moves the body itself; it returns
//! a [`TickDecision`] that the car manager applies.

use glam::Vec3;
use std::collections::VecDeque;

use super::config::VehicleConfig;
use super::road_network::NetworkGraph;
use super::route::{NextAction, RouteStrategy};
use super::spatial::{RayHit, SpatialQuery};
use super::types::{flatten, Layer, LayerMask, NodeId, Pose, KMH_PER_MS};

/// Creeping uses half power when turning right harder than this
const CREEP_TURN_LIMIT: f32 = 0.3;
const AHEAD_SIDE_BIAS: f32 = 0.2;
const BESIDE_BIAS: f32 = 0.3;
const SOFT_CLAMP: f32 = 0.99;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveState {
    /// No waypoint left
    Idle,
    Cruising,
    /// Slowing down for a turn or a nearby vehicle
    Yielding,
    /// Stopping for a vehicle ahead or a red light
    Blocked,
    HardStopped,
}

/// Which sensor saw another vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Obstacle {
    Ahead,
    AheadRight,
    AheadLeft,
    BesideRight,
    BesideLeft,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionCommand {
    None,
    /// `throttle` scales the motor's engine power, `steering` is in [-1, 1]
    /// with positive values turning right
    Drive { throttle: f32, steering: f32 },
    Brake { magnitude: f32 },
}

/// The part of the body state the controller reads
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Kinematics {
    pub position: Vec3,
    pub forward: Vec3,
    pub right: Vec3,
    pub velocity: Vec3,
}

impl Kinematics {
    pub fn new(position: Vec3, yaw: f32, speed: f32) -> Self {
        let pose = Pose::new(position, yaw);
        Self {
            position,
            forward: pose.forward(),
            right: pose.right(),
            velocity: pose.forward() * speed,
        }
    }

    /// Reference point one unit ahead of the body center
    pub fn front(&self) -> Vec3 {
        self.position + self.forward
    }
}

/// Everything the controller decided this tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickDecision {
    pub state: DriveState,
    pub command: MotionCommand,
    pub obstacle: Option<Obstacle>,
    pub turning: f32,
    pub sensor_length: f32,
    /// The next waypoint is reached; consume it on the following tick
    pub waypoint_reached: bool,
    /// Velocity should be scaled by `velocity_scale` after the command
    pub velocity_scale: f32,
}

impl TickDecision {
    fn idle(sensor_length: f32) -> Self {
        Self {
            state: DriveState::Idle,
            command: MotionCommand::None,
            obstacle: None,
            turning: 0.0,
            sensor_length,
            waypoint_reached: false,
            velocity_scale: 1.0,
        }
    }
}

/// Brake applied while the hard stop flag is set
pub fn hard_stop_brake(speed_kmh: f32) -> f32 {
    1e8 * (speed_kmh + 1.0).powi(6) + 5.0
}

/// Brake used when stopping behind a vehicle or at a red light.
/// Never decreases with distance or speed.
pub fn stopping_brake(distance: f32, speed_kmh: f32) -> f32 {
    distance.max(0.0) * 1e8 * (speed_kmh + 1.0).powi(6) + 3.0
}

/// Brake used when slowing down for a turn or a nearby vehicle
pub fn slowing_brake(distance: f32, speed_kmh: f32) -> f32 {
    distance.max(0.0) * 1e5 * (speed_kmh + 1.0).powi(10) + 3.0
}

/// Navigation state of one vehicle
pub struct VehicleController {
    config: VehicleConfig,
    turn_power: f32,
    waypoints: VecDeque<NodeId>,
    strategy: Box<dyn RouteStrategy>,
    speed_kmh: f32,
    stopped: bool,
    stop_at_traffic_light: bool,
    stop_position: Vec3,
    turning_bias: f32,
    recalculation_pending: bool,
}

impl VehicleController {
    pub fn new(
        config: VehicleConfig,
        turn_power: f32,
        waypoints: impl IntoIterator<Item = NodeId>,
        strategy: Box<dyn RouteStrategy>,
    ) -> Self {
        Self {
            config,
            turn_power,
            waypoints: waypoints.into_iter().collect(),
            strategy,
            speed_kmh: 0.0,
            stopped: false,
            stop_at_traffic_light: false,
            stop_position: Vec3::ZERO,
            turning_bias: 0.0,
            recalculation_pending: false,
        }
    }

    pub fn waypoints(&self) -> &VecDeque<NodeId> {
        &self.waypoints
    }

    pub fn next_waypoint(&self) -> Option<NodeId> {
        self.waypoints.front().copied()
    }

    /// Replace the remaining route
    pub fn set_route(&mut self, waypoints: impl IntoIterator<Item = NodeId>) {
        self.waypoints = waypoints.into_iter().collect();
        self.recalculation_pending = false;
    }

    pub fn speed_kmh(&self) -> f32 {
        self.speed_kmh
    }

    pub fn turning_bias(&self) -> f32 {
        self.turning_bias
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Hard stop: brake every tick until cleared
    pub fn set_stopped(&mut self, stopped: bool) {
        self.stopped = stopped;
    }

    pub fn is_stopping_for_light(&self) -> bool {
        self.stop_at_traffic_light
    }

    pub fn stop_position(&self) -> Vec3 {
        self.stop_position
    }

    /// Set or clear the red light flag. Clearing keeps the last stop line.
    pub fn stop_at_traffic_light(&mut self, stop_position: Vec3, stop: bool) {
        if stop {
            self.stop_position = stop_position;
        }
        self.stop_at_traffic_light = stop;
    }

    pub fn is_recalculation_pending(&self) -> bool {
        self.recalculation_pending
    }

    /// Steering bias toward `target`: the vertical component of
    /// `forward x direction`, zeroed inside the dead zone
    pub fn angle_to_turn(&self, kinematics: &Kinematics, target: Vec3) -> f32 {
        let turning = raw_turn(kinematics, target);
        if turning.abs() < self.config.min_turn_to_turn {
            0.0
        } else {
            turning
        }
    }

    /// Whether the waypoint after the next one needs a real turn
    pub fn is_about_to_turn(&self, kinematics: &Kinematics, graph: &NetworkGraph) -> bool {
        self.waypoints
            .get(1)
            .and_then(|node| graph.position(*node))
            .is_some_and(|target| raw_turn(kinematics, target).abs() >= self.config.min_turn)
    }

    /// Decide this tick's motion
    pub fn tick(
        &mut self,
        kinematics: &Kinematics,
        graph: &NetworkGraph,
        space: &impl SpatialQuery,
    ) -> TickDecision {
        self.speed_kmh = kinematics.velocity.length() * KMH_PER_MS;
        let mut sensor_length = self.config.ray_sensor_length;

        let Some(next) = self.next_waypoint() else {
            return TickDecision::idle(sensor_length);
        };

        if self.stopped {
            return TickDecision {
                state: DriveState::HardStopped,
                command: MotionCommand::Brake {
                    magnitude: hard_stop_brake(self.speed_kmh),
                },
                ..TickDecision::idle(sensor_length)
            };
        }

        let Some(target) = graph.position(next) else {
            // The waypoint's piece was removed: treat it as reached
            return TickDecision {
                state: DriveState::Yielding,
                waypoint_reached: self.request_recalculation(),
                ..TickDecision::idle(sensor_length)
            };
        };

        let front = kinematics.front();
        let distance = flatten(front).distance(flatten(target));
        let waypoint_reached =
            distance < self.config.min_distance_to_complete_check && self.request_recalculation();

        let mut turning = self.angle_to_turn(kinematics, target);
        let about_to_turn = self.is_about_to_turn(kinematics, graph);

        if self.stop_at_traffic_light
            && kinematics.position.distance(self.stop_position)
                < self.config.security_distance + 3.0
        {
            sensor_length /= 10.0;
        }

        let sensed = self.sense(kinematics, space, sensor_length, &mut turning);

        let (state, command) = match sensed {
            None if !about_to_turn && !self.stop_at_traffic_light => {
                (DriveState::Cruising, self.cruise(turning))
            }
            Some((Obstacle::Ahead, hit)) => (
                DriveState::Blocked,
                self.stopping(kinematics.position.distance(hit.point), turning),
            ),
            _ if self.stop_at_traffic_light => {
                let distance = kinematics.position.distance(self.stop_position);
                let axis = dominant_axis(self.stop_position - kinematics.position);
                let light_turning = kinematics.forward.cross(axis).y;
                (
                    DriveState::Blocked,
                    self.stopping(distance - 1.0, light_turning),
                )
            }
            _ if about_to_turn => {
                let distance = flatten(kinematics.position).distance(flatten(target));
                (DriveState::Yielding, self.slowing(distance, turning))
            }
            Some((_, hit)) => {
                let distance = kinematics.position.distance(hit.point);
                (DriveState::Yielding, self.slowing(distance + 5.0, turning))
            }
            None => (DriveState::Cruising, self.cruise(turning)),
        };

        self.turning_bias = turning;

        TickDecision {
            state,
            command,
            obstacle: sensed.map(|(obstacle, _)| obstacle),
            turning,
            sensor_length,
            waypoint_reached,
            velocity_scale: if self.speed_kmh > self.config.max_speed_kmh {
                SOFT_CLAMP
            } else {
                1.0
            },
        }
    }

    /// Consume the reached waypoint and ask the route strategy what next
    pub fn recalculate(&mut self) -> NextAction {
        self.recalculation_pending = false;
        if self.waypoints.pop_front().is_none() {
            return NextAction::Idle;
        }
        self.strategy.on_waypoint_reached(&mut self.waypoints)
    }

    /// Returns true when a new recalculation was requested
    fn request_recalculation(&mut self) -> bool {
        if self.recalculation_pending {
            return false;
        }
        self.recalculation_pending = true;
        true
    }

    /// Ray probes from the front of the vehicle, first hit wins
    fn sense(
        &self,
        kinematics: &Kinematics,
        space: &impl SpatialQuery,
        sensor_length: f32,
        turning: &mut f32,
    ) -> Option<(Obstacle, RayHit)> {
        let mask = LayerMask::of(Layer::Vehicle);
        let front = kinematics.front();
        let forward = kinematics.forward;
        let right = kinematics.right;

        if let Some(hit) = space.raycast(front, forward, sensor_length, mask) {
            return Some((Obstacle::Ahead, hit));
        }

        let diagonal = forward * (sensor_length / 6.0);
        let diagonal_length = sensor_length / 4.0;
        if let Some(hit) = space.raycast(front, diagonal + right, diagonal_length, mask) {
            *turning -= AHEAD_SIDE_BIAS;
            return Some((Obstacle::AheadRight, hit));
        }
        if let Some(hit) = space.raycast(front, diagonal - right, diagonal_length, mask) {
            *turning += AHEAD_SIDE_BIAS;
            return Some((Obstacle::AheadLeft, hit));
        }

        if let Some(hit) = space.raycast(front, right, 1.0, mask) {
            *turning = (*turning - BESIDE_BIAS).max(-1.0);
            return Some((Obstacle::BesideRight, hit));
        }
        if let Some(hit) = space.raycast(front, -right, 1.0, mask) {
            *turning = (*turning + BESIDE_BIAS).min(1.0);
            return Some((Obstacle::BesideLeft, hit));
        }

        None
    }

    /// Free road: the launch boost only applies to this tick's force
    fn cruise(&self, turning: f32) -> MotionCommand {
        let mut throttle = self.config.front_force;
        if self.speed_kmh < self.config.launch_assist_kmh {
            throttle *= self.config.launch_boost;
        }
        MotionCommand::Drive {
            throttle,
            steering: turning * self.turn_power,
        }
    }

    /// Crawl toward the target. Only hard right turns (positive bias above
    /// the limit) halve the throttle.
    fn creep(&self, turning: f32) -> MotionCommand {
        let throttle = if turning > CREEP_TURN_LIMIT { 0.5 } else { 1.0 };
        MotionCommand::Drive {
            throttle,
            steering: turning * self.turn_power,
        }
    }

    fn stopping(&self, distance: f32, turning: f32) -> MotionCommand {
        let security = self.config.security_distance;
        if distance > security && self.speed_kmh <= self.config.braking_speed_kmh {
            return self.creep(turning);
        }
        MotionCommand::Brake {
            magnitude: stopping_brake(distance, self.speed_kmh),
        }
    }

    fn slowing(&self, distance: f32, turning: f32) -> MotionCommand {
        if distance > self.config.security_distance
            && self.speed_kmh > self.config.braking_speed_kmh
        {
            return MotionCommand::Brake {
                magnitude: slowing_brake(distance, self.speed_kmh),
            };
        }
        MotionCommand::Drive {
            throttle: 1.0,
            steering: turning * self.turn_power,
        }
    }
}

fn raw_turn(kinematics: &Kinematics, target: Vec3) -> f32 {
    let direction = (target - kinematics.position).normalize_or_zero();
    kinematics.forward.cross(direction).y
}

/// The positive world axis (X or Z) that dominates `v` in the ground plane
fn dominant_axis(v: Vec3) -> Vec3 {
    if v.x.abs() > v.z.abs() {
        Vec3::X
    } else {
        Vec3::Z
    }
}
