//! Tunable constants for the network builder, vehicles and traffic lights
//!
//! Every struct has a `Default` carrying the values the simulation was tuned
//! with; the headless binary overrides a few of them from the command line.

/// A spherical probe placed `distance` units away from a node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Probe {
    pub distance: f32,
    pub radius: f32,
}

impl Probe {
    pub const fn new(distance: f32, radius: f32) -> Self {
        Self { distance, radius }
    }
}

/// Geometry and probe settings used while building the network graph
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkConfig {
    /// Size of a grid cell; every road piece covers exactly one cell
    pub cell_size: f32,
    /// Lateral offset of the outer lane from the piece center line
    pub outer_lane_offset: f32,
    /// Lateral offset of the inner lane from the piece center line
    pub inner_lane_offset: f32,
    /// Radius of the overlap check at a segment anchor
    pub overlap_radius: f32,
    /// Distance of the four classification probes
    pub classify_distance: f32,
    pub classify_radius: f32,
    /// Nodes inside this radius are re-queued after a piece is placed
    pub refresh_radius: f32,
    pub street_far_probe: Probe,
    pub street_near_probe: Probe,
    /// Lateral probe used at dead ends
    pub u_turn_probe: Probe,
    pub cross_probe_radius: f32,
    pub curve_probe: Probe,
    /// Distance from an intersection center to its entry and exit nodes
    pub arm_offset: f32,
    /// Node markers are upright cylinders
    pub marker_radius: f32,
    pub marker_half_height: f32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            cell_size: 14.0,
            outer_lane_offset: 4.2,
            inner_lane_offset: 1.8,
            overlap_radius: 0.1,
            classify_distance: 14.0,
            classify_radius: 0.1,
            refresh_radius: 15.0,
            street_far_probe: Probe::new(13.0, 2.3),
            street_near_probe: Probe::new(10.0, 2.0),
            u_turn_probe: Probe::new(4.0, 3.0),
            cross_probe_radius: 2.5,
            curve_probe: Probe::new(9.0, 2.5),
            arm_offset: 5.0,
            marker_radius: 0.2,
            marker_half_height: 4.0,
        }
    }
}

/// Driving behaviour of the navigation controller
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleConfig {
    /// Forward force multiplier while cruising
    pub front_force: f32,
    /// Dead zone of the about-to-turn check on the second waypoint
    pub min_turn: f32,
    /// Dead zone of the steering bias toward the next waypoint
    pub min_turn_to_turn: f32,
    /// A waypoint closer than this to the front of the vehicle is reached
    pub min_distance_to_complete_check: f32,
    pub ray_sensor_length: f32,
    pub security_distance: f32,
    /// Soft speed limit in km/h
    pub max_speed_kmh: f32,
    /// Below this speed (km/h) the cruise force gets a launch boost
    pub launch_assist_kmh: f32,
    pub launch_boost: f32,
    /// Above this speed (km/h) stopping and slowing brake instead of creeping
    pub braking_speed_kmh: f32,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            front_force: 2.0,
            min_turn: 0.35,
            min_turn_to_turn: 0.05,
            min_distance_to_complete_check: 2.5,
            ray_sensor_length: 12.0,
            security_distance: 4.0,
            max_speed_kmh: 50.0,
            launch_assist_kmh: 20.0,
            launch_boost: 1.1,
            braking_speed_kmh: 20.0,
        }
    }
}

/// Physical limits of the simple vehicle body
#[derive(Debug, Clone, PartialEq)]
pub struct MotorProfile {
    /// Newtons produced by a unit forward force
    pub engine_power: f32,
    /// Steering produced by a unit turning bias
    pub turn_power: f32,
    pub mass: f32,
    pub max_brake_decel: f32,
    /// Yaw rate in degrees per second at full steering
    pub max_steer_rate: f32,
    /// Fraction of speed lost per second to rolling resistance
    pub drag: f32,
    pub collider_radius: f32,
}

impl Default for MotorProfile {
    fn default() -> Self {
        Self {
            engine_power: 3000.0,
            turn_power: 1.0,
            mass: 1200.0,
            max_brake_decel: 9.0,
            max_steer_rate: 120.0,
            drag: 0.05,
            collider_radius: 1.2,
        }
    }
}

/// Signal timing of traffic lights
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficLightConfig {
    pub green_secs: f32,
    pub red_secs: f32,
    /// Vehicles inside this radius of the stop line are signalled
    pub zone_radius: f32,
}

impl Default for TrafficLightConfig {
    fn default() -> Self {
        Self {
            green_secs: 8.0,
            red_secs: 8.0,
            zone_radius: 18.0,
        }
    }
}

/// All simulation settings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimConfig {
    pub network: NetworkConfig,
    pub vehicle: VehicleConfig,
    pub motor: MotorProfile,
    pub lights: TrafficLightConfig,
}
