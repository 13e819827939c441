//! Standalone street network simulation
//!
//! Road pieces are placed on a grid, the lane graph is discovered from the
//! node markers the pieces leave in the spatial scene, and vehicles drive
//! waypoint routes over that graph. Everything runs headless so it can be
//! exercised from tests and the console.

mod builder;
mod car;
mod car_manager;
mod config;
mod intersection;
mod pieces;
mod registry;
mod road_network;
mod route;
mod spatial;
mod traffic_light;
mod types;
mod world;

// Re-export public types for external use
pub use builder::{
    BuildCommand, BuildReport, CommandOutcome, NetworkBuilder, NetworkError, PendingNodes,
    PendingTrace, PlacementOutcome, PlacementSession, RebuildToken, SettleToken, TraceKind,
    CROSS_PROBE_OFFSETS,
};
pub use car::{
    hard_stop_brake, slowing_brake, stopping_brake, DriveState, Kinematics, MotionCommand,
    Obstacle, TickDecision, VehicleController,
};
pub use car_manager::{SimVehicle, VehicleBody};
pub use config::{
    MotorProfile, NetworkConfig, Probe, SimConfig, TrafficLightConfig, VehicleConfig,
};
pub use intersection::{ArmHits, IntersectionKind, IntersectionShape};
pub use pieces::{Arm, BuildingKind, NodeTemplate, PieceKind};
pub use registry::{NetworkRegistry, Piece, PieceNode};
pub use road_network::{NetworkGraph, StreetNode};
pub use route::{DespawnAtEnd, LoopRoute, NextAction, RespawnAtStart, RouteStrategy, StopAtEnd};
pub use spatial::{Collider, PhysicsScene, RayHit, Shape, SpatialQuery};
pub use traffic_light::{LightPhase, LightSignal, TrafficLight};
pub use types::{
    flatten, normalize_yaw, yaw_towards, EntityId, Layer, LayerMask, LightId, NodeCategory,
    NodeId, Pose, SimId, VehicleId, KMH_PER_MS,
};
pub use world::{SimWorld, WorldStats};
