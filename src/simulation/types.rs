//! Core types for the street simulation
//!
//! Identifiers, spatial layers and the small amount of pose math shared by
//! the network builder and the vehicle controller.

use glam::{Quat, Vec3};

/// A unique identifier for simulation entities
/// This is a simple wrapper around a usize for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SimId(pub usize);

/// Handle of anything that lives in the spatial scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub SimId);

/// A wrapper type for graph node IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub SimId);

/// A wrapper type for vehicle IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VehicleId(pub SimId);

/// A wrapper type for traffic light IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LightId(pub SimId);

/// Category of a drivable node, which selects its arc discovery strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeCategory {
    /// Lane endpoint of a straight segment (or an intersection exit lane)
    Street,
    /// Approach node of a 4-way or 3-way intersection
    Cross,
    /// Node of a curve piece
    Curve,
}

impl NodeCategory {
    /// Tag name used by the placement tooling
    pub fn tag(&self) -> &'static str {
        match self {
            NodeCategory::Street => "streetPoint",
            NodeCategory::Cross => "crossPoint",
            NodeCategory::Curve => "curvePoint",
        }
    }
}

/// Semantic layer a collider lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Layer {
    /// Footprints of placed road pieces
    Street,
    /// Graph node markers
    Network,
    Vehicle,
    /// Ground, never deletable
    Terrain,
    Building,
}

impl Layer {
    const fn bit(self) -> u32 {
        match self {
            Layer::Street => 1 << 0,
            Layer::Network => 1 << 1,
            Layer::Vehicle => 1 << 2,
            Layer::Terrain => 1 << 3,
            Layer::Building => 1 << 4,
        }
    }
}

/// Set of layers a query is allowed to hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerMask(u32);

impl LayerMask {
    pub const NONE: LayerMask = LayerMask(0);

    pub const fn of(layer: Layer) -> Self {
        LayerMask(layer.bit())
    }

    pub const fn with(self, layer: Layer) -> Self {
        LayerMask(self.0 | layer.bit())
    }

    pub fn contains(&self, layer: Layer) -> bool {
        self.0 & layer.bit() != 0
    }
}

/// Position and heading of a placed thing.
///
/// Yaw is in degrees and rotates the local forward axis (+Z) toward the
/// local right axis (+X), so a yaw of 90 faces +X.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub yaw: f32,
}

impl Pose {
    pub fn new(position: Vec3, yaw: f32) -> Self {
        Self {
            position,
            yaw: normalize_yaw(yaw),
        }
    }

    pub fn rotation(&self) -> Quat {
        Quat::from_rotation_y(self.yaw.to_radians())
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation() * Vec3::Z
    }

    pub fn right(&self) -> Vec3 {
        self.rotation() * Vec3::X
    }

    /// Map a local offset (x = right, y = up, z = forward) into world space
    pub fn transform_point(&self, local: Vec3) -> Vec3 {
        self.position + self.rotation() * local
    }

    /// Compose a child pose given in this pose's local frame
    pub fn child(&self, local_offset: Vec3, local_yaw: f32) -> Pose {
        Pose::new(self.transform_point(local_offset), self.yaw + local_yaw)
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::new(Vec3::ZERO, 0.0)
    }
}

/// Drop the height component
pub fn flatten(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}

/// Wrap an angle in degrees into `[0, 360)`
pub fn normalize_yaw(yaw: f32) -> f32 {
    let wrapped = yaw.rem_euclid(360.0);
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Yaw (degrees) of the horizontal direction from `from` to `to`
pub fn yaw_towards(from: Vec3, to: Vec3) -> f32 {
    let dir = to - from;
    normalize_yaw(dir.x.atan2(dir.z).to_degrees())
}

/// Meters per second to kilometers per hour
pub const KMH_PER_MS: f32 = 3.6;
