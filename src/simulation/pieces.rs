//! Templates for the pieces the builder can place
//!
//! Every piece covers one grid cell. Node templates are expressed in the
//! piece's local frame and transformed by the piece pose on placement.

use glam::Vec3;

use super::config::NetworkConfig;
use super::intersection::{IntersectionKind, IntersectionShape};
use super::spatial::Shape;
use super::types::{yaw_towards, Layer, NodeCategory, Pose};

/// Building types placed through the trace/confirm path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BuildingKind {
    GarbageOffice,
    HouseBlock,
}

impl BuildingKind {
    pub fn name(&self) -> &'static str {
        match self {
            BuildingKind::GarbageOffice => "Garbage Office",
            BuildingKind::HouseBlock => "House Block",
        }
    }

    fn height(&self) -> f32 {
        match self {
            BuildingKind::GarbageOffice => 4.0,
            BuildingKind::HouseBlock => 9.0,
        }
    }
}

/// What a placed entity is
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PieceKind {
    Segment,
    Intersection(IntersectionShape),
    Building(BuildingKind),
}

impl PieceKind {
    pub fn layer(&self) -> Layer {
        match self {
            PieceKind::Building(_) => Layer::Building,
            _ => Layer::Street,
        }
    }

    pub fn is_road(&self) -> bool {
        !matches!(self, PieceKind::Building(_))
    }

    /// Collider covering the piece's cell
    pub fn footprint(&self, config: &NetworkConfig) -> Shape {
        let half = config.cell_size / 2.0;
        match self {
            PieceKind::Building(kind) => Shape::Box {
                half_extents: Vec3::new(half - 1.0, kind.height() / 2.0, half - 1.0),
            },
            _ => Shape::Box {
                half_extents: Vec3::new(half, 0.5, half),
            },
        }
    }

    pub fn node_templates(&self, config: &NetworkConfig) -> Vec<NodeTemplate> {
        match self {
            PieceKind::Segment => segment_templates(config),
            PieceKind::Intersection(shape) => match shape.kind {
                IntersectionKind::FourWay => {
                    cross_templates(&[Arm::Left, Arm::Right, Arm::Forward, Arm::Back], config)
                }
                IntersectionKind::ThreeWay => {
                    cross_templates(&[Arm::Right, Arm::Forward, Arm::Back], config)
                }
                IntersectionKind::Curve => curve_templates(config),
            },
            PieceKind::Building(_) => Vec::new(),
        }
    }
}

/// A node relative to its piece
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeTemplate {
    /// Local offset (x = right, y = up, z = forward)
    pub offset: Vec3,
    /// Local yaw in degrees
    pub yaw: f32,
    pub category: NodeCategory,
}

impl NodeTemplate {
    pub fn new(offset: Vec3, yaw: f32, category: NodeCategory) -> Self {
        Self {
            offset,
            yaw,
            category,
        }
    }

    /// World pose of this node for a piece placed at `piece`
    pub fn place(&self, piece: &Pose) -> Pose {
        piece.child(self.offset, self.yaw)
    }
}

/// Local arm directions of an intersection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arm {
    Left,
    Right,
    Forward,
    Back,
}

impl Arm {
    pub fn outward(&self) -> Vec3 {
        match self {
            Arm::Left => Vec3::NEG_X,
            Arm::Right => Vec3::X,
            Arm::Forward => Vec3::Z,
            Arm::Back => Vec3::NEG_Z,
        }
    }
}

fn lanes(config: &NetworkConfig) -> [f32; 2] {
    [config.inner_lane_offset, config.outer_lane_offset]
}

/// Four lane endpoints on the segment's center line. Right-hand nodes face
/// the segment heading, left-hand nodes face the other way.
fn segment_templates(config: &NetworkConfig) -> Vec<NodeTemplate> {
    lanes(config)
        .into_iter()
        .flat_map(|lane| {
            [
                NodeTemplate::new(Vec3::new(lane, 0.0, 0.0), 0.0, NodeCategory::Street),
                NodeTemplate::new(Vec3::new(-lane, 0.0, 0.0), 180.0, NodeCategory::Street),
            ]
        })
        .collect()
}

/// Each arm gets two entry nodes driving into the intersection and two exit
/// nodes leaving it, all `arm_offset` away from the center
fn cross_templates(arms: &[Arm], config: &NetworkConfig) -> Vec<NodeTemplate> {
    let mut templates = Vec::with_capacity(arms.len() * 4);

    for arm in arms {
        let outward = arm.outward();
        let entry = Pose::new(Vec3::ZERO, yaw_towards(Vec3::ZERO, -outward));
        let exit = Pose::new(Vec3::ZERO, yaw_towards(Vec3::ZERO, outward));

        for lane in lanes(config) {
            templates.push(NodeTemplate::new(
                entry.right() * lane + outward * config.arm_offset,
                entry.yaw,
                NodeCategory::Cross,
            ));
            templates.push(NodeTemplate::new(
                exit.right() * lane + outward * config.arm_offset,
                exit.yaw,
                NodeCategory::Street,
            ));
        }
    }

    templates
}

/// Base curve joins the back arm to the right arm: one node drives out to
/// the right, two nodes bring traffic from the right back out of the back arm
fn curve_templates(config: &NetworkConfig) -> Vec<NodeTemplate> {
    let lane = config.inner_lane_offset;
    let to_right = Vec3::new(3.0, 0.0, -lane);
    let from_right = Vec3::new(1.0, 0.0, lane);
    let to_back = Vec3::new(-lane, 0.0, -config.arm_offset);

    vec![
        NodeTemplate::new(to_right, 90.0, NodeCategory::Curve),
        NodeTemplate::new(from_right, yaw_towards(from_right, to_back), NodeCategory::Curve),
        NodeTemplate::new(to_back, 180.0, NodeCategory::Curve),
    ]
}
