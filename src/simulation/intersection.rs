//! Intersection shape classification
//!
//! When two or more segments overlap, the builder probes the four
//! neighbouring cells of the overlap point and maps the hit counts to an
//! intersection kind and a yaw.

use glam::Vec3;

use super::config::NetworkConfig;
use super::spatial::SpatialQuery;
use super::types::{Layer, LayerMask};

/// Shape families an overlap can turn into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IntersectionKind {
    FourWay,
    /// Base layout has arms right, forward and back
    ThreeWay,
    /// Base layout connects back and right
    Curve,
}

/// Classified intersection: kind plus rotation of its base layout
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntersectionShape {
    pub kind: IntersectionKind,
    /// Degrees, one of 0, 90, 180 or 270
    pub yaw: f32,
}

impl IntersectionShape {
    pub fn new(kind: IntersectionKind, yaw: f32) -> Self {
        Self { kind, yaw }
    }
}

/// Street-layer hit counts around an overlap point, in world axes
/// (left is -X, forward is +Z)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArmHits {
    pub left: usize,
    pub right: usize,
    pub forward: usize,
    pub back: usize,
}

impl ArmHits {
    pub fn new(left: usize, right: usize, forward: usize, back: usize) -> Self {
        Self {
            left,
            right,
            forward,
            back,
        }
    }

    /// Count street pieces one cell away from `position` in each direction
    pub fn probe(space: &impl SpatialQuery, position: Vec3, config: &NetworkConfig) -> Self {
        let mask = LayerMask::of(Layer::Street);
        let count = |offset: Vec3| {
            space
                .overlap_sphere(
                    position + offset * config.classify_distance,
                    config.classify_radius,
                    mask,
                )
                .len()
        };

        Self {
            left: count(Vec3::NEG_X),
            right: count(Vec3::X),
            forward: count(Vec3::Z),
            back: count(Vec3::NEG_Z),
        }
    }

    /// Map the hit counts to a shape. `None` means the topology is not
    /// supported and nothing should be placed.
    pub fn classify(&self) -> Option<IntersectionShape> {
        use IntersectionKind::*;

        let shape = match (self.left, self.right, self.forward, self.back) {
            (1, 1, 1, 1) => IntersectionShape::new(FourWay, 0.0),
            (0, 1, 1, 1) => IntersectionShape::new(ThreeWay, 0.0),
            (1, 0, 1, 1) => IntersectionShape::new(ThreeWay, 180.0),
            (1, 1, 0, 1) => IntersectionShape::new(ThreeWay, 90.0),
            (1, 1, 1, 0) => IntersectionShape::new(ThreeWay, 270.0),
            (1, 0, 0, 1) => IntersectionShape::new(Curve, 90.0),
            (0, 1, 0, 1) => IntersectionShape::new(Curve, 0.0),
            (1, 0, 1, 0) => IntersectionShape::new(Curve, 180.0),
            (0, 1, 1, 0) => IntersectionShape::new(Curve, 270.0),
            _ => return None,
        };
        Some(shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_supported_row_classifies() {
        let rows = [
            ((1, 1, 1, 1), IntersectionKind::FourWay, 0.0),
            ((0, 1, 1, 1), IntersectionKind::ThreeWay, 0.0),
            ((1, 0, 1, 1), IntersectionKind::ThreeWay, 180.0),
            ((1, 1, 0, 1), IntersectionKind::ThreeWay, 90.0),
            ((1, 1, 1, 0), IntersectionKind::ThreeWay, 270.0),
            ((1, 0, 0, 1), IntersectionKind::Curve, 90.0),
            ((0, 1, 0, 1), IntersectionKind::Curve, 0.0),
            ((1, 0, 1, 0), IntersectionKind::Curve, 180.0),
            ((0, 1, 1, 0), IntersectionKind::Curve, 270.0),
        ];

        for ((l, r, f, b), kind, yaw) in rows {
            let shape = ArmHits::new(l, r, f, b).classify();
            assert_eq!(shape, Some(IntersectionShape::new(kind, yaw)));
        }
    }

    #[test]
    fn other_combinations_are_unsupported() {
        for hits in [
            ArmHits::new(0, 0, 0, 0),
            ArmHits::new(1, 1, 0, 0),
            ArmHits::new(0, 0, 1, 1),
            ArmHits::new(1, 0, 0, 0),
            ArmHits::new(2, 1, 1, 1),
            ArmHits::new(1, 1, 1, 2),
        ] {
            assert_eq!(hits.classify(), None, "{:?}", hits);
        }
    }
}
