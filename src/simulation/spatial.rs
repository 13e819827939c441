//! Spatial queries over layered colliders
//!
//! The network builder and the vehicle sensors only talk to the world
//! through [`SpatialQuery`]. [`PhysicsScene`] is the in-memory implementation
//! used by the headless simulation and the tests.

use glam::Vec3;
use ordered_float::OrderedFloat;
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{RTree, AABB};
use std::collections::BTreeMap;

use super::types::{EntityId, Layer, LayerMask, SimId};

const PARALLEL_EPSILON: f32 = 1e-6;

/// Closest hit of a ray cast
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub entity: EntityId,
    pub point: Vec3,
    pub distance: f32,
}

/// Queries the builder and the vehicle controller need from the world
pub trait SpatialQuery {
    /// All entities on `mask` whose collider touches the sphere
    fn overlap_sphere(&self, center: Vec3, radius: f32, mask: LayerMask) -> Vec<EntityId>;

    /// First collider on `mask` hit within `max_distance`.
    ///
    /// Colliders that already contain `origin` are not reported.
    fn raycast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        mask: LayerMask,
    ) -> Option<RayHit>;
}

/// Collision volume, always centered on the collider position
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Sphere { radius: f32 },
    /// Axis aligned box
    Box { half_extents: Vec3 },
    /// Upright cylinder around the Y axis
    Cylinder { radius: f32, half_height: f32 },
}

impl Shape {
    /// Distance from a point (relative to the shape center) to the shape surface,
    /// zero when the point is inside
    pub fn distance_to(&self, local: Vec3) -> f32 {
        match *self {
            Shape::Sphere { radius } => (local.length() - radius).max(0.0),
            Shape::Box { half_extents } => (local.abs() - half_extents).max(Vec3::ZERO).length(),
            Shape::Cylinder {
                radius,
                half_height,
            } => {
                let horizontal = (local.x.hypot(local.z) - radius).max(0.0);
                let vertical = (local.y.abs() - half_height).max(0.0);
                horizontal.hypot(vertical)
            }
        }
    }

    /// Half size of the axis aligned box enclosing the shape
    pub fn half_extents(&self) -> Vec3 {
        match *self {
            Shape::Sphere { radius } => Vec3::splat(radius),
            Shape::Box { half_extents } => half_extents,
            Shape::Cylinder {
                radius,
                half_height,
            } => Vec3::new(radius, half_height, radius),
        }
    }

    /// Parameter interval along `origin + t * dir` (origin relative to the
    /// center, `dir` normalized) where the ray is inside the shape
    fn ray_interval(&self, origin: Vec3, dir: Vec3) -> Option<(f32, f32)> {
        match *self {
            Shape::Sphere { radius } => {
                let b = origin.dot(dir);
                let c = origin.length_squared() - radius * radius;
                let disc = b * b - c;
                if disc < 0.0 {
                    return None;
                }
                let root = disc.sqrt();
                Some((-b - root, -b + root))
            }
            Shape::Box { half_extents } => {
                let (x0, x1) = slab(origin.x, dir.x, half_extents.x)?;
                let (y0, y1) = slab(origin.y, dir.y, half_extents.y)?;
                let (z0, z1) = slab(origin.z, dir.z, half_extents.z)?;
                let enter = x0.max(y0).max(z0);
                let exit = x1.min(y1).min(z1);
                (enter <= exit).then_some((enter, exit))
            }
            Shape::Cylinder {
                radius,
                half_height,
            } => {
                let a = dir.x * dir.x + dir.z * dir.z;
                let c = origin.x * origin.x + origin.z * origin.z - radius * radius;
                let (h0, h1) = if a < PARALLEL_EPSILON {
                    if c > 0.0 {
                        return None;
                    }
                    (f32::NEG_INFINITY, f32::INFINITY)
                } else {
                    let b = origin.x * dir.x + origin.z * dir.z;
                    let disc = b * b - a * c;
                    if disc < 0.0 {
                        return None;
                    }
                    let root = disc.sqrt();
                    ((-b - root) / a, (-b + root) / a)
                };
                let (y0, y1) = slab(origin.y, dir.y, half_height)?;
                let enter = h0.max(y0);
                let exit = h1.min(y1);
                (enter <= exit).then_some((enter, exit))
            }
        }
    }
}

fn slab(origin: f32, dir: f32, half: f32) -> Option<(f32, f32)> {
    if dir.abs() < PARALLEL_EPSILON {
        return (origin.abs() <= half).then_some((f32::NEG_INFINITY, f32::INFINITY));
    }
    let a = (-half - origin) / dir;
    let b = (half - origin) / dir;
    Some((a.min(b), a.max(b)))
}

/// A collider registered in the scene
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Collider {
    pub entity: EntityId,
    pub layer: Layer,
    pub position: Vec3,
    pub shape: Shape,
}

impl Collider {
    pub fn contains(&self, point: Vec3) -> bool {
        self.shape.distance_to(point - self.position) <= 0.0
    }
}

/// Bounding box of a collider in the spatial index
type IndexEntry = GeomWithData<Rectangle<[f32; 3]>, EntityId>;

fn index_entry(entity: EntityId, position: Vec3, shape: &Shape) -> IndexEntry {
    let half = shape.half_extents();
    GeomWithData::new(
        Rectangle::from_corners((position - half).to_array(), (position + half).to_array()),
        entity,
    )
}

fn envelope(min: Vec3, max: Vec3) -> AABB<[f32; 3]> {
    AABB::from_corners(min.to_array(), max.to_array())
}

/// In-memory collider store with a fixed-step tick counter. Queries are
/// pruned through an R-tree of collider bounds.
#[derive(Default)]
pub struct PhysicsScene {
    colliders: BTreeMap<EntityId, Collider>,
    index: RTree<IndexEntry>,
    next_id: usize,
    tick: u64,
}

impl PhysicsScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self, layer: Layer, position: Vec3, shape: Shape) -> EntityId {
        let entity = EntityId(SimId(self.next_id));
        self.next_id += 1;
        self.colliders.insert(
            entity,
            Collider {
                entity,
                layer,
                position,
                shape,
            },
        );
        self.index.insert(index_entry(entity, position, &shape));
        entity
    }

    /// Returns false if the entity was already gone
    pub fn despawn(&mut self, entity: EntityId) -> bool {
        let Some(collider) = self.colliders.remove(&entity) else {
            return false;
        };
        self.index
            .remove(&index_entry(entity, collider.position, &collider.shape));
        true
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.colliders.contains_key(&entity)
    }

    pub fn collider(&self, entity: EntityId) -> Option<&Collider> {
        self.colliders.get(&entity)
    }

    pub fn set_position(&mut self, entity: EntityId, position: Vec3) -> bool {
        let Some(collider) = self.colliders.get_mut(&entity) else {
            return false;
        };
        self.index
            .remove(&index_entry(entity, collider.position, &collider.shape));
        collider.position = position;
        self.index
            .insert(index_entry(entity, position, &collider.shape));
        true
    }

    /// Entities on a layer, in creation order
    pub fn entities_on(&self, layer: Layer) -> Vec<EntityId> {
        self.colliders
            .values()
            .filter(|collider| collider.layer == layer)
            .map(|collider| collider.entity)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.colliders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colliders.is_empty()
    }

    /// Number of fixed steps taken so far
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Advance the fixed-step counter
    pub fn step(&mut self) {
        self.tick += 1;
    }

    /// Colliders on `mask` whose bounds intersect the box, in creation order
    fn candidates(&self, min: Vec3, max: Vec3, mask: LayerMask) -> Vec<&Collider> {
        let mut found: Vec<&Collider> = self
            .index
            .locate_in_envelope_intersecting(&envelope(min, max))
            .filter_map(|entry| self.colliders.get(&entry.data))
            .filter(|collider| mask.contains(collider.layer))
            .collect();
        found.sort_by_key(|collider| collider.entity);
        found
    }
}

impl SpatialQuery for PhysicsScene {
    fn overlap_sphere(&self, center: Vec3, radius: f32, mask: LayerMask) -> Vec<EntityId> {
        let reach = Vec3::splat(radius.max(0.0));
        self.candidates(center - reach, center + reach, mask)
            .into_iter()
            .filter(|collider| collider.shape.distance_to(center - collider.position) < radius)
            .map(|collider| collider.entity)
            .collect()
    }

    fn raycast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        mask: LayerMask,
    ) -> Option<RayHit> {
        let dir = direction.try_normalize()?;
        if max_distance <= 0.0 {
            return None;
        }

        let end = origin + dir * max_distance;
        self.candidates(origin.min(end), origin.max(end), mask)
            .into_iter()
            .filter(|collider| !collider.contains(origin))
            .filter_map(|collider| {
                let (enter, exit) = collider
                    .shape
                    .ray_interval(origin - collider.position, dir)?;
                if exit < 0.0 || enter < 0.0 || enter > max_distance {
                    return None;
                }
                Some(RayHit {
                    entity: collider.entity,
                    point: origin + dir * enter,
                    distance: enter,
                })
            })
            .min_by_key(|hit| OrderedFloat(hit.distance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn shape_distances() {
        let sphere = Shape::Sphere { radius: 1.0 };
        assert_relative_eq!(sphere.distance_to(Vec3::new(3.0, 0.0, 0.0)), 2.0);
        assert_eq!(sphere.distance_to(Vec3::new(0.5, 0.0, 0.0)), 0.0);

        let cube = Shape::Box {
            half_extents: Vec3::new(7.0, 0.5, 7.0),
        };
        assert_relative_eq!(cube.distance_to(Vec3::new(10.0, 0.0, 0.0)), 3.0);
        assert_relative_eq!(cube.distance_to(Vec3::new(10.0, 0.0, 11.0)), 5.0);

        let marker = Shape::Cylinder {
            radius: 0.2,
            half_height: 4.0,
        };
        assert_eq!(marker.distance_to(Vec3::new(0.0, 3.0, 0.1)), 0.0);
        assert_relative_eq!(marker.distance_to(Vec3::new(1.2, 0.0, 0.0)), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn overlap_is_strict_and_respects_layers() {
        let mut scene = PhysicsScene::new();
        let marker = scene.spawn(Layer::Network, Vec3::ZERO, Shape::Sphere { radius: 1.0 });
        scene.spawn(Layer::Vehicle, Vec3::ZERO, Shape::Sphere { radius: 1.0 });

        let network = LayerMask::of(Layer::Network);
        assert_eq!(scene.overlap_sphere(Vec3::new(2.0, 0.0, 0.0), 1.5, network), vec![marker]);
        // Touching surfaces do not overlap
        assert!(scene.overlap_sphere(Vec3::new(2.0, 0.0, 0.0), 1.0, network).is_empty());
        assert!(scene
            .overlap_sphere(Vec3::ZERO, 5.0, LayerMask::of(Layer::Street))
            .is_empty());
    }

    #[test]
    fn raycast_returns_nearest_hit() {
        let mut scene = PhysicsScene::new();
        let mask = LayerMask::of(Layer::Vehicle);
        let near = scene.spawn(Layer::Vehicle, Vec3::new(0.0, 0.0, 5.0), Shape::Sphere { radius: 1.0 });
        scene.spawn(Layer::Vehicle, Vec3::new(0.0, 0.0, 9.0), Shape::Sphere { radius: 1.0 });

        let hit = scene.raycast(Vec3::ZERO, Vec3::Z, 12.0, mask).unwrap();
        assert_eq!(hit.entity, near);
        assert_relative_eq!(hit.distance, 4.0, epsilon = 1e-4);

        assert!(scene.raycast(Vec3::ZERO, Vec3::Z, 3.0, mask).is_none());
        assert!(scene.raycast(Vec3::ZERO, Vec3::NEG_Z, 12.0, mask).is_none());
    }

    #[test]
    fn raycast_skips_colliders_containing_the_origin() {
        let mut scene = PhysicsScene::new();
        let mask = LayerMask::of(Layer::Vehicle);
        scene.spawn(Layer::Vehicle, Vec3::ZERO, Shape::Sphere { radius: 1.2 });
        let ahead = scene.spawn(
            Layer::Vehicle,
            Vec3::new(0.0, 0.0, 6.0),
            Shape::Box {
                half_extents: Vec3::splat(1.0),
            },
        );

        let hit = scene.raycast(Vec3::ZERO, Vec3::Z, 12.0, mask).unwrap();
        assert_eq!(hit.entity, ahead);
        assert_relative_eq!(hit.distance, 5.0, epsilon = 1e-4);
    }

    #[test]
    fn despawn_and_move() {
        let mut scene = PhysicsScene::new();
        let entity = scene.spawn(Layer::Vehicle, Vec3::ZERO, Shape::Sphere { radius: 1.0 });
        assert!(scene.set_position(entity, Vec3::new(10.0, 0.0, 0.0)));
        assert!(scene
            .overlap_sphere(Vec3::ZERO, 1.0, LayerMask::of(Layer::Vehicle))
            .is_empty());

        assert!(scene.despawn(entity));
        assert!(!scene.despawn(entity));
        assert!(!scene.set_position(entity, Vec3::ZERO));
        assert!(scene.is_empty());

        scene.step();
        assert_eq!(scene.tick(), 1);
    }

    #[test]
    fn index_follows_moves_and_removals() {
        let mut scene = PhysicsScene::new();
        let mask = LayerMask::of(Layer::Vehicle);
        let row: Vec<_> = (0..50)
            .map(|i| {
                scene.spawn(
                    Layer::Vehicle,
                    Vec3::new(i as f32 * 4.0, 0.0, 0.0),
                    Shape::Sphere { radius: 1.0 },
                )
            })
            .collect();

        let around = |scene: &PhysicsScene, x: f32| {
            scene.overlap_sphere(Vec3::new(x, 0.0, 0.0), 3.5, mask)
        };
        assert_eq!(around(&scene, 40.0), vec![row[9], row[10], row[11]]);

        assert!(scene.set_position(row[10], Vec3::new(0.0, 0.0, 30.0)));
        assert_eq!(around(&scene, 40.0), vec![row[9], row[11]]);
        assert_eq!(
            scene.overlap_sphere(Vec3::new(0.0, 0.0, 30.0), 1.5, mask),
            vec![row[10]]
        );

        let hit = scene.raycast(Vec3::new(0.0, 0.0, 20.0), Vec3::Z, 20.0, mask).unwrap();
        assert_eq!(hit.entity, row[10]);

        assert!(scene.despawn(row[11]));
        assert_eq!(around(&scene, 40.0), vec![row[9]]);
        let hit = scene.raycast(Vec3::new(37.0, 0.0, 0.0), Vec3::X, 20.0, mask).unwrap();
        assert_eq!(hit.entity, row[12]);
        assert_relative_eq!(hit.distance, 10.0, epsilon = 1e-4);
        assert_eq!(scene.len(), 49);
    }
}
