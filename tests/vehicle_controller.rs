//! Vehicle controller validation tests
//!
//! Drives a single controller against a hand-built graph so every decision
//! branch can be checked without a full world.

use approx::assert_relative_eq;
use glam::Vec3;
use std::collections::VecDeque;
use street_sim::simulation::{
    hard_stop_brake, slowing_brake, stopping_brake, DespawnAtEnd, DriveState, EntityId, Kinematics, Layer,
    LayerMask, LoopRoute, MotionCommand, NetworkGraph, NextAction, NodeCategory, NodeId,
    Obstacle, PhysicsScene, Pose, RayHit, RespawnAtStart, RouteStrategy, Shape, SimId,
    SpatialQuery, StopAtEnd, VehicleConfig, VehicleController, KMH_PER_MS,
};

/// A world with nothing to hit
struct EmptyRoad;

impl SpatialQuery for EmptyRoad {
    fn overlap_sphere(&self, _center: Vec3, _radius: f32, _mask: LayerMask) -> Vec<EntityId> {
        Vec::new()
    }

    fn raycast(
        &self,
        _origin: Vec3,
        _direction: Vec3,
        _max_distance: f32,
        _mask: LayerMask,
    ) -> Option<RayHit> {
        None
    }
}

fn graph_with(points: &[Vec3]) -> (NetworkGraph, Vec<NodeId>) {
    let mut graph = NetworkGraph::new();
    let owner = EntityId(SimId(0));
    let ids = points
        .iter()
        .map(|point| {
            let id = graph.add_node(NodeCategory::Street, owner, owner);
            graph.initialize_node(id, Pose::new(*point, 0.0)).unwrap();
            id
        })
        .collect();
    (graph, ids)
}

fn controller(route: &[NodeId], strategy: Box<dyn RouteStrategy>) -> VehicleController {
    VehicleController::new(VehicleConfig::default(), 1.0, route.iter().copied(), strategy)
}

fn at_origin(speed: f32) -> Kinematics {
    Kinematics::new(Vec3::ZERO, 0.0, speed)
}

#[test]
fn test_small_angles_are_ignored() {
    let (_, ids) = graph_with(&[]);
    let controller = controller(&ids, Box::new(StopAtEnd));
    let kinematics = at_origin(0.0);

    assert_eq!(controller.angle_to_turn(&kinematics, Vec3::new(0.1, 0.0, 10.0)), 0.0);

    // Target to the right turns right
    let turning = controller.angle_to_turn(&kinematics, Vec3::new(10.0, 0.0, 10.0));
    assert_relative_eq!(turning, std::f32::consts::FRAC_1_SQRT_2, epsilon = 1e-5);

    let turning = controller.angle_to_turn(&kinematics, Vec3::new(-10.0, 0.0, 10.0));
    assert!(turning < 0.0);

    // Height difference is part of the heading
    let turning = controller.angle_to_turn(&kinematics, Vec3::new(10.0, 10.0, 10.0));
    assert_relative_eq!(turning, 1.0 / 3.0f32.sqrt(), epsilon = 1e-5);
}

#[test]
fn test_stopping_brake_is_monotonic() {
    let distances = [-2.0, 0.0, 0.5, 1.0, 4.0, 10.0];
    let speeds = [0.0, 5.0, 20.0, 50.0];

    for speed in speeds {
        for pair in distances.windows(2) {
            assert!(stopping_brake(pair[1], speed) >= stopping_brake(pair[0], speed));
        }
    }
    for distance in distances {
        for pair in speeds.windows(2) {
            assert!(stopping_brake(distance, pair[1]) >= stopping_brake(distance, pair[0]));
        }
    }
    assert_eq!(stopping_brake(-5.0, 30.0), 3.0);
}

#[test]
fn test_slowing_brake_formula() {
    assert_relative_eq!(slowing_brake(2.0, 0.0), 200_003.0);
    assert_relative_eq!(slowing_brake(1.0, 1.0), 1e5 * 1024.0 + 3.0, max_relative = 1e-6);
    assert_eq!(slowing_brake(-1.0, 30.0), 3.0);
    assert_eq!(slowing_brake(0.0, 30.0), 3.0);

    // Much softer than stopping at low speed
    assert!(slowing_brake(2.0, 0.0) < stopping_brake(2.0, 0.0));
    assert!(slowing_brake(4.0, 10.0) > slowing_brake(2.0, 10.0));
    assert!(slowing_brake(2.0, 40.0) > slowing_brake(2.0, 10.0));
}

#[test]
fn test_free_road_cruises_with_launch_boost() {
    let (graph, ids) = graph_with(&[Vec3::new(0.0, 0.0, 50.0)]);
    let mut controller = controller(&ids, Box::new(StopAtEnd));

    let decision = controller.tick(&at_origin(0.0), &graph, &EmptyRoad);
    assert_eq!(decision.state, DriveState::Cruising);
    assert!(!decision.waypoint_reached);
    match decision.command {
        MotionCommand::Drive { throttle, steering } => {
            assert_relative_eq!(throttle, 2.2, epsilon = 1e-5);
            assert_eq!(steering, 0.0);
        }
        other => panic!("Expected drive, got {:?}", other),
    }

    // Above the launch assist speed the boost is gone
    let decision = controller.tick(&at_origin(10.0), &graph, &EmptyRoad);
    assert_eq!(
        decision.command,
        MotionCommand::Drive {
            throttle: 2.0,
            steering: 0.0
        }
    );
}

#[test]
fn test_speed_over_limit_is_clamped() {
    let (graph, ids) = graph_with(&[Vec3::new(0.0, 0.0, 200.0)]);
    let mut controller = controller(&ids, Box::new(StopAtEnd));

    let decision = controller.tick(&at_origin(10.0), &graph, &EmptyRoad);
    assert_eq!(decision.velocity_scale, 1.0);

    // 15 m/s is 54 km/h
    let decision = controller.tick(&at_origin(15.0), &graph, &EmptyRoad);
    assert_eq!(decision.velocity_scale, 0.99);
}

#[test]
fn test_red_light_shortens_sensor_and_stops() {
    let (graph, ids) = graph_with(&[Vec3::new(0.0, 0.0, 50.0)]);
    let mut controller = controller(&ids, Box::new(StopAtEnd));

    let decision = controller.tick(&at_origin(0.0), &graph, &EmptyRoad);
    assert_relative_eq!(decision.sensor_length, 12.0);

    controller.stop_at_traffic_light(Vec3::new(0.0, 0.0, 3.0), true);
    let decision = controller.tick(&at_origin(0.0), &graph, &EmptyRoad);
    assert_relative_eq!(decision.sensor_length, 1.2, epsilon = 1e-5);
    assert_eq!(decision.state, DriveState::Blocked);
    assert_eq!(
        decision.command,
        MotionCommand::Brake {
            magnitude: stopping_brake(2.0, 0.0)
        }
    );

    // Far from the line the sensor keeps its length
    controller.stop_at_traffic_light(Vec3::new(0.0, 0.0, 30.0), true);
    let decision = controller.tick(&at_origin(0.0), &graph, &EmptyRoad);
    assert_relative_eq!(decision.sensor_length, 12.0);
    assert_eq!(decision.state, DriveState::Blocked);

    controller.stop_at_traffic_light(Vec3::new(0.0, 0.0, 30.0), false);
    let decision = controller.tick(&at_origin(0.0), &graph, &EmptyRoad);
    assert_eq!(decision.state, DriveState::Cruising);
}

#[test]
fn test_vehicle_ahead_blocks() {
    let (graph, ids) = graph_with(&[Vec3::new(0.0, 0.0, 50.0)]);
    let mut controller = controller(&ids, Box::new(StopAtEnd));

    let mut scene = PhysicsScene::new();
    scene.spawn(Layer::Vehicle, Vec3::ZERO, Shape::Sphere { radius: 1.2 });
    scene.spawn(
        Layer::Vehicle,
        Vec3::new(0.0, 0.0, 8.0),
        Shape::Sphere { radius: 1.2 },
    );

    // Slow and far enough: creep toward it
    let decision = controller.tick(&at_origin(0.0), &graph, &scene);
    assert_eq!(decision.state, DriveState::Blocked);
    assert_eq!(decision.obstacle, Some(Obstacle::Ahead));
    assert_eq!(
        decision.command,
        MotionCommand::Drive {
            throttle: 1.0,
            steering: 0.0
        }
    );

    // Fast: brake
    let decision = controller.tick(&at_origin(15.0), &graph, &scene);
    assert_eq!(decision.state, DriveState::Blocked);
    assert!(matches!(decision.command, MotionCommand::Brake { .. }));
}

#[test]
fn test_vehicle_ahead_right_nudges_left() {
    let (graph, ids) = graph_with(&[Vec3::new(0.0, 0.0, 50.0)]);
    let mut controller = controller(&ids, Box::new(StopAtEnd));

    let mut scene = PhysicsScene::new();
    scene.spawn(
        Layer::Vehicle,
        Vec3::new(0.9, 0.0, 2.8),
        Shape::Sphere { radius: 0.5 },
    );

    let decision = controller.tick(&at_origin(0.0), &graph, &scene);
    assert_eq!(decision.obstacle, Some(Obstacle::AheadRight));
    assert_eq!(decision.state, DriveState::Yielding);
    assert_relative_eq!(decision.turning, -0.2, epsilon = 1e-5);
}

#[test]
fn test_vehicle_ahead_left_nudges_right() {
    let (graph, ids) = graph_with(&[Vec3::new(0.0, 0.0, 50.0)]);
    let mut controller = controller(&ids, Box::new(StopAtEnd));

    let mut scene = PhysicsScene::new();
    scene.spawn(
        Layer::Vehicle,
        Vec3::new(-0.9, 0.0, 2.8),
        Shape::Sphere { radius: 0.5 },
    );

    let decision = controller.tick(&at_origin(0.0), &graph, &scene);
    assert_eq!(decision.obstacle, Some(Obstacle::AheadLeft));
    assert_eq!(decision.state, DriveState::Yielding);
    assert_relative_eq!(decision.turning, 0.2, epsilon = 1e-5);
    assert_eq!(
        decision.command,
        MotionCommand::Drive {
            throttle: 1.0,
            steering: decision.turning
        }
    );
}

#[test]
fn test_nearby_vehicle_brakes_with_margin() {
    let (graph, ids) = graph_with(&[Vec3::new(0.0, 0.0, 50.0)]);
    let mut controller = controller(&ids, Box::new(StopAtEnd));

    let mut scene = PhysicsScene::new();
    scene.spawn(
        Layer::Vehicle,
        Vec3::new(-0.9, 0.0, 2.8),
        Shape::Sphere { radius: 0.5 },
    );

    // Same ray the ahead-left sensor casts from the front of the vehicle
    let hit = scene
        .raycast(
            Vec3::Z,
            Vec3::new(-1.0, 0.0, 2.0),
            3.0,
            LayerMask::of(Layer::Vehicle),
        )
        .unwrap();
    let speed_kmh = 10.0 * KMH_PER_MS;
    let expected = slowing_brake(hit.point.length() + 5.0, speed_kmh);

    let decision = controller.tick(&at_origin(10.0), &graph, &scene);
    assert_eq!(decision.obstacle, Some(Obstacle::AheadLeft));
    assert_eq!(decision.state, DriveState::Yielding);
    match decision.command {
        MotionCommand::Brake { magnitude } => {
            assert_relative_eq!(magnitude, expected, max_relative = 1e-4)
        }
        other => panic!("Expected brake, got {:?}", other),
    }
}

#[test]
fn test_vehicles_beside_push_away_within_limits() {
    let right = Vec3::new(1.0, 0.0, 1.0);
    let left = Vec3::new(-1.0, 0.0, 1.0);
    let cases = [
        // (other vehicle, waypoint, sensor, turning)
        (right, Vec3::new(0.0, 0.0, 50.0), Obstacle::BesideRight, -0.3),
        (right, Vec3::new(-10.0, 0.0, 1.0), Obstacle::BesideRight, -1.0),
        (left, Vec3::new(0.0, 0.0, 50.0), Obstacle::BesideLeft, 0.3),
        (left, Vec3::new(10.0, 0.0, 1.0), Obstacle::BesideLeft, 1.0),
    ];

    for (other, waypoint, sensor, turning) in cases {
        let (graph, ids) = graph_with(&[waypoint]);
        let mut controller = controller(&ids, Box::new(StopAtEnd));
        let mut scene = PhysicsScene::new();
        scene.spawn(Layer::Vehicle, other, Shape::Sphere { radius: 0.5 });

        let decision = controller.tick(&at_origin(0.0), &graph, &scene);
        assert_eq!(decision.obstacle, Some(sensor));
        assert_eq!(decision.state, DriveState::Yielding);
        assert_relative_eq!(decision.turning, turning, epsilon = 1e-5);
        assert_relative_eq!(controller.turning_bias(), turning, epsilon = 1e-5);
    }
}

#[test]
fn test_creep_halves_power_only_for_right_turns() {
    let mut scene = PhysicsScene::new();
    scene.spawn(
        Layer::Vehicle,
        Vec3::new(0.0, 0.0, 8.0),
        Shape::Sphere { radius: 1.2 },
    );

    let cases = [
        (Vec3::new(-10.0, 0.0, 10.0), 1.0),
        (Vec3::new(10.0, 0.0, 10.0), 0.5),
    ];
    for (waypoint, expected) in cases {
        let (graph, ids) = graph_with(&[waypoint]);
        let mut controller = controller(&ids, Box::new(StopAtEnd));

        let decision = controller.tick(&at_origin(0.0), &graph, &scene);
        assert_eq!(decision.obstacle, Some(Obstacle::Ahead));
        assert_eq!(decision.state, DriveState::Blocked);
        match decision.command {
            MotionCommand::Drive { throttle, steering } => {
                assert_eq!(throttle, expected);
                assert_relative_eq!(steering, decision.turning);
                assert_relative_eq!(
                    steering.abs(),
                    std::f32::consts::FRAC_1_SQRT_2,
                    epsilon = 1e-5
                );
            }
            other => panic!("Expected drive, got {:?}", other),
        }
    }
}

#[test]
fn test_slowing_for_a_turn_creeps_at_full_power() {
    // Next waypoint ahead and to the right, the one after it hard right
    let (graph, ids) = graph_with(&[Vec3::new(10.0, 0.0, 5.0), Vec3::new(40.0, 0.0, 0.0)]);
    let mut controller = controller(&ids, Box::new(StopAtEnd));
    let kinematics = at_origin(1.0);

    assert!(controller.is_about_to_turn(&kinematics, &graph));

    let decision = controller.tick(&kinematics, &graph, &EmptyRoad);
    assert_eq!(decision.state, DriveState::Yielding);
    assert_relative_eq!(decision.turning, 2.0 / 5.0f32.sqrt(), epsilon = 1e-5);
    assert_eq!(
        decision.command,
        MotionCommand::Drive {
            throttle: 1.0,
            steering: decision.turning
        }
    );
}

#[test]
fn test_red_light_wins_over_upcoming_turn() {
    let (graph, ids) = graph_with(&[Vec3::new(0.0, 0.0, 30.0), Vec3::new(40.0, 0.0, 0.0)]);
    let mut controller = controller(&ids, Box::new(StopAtEnd));
    assert!(controller.is_about_to_turn(&at_origin(0.0), &graph));

    let decision = controller.tick(&at_origin(0.0), &graph, &EmptyRoad);
    assert_eq!(decision.state, DriveState::Yielding);

    controller.stop_at_traffic_light(Vec3::new(0.0, 0.0, 3.0), true);
    let decision = controller.tick(&at_origin(0.0), &graph, &EmptyRoad);
    assert_eq!(decision.state, DriveState::Blocked);
    assert_eq!(
        decision.command,
        MotionCommand::Brake {
            magnitude: stopping_brake(2.0, 0.0)
        }
    );
}

#[test]
fn test_green_light_keeps_stop_line() {
    let (_, ids) = graph_with(&[]);
    let mut controller = controller(&ids, Box::new(StopAtEnd));
    let line = Vec3::new(1.8, 0.0, 30.0);

    controller.stop_at_traffic_light(line, true);
    assert!(controller.is_stopping_for_light());
    assert_eq!(controller.stop_position(), line);

    controller.stop_at_traffic_light(Vec3::ZERO, false);
    assert!(!controller.is_stopping_for_light());
    assert_eq!(controller.stop_position(), line);
}

#[test]
fn test_waypoint_reached_once() {
    let (graph, ids) = graph_with(&[Vec3::new(0.0, 0.0, 1.5)]);
    let mut controller = controller(&ids, Box::new(StopAtEnd));

    let decision = controller.tick(&at_origin(0.0), &graph, &EmptyRoad);
    assert!(decision.waypoint_reached);
    assert!(controller.is_recalculation_pending());

    // Not requested again until the recalculation ran
    let decision = controller.tick(&at_origin(0.0), &graph, &EmptyRoad);
    assert!(!decision.waypoint_reached);

    assert_eq!(controller.recalculate(), NextAction::Idle);
    assert!(!controller.is_recalculation_pending());
    assert_eq!(controller.next_waypoint(), None);

    let decision = controller.tick(&at_origin(0.0), &graph, &EmptyRoad);
    assert_eq!(decision.state, DriveState::Idle);
    assert_eq!(decision.command, MotionCommand::None);
}

#[test]
fn test_missing_waypoint_counts_as_reached() {
    let (graph, _) = graph_with(&[]);
    let missing = NodeId(SimId(42));
    let mut controller = controller(&[missing], Box::new(DespawnAtEnd));

    let decision = controller.tick(&at_origin(0.0), &graph, &EmptyRoad);
    assert!(decision.waypoint_reached);
    assert_eq!(decision.state, DriveState::Yielding);
    assert_eq!(controller.recalculate(), NextAction::Despawn);
}

#[test]
fn test_hard_stop_overrides_everything() {
    let (graph, ids) = graph_with(&[Vec3::new(0.0, 0.0, 50.0)]);
    let mut controller = controller(&ids, Box::new(StopAtEnd));
    controller.set_stopped(true);

    let decision = controller.tick(&at_origin(0.0), &graph, &EmptyRoad);
    assert_eq!(decision.state, DriveState::HardStopped);
    assert_eq!(
        decision.command,
        MotionCommand::Brake {
            magnitude: hard_stop_brake(0.0)
        }
    );

    controller.set_stopped(false);
    let decision = controller.tick(&at_origin(0.0), &graph, &EmptyRoad);
    assert_eq!(decision.state, DriveState::Cruising);
}

#[test]
fn test_sharp_turn_ahead_slows_down() {
    // Next waypoint straight ahead, the one after it far to the right
    let (graph, ids) = graph_with(&[Vec3::new(0.0, 0.0, 30.0), Vec3::new(40.0, 0.0, 0.0)]);
    let mut controller = controller(&ids, Box::new(StopAtEnd));

    assert!(controller.is_about_to_turn(&at_origin(0.0), &graph));

    let decision = controller.tick(&at_origin(10.0), &graph, &EmptyRoad);
    assert_eq!(decision.state, DriveState::Yielding);
    assert!(matches!(decision.command, MotionCommand::Brake { .. }));

    // Slow enough to creep through
    let decision = controller.tick(&at_origin(2.0), &graph, &EmptyRoad);
    assert_eq!(decision.state, DriveState::Yielding);
    assert!(matches!(decision.command, MotionCommand::Drive { .. }));
}

#[test]
fn test_route_strategies() {
    let a = NodeId(SimId(1));
    let b = NodeId(SimId(2));

    let mut remaining = VecDeque::new();
    assert_eq!(
        DespawnAtEnd.on_waypoint_reached(&mut remaining),
        NextAction::Despawn
    );
    assert_eq!(StopAtEnd.on_waypoint_reached(&mut remaining), NextAction::Idle);

    let mut looping = LoopRoute::new(vec![a, b]);
    assert_eq!(
        looping.on_waypoint_reached(&mut remaining),
        NextAction::Continue
    );
    assert_eq!(remaining, VecDeque::from(vec![a, b]));

    let mut respawn = RespawnAtStart::new(vec![a, b]);
    let mut remaining = VecDeque::new();
    assert_eq!(
        respawn.on_waypoint_reached(&mut remaining),
        NextAction::Respawn { at: a }
    );
    assert_eq!(remaining, VecDeque::from(vec![b]));

    let mut remaining = VecDeque::from(vec![b]);
    assert_eq!(
        respawn.on_waypoint_reached(&mut remaining),
        NextAction::Continue
    );
}
