//! Route strategies decide what happens once a vehicle consumes a waypoint

use std::collections::VecDeque;

use super::types::NodeId;

/// What the world should do with a vehicle after a waypoint is consumed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
    /// Keep driving toward the next waypoint
    Continue,
    /// Route finished, stay where you are
    Idle,
    Despawn,
    /// Teleport to the given node and keep driving
    Respawn { at: NodeId },
}

/// Called after the reached waypoint has been removed from `remaining`
pub trait RouteStrategy: Send {
    fn on_waypoint_reached(&mut self, remaining: &mut VecDeque<NodeId>) -> NextAction;

    fn name(&self) -> &'static str;
}

/// Remove the vehicle when the route runs out
#[derive(Debug, Clone, Default)]
pub struct DespawnAtEnd;

impl RouteStrategy for DespawnAtEnd {
    fn on_waypoint_reached(&mut self, remaining: &mut VecDeque<NodeId>) -> NextAction {
        if remaining.is_empty() {
            NextAction::Despawn
        } else {
            NextAction::Continue
        }
    }

    fn name(&self) -> &'static str {
        "despawn-at-end"
    }
}

/// Park the vehicle when the route runs out
#[derive(Debug, Clone, Default)]
pub struct StopAtEnd;

impl RouteStrategy for StopAtEnd {
    fn on_waypoint_reached(&mut self, remaining: &mut VecDeque<NodeId>) -> NextAction {
        if remaining.is_empty() {
            NextAction::Idle
        } else {
            NextAction::Continue
        }
    }

    fn name(&self) -> &'static str {
        "stop-at-end"
    }
}

/// Drive the same route forever. The last node should lead back to the first.
#[derive(Debug, Clone)]
pub struct LoopRoute {
    route: Vec<NodeId>,
}

impl LoopRoute {
    pub fn new(route: Vec<NodeId>) -> Self {
        Self { route }
    }
}

impl RouteStrategy for LoopRoute {
    fn on_waypoint_reached(&mut self, remaining: &mut VecDeque<NodeId>) -> NextAction {
        if !remaining.is_empty() {
            return NextAction::Continue;
        }
        if self.route.is_empty() {
            return NextAction::Idle;
        }
        remaining.extend(self.route.iter().copied());
        NextAction::Continue
    }

    fn name(&self) -> &'static str {
        "loop"
    }
}

/// Jump back to the first node and drive the route again
#[derive(Debug, Clone)]
pub struct RespawnAtStart {
    route: Vec<NodeId>,
}

impl RespawnAtStart {
    pub fn new(route: Vec<NodeId>) -> Self {
        Self { route }
    }
}

impl RouteStrategy for RespawnAtStart {
    fn on_waypoint_reached(&mut self, remaining: &mut VecDeque<NodeId>) -> NextAction {
        if !remaining.is_empty() {
            return NextAction::Continue;
        }
        let Some((first, rest)) = self.route.split_first() else {
            return NextAction::Despawn;
        };
        remaining.extend(rest.iter().copied());
        NextAction::Respawn { at: *first }
    }

    fn name(&self) -> &'static str {
        "respawn-at-start"
    }
}
