//! Timed traffic lights
//!
//! A light guards one stop line. While red it tells the vehicles inside its
//! zone that are driving toward the line to stop, and releases them when it
//! turns green or they leave the zone.

use glam::Vec3;
use std::collections::BTreeSet;

use super::config::TrafficLightConfig;
use super::types::{flatten, LightId, VehicleId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightPhase {
    Green,
    Red,
}

/// Message for one vehicle's controller
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightSignal {
    pub vehicle: VehicleId,
    pub stop_position: Vec3,
    pub stop: bool,
}

#[derive(Debug, Clone)]
pub struct TrafficLight {
    pub id: LightId,
    pub stop_position: Vec3,
    /// Direction of the traffic this light controls
    pub approach: Vec3,
    phase: LightPhase,
    timer: f32,
    config: TrafficLightConfig,
    /// Vehicles currently told to stop
    stopped: BTreeSet<VehicleId>,
}

impl TrafficLight {
    pub fn new(
        id: LightId,
        stop_position: Vec3,
        approach: Vec3,
        phase: LightPhase,
        config: TrafficLightConfig,
    ) -> Self {
        Self {
            id,
            stop_position,
            approach: flatten(approach).normalize_or_zero(),
            phase,
            timer: 0.0,
            config,
            stopped: BTreeSet::new(),
        }
    }

    pub fn phase(&self) -> LightPhase {
        self.phase
    }

    pub fn is_red(&self) -> bool {
        self.phase == LightPhase::Red
    }

    /// Advance the cycle. Returns true when the phase flipped.
    pub fn update_timer(&mut self, delta_time: f32) -> bool {
        self.timer += delta_time;
        let duration = match self.phase {
            LightPhase::Green => self.config.green_secs,
            LightPhase::Red => self.config.red_secs,
        };
        if self.timer < duration {
            return false;
        }

        self.timer -= duration;
        self.phase = match self.phase {
            LightPhase::Green => LightPhase::Red,
            LightPhase::Red => LightPhase::Green,
        };
        true
    }

    /// True when a vehicle at `position` heading `forward` is approaching the line
    pub fn in_zone(&self, position: Vec3, forward: Vec3) -> bool {
        let to_line = flatten(self.stop_position - position);
        to_line.length() < self.config.zone_radius
            && forward.dot(to_line) > 0.0
            && forward.dot(self.approach) > 0.5
    }

    /// Compute the state changes for the given `(vehicle, position, forward)` set
    pub fn signals<I>(&mut self, vehicles: I) -> Vec<LightSignal>
    where
        I: IntoIterator<Item = (VehicleId, Vec3, Vec3)>,
    {
        let mut signals = Vec::new();
        let mut seen = BTreeSet::new();

        for (vehicle, position, forward) in vehicles {
            seen.insert(vehicle);
            let stop = self.is_red() && self.in_zone(position, forward);
            let already = self.stopped.contains(&vehicle);

            if stop != already {
                if stop {
                    self.stopped.insert(vehicle);
                } else {
                    self.stopped.remove(&vehicle);
                }
                signals.push(LightSignal {
                    vehicle,
                    stop_position: self.stop_position,
                    stop,
                });
            }
        }

        // Vehicles that no longer exist
        self.stopped.retain(|vehicle| seen.contains(vehicle));
        signals
    }
}
