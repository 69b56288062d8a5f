//! Controlled mobility: scripted trajectories by linear interpolation between
//! timed waypoints.

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::simulation::types::Position;

/// A position a node must occupy at a given simulation time (s).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub time: f64,
    pub position: Position,
}

/// Timed waypoints of one node, kept sorted by time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trajectory {
    waypoints: Vec<Waypoint>,
}

impl Trajectory {
    pub fn new(mut waypoints: Vec<Waypoint>) -> Result<Self, ConfigurationError> {
        waypoints.sort_by(|a, b| a.time.total_cmp(&b.time));
        if waypoints.windows(2).any(|w| w[0].time == w[1].time && w[0].position != w[1].position) {
            return Err(ConfigurationError::InvalidParameter {
                name: "waypoints",
                reason: "two different positions at the same time".to_string(),
            });
        }
        Ok(Self { waypoints })
    }

    /// Start/stop pair, the common scripted case.
    pub fn linear(start_time: f64, start: Position, end_time: f64, end: Position) -> Result<Self, ConfigurationError> {
        if end_time < start_time {
            return Err(ConfigurationError::InvalidParameter {
                name: "end_time",
                reason: format!("{end_time} precedes start {start_time}"),
            });
        }
        Self::new(vec![
            Waypoint {
                time: start_time,
                position: start,
            },
            Waypoint {
                time: end_time,
                position: end,
            },
        ])
    }

    pub fn push(&mut self, waypoint: Waypoint) {
        let idx = self.waypoints.partition_point(|w| w.time <= waypoint.time);
        self.waypoints.insert(idx, waypoint);
    }

    pub fn end_time(&self) -> Option<f64> {
        self.waypoints.last().map(|w| w.time)
    }

    /// Position at `time`; before the first waypoint the node holds the first
    /// position, after the last it holds the last one.
    pub fn position_at(&self, time: f64) -> Option<Position> {
        let first = self.waypoints.first()?;
        if time <= first.time {
            return Some(first.position);
        }
        let idx = self.waypoints.partition_point(|w| w.time <= time);
        if idx >= self.waypoints.len() {
            return self.waypoints.last().map(|w| w.position);
        }
        let a = &self.waypoints[idx - 1];
        let b = &self.waypoints[idx];
        let span = b.time - a.time;
        if span <= 0.0 {
            return Some(b.position);
        }
        Some(a.position.lerp(&b.position, (time - a.time) / span))
    }
}

/// Scripted movement for a set of nodes, indexed by world node index.
#[derive(Debug, Clone, Default)]
pub struct ControlledMobility {
    tracks: Vec<(usize, Trajectory)>,
}

impl ControlledMobility {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node: usize, trajectory: Trajectory) {
        match self.tracks.iter_mut().find(|(n, _)| *n == node) {
            Some((_, t)) => *t = trajectory,
            None => self.tracks.push((node, trajectory)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Time after which no scripted node moves.
    pub fn end_time(&self) -> Option<f64> {
        self.tracks.iter().filter_map(|(_, t)| t.end_time()).reduce(f64::max)
    }

    /// `(node, position)` for every scripted node at `time`.
    pub fn positions_at(&self, time: f64) -> Vec<(usize, Position)> {
        self.tracks.iter().filter_map(|(n, t)| t.position_at(time).map(|p| (*n, p))).collect()
    }
}
