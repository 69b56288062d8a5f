//! Mobility generators.
//!
//! Every stochastic model is an infinite, stateful producer of "next
//! positions for all managed nodes", advanced once per simulation tick by
//! `dt` seconds. Velocities are in m/s, waits and epochs in seconds.
//!
//! - `border`: reflect / wrap policies
//! - `distributions`: flight, wait and velocity sampling
//! - `random_walk`, `random_waypoint`, `stochastic_walk` (random direction and
//!   truncated Lévy walk), `gauss_markov`, `group` (reference point group and
//!   time-variant community)
//! - `controlled`: scripted waypoint interpolation

pub mod border;
pub mod controlled;
pub mod distributions;
pub mod gauss_markov;
pub mod group;
pub mod random_walk;
pub mod random_waypoint;
pub mod stochastic_walk;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::simulation::types::Position;

pub use border::BorderPolicy;
pub use controlled::{ControlledMobility, Trajectory, Waypoint};
use gauss_markov::GaussMarkov;
use group::{AggregationEpoch, GroupMobility};
use random_walk::RandomWalk;
use random_waypoint::RandomWaypoint;
use stochastic_walk::{StochasticWalk, WalkDistributions};

/// Area and speed limits of one mobile node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeBounds {
    pub min: Position,
    pub max: Position,
    /// `(min, max)` speed in m/s.
    pub velocity: (f64, f64),
}

impl NodeBounds {
    pub fn new(min: Position, max: Position, velocity: (f64, f64)) -> Self {
        Self { min, max, velocity }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z {
            return Err(ConfigurationError::InvalidParameter {
                name: "bounds",
                reason: format!("min {:?} exceeds max {:?}", self.min, self.max),
            });
        }
        if self.velocity.0 < 0.0 || self.velocity.1 < self.velocity.0 {
            return Err(ConfigurationError::InvalidParameter {
                name: "velocity",
                reason: format!("{:?} is not a non-negative range", self.velocity),
            });
        }
        Ok(())
    }

    pub fn contains(&self, p: &Position) -> bool {
        (self.min.x..=self.max.x).contains(&p.x) && (self.min.y..=self.max.y).contains(&p.y) && (self.min.z..=self.max.z).contains(&p.z)
    }

    pub fn center(&self) -> Position {
        self.min.lerp(&self.max, 0.5)
    }

    pub fn diagonal(&self) -> f64 {
        self.min.distance_to(&self.max)
    }

    /// Closest point inside the bounds.
    pub fn clamp(&self, p: &Position) -> Position {
        Position::new(p.x.clamp(self.min.x, self.max.x), p.y.clamp(self.min.y, self.max.y), p.z.clamp(self.min.z, self.max.z))
    }
}

/// Shared interface of every stochastic model.
pub trait PositionGenerator {
    /// Current positions, in managed-node order.
    fn positions(&self) -> &[Position];

    /// Advance the model by `dt` seconds and return the new positions.
    fn next_positions<R: Rng + ?Sized>(&mut self, rng: &mut R, dt: f64) -> &[Position];
}

fn default_step_length() -> f64 {
    10.0
}
fn default_levy_flight_alpha() -> f64 {
    1.6
}
fn default_levy_flight_max() -> f64 {
    50.0
}
fn default_levy_wait_alpha() -> f64 {
    0.8
}
fn default_levy_wait_max() -> f64 {
    100.0
}
fn default_levy_velocity_factor() -> f64 {
    0.1
}
fn default_gm_alpha() -> f64 {
    0.75
}
fn default_gm_sigma() -> f64 {
    1.0
}
fn default_aggregation() -> f64 {
    0.1
}

/// Stochastic mobility model selection and model-specific parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum MobilityModel {
    RandomWalk {
        /// Distance (m) walked before a new heading is drawn.
        #[serde(default = "default_step_length")]
        step_length: f64,
    },
    RandomWaypoint {
        /// Maximum pause (s) on arrival.
        #[serde(default)]
        max_wait: Option<f64>,
    },
    RandomDirection {
        #[serde(default)]
        max_wait: Option<f64>,
        /// Flight length distribution; defaults to uniform up to the area diagonal.
        #[serde(default)]
        flight: Option<distributions::ScalarDistribution>,
    },
    TruncatedLevyWalk {
        #[serde(default = "default_levy_flight_alpha")]
        flight_alpha: f64,
        #[serde(default = "default_levy_flight_max")]
        flight_max: f64,
        #[serde(default = "default_levy_wait_alpha")]
        wait_alpha: f64,
        #[serde(default = "default_levy_wait_max")]
        wait_max: f64,
        #[serde(default = "default_levy_velocity_factor")]
        velocity_factor: f64,
    },
    GaussMarkov {
        #[serde(default = "default_gm_alpha")]
        alpha: f64,
        #[serde(default = "default_gm_sigma")]
        sigma: f64,
    },
    ReferencePointGroup {
        /// Group sizes; empty puts every node in one group.
        #[serde(default)]
        groups: Vec<usize>,
        #[serde(default = "default_aggregation")]
        aggregation: f64,
    },
    TimeVariantCommunity {
        #[serde(default)]
        groups: Vec<usize>,
        epochs: Vec<AggregationEpoch>,
    },
}

/// A running stochastic model.
#[derive(Debug, Clone)]
pub enum MobilityGenerator {
    RandomWalk(RandomWalk),
    RandomWaypoint(RandomWaypoint),
    StochasticWalk(StochasticWalk),
    GaussMarkov(GaussMarkov),
    Group(GroupMobility),
}

impl MobilityGenerator {
    /// Start `model` for nodes with the given bounds and starting positions.
    /// `area` is the overall simulation area, used by group reference points.
    pub fn new<R: Rng + ?Sized>(
        rng: &mut R,
        model: &MobilityModel,
        border: BorderPolicy,
        area: NodeBounds,
        bounds: Vec<NodeBounds>,
        initial: Vec<Position>,
    ) -> Result<Self, ConfigurationError> {
        area.validate()?;
        for b in &bounds {
            b.validate()?;
        }
        if initial.len() != bounds.len() {
            return Err(ConfigurationError::InvalidParameter {
                name: "initial",
                reason: format!("{} positions for {} nodes", initial.len(), bounds.len()),
            });
        }
        let initial: Vec<Position> = initial.iter().zip(&bounds).map(|(p, b)| b.clamp(p)).collect();
        let all_in_one = |groups: &[usize]| if groups.is_empty() { vec![bounds.len()] } else { groups.to_vec() };

        Ok(match model {
            MobilityModel::RandomWalk { step_length } => {
                if *step_length <= 0.0 {
                    return Err(ConfigurationError::InvalidParameter {
                        name: "step_length",
                        reason: "must be positive".to_string(),
                    });
                }
                MobilityGenerator::RandomWalk(RandomWalk::new(rng, bounds, initial, border, *step_length))
            }
            MobilityModel::RandomWaypoint { max_wait } => MobilityGenerator::RandomWaypoint(RandomWaypoint::new(rng, bounds, initial, border, *max_wait)),
            MobilityModel::RandomDirection { max_wait, flight } => {
                let mut d = WalkDistributions::random_direction(area.diagonal(), *max_wait);
                if let Some(flight) = flight {
                    flight.validate()?;
                    d.flight = flight.clone();
                }
                MobilityGenerator::StochasticWalk(StochasticWalk::new(rng, bounds, initial, border, d))
            }
            MobilityModel::TruncatedLevyWalk {
                flight_alpha,
                flight_max,
                wait_alpha,
                wait_max,
                velocity_factor,
            } => {
                let d = WalkDistributions::truncated_levy(*flight_alpha, *flight_max, *wait_alpha, *wait_max, *velocity_factor);
                d.flight.validate()?;
                d.wait.validate()?;
                MobilityGenerator::StochasticWalk(StochasticWalk::new(rng, bounds, initial, border, d))
            }
            MobilityModel::GaussMarkov { alpha, sigma } => MobilityGenerator::GaussMarkov(GaussMarkov::new(rng, bounds, initial, border, *alpha, *sigma)?),
            MobilityModel::ReferencePointGroup { groups, aggregation } => {
                let schedule = vec![AggregationEpoch {
                    aggregation: *aggregation,
                    duration: f64::MAX,
                }];
                let groups = all_in_one(groups);
                MobilityGenerator::Group(GroupMobility::new(rng, bounds, initial, border, area, &groups, schedule)?)
            }
            MobilityModel::TimeVariantCommunity { groups, epochs } => {
                let groups = all_in_one(groups);
                MobilityGenerator::Group(GroupMobility::new(rng, bounds, initial, border, area, &groups, epochs.clone())?)
            }
        })
    }
}

impl PositionGenerator for MobilityGenerator {
    fn positions(&self) -> &[Position] {
        match self {
            MobilityGenerator::RandomWalk(m) => m.positions(),
            MobilityGenerator::RandomWaypoint(m) => m.positions(),
            MobilityGenerator::StochasticWalk(m) => m.positions(),
            MobilityGenerator::GaussMarkov(m) => m.positions(),
            MobilityGenerator::Group(m) => m.positions(),
        }
    }

    fn next_positions<R: Rng + ?Sized>(&mut self, rng: &mut R, dt: f64) -> &[Position] {
        match self {
            MobilityGenerator::RandomWalk(m) => m.next_positions(rng, dt),
            MobilityGenerator::RandomWaypoint(m) => m.next_positions(rng, dt),
            MobilityGenerator::StochasticWalk(m) => m.next_positions(rng, dt),
            MobilityGenerator::GaussMarkov(m) => m.next_positions(rng, dt),
            MobilityGenerator::Group(m) => m.next_positions(rng, dt),
        }
    }
}
