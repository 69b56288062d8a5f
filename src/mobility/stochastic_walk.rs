//! Flight-based walks: random direction and truncated Lévy walk.
//!
//! Each node alternates between a flight (straight line, length and speed
//! drawn from the configured distributions) and a pause. The heading is
//! redrawn when a flight ends and whenever the node bounces off a border.

use rand::Rng;

use crate::simulation::types::Position;

use super::border::{BorderHits, BorderPolicy};
use super::distributions::{ScalarDistribution, VelocityDistribution, random_heading};
use super::{NodeBounds, PositionGenerator};

/// Distributions driving a stochastic walk.
#[derive(Debug, Clone, PartialEq)]
pub struct WalkDistributions {
    pub flight: ScalarDistribution,
    pub wait: ScalarDistribution,
    pub velocity: VelocityDistribution,
}

impl WalkDistributions {
    /// Random direction: uniform flights up to the area diagonal, uniform
    /// speed in the node range, uniform pause up to `max_wait`.
    pub fn random_direction(diagonal: f64, max_wait: Option<f64>) -> Self {
        Self {
            flight: ScalarDistribution::Uniform { min: 0.0, max: diagonal },
            wait: match max_wait {
                Some(max) => ScalarDistribution::Uniform { min: 0.0, max },
                None => ScalarDistribution::Constant { value: 0.0 },
            },
            velocity: VelocityDistribution::NodeRange,
        }
    }

    /// Truncated Lévy walk with power-law flights and pauses.
    pub fn truncated_levy(flight_alpha: f64, flight_max: f64, wait_alpha: f64, wait_max: f64, velocity_factor: f64) -> Self {
        Self {
            flight: ScalarDistribution::TruncatedPowerLaw {
                alpha: flight_alpha,
                min: 1.0,
                max: flight_max,
            },
            wait: ScalarDistribution::TruncatedPowerLaw {
                alpha: wait_alpha,
                min: 1.0,
                max: wait_max,
            },
            velocity: VelocityDistribution::FlightScaled { factor: velocity_factor },
        }
    }
}

#[derive(Debug, Clone)]
struct FlightState {
    heading: [f64; 3],
    speed: f64,
    remaining: f64,
    wait: f64,
}

/// Random direction / truncated Lévy walk generator.
#[derive(Debug, Clone)]
pub struct StochasticWalk {
    bounds: Vec<NodeBounds>,
    border: BorderPolicy,
    distributions: WalkDistributions,
    states: Vec<FlightState>,
    positions: Vec<Position>,
}

impl StochasticWalk {
    pub fn new<R: Rng + ?Sized>(rng: &mut R, bounds: Vec<NodeBounds>, initial: Vec<Position>, border: BorderPolicy, distributions: WalkDistributions) -> Self {
        let states = bounds.iter().map(|b| new_flight(rng, b, &distributions, 0.0)).collect();
        Self {
            bounds,
            border,
            distributions,
            states,
            positions: initial,
        }
    }
}

fn new_flight<R: Rng + ?Sized>(rng: &mut R, b: &NodeBounds, d: &WalkDistributions, wait: f64) -> FlightState {
    let flight = d.flight.sample(rng);
    FlightState {
        heading: random_heading(rng, &b.min, &b.max),
        speed: d.velocity.sample(rng, b.velocity, flight),
        remaining: flight,
        wait,
    }
}

/// New random heading whose components on hit axes point back inside.
fn inward_heading<R: Rng + ?Sized>(rng: &mut R, b: &NodeBounds, hits: BorderHits) -> [f64; 3] {
    let mut heading = random_heading(rng, &b.min, &b.max);
    for axis in 0..3 {
        if hits[axis] != 0 && heading[axis].signum() as i8 == hits[axis] {
            heading[axis] = -heading[axis];
        }
    }
    heading
}

impl PositionGenerator for StochasticWalk {
    fn positions(&self) -> &[Position] {
        &self.positions
    }

    fn next_positions<R: Rng + ?Sized>(&mut self, rng: &mut R, dt: f64) -> &[Position] {
        for ((pos, state), b) in self.positions.iter_mut().zip(self.states.iter_mut()).zip(&self.bounds) {
            let mut budget = dt;
            if state.wait > 0.0 {
                let waited = state.wait.min(budget);
                state.wait -= waited;
                budget -= waited;
                if budget <= 0.0 {
                    continue;
                }
            }
            let travel = (state.speed * budget).min(state.remaining.max(0.0));
            pos.x += state.heading[0] * travel;
            pos.y += state.heading[1] * travel;
            pos.z += state.heading[2] * travel;
            state.remaining -= travel;

            let hits = self.border.apply(pos, &mut state.heading, &b.min, &b.max);
            if state.remaining <= 0.0 {
                let wait = self.distributions.wait.sample(rng);
                *state = new_flight(rng, b, &self.distributions, wait);
            } else if hits.iter().any(|h| *h != 0) && self.border == BorderPolicy::Reflect {
                state.heading = inward_heading(rng, b, hits);
            }
        }
        &self.positions
    }
}
