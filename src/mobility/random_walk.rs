//! Random walk: constant per-node speed, new uniform heading after every
//! fixed-length step.

use rand::Rng;

use crate::simulation::types::Position;

use super::border::BorderPolicy;
use super::distributions::{random_heading, uniform};
use super::{NodeBounds, PositionGenerator};

#[derive(Debug, Clone)]
struct WalkState {
    speed: f64,
    heading: [f64; 3],
    remaining: f64,
}

/// Random walk generator.
#[derive(Debug, Clone)]
pub struct RandomWalk {
    bounds: Vec<NodeBounds>,
    border: BorderPolicy,
    step_length: f64,
    states: Vec<WalkState>,
    positions: Vec<Position>,
}

impl RandomWalk {
    pub fn new<R: Rng + ?Sized>(rng: &mut R, bounds: Vec<NodeBounds>, initial: Vec<Position>, border: BorderPolicy, step_length: f64) -> Self {
        let states = bounds
            .iter()
            .map(|b| WalkState {
                speed: uniform(rng, b.velocity.0, b.velocity.1),
                heading: random_heading(rng, &b.min, &b.max),
                remaining: step_length,
            })
            .collect();
        Self {
            bounds,
            border,
            step_length,
            states,
            positions: initial,
        }
    }
}

impl PositionGenerator for RandomWalk {
    fn positions(&self) -> &[Position] {
        &self.positions
    }

    fn next_positions<R: Rng + ?Sized>(&mut self, rng: &mut R, dt: f64) -> &[Position] {
        for ((pos, state), b) in self.positions.iter_mut().zip(self.states.iter_mut()).zip(&self.bounds) {
            if state.remaining <= 0.0 {
                state.heading = random_heading(rng, &b.min, &b.max);
                state.remaining = self.step_length;
            }
            let travel = (state.speed * dt).min(state.remaining.max(0.0));
            pos.x += state.heading[0] * travel;
            pos.y += state.heading[1] * travel;
            pos.z += state.heading[2] * travel;
            state.remaining -= travel;
            self.border.apply(pos, &mut state.heading, &b.min, &b.max);
        }
        &self.positions
    }
}
