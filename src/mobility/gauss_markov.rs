//! Gauss-Markov mobility.
//!
//! Speed and heading evolve as
//!
//! ```text
//! s' = α·s + (1 − α)·s̄ + √(1 − α²)·N(0, σ)
//! θ' = α·θ + (1 − α)·θ̄ + √(1 − α²)·N(0, σ)
//! ```
//!
//! α = 1 keeps the previous value (straight lines), α = 0 is memoryless.
//! Motion is planar; the z coordinate is held. A border hit points the mean
//! heading θ̄ back at the center of the node's bounds.

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::error::ConfigurationError;
use crate::simulation::types::Position;

use super::border::BorderPolicy;
use super::distributions::uniform;
use super::{NodeBounds, PositionGenerator};

#[derive(Debug, Clone)]
struct GaussMarkovState {
    speed: f64,
    mean_speed: f64,
    angle: f64,
    mean_angle: f64,
}

/// Gauss-Markov generator.
#[derive(Debug, Clone)]
pub struct GaussMarkov {
    bounds: Vec<NodeBounds>,
    border: BorderPolicy,
    alpha: f64,
    noise: Normal<f64>,
    states: Vec<GaussMarkovState>,
    positions: Vec<Position>,
}

impl GaussMarkov {
    pub fn new<R: Rng + ?Sized>(
        rng: &mut R,
        bounds: Vec<NodeBounds>,
        initial: Vec<Position>,
        border: BorderPolicy,
        alpha: f64,
        sigma: f64,
    ) -> Result<Self, ConfigurationError> {
        if !(0.0..=1.0).contains(&alpha) {
            return Err(ConfigurationError::InvalidParameter {
                name: "alpha",
                reason: format!("{alpha} outside [0, 1]"),
            });
        }
        let noise = Normal::new(0.0, sigma).map_err(|e| ConfigurationError::InvalidParameter {
            name: "sigma",
            reason: e.to_string(),
        })?;
        let states = bounds
            .iter()
            .map(|b| {
                let angle = uniform(rng, 0.0, std::f64::consts::TAU);
                let mean_speed = (b.velocity.0 + b.velocity.1) / 2.0;
                GaussMarkovState {
                    speed: mean_speed,
                    mean_speed,
                    angle,
                    mean_angle: angle,
                }
            })
            .collect();
        Ok(Self {
            bounds,
            border,
            alpha,
            noise,
            states,
            positions: initial,
        })
    }
}

impl PositionGenerator for GaussMarkov {
    fn positions(&self) -> &[Position] {
        &self.positions
    }

    fn next_positions<R: Rng + ?Sized>(&mut self, rng: &mut R, dt: f64) -> &[Position] {
        let a = self.alpha;
        let memory = (1.0 - a * a).sqrt();
        for ((pos, state), b) in self.positions.iter_mut().zip(self.states.iter_mut()).zip(&self.bounds) {
            state.speed = (a * state.speed + (1.0 - a) * state.mean_speed + memory * self.noise.sample(rng)).clamp(b.velocity.0, b.velocity.1.max(b.velocity.0));
            state.angle = a * state.angle + (1.0 - a) * state.mean_angle + memory * self.noise.sample(rng);

            let step = state.speed * dt;
            pos.x += step * state.angle.cos();
            pos.y += step * state.angle.sin();

            let mut heading = [state.angle.cos(), state.angle.sin(), 0.0];
            let hits = self.border.apply(pos, &mut heading, &b.min, &b.max);
            if hits[0] != 0 || hits[1] != 0 {
                let center = b.center();
                state.mean_angle = (center.y - pos.y).atan2(center.x - pos.x);
                if self.border == BorderPolicy::Reflect {
                    state.angle = heading[1].atan2(heading[0]);
                }
            }
        }
        &self.positions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn area() -> NodeBounds {
        NodeBounds::new(Position::new(0.0, 0.0, 0.0), Position::new(100.0, 100.0, 0.0), (1.0, 3.0))
    }

    #[test]
    fn alpha_one_moves_in_a_straight_line() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut gm = GaussMarkov::new(&mut rng, vec![area()], vec![Position::new(50.0, 50.0, 0.0)], BorderPolicy::Reflect, 1.0, 1.0).unwrap();
        let p0 = gm.positions()[0];
        let p1 = gm.next_positions(&mut rng, 1.0)[0];
        let p2 = gm.next_positions(&mut rng, 1.0)[0];
        // Equal spacing and collinear: no noise enters when α = 1.
        assert!((p0.distance_to(&p1) - p1.distance_to(&p2)).abs() < 1e-9);
        let cross = (p1.x - p0.x) * (p2.y - p1.y) - (p1.y - p0.y) * (p2.x - p1.x);
        assert!(cross.abs() < 1e-9);
    }

    #[test]
    fn positions_stay_inside_and_speed_respects_range() {
        let mut rng = StdRng::seed_from_u64(8);
        let b = area();
        let mut gm = GaussMarkov::new(&mut rng, vec![b.clone(); 4], vec![Position::new(50.0, 50.0, 0.0); 4], BorderPolicy::Reflect, 0.75, 2.0).unwrap();
        let mut last = gm.positions().to_vec();
        for _ in 0..1000 {
            let now = gm.next_positions(&mut rng, 1.0).to_vec();
            for (p, q) in now.iter().zip(&last) {
                assert!(b.contains(p));
                assert!(p.distance_to(q) <= 3.0 + 1e-9);
            }
            last = now;
        }
    }

    #[test]
    fn alpha_outside_unit_interval_is_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(GaussMarkov::new(&mut rng, vec![area()], vec![Position::default()], BorderPolicy::Reflect, 1.5, 1.0).is_err());
    }
}
