//! Sampling helpers for flight lengths, wait times and velocities.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::simulation::types::Position;

/// Uniform draw from `[lo, hi)`; degenerate ranges return `lo`.
pub fn uniform<R: Rng + ?Sized>(rng: &mut R, lo: f64, hi: f64) -> f64 {
    if hi > lo { rng.gen_range(lo..hi) } else { lo }
}

/// Uniform point inside a box. Pinned axes (`min == max`) stay at `min`.
pub fn uniform_position<R: Rng + ?Sized>(rng: &mut R, min: &Position, max: &Position) -> Position {
    Position::new(uniform(rng, min.x, max.x), uniform(rng, min.y, max.y), uniform(rng, min.z, max.z))
}

/// Random unit heading. Axes pinned by the bounds get no component, so a flat
/// area yields a planar heading.
pub fn random_heading<R: Rng + ?Sized>(rng: &mut R, min: &Position, max: &Position) -> [f64; 3] {
    let free = [max.x > min.x, max.y > min.y, max.z > min.z];
    if free[2] {
        // Uniform on the sphere: z = cos θ uniform in [-1, 1].
        let z: f64 = rng.gen_range(-1.0..1.0);
        let phi: f64 = rng.gen_range(0.0..std::f64::consts::TAU);
        let r = (1.0 - z * z).sqrt();
        let mut h = [r * phi.cos(), r * phi.sin(), z];
        if !free[0] {
            h[0] = 0.0;
        }
        if !free[1] {
            h[1] = 0.0;
        }
        return normalize(h);
    }
    let phi: f64 = rng.gen_range(0.0..std::f64::consts::TAU);
    let mut h = [phi.cos(), phi.sin(), 0.0];
    if !free[0] {
        h[0] = 0.0;
    }
    if !free[1] {
        h[1] = 0.0;
    }
    normalize(h)
}

fn normalize(h: [f64; 3]) -> [f64; 3] {
    let n = (h[0] * h[0] + h[1] * h[1] + h[2] * h[2]).sqrt();
    if n == 0.0 { [0.0; 3] } else { [h[0] / n, h[1] / n, h[2] / n] }
}

/// Distribution of a non-negative scalar (flight length, wait time).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScalarDistribution {
    Constant { value: f64 },
    Uniform { min: f64, max: f64 },
    /// Pareto with tail exponent `alpha`, truncated to `[min, max]`.
    TruncatedPowerLaw { alpha: f64, min: f64, max: f64 },
}

impl ScalarDistribution {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let bad = |reason: &str| ConfigurationError::InvalidParameter {
            name: "distribution",
            reason: reason.to_string(),
        };
        match *self {
            ScalarDistribution::Constant { value } if value < 0.0 => Err(bad("constant must be non-negative")),
            ScalarDistribution::Uniform { min, max } if min < 0.0 || max < min => Err(bad("uniform needs 0 <= min <= max")),
            ScalarDistribution::TruncatedPowerLaw { alpha, min, max } if alpha <= 0.0 || min <= 0.0 || max < min => {
                Err(bad("power law needs alpha > 0 and 0 < min <= max"))
            }
            _ => Ok(()),
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match *self {
            ScalarDistribution::Constant { value } => value,
            ScalarDistribution::Uniform { min, max } => uniform(rng, min, max),
            ScalarDistribution::TruncatedPowerLaw { alpha, min, max } => {
                // Inverse CDF of the truncated Pareto distribution.
                let u: f64 = rng.r#gen();
                let lo = min.powf(-alpha);
                let hi = max.powf(-alpha);
                (lo - u * (lo - hi)).powf(-1.0 / alpha).clamp(min, max)
            }
        }
    }
}

/// How a node's speed is chosen for a new flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VelocityDistribution {
    /// Uniform in the node's configured velocity range.
    #[default]
    NodeRange,
    Constant {
        value: f64,
    },
    /// `factor · sqrt(flight_length)`; longer flights are faster.
    FlightScaled {
        factor: f64,
    },
}

impl VelocityDistribution {
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, node_range: (f64, f64), flight_length: f64) -> f64 {
        match *self {
            VelocityDistribution::NodeRange => uniform(rng, node_range.0, node_range.1),
            VelocityDistribution::Constant { value } => value,
            VelocityDistribution::FlightScaled { factor } => factor * flight_length.max(0.0).sqrt(),
        }
    }
}
