//! Border handling shared by every stochastic model.

use serde::{Deserialize, Serialize};

use crate::simulation::types::Position;

/// What happens when a node overshoots its bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BorderPolicy {
    /// Mirror the overshoot back inside and invert that velocity component.
    #[default]
    Reflect,
    /// Treat the area as a torus.
    Wrap,
}

/// Which border an axis touched during `apply`: -1 for the minimum, +1 for the
/// maximum, 0 for none.
pub type BorderHits = [i8; 3];

impl BorderPolicy {
    /// Bring `position` back inside `[min, max]`, adjusting `velocity` (any
    /// per-axis direction or velocity vector) for reflections. Axes with
    /// `min == max` are pinned.
    pub fn apply(self, position: &mut Position, velocity: &mut [f64; 3], min: &Position, max: &Position) -> BorderHits {
        let mut hits = [0i8; 3];
        for axis in 0..3 {
            let lo = min.axis(axis);
            let hi = max.axis(axis);
            let value = position.axis_mut(axis);
            if hi <= lo {
                *value = lo;
                velocity[axis] = 0.0;
                continue;
            }
            if *value >= lo && *value <= hi {
                continue;
            }
            hits[axis] = if *value < lo { -1 } else { 1 };
            match self {
                BorderPolicy::Reflect => {
                    let span = hi - lo;
                    // Fold the coordinate onto a 2·span period, then mirror the upper half.
                    let folded = (*value - lo).rem_euclid(2.0 * span);
                    let flips = ((*value - lo) / span).floor() as i64;
                    *value = if folded > span { lo + 2.0 * span - folded } else { lo + folded };
                    if flips.rem_euclid(2) == 1 {
                        velocity[axis] = -velocity[axis];
                    }
                }
                BorderPolicy::Wrap => {
                    *value = lo + (*value - lo).rem_euclid(hi - lo);
                }
            }
        }
        hits
    }
}
