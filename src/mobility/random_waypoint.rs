//! Random waypoint: travel in a straight line to a uniform destination at a
//! uniform speed, optionally pause, repeat.

use rand::Rng;

use crate::simulation::types::Position;

use super::border::BorderPolicy;
use super::distributions::{uniform, uniform_position};
use super::{NodeBounds, PositionGenerator};

#[derive(Debug, Clone)]
struct WaypointState {
    target: Position,
    speed: f64,
    wait: f64,
}

/// Random waypoint generator.
#[derive(Debug, Clone)]
pub struct RandomWaypoint {
    bounds: Vec<NodeBounds>,
    border: BorderPolicy,
    /// Upper bound (s) of the uniform pause on arrival; `None` never pauses.
    max_wait: Option<f64>,
    states: Vec<WaypointState>,
    positions: Vec<Position>,
}

impl RandomWaypoint {
    pub fn new<R: Rng + ?Sized>(rng: &mut R, bounds: Vec<NodeBounds>, initial: Vec<Position>, border: BorderPolicy, max_wait: Option<f64>) -> Self {
        let states = bounds.iter().map(|b| new_leg(rng, b, 0.0)).collect();
        Self {
            bounds,
            border,
            max_wait,
            states,
            positions: initial,
        }
    }
}

fn new_leg<R: Rng + ?Sized>(rng: &mut R, b: &NodeBounds, wait: f64) -> WaypointState {
    // A zero lower speed bound would allow a node to stall forever.
    let lo = b.velocity.0.max(f64::EPSILON);
    WaypointState {
        target: uniform_position(rng, &b.min, &b.max),
        speed: uniform(rng, lo, b.velocity.1.max(lo)),
        wait,
    }
}

impl PositionGenerator for RandomWaypoint {
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
            }
            if budget <= 0.0 {
                continue;
            }
            let remaining = pos.distance_to(&state.target);
            let travel = state.speed * budget;
            if travel >= remaining {
                *pos = state.target;
                let wait = self.max_wait.map_or(0.0, |w| uniform(rng, 0.0, w));
                *state = new_leg(rng, b, wait);
            } else {
                *pos = pos.lerp(&state.target, travel / remaining);
            }
            let mut heading = [0.0; 3];
            self.border.apply(pos, &mut heading, &b.min, &b.max);
        }
        &self.positions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn bounds() -> Vec<NodeBounds> {
        vec![
            NodeBounds::new(Position::new(0.0, 0.0, 0.0), Position::new(100.0, 100.0, 0.0), (1.0, 5.0)),
            NodeBounds::new(Position::new(200.0, 0.0, 0.0), Position::new(250.0, 30.0, 10.0), (0.5, 1.0)),
        ]
    }

    #[test]
    fn every_position_stays_within_per_node_bounds() {
        let mut rng = StdRng::seed_from_u64(42);
        let b = bounds();
        let initial = b.iter().map(|nb| uniform_position(&mut rng, &nb.min, &nb.max)).collect();
        let mut rwp = RandomWaypoint::new(&mut rng, b.clone(), initial, BorderPolicy::Reflect, Some(3.0));
        for _ in 0..2000 {
            let positions = rwp.next_positions(&mut rng, 1.0).to_vec();
            for (p, nb) in positions.iter().zip(&b) {
                assert!(nb.contains(p), "{p:?} outside {nb:?}");
            }
        }
    }

    #[test]
    fn speed_never_exceeds_node_maximum() {
        let mut rng = StdRng::seed_from_u64(5);
        let b = bounds();
        let initial = vec![Position::new(50.0, 50.0, 0.0), Position::new(220.0, 10.0, 5.0)];
        let mut rwp = RandomWaypoint::new(&mut rng, b, initial, BorderPolicy::Reflect, None);
        let mut last = rwp.positions().to_vec();
        for _ in 0..300 {
            let now = rwp.next_positions(&mut rng, 0.5).to_vec();
            assert!(now[0].distance_to(&last[0]) <= 5.0 * 0.5 + 1e-9);
            assert!(now[1].distance_to(&last[1]) <= 1.0 * 0.5 + 1e-9);
            last = now;
        }
    }
}
