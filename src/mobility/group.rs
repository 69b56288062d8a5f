//! Group mobility: reference point group and time-variant community.
//!
//! Every group has a reference point that moves like a random-direction node
//! over the whole area. Members random-walk around it, and each tick their
//! offset from the reference shrinks by the aggregation coefficient
//! (0 = independent, 1 = glued to the reference). The time-variant community
//! variant cycles the coefficient through a schedule of epochs.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::simulation::types::Position;

use super::border::BorderPolicy;
use super::distributions::{random_heading, uniform};
use super::stochastic_walk::{StochasticWalk, WalkDistributions};
use super::{NodeBounds, PositionGenerator};

/// One entry of an aggregation schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationEpoch {
    pub aggregation: f64,
    /// Epoch duration (s).
    pub duration: f64,
}

/// Group mobility generator.
#[derive(Debug, Clone)]
pub struct GroupMobility {
    bounds: Vec<NodeBounds>,
    border: BorderPolicy,
    /// Group index of every member.
    membership: Vec<usize>,
    references: StochasticWalk,
    schedule: Vec<AggregationEpoch>,
    epoch: usize,
    epoch_elapsed: f64,
    offsets: Vec<Position>,
    positions: Vec<Position>,
}

impl GroupMobility {
    /// `groups` lists group sizes and must cover every managed node.
    pub fn new<R: Rng + ?Sized>(
        rng: &mut R,
        bounds: Vec<NodeBounds>,
        initial: Vec<Position>,
        border: BorderPolicy,
        area: NodeBounds,
        groups: &[usize],
        schedule: Vec<AggregationEpoch>,
    ) -> Result<Self, ConfigurationError> {
        let total: usize = groups.iter().sum();
        if total != bounds.len() {
            return Err(ConfigurationError::InvalidParameter {
                name: "groups",
                reason: format!("group sizes add up to {total}, expected {}", bounds.len()),
            });
        }
        if schedule.is_empty() || schedule.iter().any(|e| !(0.0..=1.0).contains(&e.aggregation) || e.duration <= 0.0) {
            return Err(ConfigurationError::InvalidParameter {
                name: "aggregation",
                reason: "each epoch needs aggregation in [0, 1] and a positive duration".to_string(),
            });
        }
        let membership: Vec<usize> = groups.iter().enumerate().flat_map(|(g, n)| std::iter::repeat_n(g, *n)).collect();

        // Reference points start at their group's centroid.
        let mut starts = vec![Position::default(); groups.len()];
        for (g, size) in groups.iter().enumerate() {
            let members: Vec<&Position> = membership.iter().zip(&initial).filter(|(m, _)| **m == g).map(|(_, p)| p).collect();
            if *size > 0 {
                let n = members.len() as f64;
                starts[g] = Position::new(
                    members.iter().map(|p| p.x).sum::<f64>() / n,
                    members.iter().map(|p| p.y).sum::<f64>() / n,
                    members.iter().map(|p| p.z).sum::<f64>() / n,
                );
            }
        }
        let references = StochasticWalk::new(
            rng,
            vec![area.clone(); groups.len()],
            starts,
            border,
            WalkDistributions::random_direction(area.diagonal(), None),
        );
        let offsets = membership.iter().zip(&initial).map(|(g, p)| sub(p, &references.positions()[*g])).collect();
        Ok(Self {
            bounds,
            border,
            membership,
            references,
            schedule,
            epoch: 0,
            epoch_elapsed: 0.0,
            offsets,
            positions: initial,
        })
    }

    /// Aggregation coefficient in force right now.
    pub fn aggregation(&self) -> f64 {
        self.schedule[self.epoch].aggregation
    }

    pub fn reference_points(&self) -> &[Position] {
        self.references.positions()
    }

    fn advance_schedule(&mut self, dt: f64) {
        self.epoch_elapsed += dt;
        while self.epoch_elapsed >= self.schedule[self.epoch].duration {
            self.epoch_elapsed -= self.schedule[self.epoch].duration;
            self.epoch = (self.epoch + 1) % self.schedule.len();
        }
    }
}

fn sub(a: &Position, b: &Position) -> Position {
    Position::new(a.x - b.x, a.y - b.y, a.z - b.z)
}

impl PositionGenerator for GroupMobility {
    fn positions(&self) -> &[Position] {
        &self.positions
    }

    fn next_positions<R: Rng + ?Sized>(&mut self, rng: &mut R, dt: f64) -> &[Position] {
        let aggregation = self.aggregation();
        let references = self.references.next_positions(rng, dt).to_vec();
        for (((pos, offset), group), b) in self.positions.iter_mut().zip(self.offsets.iter_mut()).zip(&self.membership).zip(&self.bounds) {
            let heading = random_heading(rng, &b.min, &b.max);
            let step = uniform(rng, b.velocity.0, b.velocity.1) * dt;
            let pull = 1.0 - aggregation;
            offset.x = (offset.x + heading[0] * step) * pull;
            offset.y = (offset.y + heading[1] * step) * pull;
            offset.z = (offset.z + heading[2] * step) * pull;

            let reference = references[*group];
            *pos = Position::new(reference.x + offset.x, reference.y + offset.y, reference.z + offset.z);
            let mut velocity = heading;
            self.border.apply(pos, &mut velocity, &b.min, &b.max);
            *offset = sub(pos, &reference);
        }
        self.advance_schedule(dt);
        &self.positions
    }
}
