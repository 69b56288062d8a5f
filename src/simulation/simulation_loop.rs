//! Single-writer simulation loop.
//!
//! `SimulationLoop` owns the world and is the only code that mutates node
//! state. One tick, in order:
//! 1) advance simulation time by `dt`,
//! 2) move the stochastic nodes, then the scripted ones,
//! 3) run one association pass (rssi/snr, association, peer links and their
//!    side effects),
//! 4) check the association relation.
//!
//! Every position written in a tick is fully applied before the pass reads it,
//! and the pass completes before the next tick starts.

use rand::rngs::StdRng;

use crate::association::{AssociationController, PassOutcome};
use crate::error::{Error, Result};
use crate::mobility::{ControlledMobility, MobilityGenerator, PositionGenerator};
use crate::time_driver;

use super::types::{LinkEvent, SimulationCommand, WorldSnapshot};
use super::world::World;

/// A running stochastic model and the world indices of the nodes it moves,
/// in the generator's order.
#[derive(Debug, Clone)]
pub struct ManagedMobility {
    pub generator: MobilityGenerator,
    pub nodes: Vec<usize>,
}

/// What one tick changed.
#[derive(Debug, Default)]
pub struct TickReport {
    pub tick: u64,
    /// Simulated seconds since the start.
    pub elapsed: f64,
    pub events: Vec<LinkEvent>,
    /// Side effects that failed during the pass.
    pub failures: Vec<Error>,
}

/// Result of applying a command between ticks.
#[derive(Debug)]
pub enum CommandEffect {
    None,
    Snapshot(WorldSnapshot),
    Stop,
}

#[derive(Debug)]
pub struct SimulationLoop {
    world: World,
    controller: AssociationController,
    mobility: Option<ManagedMobility>,
    controlled: ControlledMobility,
    rng: StdRng,
    tick: u64,
    elapsed: f64,
}

impl SimulationLoop {
    pub fn new(world: World, controller: AssociationController, mobility: Option<ManagedMobility>, controlled: ControlledMobility, rng: StdRng) -> Self {
        Self {
            world,
            controller,
            mobility,
            controlled,
            rng,
            tick: 0,
            elapsed: 0.0,
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn controller(&self) -> &AssociationController {
        &self.controller
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// True when something moves between ticks. Without movement the loop
    /// only refreshes shadowing and daemon state.
    pub fn has_mobility(&self) -> bool {
        self.mobility.is_some() || !self.controlled.is_empty()
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        self.world.snapshot(self.tick)
    }

    /// Associate everything in range at time 0, before the first tick.
    pub fn start(&mut self) -> Result<TickReport> {
        for (node, position) in self.controlled.positions_at(0.0) {
            self.world.set_position(node, position);
        }
        let outcome = self.controller.pass(&mut self.world, &mut self.rng)?;
        self.finish_pass(outcome)
    }

    /// Advance the world by `dt` simulated seconds.
    pub fn tick(&mut self, dt: f64) -> Result<TickReport> {
        self.tick += 1;
        self.elapsed += dt;

        if let Some(managed) = self.mobility.as_mut() {
            let positions = managed.generator.next_positions(&mut self.rng, dt);
            for (&node, position) in managed.nodes.iter().zip(positions) {
                self.world.set_position(node, *position);
            }
        }
        for (node, position) in self.controlled.positions_at(self.elapsed) {
            self.world.set_position(node, position);
        }

        let outcome = self.controller.pass(&mut self.world, &mut self.rng)?;
        self.finish_pass(outcome)
    }

    fn finish_pass(&mut self, outcome: PassOutcome) -> Result<TickReport> {
        self.world.check_consistency()?;
        for event in &outcome.events {
            log::info!("[t={:.1}s] {:?}", self.elapsed, event);
        }
        for failure in &outcome.failures {
            log::warn!("[t={:.1}s] link side effect failed: {}", self.elapsed, failure);
        }
        log::debug!("Tick {} done, {} events", self.tick, outcome.events.len());
        Ok(TickReport {
            tick: self.tick,
            elapsed: self.elapsed,
            events: outcome.events,
            failures: outcome.failures,
        })
    }

    /// Apply a command between ticks. A position set on a node that a
    /// mobility model drives holds until that model's next step.
    pub fn handle_command(&mut self, command: SimulationCommand) -> Result<CommandEffect> {
        match command {
            SimulationCommand::Stop => return Ok(CommandEffect::Stop),
            SimulationCommand::SetPosition { node, position } => {
                let idx = self.world.index_of(&node)?;
                self.world.set_position(idx, position);
                log::info!("{} moved to ({:.1}, {:.1}, {:.1})", node, position.x, position.y, position.z);
            }
            SimulationCommand::SetTxPower { node, wlan, dbm } => {
                let r = self.world.intf_ref(&node, wlan)?;
                self.controller.set_tx_power(&mut self.world, r, dbm)?;
            }
            SimulationCommand::SetRange { node, wlan, meters } => {
                let r = self.world.intf_ref(&node, wlan)?;
                self.controller.set_range(&mut self.world, r, meters)?;
            }
            SimulationCommand::SetAntennaGain { node, wlan, dbi } => {
                let r = self.world.intf_ref(&node, wlan)?;
                self.controller.set_antenna_gain(&mut self.world, r, dbi)?;
            }
            SimulationCommand::SetAntennaHeight { node, wlan, meters } => {
                let r = self.world.intf_ref(&node, wlan)?;
                self.controller.set_antenna_height(&mut self.world, r, meters)?;
            }
            SimulationCommand::SetSpeed { percent } => time_driver::set_speed_percent(percent),
            SimulationCommand::RequestSnapshot => return Ok(CommandEffect::Snapshot(self.snapshot())),
        }
        Ok(CommandEffect::None)
    }
}
