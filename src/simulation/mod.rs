//! Simulation core.
//!
//! - `types`: positions, nodes, interfaces, snapshots, commands and events
//! - `world`: node storage and the only mutation path for associations
//! - `simulation_loop`: the single-writer tick (mobility, then association)
//! - `simulation_task`: the embassy task and executor thread around the loop

pub mod simulation_loop;
pub mod simulation_task;
pub mod types;
pub mod world;

pub use simulation_loop::{CommandEffect, ManagedMobility, SimulationLoop, TickReport};
pub use simulation_task::{LoopSettings, SimulationHandle, simulation_task, spawn_simulation};
pub use world::World;
