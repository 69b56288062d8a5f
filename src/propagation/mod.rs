//! Signal-strength physics.
//!
//! - `signal_calculations`: unit conversions, the free-space path-loss core,
//!   channel → frequency mapping
//! - `models`: the six propagation models and their inverses

pub mod models;
pub mod signal_calculations;

pub use models::{ModelKind, PathLossParameters, PropagationModel};
