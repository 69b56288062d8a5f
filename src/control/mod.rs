//! Runtime configuration for a simulation run.

pub mod config;

pub use config::{DaemonSettings, RuntimeConfig};
