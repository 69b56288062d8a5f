//! Wireless channel simulation and daemon sync engine.
//!
//! The engine keeps the radio-level state of an emulated wireless network
//! consistent over time. Nodes move (`mobility`), their received signal
//! strength follows from the distance between them (`propagation`), stations
//! associate to and hand over between access points (`association`), and the
//! resulting link quality is either applied as local shaping or pushed to the
//! external packet-level channel daemon (`wmediumd`). `simulation` runs the
//! whole thing as a single-writer tick loop on an embassy executor thread.

pub mod association;
pub mod common;
pub mod control;
pub mod error;
pub mod mobility;
pub mod propagation;
pub mod simulation;
pub mod time_driver;
pub mod wmediumd;

pub use error::{Error, Result};
