//! Synchronisation with the external packet-level channel daemon.
//!
//! - `protocol`: message layouts of the daemon's control socket
//! - `client`: the request/response bridge
//! - `config`: cold-start config file generation
//! - `launcher`: daemon process start/stop

pub mod client;
pub mod config;
pub mod launcher;
pub mod protocol;

pub use client::ChannelBridge;
pub use config::{DaemonConfig, DaemonMode, DaemonModel};
pub use launcher::{DaemonProcess, LaunchOptions, adopt_world, launch, register_world};
