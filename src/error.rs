//! Error types for the channel simulation engine.
//!
//! Errors fall into four families:
//! - `Protocol`: the channel daemon answered with something other than success
//! - `Configuration`: a propagation or scene parameter is not physical
//! - `Consistency`: the association relation lost its inverse
//! - transient I/O (`Io`, `Timeout`, `DaemonUnavailable`)

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::wmediumd::protocol::{MacAddr, UpdateStatus};

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("consistency error: {0}")]
    Consistency(#[from] ConsistencyError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("no response from channel daemon within {0:?}")]
    Timeout(Duration),

    #[error("channel daemon not reachable at {path:?} after {waited:?}")]
    DaemonUnavailable { path: PathBuf, waited: Duration },

    #[error("unknown node {0}")]
    UnknownNode(String),

    #[error("node {node} has no wireless interface {wlan}")]
    UnknownInterface { node: String, wlan: usize },

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Daemon protocol failures. Never retried automatically.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("expected response type {expected}, got {got}")]
    UnexpectedResponseType { expected: u8, got: u8 },

    #[error("request {tag} for {mac} rejected with status {status:?}")]
    Status { tag: u8, mac: MacAddr, status: UpdateStatus },

    #[error("response does not echo the in-flight request (type {tag})")]
    EchoMismatch { tag: u8 },

    #[error("connection poisoned by an earlier unanswered request")]
    Poisoned,

    #[error("station {0} is not registered with the daemon")]
    UnknownStation(MacAddr),

    #[error("invalid MAC address {0:?}")]
    InvalidMac(String),
}

/// Non-physical channel or scene configuration. Fatal for setup.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("required tx power {0:.2} dBm is below 1 dBm")]
    InvalidPower(f64),

    #[error("inverse propagation yields non-physical range {0}")]
    NonPhysicalRange(f64),

    #[error("probability {0} outside [0, 1]")]
    InvalidProbability(f64),

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// Association relation no longer matches its inverse.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConsistencyError {
    #[error("station {station} appears {count} times in associated lists")]
    DuplicateStation { station: String, count: usize },

    #[error("station {station} is associated to {ap} but missing from its list")]
    MissingFromAccessPoint { station: String, ap: String },

    #[error("access point {ap} lists {station} which is not associated to it")]
    StaleStation { station: String, ap: String },

    #[error("interface {0} is not an access point")]
    NotAnAccessPoint(String),
}
