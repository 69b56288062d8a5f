//! Type definitions for the simulated wireless world.
//!
//! Contains:
//! - Positions and the radio parameters consumed by the propagation models
//! - Nodes, their roles and wireless interfaces
//! - Per-link derived metrics (distance, rssi, snr, shaping)
//! - Commands and events exchanged with the simulation task

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use serde::{Deserialize, Serialize};

use crate::association::shaping::ShapingParams;
use crate::wmediumd::protocol::{MacAddr, StationId};

/// Depth of the command channel (caller → simulation task).
pub const SIMULATION_COMMAND_QUEUE_SIZE: usize = 16;
/// Bounded channel used to send commands into the simulation task.
pub type SimulationCommandQueue = embassy_sync::channel::Channel<CriticalSectionRawMutex, SimulationCommand, SIMULATION_COMMAND_QUEUE_SIZE>;
/// Receiver side of the command channel.
pub type SimulationCommandReceiver = embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, SimulationCommand, SIMULATION_COMMAND_QUEUE_SIZE>;
/// Sender side of the command channel.
pub type SimulationCommandSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, SimulationCommand, SIMULATION_COMMAND_QUEUE_SIZE>;

/// Depth of the event channel (simulation task → observers). Events are
/// dropped with a warning when observers fall behind.
pub const SIMULATION_EVENT_QUEUE_SIZE: usize = 64;
/// Bounded channel carrying snapshots and transitions out of the loop.
pub type SimulationEventQueue = embassy_sync::channel::Channel<CriticalSectionRawMutex, SimulationEvent, SIMULATION_EVENT_QUEUE_SIZE>;
/// Receiver side of the event channel.
pub type SimulationEventReceiver = embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, SimulationEvent, SIMULATION_EVENT_QUEUE_SIZE>;
/// Sender side of the event channel.
pub type SimulationEventSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, SimulationEvent, SIMULATION_EVENT_QUEUE_SIZE>;

/// 3D position in meters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance_to(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Linear interpolation, `t` clamped to `[0, 1]`.
    pub fn lerp(&self, other: &Position, t: f64) -> Position {
        let t = t.clamp(0.0, 1.0);
        Position {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
            z: self.z + (other.z - self.z) * t,
        }
    }

    pub(crate) fn axis(&self, axis: usize) -> f64 {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    pub(crate) fn axis_mut(&mut self, axis: usize) -> &mut f64 {
        match axis {
            0 => &mut self.x,
            1 => &mut self.y,
            _ => &mut self.z,
        }
    }
}

/// Role a node plays in the emulated network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Station,
    AccessPoint,
    /// Stand-in for a vehicle driven by an external traffic simulator.
    /// Associates like a station.
    VehicleProxy,
}

/// 802.11 operating mode of an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceMode {
    #[default]
    Managed,
    Master,
    Adhoc,
    Mesh,
}

impl InterfaceMode {
    /// Peer-to-peer modes that form symmetric neighbour links.
    pub fn is_peer(self) -> bool {
        matches!(self, InterfaceMode::Adhoc | InterfaceMode::Mesh)
    }
}

/// Position-independent radio attributes seen by the propagation models.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadioParams {
    /// Transmit power (dBm).
    pub tx_power: f64,
    /// Antenna gain (dBi).
    pub antenna_gain: f64,
    /// Antenna height above ground (m).
    pub antenna_height: f64,
    /// Carrier frequency (GHz).
    pub freq_ghz: f64,
}

/// Reference to one wireless interface of one node in a `World`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct IntfRef {
    pub node: usize,
    pub wlan: usize,
}

impl IntfRef {
    pub const fn new(node: usize, wlan: usize) -> Self {
        Self { node, wlan }
    }
}

/// Derived quality of an association or neighbour link.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinkMetrics {
    pub distance: f64,
    pub rssi: f64,
    pub snr: f64,
}

/// A wireless interface with both its static configuration and its
/// position-dependent state.
///
/// Association fields are private; the only way to change them is through
/// `World::associate` / `World::disassociate`, which keep both sides of the
/// relation in step.
#[derive(Debug, Clone)]
pub struct WirelessInterface {
    pub name: String,
    pub mac: MacAddr,
    pub mode: InterfaceMode,
    pub channel: u8,
    pub freq_ghz: f64,
    pub tx_power: f64,
    pub antenna_gain: f64,
    pub antenna_height: f64,
    /// Coverage radius (m), kept in step with `tx_power`.
    pub range: f64,
    pub rssi: f64,
    pub snr: f64,
    /// Last shadowing draw (dB) used for this interface's received power.
    pub gaussian_random: f64,
    /// Daemon-side index, present while registered.
    pub wmediumd_id: Option<StationId>,
    pub(crate) associated_to: Option<IntfRef>,
    pub(crate) associated_stations: BTreeSet<IntfRef>,
    pub(crate) aps_in_range: BTreeMap<IntfRef, f64>,
    pub(crate) neighbors: BTreeMap<IntfRef, LinkMetrics>,
    pub(crate) link: Option<LinkMetrics>,
    pub(crate) applied_shaping: Option<ShapingParams>,
}

impl WirelessInterface {
    pub fn new(name: impl Into<String>, mac: MacAddr, mode: InterfaceMode, channel: u8, freq_ghz: f64) -> Self {
        Self {
            name: name.into(),
            mac,
            mode,
            channel,
            freq_ghz,
            tx_power: 14.0,
            antenna_gain: 5.0,
            antenna_height: 1.0,
            range: 0.0,
            rssi: f64::NEG_INFINITY,
            snr: f64::NEG_INFINITY,
            gaussian_random: 0.0,
            wmediumd_id: None,
            associated_to: None,
            associated_stations: BTreeSet::new(),
            aps_in_range: BTreeMap::new(),
            neighbors: BTreeMap::new(),
            link: None,
            applied_shaping: None,
        }
    }

    pub fn radio(&self) -> RadioParams {
        RadioParams {
            tx_power: self.tx_power,
            antenna_gain: self.antenna_gain,
            antenna_height: self.antenna_height,
            freq_ghz: self.freq_ghz,
        }
    }

    pub fn associated_to(&self) -> Option<IntfRef> {
        self.associated_to
    }

    pub fn associated_stations(&self) -> &BTreeSet<IntfRef> {
        &self.associated_stations
    }

    pub fn aps_in_range(&self) -> &BTreeMap<IntfRef, f64> {
        &self.aps_in_range
    }

    pub fn neighbors(&self) -> &BTreeMap<IntfRef, LinkMetrics> {
        &self.neighbors
    }

    pub fn link(&self) -> Option<LinkMetrics> {
        self.link
    }
}

/// Node with a mutable position and its wireless interfaces.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub role: Role,
    pub position: Position,
    pub interfaces: Vec<WirelessInterface>,
}

impl Node {
    pub fn new(name: impl Into<String>, role: Role, position: Position) -> Self {
        Self {
            name: name.into(),
            role,
            position,
            interfaces: Vec::new(),
        }
    }

    pub fn with_interface(mut self, intf: WirelessInterface) -> Self {
        self.interfaces.push(intf);
        self
    }
}

/// Immutable copy of one interface for observers.
#[derive(Debug, Clone, Serialize)]
pub struct InterfaceSnapshot {
    pub name: String,
    pub mac: String,
    pub tx_power: f64,
    pub range: f64,
    pub rssi: f64,
    pub snr: f64,
    /// Name of the access point node this interface is associated to.
    pub associated_to: Option<String>,
    pub associated_stations: Vec<String>,
    pub neighbors: Vec<String>,
}

/// Immutable copy of one node for observers.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    pub name: String,
    pub role: Role,
    pub position: Position,
    pub interfaces: Vec<InterfaceSnapshot>,
}

/// State of the whole world at the end of a tick.
#[derive(Debug, Clone, Serialize)]
pub struct WorldSnapshot {
    pub tick: u64,
    pub timestamp: DateTime<Utc>,
    pub nodes: Vec<NodeSnapshot>,
}

/// Commands accepted by the simulation task between ticks.
#[derive(Debug, Clone)]
pub enum SimulationCommand {
    Stop,
    SetPosition { node: String, position: Position },
    SetTxPower { node: String, wlan: usize, dbm: f64 },
    SetRange { node: String, wlan: usize, meters: f64 },
    SetAntennaGain { node: String, wlan: usize, dbi: f64 },
    SetAntennaHeight { node: String, wlan: usize, meters: f64 },
    /// Simulation clock speed in percent of wall time.
    SetSpeed { percent: u32 },
    RequestSnapshot,
}

/// Association-level transitions emitted by the controller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LinkEvent {
    Associated { station: String, wlan: usize, ap: String },
    Disassociated { station: String, wlan: usize, ap: String },
    Handover { station: String, wlan: usize, from: String, to: String },
    PeerUp { a: String, b: String },
    PeerDown { a: String, b: String },
}

/// Output of the simulation task.
#[derive(Debug, Clone)]
pub enum SimulationEvent {
    Snapshot(WorldSnapshot),
    Link(LinkEvent),
    Alert(String),
    Stopped { tick: u64 },
}
