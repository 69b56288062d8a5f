//! Scene loading, parsing, and validation logic.
//!
//! A scene describes the emulated network: nodes with their wireless
//! interfaces, the propagation model, optional mobility, the handover policy,
//! local link shaping and the channel daemon mode. Loading validates the whole
//! file up front so that building the world and the generators afterwards can
//! only fail on physics (an interface whose range needs an impossible tx power).

use anyhow::Context;
use rand::Rng;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;

use crate::association::{AssociationController, AssociationPolicy, ShapingConfig};
use crate::error::{Error, Result};
use crate::mobility::distributions::uniform_position;
use crate::mobility::{BorderPolicy, ControlledMobility, MobilityGenerator, MobilityModel, NodeBounds, Trajectory, Waypoint};
use crate::propagation::signal_calculations::channel_to_freq_ghz;
use crate::propagation::{PathLossParameters, PropagationModel};
use crate::simulation::types::{InterfaceMode, Node, Position, Role, WirelessInterface};
use crate::simulation::ManagedMobility;
use crate::simulation::world::World;
use crate::wmediumd::DaemonMode;
use crate::wmediumd::protocol::MacAddr;

/// Error type for scene loading failures.
#[derive(Debug)]
pub enum SceneLoadError {
    FileReadError(String),
    ParseError(String),
    ValidationError(String),
}

impl std::fmt::Display for SceneLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SceneLoadError::FileReadError(msg) => write!(f, "Failed to read file: {}", msg),
            SceneLoadError::ParseError(msg) => write!(f, "Failed to parse JSON: {}", msg),
            SceneLoadError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for SceneLoadError {}

fn default_channel() -> u8 {
    1
}
fn default_tx_power() -> f64 {
    14.0
}
fn default_antenna_gain() -> f64 {
    5.0
}
fn default_antenna_height() -> f64 {
    1.0
}
fn default_velocity() -> (f64, f64) {
    (0.1, 1.0)
}
fn default_start_from_current() -> bool {
    true
}

/// One wireless interface of a node.
#[derive(Debug, Deserialize, Clone)]
pub struct InterfaceConfig {
    /// Defaults to `master` on access points and `managed` elsewhere.
    #[serde(default)]
    pub mode: Option<InterfaceMode>,
    #[serde(default = "default_channel")]
    pub channel: u8,
    /// Overrides the frequency derived from `channel`.
    #[serde(default)]
    pub freq_ghz: Option<f64>,
    #[serde(default = "default_tx_power")]
    pub tx_power: f64,
    #[serde(default = "default_antenna_gain")]
    pub antenna_gain: f64,
    #[serde(default = "default_antenna_height")]
    pub antenna_height: f64,
    /// Coverage radius (m). When set, tx power is derived from it.
    #[serde(default)]
    pub range: Option<f64>,
    /// Locally administered address when absent.
    #[serde(default)]
    pub mac: Option<String>,
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            mode: None,
            channel: default_channel(),
            freq_ghz: None,
            tx_power: default_tx_power(),
            antenna_gain: default_antenna_gain(),
            antenna_height: default_antenna_height(),
            range: None,
            mac: None,
        }
    }
}

/// Node structure with position and interfaces.
#[derive(Debug, Deserialize, Clone)]
pub struct NodeConfig {
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub position: Position,
    /// A single default interface when empty.
    #[serde(default)]
    pub interfaces: Vec<InterfaceConfig>,
}

/// Rectangular (or box) area.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Area {
    pub min: Position,
    pub max: Position,
}

/// Per-node limits that replace the mobility defaults.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct NodeMobilityOverride {
    #[serde(default)]
    pub min: Option<Position>,
    #[serde(default)]
    pub max: Option<Position>,
    #[serde(default)]
    pub velocity: Option<(f64, f64)>,
}

/// Mobility section of a scene.
#[derive(Debug, Deserialize, Clone)]
pub struct MobilityConfig {
    /// Stochastic model driving the managed nodes.
    #[serde(default)]
    pub model: Option<MobilityModel>,
    #[serde(default)]
    pub border: BorderPolicy,
    pub area: Area,
    /// Default `(min, max)` speed in m/s.
    #[serde(default = "default_velocity")]
    pub velocity: (f64, f64),
    /// Nodes moved by `model`. Empty selects every non access point node
    /// without a scripted trajectory.
    #[serde(default)]
    pub nodes: Vec<String>,
    #[serde(default)]
    pub overrides: BTreeMap<String, NodeMobilityOverride>,
    /// Start from the scene positions instead of random ones.
    #[serde(default = "default_start_from_current")]
    pub start_from_current: bool,
    /// Scripted trajectories by node name.
    #[serde(default)]
    pub controlled: BTreeMap<String, Vec<Waypoint>>,
}

/// Root structure representing the entire scene.
#[derive(Debug, Deserialize)]
pub struct Scene {
    #[serde(default)]
    pub propagation: PathLossParameters,
    /// All nodes present in the scene.
    pub nodes: Vec<NodeConfig>,
    #[serde(default)]
    pub mobility: Option<MobilityConfig>,
    #[serde(default)]
    pub association: AssociationPolicy,
    /// Local shaping of station links. Ignored while the channel daemon runs.
    #[serde(default)]
    pub shaping: Option<ShapingConfig>,
    #[serde(default)]
    pub daemon_mode: DaemonMode,
}

/// Load and parse a scene from a file.
///
/// # Parameters
///
/// * `path` - Path to the scene JSON file
///
/// # Returns
///
/// Parsed and validated Scene or an error.
pub fn load_scene(path: &str) -> std::result::Result<Scene, SceneLoadError> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path))
        .map_err(|e| SceneLoadError::FileReadError(e.to_string()))?;
    parse_scene(&data)
}

/// Parse and validate scene JSON.
pub fn parse_scene(data: &str) -> std::result::Result<Scene, SceneLoadError> {
    let scene: Scene = serde_json::from_str(data)
        .context("Invalid JSON format")
        .map_err(|e| SceneLoadError::ParseError(format!("{:#}", e)))?;

    validate_scene(&scene).map_err(SceneLoadError::ValidationError)?;

    Ok(scene)
}

/// Validate scene configuration.
///
/// # Returns
///
/// `Ok(())` if validation passes, `Err(String)` with error description otherwise.
pub fn validate_scene(scene: &Scene) -> std::result::Result<(), String> {
    const MAX_NODES: usize = 10000;
    const MIN_TX_POWER: f64 = -50.0;
    const MAX_TX_POWER: f64 = 50.0;

    if scene.nodes.is_empty() {
        return Err("Scene must contain at least one node".to_string());
    }
    if scene.nodes.len() > MAX_NODES {
        return Err(format!("Node count {} exceeds maximum of {}", scene.nodes.len(), MAX_NODES));
    }

    let mut names = HashSet::new();
    for node in &scene.nodes {
        if !names.insert(node.name.as_str()) {
            return Err(format!("Duplicate node name found: {}", node.name));
        }
    }

    let mut macs = HashSet::new();
    for node in &scene.nodes {
        for (wlan, intf) in node.interfaces.iter().enumerate() {
            if intf.tx_power < MIN_TX_POWER || intf.tx_power > MAX_TX_POWER {
                return Err(format!(
                    "Node {} wlan{} tx_power {} dBm outside realistic range ({} to {} dBm)",
                    node.name, wlan, intf.tx_power, MIN_TX_POWER, MAX_TX_POWER
                ));
            }
            if let Some(range) = intf.range {
                if range <= 0.0 {
                    return Err(format!("Node {} wlan{} range must be positive", node.name, wlan));
                }
            }
            if let Some(freq) = intf.freq_ghz {
                if freq <= 0.0 {
                    return Err(format!("Node {} wlan{} freq_ghz must be positive", node.name, wlan));
                }
            }
            if let Some(mac) = &intf.mac {
                let parsed: MacAddr = mac.parse().map_err(|e| format!("Node {} wlan{}: {}", node.name, wlan, e))?;
                if !macs.insert(parsed) {
                    return Err(format!("Duplicate mac found: {}", mac));
                }
            }
        }
        if node.role == Role::AccessPoint && !node.interfaces.is_empty() && !node.interfaces.iter().any(|i| i.mode.is_none() || i.mode == Some(InterfaceMode::Master)) {
            return Err(format!("Access point {} has no master interface", node.name));
        }
    }

    scene.propagation.validate().map_err(|e| e.to_string())?;

    if scene.association.ssf_margin < 0.0 {
        return Err("Invalid ssf_margin, must be non-negative".to_string());
    }

    if let Some(mobility) = &scene.mobility {
        let area = NodeBounds::new(mobility.area.min, mobility.area.max, mobility.velocity);
        area.validate().map_err(|e| e.to_string())?;
        for name in mobility.nodes.iter().chain(mobility.overrides.keys()).chain(mobility.controlled.keys()) {
            if !names.contains(name.as_str()) {
                return Err(format!("Mobility refers to unknown node {}", name));
            }
        }
        for name in &mobility.nodes {
            if mobility.controlled.contains_key(name) {
                return Err(format!("Node {} is both randomly moved and scripted", name));
            }
        }
        for (name, waypoints) in &mobility.controlled {
            if waypoints.is_empty() {
                return Err(format!("Node {} has an empty trajectory", name));
            }
            if waypoints.iter().any(|w| w.time < 0.0) {
                return Err(format!("Node {} has a waypoint before time 0", name));
            }
        }
    }

    Ok(())
}

impl Scene {
    /// Build the world. Interfaces without a MAC get `02:00:xx:xx:xx:xx`
    /// addresses numbered in scene order, skipping any given explicitly.
    pub fn build_world(&self) -> Result<World> {
        let taken: HashSet<MacAddr> = self
            .nodes
            .iter()
            .flat_map(|n| n.interfaces.iter())
            .filter_map(|i| i.mac.as_deref())
            .filter_map(|m| m.parse().ok())
            .collect();
        let mut next_local = 1u32;
        let mut world = World::new();

        for node in &self.nodes {
            let default_mode = if node.role == Role::AccessPoint { InterfaceMode::Master } else { InterfaceMode::Managed };
            let default_intf = [InterfaceConfig::default()];
            let configs: &[InterfaceConfig] = if node.interfaces.is_empty() { &default_intf } else { &node.interfaces };

            let mut built = Node::new(node.name.clone(), node.role, node.position);
            for (wlan, cfg) in configs.iter().enumerate() {
                let mac = match &cfg.mac {
                    Some(m) => m.parse::<MacAddr>()?,
                    None => loop {
                        let candidate = MacAddr::local(next_local);
                        next_local += 1;
                        if !taken.contains(&candidate) {
                            break candidate;
                        }
                    },
                };
                let freq = cfg.freq_ghz.unwrap_or_else(|| channel_to_freq_ghz(cfg.channel));
                let mut intf = WirelessInterface::new(format!("{}-wlan{}", node.name, wlan), mac, cfg.mode.unwrap_or(default_mode), cfg.channel, freq);
                intf.tx_power = cfg.tx_power;
                intf.antenna_gain = cfg.antenna_gain;
                intf.antenna_height = cfg.antenna_height;
                built.interfaces.push(intf);
            }
            world.add_node(built)?;
        }
        log::info!("Built world with {} nodes", world.len());
        Ok(world)
    }

    pub fn propagation_model(&self) -> Result<PropagationModel> {
        Ok(PropagationModel::new(self.propagation.clone())?)
    }

    /// Interfaces whose range is given in the scene, as `(node, wlan, meters)`.
    pub fn explicit_ranges(&self) -> Vec<(String, usize, f64)> {
        self.nodes
            .iter()
            .flat_map(|n| n.interfaces.iter().enumerate().filter_map(move |(w, i)| i.range.map(|r| (n.name.clone(), w, r))))
            .collect()
    }

    /// Apply the scene's explicit ranges, deriving tx power from them, then
    /// give every other interface the range its tx power reaches.
    pub fn apply_ranges(&self, world: &mut World, controller: &mut AssociationController) -> Result<()> {
        for (node, wlan, meters) in self.explicit_ranges() {
            let r = world.intf_ref(&node, wlan)?;
            controller.set_range(world, r, meters)?;
        }
        controller.init_ranges(world)
    }

    /// Scripted trajectories keyed by world node index.
    pub fn controlled_mobility(&self, world: &World) -> Result<ControlledMobility> {
        let mut controlled = ControlledMobility::new();
        if let Some(mobility) = &self.mobility {
            for (name, waypoints) in &mobility.controlled {
                let node = world.index_of(name)?;
                controlled.insert(node, Trajectory::new(waypoints.clone())?);
            }
        }
        Ok(controlled)
    }

    /// Start the stochastic model, if the scene has one.
    pub fn mobility_generator<R: Rng + ?Sized>(&self, world: &World, rng: &mut R) -> Result<Option<ManagedMobility>> {
        let Some(mobility) = &self.mobility else {
            return Ok(None);
        };
        let Some(model) = &mobility.model else {
            return Ok(None);
        };

        let nodes: Vec<usize> = if mobility.nodes.is_empty() {
            (0..world.len())
                .filter(|&n| world.node(n).role != Role::AccessPoint && !mobility.controlled.contains_key(&world.node(n).name))
                .collect()
        } else {
            mobility.nodes.iter().map(|name| world.index_of(name)).collect::<Result<_>>()?
        };
        if nodes.is_empty() {
            log::warn!("Mobility model configured but no node to move");
            return Ok(None);
        }

        let area = NodeBounds::new(mobility.area.min, mobility.area.max, mobility.velocity);
        let bounds: Vec<NodeBounds> = nodes
            .iter()
            .map(|&n| {
                let o = mobility.overrides.get(&world.node(n).name).cloned().unwrap_or_default();
                NodeBounds::new(o.min.unwrap_or(area.min), o.max.unwrap_or(area.max), o.velocity.unwrap_or(area.velocity))
            })
            .collect();
        let initial: Vec<Position> = if mobility.start_from_current {
            nodes.iter().map(|&n| world.position(n)).collect()
        } else {
            bounds.iter().map(|b| uniform_position(rng, &b.min, &b.max)).collect()
        };

        let generator = MobilityGenerator::new(rng, model, mobility.border, area, bounds, initial).map_err(Error::Configuration)?;
        log::info!("Mobility {:?} drives {} nodes", model, nodes.len());
        Ok(Some(ManagedMobility { generator, nodes }))
    }

    /// Run time of the longest scripted trajectory.
    pub fn scripted_end_time(&self) -> Option<f64> {
        self.mobility
            .as_ref()
            .and_then(|m| m.controlled.values().filter_map(|w| w.iter().map(|w| w.time).reduce(f64::max)).reduce(f64::max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::association::PolicyKind;
    use crate::mobility::PositionGenerator;
    use crate::propagation::ModelKind;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const SCENE: &str = r#"{
        "propagation": {"model": "log_distance", "path_loss_exponent": 3.0},
        "nodes": [
            {"name": "ap1", "role": "access-point", "position": {"x": 0.0, "y": 0.0}, "interfaces": [{"channel": 6, "range": 150.0}]},
            {"name": "sta1", "role": "station", "position": {"x": 10.0, "y": 0.0}},
            {"name": "sta2", "role": "station", "position": {"x": 20.0, "y": 0.0}, "interfaces": [{"mac": "02:00:00:00:00:01"}]},
            {"name": "car1", "role": "vehicle-proxy", "position": {"x": 5.0, "y": 5.0}}
        ],
        "mobility": {
            "model": {"model": "random_walk", "step_length": 5.0},
            "area": {"min": {"x": 0.0, "y": 0.0}, "max": {"x": 100.0, "y": 100.0}},
            "nodes": ["sta1", "sta2"],
            "overrides": {"sta2": {"velocity": [1.0, 2.0]}},
            "controlled": {"car1": [{"time": 0.0, "position": {"x": 5.0, "y": 5.0}}, {"time": 10.0, "position": {"x": 50.0, "y": 5.0}}]}
        },
        "association": {"kind": "ssf", "ssf_margin": 0.5},
        "daemon_mode": "interference"
    }"#;

    #[test]
    fn scene_builds_world_and_generators() {
        let scene = parse_scene(SCENE).unwrap();
        assert_eq!(scene.association.kind, PolicyKind::Ssf);
        assert_eq!(scene.association.ssf_margin, 0.5);
        assert_eq!(scene.daemon_mode, DaemonMode::Interference);
        assert_eq!(scene.propagation.model, ModelKind::LogDistance);

        let world = scene.build_world().unwrap();
        assert_eq!(world.len(), 4);
        let ap = world.intf(world.intf_ref("ap1", 0).unwrap());
        assert_eq!(ap.mode, InterfaceMode::Master);
        assert!((ap.freq_ghz - 2.437).abs() < 1e-9);
        let sta1 = world.intf(world.intf_ref("sta1", 0).unwrap());
        assert_eq!(sta1.mode, InterfaceMode::Managed);
        // 02:00:00:00:00:01 is taken by sta2, so generated addresses skip it.
        assert_eq!(ap.mac, MacAddr::local(2));
        assert_eq!(sta1.mac, MacAddr::local(3));
        assert_eq!(scene.explicit_ranges(), vec![("ap1".to_string(), 0, 150.0)]);

        let mut rng = StdRng::seed_from_u64(3);
        let managed = scene.mobility_generator(&world, &mut rng).unwrap().unwrap();
        assert_eq!(managed.nodes, vec![1, 2]);
        assert_eq!(managed.generator.positions()[0], Position::new(10.0, 0.0, 0.0));

        let controlled = scene.controlled_mobility(&world).unwrap();
        assert_eq!(controlled.positions_at(5.0), vec![(3, Position::new(27.5, 5.0, 0.0))]);
        assert_eq!(scene.scripted_end_time(), Some(10.0));
    }

    #[test]
    fn ranges_and_tx_power_are_coupled_at_load() {
        use crate::association::LinkSideEffect;
        let scene = parse_scene(SCENE).unwrap();
        let mut world = scene.build_world().unwrap();
        let mut controller = AssociationController::new(scene.propagation_model().unwrap(), scene.association, LinkSideEffect::None);
        scene.apply_ranges(&mut world, &mut controller).unwrap();

        let model = scene.propagation_model().unwrap();
        let ap = world.intf(world.intf_ref("ap1", 0).unwrap());
        assert_eq!(ap.range, 150.0);
        assert!((ap.tx_power - model.required_tx_power(150.0, &ap.radio()).unwrap()).abs() < 1e-9);
        let sta = world.intf(world.intf_ref("sta1", 0).unwrap());
        assert!((sta.range - model.max_distance_for_threshold(&sta.radio()).unwrap()).abs() < 1e-9);
    }

    #[test]
    fn default_mobility_nodes_skip_aps_and_scripted_nodes() {
        let mut scene = parse_scene(SCENE).unwrap();
        if let Some(m) = scene.mobility.as_mut() {
            m.nodes.clear();
        }
        let world = scene.build_world().unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let managed = scene.mobility_generator(&world, &mut rng).unwrap().unwrap();
        assert_eq!(managed.nodes, vec![1, 2]);
    }

    #[test]
    fn validation_rejects_bad_scenes() {
        let dup = r#"{"nodes": [{"name": "a", "role": "station"}, {"name": "a", "role": "station"}]}"#;
        assert!(matches!(parse_scene(dup), Err(SceneLoadError::ValidationError(m)) if m.contains("Duplicate")));

        let sigma = r#"{"propagation": {"shadowing_sigma": -1.0}, "nodes": [{"name": "a", "role": "station"}]}"#;
        assert!(matches!(parse_scene(sigma), Err(SceneLoadError::ValidationError(_))));

        let ap = r#"{"nodes": [{"name": "ap", "role": "access-point", "interfaces": [{"mode": "managed"}]}]}"#;
        assert!(matches!(parse_scene(ap), Err(SceneLoadError::ValidationError(m)) if m.contains("master")));

        let unknown = r#"{"nodes": [{"name": "a", "role": "station"}],
            "mobility": {"area": {"min": {"x": 0, "y": 0}, "max": {"x": 10, "y": 10}}, "nodes": ["b"]}}"#;
        assert!(matches!(parse_scene(unknown), Err(SceneLoadError::ValidationError(m)) if m.contains("unknown node")));

        let area = r#"{"nodes": [{"name": "a", "role": "station"}],
            "mobility": {"area": {"min": {"x": 10, "y": 0}, "max": {"x": 0, "y": 10}}}}"#;
        assert!(matches!(parse_scene(area), Err(SceneLoadError::ValidationError(_))));

        assert!(matches!(parse_scene("{"), Err(SceneLoadError::ParseError(_))));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("none.json");
        assert!(matches!(load_scene(path.to_str().unwrap()), Err(SceneLoadError::FileReadError(_))));
        let path = dir.path().join("scene.json");
        std::fs::write(&path, r#"{"nodes": [{"name": "sta1", "role": "station"}]}"#).unwrap();
        let scene = load_scene(path.to_str().unwrap()).unwrap();
        assert!(scene.mobility.is_none());
        assert_eq!(scene.build_world().unwrap().node(0).interfaces.len(), 1);
    }
}
