//! Channel daemon configuration file.
//!
//! The daemon reads a libconfig-style text file at startup listing every
//! station MAC (`ifaces.ids`) and the channel model: either explicit link
//! values (SNR or error probability) or the inputs of its own path-loss
//! computation (positions, tx powers, gains and model parameters).

use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, Result};
use crate::propagation::{ModelKind, PathLossParameters};
use crate::simulation::types::Position;
use crate::simulation::world::World;

use super::protocol::MacAddr;

/// How the daemon decides frame delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DaemonMode {
    /// Per-link SNR pushed by the simulation.
    #[default]
    Snr,
    /// Per-link frame error probability pushed by the simulation.
    ErrorProb,
    /// The daemon computes path loss itself from pushed positions.
    Interference,
}

/// Link model section of the daemon config.
#[derive(Debug, Clone, PartialEq)]
pub enum DaemonModel {
    Snr {
        default_snr: i32,
        /// `(station index, station index, snr)`.
        links: Vec<(usize, usize, i32)>,
    },
    ErrorProb {
        default_prob: f64,
        links: Vec<(usize, usize, f64)>,
    },
    PathLoss {
        positions: Vec<Position>,
        tx_powers: Vec<f64>,
        antenna_gains: Vec<f64>,
        params: PathLossParameters,
    },
}

/// Everything needed to cold start the daemon.
#[derive(Debug, Clone, PartialEq)]
pub struct DaemonConfig {
    pub stations: Vec<MacAddr>,
    pub model: DaemonModel,
}

impl DaemonConfig {
    /// Cold start config for every interface in `world`, in interface order.
    /// Explicit link modes start with every link down; the first controller
    /// pass pushes the real values.
    pub fn from_world(world: &World, mode: DaemonMode, params: &PathLossParameters, disconnected_snr: i32) -> Self {
        let refs: Vec<_> = world.interfaces().collect();
        let stations = refs.iter().map(|r| world.intf(*r).mac).collect();
        let model = match mode {
            DaemonMode::Snr => DaemonModel::Snr {
                default_snr: disconnected_snr,
                links: Vec::new(),
            },
            DaemonMode::ErrorProb => DaemonModel::ErrorProb {
                default_prob: 1.0,
                links: Vec::new(),
            },
            DaemonMode::Interference => DaemonModel::PathLoss {
                positions: refs.iter().map(|r| world.position(r.node)).collect(),
                tx_powers: refs.iter().map(|r| world.intf(*r).tx_power).collect(),
                antenna_gains: refs.iter().map(|r| world.intf(*r).antenna_gain).collect(),
                params: params.clone(),
            },
        };
        Self { stations, model }
    }

    fn validate(&self) -> std::result::Result<(), ConfigurationError> {
        let n = self.stations.len();
        let bad_index = |i: usize, j: usize| i >= n || j >= n;
        match &self.model {
            DaemonModel::Snr { links, .. } if links.iter().any(|(i, j, _)| bad_index(*i, *j)) => Err(invalid_links(n)),
            DaemonModel::ErrorProb { default_prob, links } => {
                if links.iter().any(|(i, j, _)| bad_index(*i, *j)) {
                    return Err(invalid_links(n));
                }
                for p in std::iter::once(default_prob).chain(links.iter().map(|(_, _, p)| p)) {
                    if !(0.0..=1.0).contains(p) {
                        return Err(ConfigurationError::InvalidProbability(*p));
                    }
                }
                Ok(())
            }
            DaemonModel::PathLoss {
                positions,
                tx_powers,
                antenna_gains,
                ..
            } if positions.len() != n || tx_powers.len() != n || antenna_gains.len() != n => Err(ConfigurationError::InvalidParameter {
                name: "path_loss",
                reason: format!("expected {n} positions, tx powers and gains"),
            }),
            _ => Ok(()),
        }
    }

    /// Render the config text.
    pub fn render(&self) -> std::result::Result<String, ConfigurationError> {
        self.validate()?;
        let mut out = String::new();
        let ids: Vec<String> = self.stations.iter().map(|m| format!("\t\t\"{m}\"")).collect();
        let _ = writeln!(out, "ifaces :\n{{\n\tids = [\n{}\n\t];\n}};\n", ids.join(",\n"));

        out.push_str("model :\n{\n");
        match &self.model {
            DaemonModel::Snr { default_snr, links } => {
                let _ = writeln!(out, "\ttype = \"snr\";");
                let _ = writeln!(out, "\tdefault_snr = {default_snr};");
                let rows: Vec<String> = links.iter().map(|(i, j, v)| format!("\t\t({i}, {j}, {v})")).collect();
                write_list(&mut out, "links", &rows);
            }
            DaemonModel::ErrorProb { default_prob, links } => {
                let _ = writeln!(out, "\ttype = \"prob\";");
                let _ = writeln!(out, "\tdefault_prob = {default_prob:.6};");
                let rows: Vec<String> = links.iter().map(|(i, j, v)| format!("\t\t({i}, {j}, {v:.6})")).collect();
                write_list(&mut out, "links", &rows);
            }
            DaemonModel::PathLoss {
                positions,
                tx_powers,
                antenna_gains,
                params,
            } => {
                let _ = writeln!(out, "\ttype = \"path_loss\";");
                let rows: Vec<String> = positions.iter().map(|p| format!("\t\t({:.1}, {:.1}, {:.1})", p.x, p.y, p.z)).collect();
                write_list(&mut out, "positions", &rows);
                let _ = writeln!(out, "\ttx_powers = ({});", join_floats(tx_powers));
                let _ = writeln!(out, "\tantenna_gain = ({});", join_floats(antenna_gains));
                let _ = writeln!(out, "\tmodel_name = \"{}\";", params.model.daemon_name());
                write_model_params(&mut out, params);
            }
        }
        out.push_str("};\n");
        Ok(out)
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let text = self.render()?;
        std::fs::write(path, text)?;
        log::info!("Wrote channel daemon config for {} stations to {:?}", self.stations.len(), path);
        Ok(())
    }
}

fn invalid_links(n: usize) -> ConfigurationError {
    ConfigurationError::InvalidParameter {
        name: "links",
        reason: format!("link refers to a station index outside 0..{n}"),
    }
}

fn write_list(out: &mut String, name: &str, rows: &[String]) {
    let _ = writeln!(out, "\t{name} = (\n{}\n\t);", rows.join(",\n"));
}

fn join_floats(values: &[f64]) -> String {
    values.iter().map(|v| format!("{v:.1}")).collect::<Vec<_>>().join(", ")
}

fn write_model_params(out: &mut String, p: &PathLossParameters) {
    match p.model {
        ModelKind::Friis | ModelKind::TwoRayGround => {
            let _ = writeln!(out, "\tsL = {:.1};", p.system_loss);
        }
        ModelKind::LogDistance => {
            let _ = writeln!(out, "\tpath_loss_exp = {:.1};", p.path_loss_exponent);
            let _ = writeln!(out, "\txg = 0.0;");
        }
        ModelKind::LogNormalShadowing => {
            let _ = writeln!(out, "\tpath_loss_exp = {:.1};", p.path_loss_exponent);
            let _ = writeln!(out, "\tsL = {:.1};", p.system_loss);
            let _ = writeln!(out, "\txg = {:.1};", p.shadowing_sigma);
        }
        ModelKind::Itu => {
            let _ = writeln!(out, "\tnFLOORS = {};", p.floors);
            let _ = writeln!(out, "\tlF = {:.1};", p.floor_penetration);
            let _ = writeln!(out, "\tpL = {:.1};", p.itu_coefficient());
        }
        ModelKind::Young => {
            let _ = writeln!(out, "\tcF = {};", p.clutter_factor);
        }
    }
    let _ = writeln!(out, "\tnoise_threshold = {:.1};", p.noise_threshold);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn macs(n: u8) -> Vec<MacAddr> {
        (1..=n).map(|i| MacAddr([2, 0, 0, 0, 0, i])).collect()
    }

    #[test]
    fn snr_config_lists_stations_and_links() {
        let cfg = DaemonConfig {
            stations: macs(2),
            model: DaemonModel::Snr {
                default_snr: -10,
                links: vec![(0, 1, 35), (1, 0, 30)],
            },
        };
        let text = cfg.render().unwrap();
        assert!(text.contains("\"02:00:00:00:00:01\",\n\t\t\"02:00:00:00:00:02\""));
        assert!(text.contains("type = \"snr\";"));
        assert!(text.contains("(0, 1, 35),\n\t\t(1, 0, 30)"));
    }

    #[test]
    fn path_loss_config_carries_model_parameters() {
        let params = PathLossParameters {
            model: ModelKind::LogNormalShadowing,
            path_loss_exponent: 3.5,
            shadowing_sigma: 2.0,
            ..Default::default()
        };
        let cfg = DaemonConfig {
            stations: macs(2),
            model: DaemonModel::PathLoss {
                positions: vec![Position::new(0.0, 0.0, 0.0), Position::new(10.0, 5.0, 1.0)],
                tx_powers: vec![14.0, 20.0],
                antenna_gains: vec![5.0, 5.0],
                params,
            },
        };
        let text = cfg.render().unwrap();
        assert!(text.contains("type = \"path_loss\";"));
        assert!(text.contains("(10.0, 5.0, 1.0)"));
        assert!(text.contains("tx_powers = (14.0, 20.0);"));
        assert!(text.contains("model_name = \"log_normal_shadowing\";"));
        assert!(text.contains("path_loss_exp = 3.5;"));
        assert!(text.contains("xg = 2.0;"));
    }

    #[test]
    fn world_config_lists_every_interface() {
        use crate::simulation::types::{InterfaceMode, Node, Role, WirelessInterface};
        let mut world = World::new();
        world
            .add_node(Node::new("ap1", Role::AccessPoint, Position::new(1.0, 2.0, 0.0)).with_interface(WirelessInterface::new("ap1-wlan1", MacAddr::local(1), InterfaceMode::Master, 1, 2.412)))
            .unwrap();
        world
            .add_node(Node::new("sta1", Role::Station, Position::new(5.0, 0.0, 0.0)).with_interface(WirelessInterface::new("sta1-wlan0", MacAddr::local(2), InterfaceMode::Managed, 1, 2.412)))
            .unwrap();
        let cfg = DaemonConfig::from_world(&world, DaemonMode::Interference, &PathLossParameters::default(), -10);
        assert_eq!(cfg.stations, vec![MacAddr::local(1), MacAddr::local(2)]);
        match &cfg.model {
            DaemonModel::PathLoss { positions, tx_powers, .. } => {
                assert_eq!(positions[1], Position::new(5.0, 0.0, 0.0));
                assert_eq!(tx_powers, &vec![14.0, 14.0]);
            }
            other => panic!("unexpected model {other:?}"),
        }
        let snr = DaemonConfig::from_world(&world, DaemonMode::Snr, &PathLossParameters::default(), -10);
        assert_eq!(snr.model, DaemonModel::Snr { default_snr: -10, links: vec![] });
    }

    #[test]
    fn mismatched_lists_are_rejected() {
        let cfg = DaemonConfig {
            stations: macs(2),
            model: DaemonModel::PathLoss {
                positions: vec![Position::default()],
                tx_powers: vec![14.0, 14.0],
                antenna_gains: vec![5.0, 5.0],
                params: PathLossParameters::default(),
            },
        };
        assert!(cfg.render().is_err());
    }

    #[test]
    fn error_prob_links_must_be_probabilities() {
        let cfg = DaemonConfig {
            stations: macs(2),
            model: DaemonModel::ErrorProb {
                default_prob: 1.0,
                links: vec![(0, 1, 1.5)],
            },
        };
        assert_eq!(cfg.render(), Err(ConfigurationError::InvalidProbability(1.5)));
    }

    #[test]
    fn config_is_written_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wmediumd.cfg");
        let cfg = DaemonConfig {
            stations: macs(1),
            model: DaemonModel::Snr { default_snr: 0, links: vec![] },
        };
        cfg.write_to(&path).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().starts_with("ifaces :"));
    }
}
