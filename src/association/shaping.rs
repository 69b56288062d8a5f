//! Local link shaping: how link quality maps to bandwidth, loss and latency,
//! and how those values reach an interface.

use std::fmt;
use std::process::Command;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::simulation::types::LinkMetrics;

/// Traffic-control parameters for one interface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ShapingParams {
    pub bandwidth_mbit: f64,
    pub loss_percent: f64,
    pub latency_ms: f64,
}

impl ShapingParams {
    /// Rounded to what `tc` can express, so tiny drifts do not trigger a
    /// reconfiguration.
    pub fn rounded(self) -> Self {
        let r = |v: f64| (v * 100.0).round() / 100.0;
        Self {
            bandwidth_mbit: r(self.bandwidth_mbit),
            loss_percent: r(self.loss_percent),
            latency_ms: r(self.latency_ms),
        }
    }

    /// Applied while a station has no access point: floor rate, every frame
    /// dropped.
    pub fn disconnected() -> Self {
        Self {
            bandwidth_mbit: 0.01,
            loss_percent: 100.0,
            latency_ms: 0.0,
        }
    }
}

/// One row of a rate table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateEntry {
    /// Lowest rssi (dBm) at which this rate is reachable.
    pub min_rssi: f64,
    pub bandwidth_mbit: f64,
}

/// 802.11g rates and their usual sensitivity thresholds.
pub fn default_rate_table() -> Vec<RateEntry> {
    [(-65.0, 54.0), (-66.0, 48.0), (-70.0, 36.0), (-74.0, 24.0), (-77.0, 18.0), (-79.0, 12.0), (-81.0, 9.0), (-82.0, 6.0)]
        .into_iter()
        .map(|(min_rssi, bandwidth_mbit)| RateEntry { min_rssi, bandwidth_mbit })
        .collect()
}

/// Typed replacement for free-form link equations.
pub type ShapingFn = Arc<dyn Fn(&LinkMetrics) -> ShapingParams + Send + Sync>;

/// Strategy selected at configuration time.
#[derive(Clone)]
pub enum ShapingStrategy {
    /// Bandwidth from the highest rate whose threshold the rssi meets;
    /// loss and latency grow with distance.
    RateTable(Vec<RateEntry>),
    /// Bandwidth decays by 1 % per meter from `base_mbit`.
    DistanceDecay { base_mbit: f64 },
    Custom(ShapingFn),
}

impl fmt::Debug for ShapingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapingStrategy::RateTable(t) => f.debug_tuple("RateTable").field(t).finish(),
            ShapingStrategy::DistanceDecay { base_mbit } => f.debug_struct("DistanceDecay").field("base_mbit", base_mbit).finish(),
            ShapingStrategy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

fn distance_loss(distance: f64) -> f64 {
    (distance * 2.0 / 1000.0).min(100.0)
}

fn distance_latency(distance: f64) -> f64 {
    distance / 10.0 + 1.0
}

impl ShapingStrategy {
    pub fn params(&self, link: &LinkMetrics) -> ShapingParams {
        match self {
            ShapingStrategy::RateTable(table) => {
                let fallback = table.iter().map(|e| e.bandwidth_mbit).reduce(f64::min).unwrap_or(1.0);
                let bandwidth_mbit = table
                    .iter()
                    .filter(|e| link.rssi >= e.min_rssi)
                    .map(|e| e.bandwidth_mbit)
                    .reduce(f64::max)
                    .unwrap_or(fallback);
                ShapingParams {
                    bandwidth_mbit,
                    loss_percent: distance_loss(link.distance),
                    latency_ms: distance_latency(link.distance),
                }
            }
            ShapingStrategy::DistanceDecay { base_mbit } => ShapingParams {
                bandwidth_mbit: base_mbit * 1.01f64.powf(-link.distance),
                loss_percent: distance_loss(link.distance),
                latency_ms: distance_latency(link.distance),
            },
            ShapingStrategy::Custom(f) => f(link),
        }
    }
}

/// Serialisable strategy selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ShapingConfig {
    RateTable {
        #[serde(default = "default_rate_table")]
        table: Vec<RateEntry>,
    },
    DistanceDecay {
        base_mbit: f64,
    },
}

impl Default for ShapingConfig {
    fn default() -> Self {
        ShapingConfig::RateTable { table: default_rate_table() }
    }
}

impl From<&ShapingConfig> for ShapingStrategy {
    fn from(cfg: &ShapingConfig) -> Self {
        match cfg {
            ShapingConfig::RateTable { table } => ShapingStrategy::RateTable(table.clone()),
            ShapingConfig::DistanceDecay { base_mbit } => ShapingStrategy::DistanceDecay { base_mbit: *base_mbit },
        }
    }
}

/// Applies shaping parameters to a named interface.
pub trait LinkShaper: Send {
    fn apply_link_shaping(&mut self, interface: &str, bandwidth_mbit: f64, loss_percent: f64, latency_ms: f64) -> Result<()>;
}

/// Only logs what would be applied.
#[derive(Debug, Default)]
pub struct LogShaper;

impl LinkShaper for LogShaper {
    fn apply_link_shaping(&mut self, interface: &str, bandwidth_mbit: f64, loss_percent: f64, latency_ms: f64) -> Result<()> {
        log::debug!("shape {}: {} Mbit/s, {}% loss, {} ms", interface, bandwidth_mbit, loss_percent, latency_ms);
        Ok(())
    }
}

/// Shapes through `tc ... netem`.
#[derive(Debug, Clone)]
pub struct NetemShaper {
    tc: String,
}

impl Default for NetemShaper {
    fn default() -> Self {
        Self { tc: "tc".to_string() }
    }
}

impl NetemShaper {
    pub fn with_binary(tc: impl Into<String>) -> Self {
        Self { tc: tc.into() }
    }

    pub fn args(interface: &str, bandwidth_mbit: f64, loss_percent: f64, latency_ms: f64) -> Vec<String> {
        let mut args: Vec<String> = ["qdisc", "replace", "dev", interface, "root", "netem"].iter().map(|s| s.to_string()).collect();
        args.extend([
            "rate".to_string(),
            format!("{bandwidth_mbit}mbit"),
            "loss".to_string(),
            format!("{loss_percent}%"),
            "delay".to_string(),
            format!("{latency_ms}ms"),
        ]);
        args
    }
}

impl LinkShaper for NetemShaper {
    fn apply_link_shaping(&mut self, interface: &str, bandwidth_mbit: f64, loss_percent: f64, latency_ms: f64) -> Result<()> {
        let output = Command::new(&self.tc).args(Self::args(interface, bandwidth_mbit, loss_percent, latency_ms)).output()?;
        if !output.status.success() {
            return Err(Error::Other(anyhow::anyhow!(
                "tc failed on {}: {}",
                interface,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(distance: f64, rssi: f64) -> LinkMetrics {
        LinkMetrics { distance, rssi, snr: rssi + 91.0 }
    }

    #[test]
    fn rate_table_picks_highest_reachable_rate() {
        let s = ShapingStrategy::RateTable(default_rate_table());
        assert_eq!(s.params(&link(5.0, -40.0)).bandwidth_mbit, 54.0);
        assert_eq!(s.params(&link(5.0, -75.0)).bandwidth_mbit, 18.0);
        assert_eq!(s.params(&link(5.0, -95.0)).bandwidth_mbit, 6.0);
    }

    #[test]
    fn distance_decay_formulas() {
        let s = ShapingStrategy::DistanceDecay { base_mbit: 11.0 };
        let p = s.params(&link(100.0, -70.0));
        assert!((p.bandwidth_mbit - 11.0 * 1.01f64.powf(-100.0)).abs() < 1e-12);
        assert!((p.loss_percent - 0.2).abs() < 1e-12);
        assert!((p.latency_ms - 11.0).abs() < 1e-12);
    }

    #[test]
    fn custom_callback_is_used_verbatim() {
        let s = ShapingStrategy::Custom(Arc::new(|l: &LinkMetrics| ShapingParams {
            bandwidth_mbit: l.snr,
            loss_percent: 0.0,
            latency_ms: 1.0,
        }));
        assert_eq!(s.params(&link(1.0, -61.0)).bandwidth_mbit, 30.0);
    }

    #[test]
    fn netem_arguments() {
        let args = NetemShaper::args("sta1-wlan0", 54.0, 0.5, 2.0);
        assert_eq!(args.join(" "), "qdisc replace dev sta1-wlan0 root netem rate 54mbit loss 0.5% delay 2ms");
    }

    #[test]
    fn shaping_config_parses() {
        let cfg: ShapingConfig = serde_json::from_str(r#"{"strategy": "distance_decay", "base_mbit": 20.0}"#).unwrap();
        assert_eq!(cfg, ShapingConfig::DistanceDecay { base_mbit: 20.0 });
        let cfg: ShapingConfig = serde_json::from_str(r#"{"strategy": "rate_table"}"#).unwrap();
        assert_eq!(cfg, ShapingConfig::default());
    }
}
