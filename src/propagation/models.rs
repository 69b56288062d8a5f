//! Propagation models: received power and the two inverse problems.
//!
//! Every model reduces to a path loss `PL(d)` in dB; the received power is
//!
//! ```text
//! P_rx = P_tx + G_tx + G_rx − PL(d) [− X_σ for log-normal shadowing]
//! ```
//!
//! The inverses solve `PL(d) = P_tx + G_tx + G_rx − noise_threshold` for `d`
//! (maximum range) or for `P_tx` (power needed to cover a range). Both use the
//! same `PathLossParameters` value as the forward direction.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, Result};
use crate::simulation::types::RadioParams;

use super::signal_calculations::{MIN_DISTANCE, path_loss, path_loss_distance};

/// Power loss coefficient used by the ITU indoor model when none is configured.
pub const ITU_DEFAULT_POWER_LOSS_COEFFICIENT: f64 = 28.0;

/// Tx power below this is not a usable configuration.
pub const MIN_TX_POWER_DBM: f64 = 1.0;

/// Propagation model selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Free space (Friis).
    Friis,
    /// Friis up to the crossover distance, fourth-power decay beyond it.
    TwoRayGround,
    #[default]
    LogDistance,
    /// Log-distance plus a Gaussian term drawn per evaluation.
    LogNormalShadowing,
    /// ITU-R P.1238 indoor.
    Itu,
    /// Young's empirical outdoor model.
    Young,
}

impl ModelKind {
    /// Name used in the channel daemon's `path_loss` config block.
    pub fn daemon_name(self) -> &'static str {
        match self {
            ModelKind::Friis => "free_space",
            ModelKind::TwoRayGround => "two_ray_ground",
            ModelKind::LogDistance => "log_distance",
            ModelKind::LogNormalShadowing => "log_normal_shadowing",
            ModelKind::Itu => "itu",
            ModelKind::Young => "young",
        }
    }
}

fn default_exponent() -> f64 {
    3.0
}
fn default_system_loss() -> f64 {
    1.0
}
fn default_sigma() -> f64 {
    2.0
}
fn default_noise_threshold() -> f64 {
    -91.0
}
fn default_cca_threshold() -> f64 {
    -90.0
}
fn default_clutter_factor() -> f64 {
    0.01075
}

/// Channel-model constants shared by the forward and inverse functions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathLossParameters {
    #[serde(default)]
    pub model: ModelKind,

    /// Path loss exponent (n) for the log-distance family.
    /// - n = 2.0: Free space
    /// - n = 2.7 to 3.5: Urban areas
    /// - n = 3.0 to 5.0: Indoor obstructed environments
    #[serde(default = "default_exponent")]
    pub path_loss_exponent: f64,

    /// System loss factor L (linear, ≥ 1).
    #[serde(default = "default_system_loss")]
    pub system_loss: f64,

    /// Standard deviation (dB) of the log-normal shadowing term.
    #[serde(default = "default_sigma")]
    pub shadowing_sigma: f64,

    /// ITU floor penetration loss factor (dB per floor).
    #[serde(default)]
    pub floor_penetration: f64,

    /// ITU number of floors between transmitter and receiver.
    #[serde(default)]
    pub floors: u32,

    /// ITU distance power loss coefficient; 0 selects the default of 28.
    #[serde(default)]
    pub power_loss_coefficient: f64,

    /// Young clutter factor.
    #[serde(default = "default_clutter_factor")]
    pub clutter_factor: f64,

    /// Receiver noise threshold (dBm); also the reception limit for ranges.
    #[serde(default = "default_noise_threshold")]
    pub noise_threshold: f64,

    /// Clear channel assessment threshold (dBm).
    #[serde(default = "default_cca_threshold")]
    pub cca_threshold: f64,
}

impl Default for PathLossParameters {
    fn default() -> Self {
        Self {
            model: ModelKind::default(),
            path_loss_exponent: default_exponent(),
            system_loss: default_system_loss(),
            shadowing_sigma: default_sigma(),
            floor_penetration: 0.0,
            floors: 0,
            power_loss_coefficient: 0.0,
            clutter_factor: default_clutter_factor(),
            noise_threshold: default_noise_threshold(),
            cca_threshold: default_cca_threshold(),
        }
    }
}

impl PathLossParameters {
    pub fn validate(&self) -> std::result::Result<(), ConfigurationError> {
        if self.path_loss_exponent <= 0.0 {
            return Err(invalid("path_loss_exponent", "must be positive"));
        }
        if self.system_loss < 1.0 {
            return Err(invalid("system_loss", "must be at least 1"));
        }
        if self.shadowing_sigma < 0.0 {
            return Err(invalid("shadowing_sigma", "must be non-negative"));
        }
        if self.clutter_factor <= 0.0 {
            return Err(invalid("clutter_factor", "must be positive"));
        }
        Ok(())
    }

    /// ITU distance power loss coefficient in force.
    pub fn itu_coefficient(&self) -> f64 {
        if self.power_loss_coefficient != 0.0 {
            self.power_loss_coefficient
        } else {
            ITU_DEFAULT_POWER_LOSS_COEFFICIENT
        }
    }
}

fn invalid(name: &'static str, reason: &str) -> ConfigurationError {
    ConfigurationError::InvalidParameter {
        name,
        reason: reason.to_string(),
    }
}

/// A propagation model bound to its immutable parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PropagationModel {
    params: PathLossParameters,
}

impl PropagationModel {
    pub fn new(params: PathLossParameters) -> std::result::Result<Self, ConfigurationError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &PathLossParameters {
        &self.params
    }

    pub fn kind(&self) -> ModelKind {
        self.params.model
    }

    /// Whether evaluations carry a random term that must be mirrored to the
    /// channel daemon.
    pub fn is_stochastic(&self) -> bool {
        self.params.model == ModelKind::LogNormalShadowing && self.params.shadowing_sigma > 0.0
    }

    /// Draw one shadowing sample (dB). Deterministic models always return 0.
    pub fn sample_shadowing<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        if !self.is_stochastic() {
            return 0.0;
        }
        match Normal::new(0.0, self.params.shadowing_sigma) {
            Ok(normal) => normal.sample(rng),
            Err(_) => 0.0,
        }
    }

    /// Deterministic path loss (dB) between `tx` and `rx` at `distance`.
    pub fn path_loss_db(&self, distance: f64, tx: &RadioParams, rx: &RadioParams) -> f64 {
        let p = &self.params;
        let d = distance.max(MIN_DISTANCE);
        match p.model {
            ModelKind::Friis => path_loss(tx.freq_ghz, d, p.system_loss),
            ModelKind::TwoRayGround => {
                let crossover = two_ray_crossover(tx, rx);
                if d < crossover {
                    path_loss(tx.freq_ghz, d, p.system_loss)
                } else {
                    40.0 * d.log10() - 20.0 * (tx.antenna_height * rx.antenna_height).log10() + 10.0 * p.system_loss.log10()
                }
            }
            ModelKind::LogDistance | ModelKind::LogNormalShadowing => {
                path_loss(tx.freq_ghz, 1.0, p.system_loss) + 10.0 * p.path_loss_exponent * d.log10()
            }
            ModelKind::Itu => {
                let f_mhz = tx.freq_ghz * 1e3;
                20.0 * f_mhz.log10() + p.itu_coefficient() * d.log10() + p.floor_penetration * p.floors as f64 - 28.0
            }
            ModelKind::Young => {
                10.0 * p.clutter_factor.log10() + 40.0 * d.log10() - 20.0 * (tx.antenna_height * rx.antenna_height).log10()
            }
        }
    }

    /// Received signal strength (dBm) at `rx` from `tx`.
    ///
    /// `shadowing_db` is the Gaussian draw for this evaluation, obtained from
    /// `sample_shadowing`; it is ignored by the deterministic models.
    pub fn received_power(&self, distance: f64, tx: &RadioParams, rx: &RadioParams, shadowing_db: f64) -> f64 {
        let gains = tx.tx_power + tx.antenna_gain + rx.antenna_gain;
        let shadowing = if self.params.model == ModelKind::LogNormalShadowing {
            shadowing_db
        } else {
            0.0
        };
        gains - self.path_loss_db(distance, tx, rx) - shadowing
    }

    /// Signal-to-noise ratio (dB) for a received power.
    pub fn snr(&self, rssi: f64) -> f64 {
        rssi - self.params.noise_threshold
    }

    /// Largest distance at which a node's own signal stays above the noise
    /// threshold. The receiving end is assumed to mirror the transmitter's
    /// antenna. Shadowing is not sampled so the result is stable.
    pub fn max_distance_for_threshold(&self, tx: &RadioParams) -> Result<f64> {
        let p = &self.params;
        let budget = tx.tx_power + 2.0 * tx.antenna_gain - p.noise_threshold;
        let distance = match p.model {
            ModelKind::Friis => path_loss_distance(tx.freq_ghz, budget, p.system_loss),
            ModelKind::TwoRayGround => {
                require_heights(tx)?;
                let friis = path_loss_distance(tx.freq_ghz, budget, p.system_loss);
                if friis < two_ray_crossover(tx, tx) {
                    friis
                } else {
                    10f64.powf((budget + 20.0 * (tx.antenna_height * tx.antenna_height).log10() - 10.0 * p.system_loss.log10()) / 40.0)
                }
            }
            ModelKind::LogDistance | ModelKind::LogNormalShadowing => {
                let pl0 = path_loss(tx.freq_ghz, 1.0, p.system_loss);
                10f64.powf((budget - pl0) / (10.0 * p.path_loss_exponent))
            }
            ModelKind::Itu => {
                let f_mhz = tx.freq_ghz * 1e3;
                10f64.powf((budget - 20.0 * f_mhz.log10() - p.floor_penetration * p.floors as f64 + 28.0) / p.itu_coefficient())
            }
            ModelKind::Young => {
                require_heights(tx)?;
                10f64.powf((budget - 10.0 * p.clutter_factor.log10() + 20.0 * (tx.antenna_height * tx.antenna_height).log10()) / 40.0)
            }
        };
        if !distance.is_finite() || distance <= 0.0 {
            return Err(ConfigurationError::NonPhysicalRange(distance).into());
        }
        Ok(distance)
    }

    /// Tx power (dBm) needed for the signal to reach the noise threshold at
    /// `range`. Results below `MIN_TX_POWER_DBM` are rejected.
    pub fn required_tx_power(&self, range: f64, tx: &RadioParams) -> Result<f64> {
        if matches!(self.params.model, ModelKind::TwoRayGround | ModelKind::Young) {
            require_heights(tx)?;
        }
        let loss = self.path_loss_db(range, tx, tx);
        let power = self.params.noise_threshold + loss - 2.0 * tx.antenna_gain;
        if !power.is_finite() || power < MIN_TX_POWER_DBM {
            return Err(ConfigurationError::InvalidPower(power).into());
        }
        Ok(power)
    }
}

/// Distance beyond which the ground reflection dominates.
fn two_ray_crossover(tx: &RadioParams, rx: &RadioParams) -> f64 {
    4.0 * std::f64::consts::PI * tx.antenna_height * rx.antenna_height * tx.freq_ghz * 1e9 / super::signal_calculations::SPEED_OF_LIGHT
}

fn require_heights(tx: &RadioParams) -> std::result::Result<(), ConfigurationError> {
    if tx.antenna_height <= 0.0 {
        return Err(invalid("antenna_height", "must be positive for height-based models"));
    }
    Ok(())
}
