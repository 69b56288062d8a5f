//! Radio unit conversions and channel helpers.
//!
//! Units:
//! - Power: dBm, mW (conversion provided)
//! - Frequency: GHz at the API, Hz inside the path-loss core
//! - Distance: meters

/// Speed of light in vacuum (m/s).
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Distances below this are clamped to avoid the log(0) singularity.
pub const MIN_DISTANCE: f64 = 0.1;

/// Convert power from dBm to milliwatts.
///
/// ```text
/// 0 dBm   → 1 mW
/// 20 dBm  → 100 mW
/// -10 dBm → 0.1 mW
/// ```
pub fn dbm_to_mw(dbm: f64) -> f64 {
    10f64.powf(dbm / 10.0)
}

/// Convert power from milliwatts to dBm. Inverse of `dbm_to_mw`; `mw` must be
/// positive.
pub fn mw_to_dbm(mw: f64) -> f64 {
    10.0 * mw.log10()
}

/// Wavelength (m) of a carrier given in GHz.
pub fn wavelength(freq_ghz: f64) -> f64 {
    SPEED_OF_LIGHT / (freq_ghz * 1e9)
}

/// Free-space path-loss core shared by every model:
///
/// ```text
/// PL(d) = 10 × log₁₀((4π·d)² · L / λ²)
/// ```
///
/// `distance` is floored to `MIN_DISTANCE`.
pub fn path_loss(freq_ghz: f64, distance: f64, system_loss: f64) -> f64 {
    let d = distance.max(MIN_DISTANCE);
    let lambda = wavelength(freq_ghz);
    let numerator = (4.0 * std::f64::consts::PI * d).powi(2) * system_loss;
    10.0 * (numerator / (lambda * lambda)).log10()
}

/// Inverse of `path_loss`: the distance at which the free-space loss reaches
/// `loss_db`.
pub(crate) fn path_loss_distance(freq_ghz: f64, loss_db: f64, system_loss: f64) -> f64 {
    let lambda = wavelength(freq_ghz);
    lambda * 10f64.powf(loss_db / 20.0) / (4.0 * std::f64::consts::PI * system_loss.sqrt())
}

/// Center frequency (GHz) of an IEEE 802.11 channel. Unknown channels fall
/// back to channel 1.
pub fn channel_to_freq_ghz(channel: u8) -> f64 {
    match channel {
        1..=13 => 2.407 + 0.005 * channel as f64,
        14 => 2.484,
        32..=177 => 5.0 + 0.005 * channel as f64,
        _ => 2.412,
    }
}
