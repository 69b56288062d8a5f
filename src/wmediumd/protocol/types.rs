use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ConfigurationError, ProtocolError};

use super::constants::*;

/// 48-bit hardware address, carried on the wire as 6 raw bytes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MacAddr(pub [u8; MAC_LEN]);

impl MacAddr {
    /// Locally administered address derived from a station counter, as
    /// handed out to interfaces that were not given one explicitly.
    pub fn local(index: u32) -> Self {
        let b = index.to_be_bytes();
        MacAddr([0x02, 0x00, b[0], b[1], b[2], b[3]])
    }

    pub fn octets(&self) -> [u8; MAC_LEN] {
        self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", b[0], b[1], b[2], b[3], b[4], b[5])
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddr({self})")
    }
}

impl FromStr for MacAddr {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProtocolError::InvalidMac(s.to_string());
        let mut out = [0u8; MAC_LEN];
        let mut parts = s.split(':');
        for byte in out.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 {
                return Err(invalid());
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(MacAddr(out))
    }
}

impl Serialize for MacAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Index the daemon assigned to a registered station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StationId(pub i32);

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Status byte at the end of every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    Success,
    InterfaceNotFound,
    InterfaceDuplicate,
    WrongMode,
    Unknown(u8),
}

impl From<u8> for UpdateStatus {
    fn from(value: u8) -> Self {
        match value {
            WUPDATE_SUCCESS => UpdateStatus::Success,
            WUPDATE_INTF_NOTFOUND => UpdateStatus::InterfaceNotFound,
            WUPDATE_INTF_DUPLICATE => UpdateStatus::InterfaceDuplicate,
            WUPDATE_WRONG_MODE => UpdateStatus::WrongMode,
            other => UpdateStatus::Unknown(other),
        }
    }
}

impl From<UpdateStatus> for u8 {
    fn from(value: UpdateStatus) -> Self {
        match value {
            UpdateStatus::Success => WUPDATE_SUCCESS,
            UpdateStatus::InterfaceNotFound => WUPDATE_INTF_NOTFOUND,
            UpdateStatus::InterfaceDuplicate => WUPDATE_INTF_DUPLICATE,
            UpdateStatus::WrongMode => WUPDATE_WRONG_MODE,
            UpdateStatus::Unknown(other) => other,
        }
    }
}

/// Encode a probability as the daemon's fixed-point integer.
/// 1.0 saturates at `i32::MAX`.
pub fn probability_to_fixed(p: f64) -> Result<i32, ConfigurationError> {
    if !(0.0..=1.0).contains(&p) {
        return Err(ConfigurationError::InvalidProbability(p));
    }
    Ok((p * FIXED_POINT_SCALE).min(i32::MAX as f64) as i32)
}

pub fn fixed_to_probability(v: i32) -> f64 {
    v as f64 / FIXED_POINT_SCALE
}

/// Size × rate error probability matrix for one link direction.
pub type SpecProbMatrix = [[f64; SPECPROB_RATES]; SPECPROB_SIZES];

/// Response tag expected for a request tag.
pub fn response_type_for(request: u8) -> Option<u8> {
    match request {
        WSERVER_SHUTDOWN_REQUEST_TYPE => None,
        t if t % 2 == 1 && t < WSERVER_HEIGHT_UPDATE_RESPONSE_TYPE => Some(t + 1),
        _ => None,
    }
}

/// Length of a full response (tag, echoed request, trailing fields, status)
/// for a request of `request_len` bytes.
pub fn response_len(request_tag: u8, request_len: usize) -> usize {
    let extra = if request_tag == WSERVER_ADD_REQUEST_TYPE { INT_LEN } else { 0 };
    TAG_LEN + request_len + extra + STATUS_LEN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_parses_and_prints() {
        let mac: MacAddr = "02:00:00:00:0a:FF".parse().unwrap();
        assert_eq!(mac.0, [2, 0, 0, 0, 0x0a, 0xff]);
        assert_eq!(mac.to_string(), "02:00:00:00:0a:ff");
    }

    #[test]
    fn malformed_macs_are_rejected() {
        for bad in ["", "02:00:00:00:00", "02:00:00:00:00:01:02", "2:00:00:00:00:01", "zz:00:00:00:00:01"] {
            assert!(bad.parse::<MacAddr>().is_err(), "{bad}");
        }
    }

    #[test]
    fn fixed_point_matches_daemon_encoding() {
        assert_eq!(probability_to_fixed(0.0).unwrap(), 0);
        assert_eq!(probability_to_fixed(0.5).unwrap(), 1 << 30);
        assert_eq!(probability_to_fixed(1.0).unwrap(), i32::MAX);
        assert!((fixed_to_probability(1 << 29) - 0.25).abs() < 1e-12);
        assert_eq!(probability_to_fixed(1.5), Err(ConfigurationError::InvalidProbability(1.5)));
    }

    #[test]
    fn response_tags_follow_requests() {
        assert_eq!(response_type_for(WSERVER_SNR_UPDATE_REQUEST_TYPE), Some(WSERVER_SNR_UPDATE_RESPONSE_TYPE));
        assert_eq!(response_type_for(WSERVER_HEIGHT_UPDATE_REQUEST_TYPE), Some(WSERVER_HEIGHT_UPDATE_RESPONSE_TYPE));
        assert_eq!(response_type_for(WSERVER_SHUTDOWN_REQUEST_TYPE), None);
        assert_eq!(response_type_for(WSERVER_ADD_RESPONSE_TYPE), None);
    }

    #[test]
    fn status_codes_map_both_ways() {
        for code in 0..=4u8 {
            assert_eq!(u8::from(UpdateStatus::from(code)), code);
        }
        assert_eq!(UpdateStatus::from(1), UpdateStatus::InterfaceNotFound);
    }
}
