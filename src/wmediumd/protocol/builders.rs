use crate::simulation::types::Position;

use super::constants::*;
use super::types::{MacAddr, StationId};

/// One request to the channel daemon.
///
/// Integer fields are sent as-is. The probability fields must already be in
/// fixed-point form (`probability_to_fixed`).
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Shutdown,
    SnrUpdate { from: MacAddr, to: MacAddr, snr: i32 },
    DeleteByMac { mac: MacAddr },
    DeleteById { id: StationId },
    Add { mac: MacAddr },
    ErrorProbUpdate { from: MacAddr, to: MacAddr, errprob: i32 },
    SpecProbUpdate { from: MacAddr, to: MacAddr, errprobs: Box<[i32; SPECPROB_LEN]> },
    PositionUpdate { mac: MacAddr, x: f32, y: f32, z: f32 },
    TxPowerUpdate { mac: MacAddr, tx_power: i32 },
    GaussianRandomUpdate { mac: MacAddr, gaussian_random: f32 },
    GainUpdate { mac: MacAddr, gain: i32 },
    HeightUpdate { mac: MacAddr, height: i32 },
}

impl Request {
    pub fn position(mac: MacAddr, position: &Position) -> Self {
        Request::PositionUpdate {
            mac,
            x: position.x as f32,
            y: position.y as f32,
            z: position.z as f32,
        }
    }

    pub fn tag(&self) -> u8 {
        match self {
            Request::Shutdown => WSERVER_SHUTDOWN_REQUEST_TYPE,
            Request::SnrUpdate { .. } => WSERVER_SNR_UPDATE_REQUEST_TYPE,
            Request::DeleteByMac { .. } => WSERVER_DEL_BY_MAC_REQUEST_TYPE,
            Request::DeleteById { .. } => WSERVER_DEL_BY_ID_REQUEST_TYPE,
            Request::Add { .. } => WSERVER_ADD_REQUEST_TYPE,
            Request::ErrorProbUpdate { .. } => WSERVER_ERRPROB_UPDATE_REQUEST_TYPE,
            Request::SpecProbUpdate { .. } => WSERVER_SPECPROB_UPDATE_REQUEST_TYPE,
            Request::PositionUpdate { .. } => WSERVER_POSITION_UPDATE_REQUEST_TYPE,
            Request::TxPowerUpdate { .. } => WSERVER_TXPOWER_UPDATE_REQUEST_TYPE,
            Request::GaussianRandomUpdate { .. } => WSERVER_GAUSSIAN_RANDOM_UPDATE_REQUEST_TYPE,
            Request::GainUpdate { .. } => WSERVER_GAIN_UPDATE_REQUEST_TYPE,
            Request::HeightUpdate { .. } => WSERVER_HEIGHT_UPDATE_REQUEST_TYPE,
        }
    }

    /// Station the request is about, used in error reports.
    pub fn subject(&self) -> MacAddr {
        match self {
            Request::Shutdown | Request::DeleteById { .. } => MacAddr::default(),
            Request::SnrUpdate { from, .. } | Request::ErrorProbUpdate { from, .. } | Request::SpecProbUpdate { from, .. } => *from,
            Request::DeleteByMac { mac }
            | Request::Add { mac }
            | Request::PositionUpdate { mac, .. }
            | Request::TxPowerUpdate { mac, .. }
            | Request::GaussianRandomUpdate { mac, .. }
            | Request::GainUpdate { mac, .. }
            | Request::HeightUpdate { mac, .. } => *mac,
        }
    }

    /// Wire encoding: tag byte followed by the fixed-layout payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut pkt = Vec::with_capacity(TAG_LEN + 2 * MAC_LEN + SPECPROB_LEN * INT_LEN);
        pkt.push(self.tag());
        match self {
            Request::Shutdown => {}
            Request::SnrUpdate { from, to, snr } => {
                pkt.extend_from_slice(&from.0);
                pkt.extend_from_slice(&to.0);
                pkt.extend_from_slice(&snr.to_be_bytes());
            }
            Request::DeleteByMac { mac } | Request::Add { mac } => pkt.extend_from_slice(&mac.0),
            Request::DeleteById { id } => pkt.extend_from_slice(&id.0.to_be_bytes()),
            Request::ErrorProbUpdate { from, to, errprob } => {
                pkt.extend_from_slice(&from.0);
                pkt.extend_from_slice(&to.0);
                pkt.extend_from_slice(&errprob.to_be_bytes());
            }
            Request::SpecProbUpdate { from, to, errprobs } => {
                pkt.extend_from_slice(&from.0);
                pkt.extend_from_slice(&to.0);
                for v in errprobs.iter() {
                    pkt.extend_from_slice(&v.to_be_bytes());
                }
            }
            Request::PositionUpdate { mac, x, y, z } => {
                pkt.extend_from_slice(&mac.0);
                pkt.extend_from_slice(&x.to_be_bytes());
                pkt.extend_from_slice(&y.to_be_bytes());
                pkt.extend_from_slice(&z.to_be_bytes());
            }
            Request::TxPowerUpdate { mac, tx_power: v } | Request::GainUpdate { mac, gain: v } | Request::HeightUpdate { mac, height: v } => {
                pkt.extend_from_slice(&mac.0);
                pkt.extend_from_slice(&v.to_be_bytes());
            }
            Request::GaussianRandomUpdate { mac, gaussian_random } => {
                pkt.extend_from_slice(&mac.0);
                pkt.extend_from_slice(&gaussian_random.to_be_bytes());
            }
        }
        pkt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: MacAddr = MacAddr([2, 0, 0, 0, 0, 1]);
    const B: MacAddr = MacAddr([2, 0, 0, 0, 0, 2]);

    #[test]
    fn snr_update_layout() {
        let pkt = Request::SnrUpdate { from: A, to: B, snr: -3 }.encode();
        assert_eq!(pkt.len(), TAG_LEN + 2 * MAC_LEN + INT_LEN);
        assert_eq!(pkt[0], WSERVER_SNR_UPDATE_REQUEST_TYPE);
        assert_eq!(&pkt[1..7], &A.0);
        assert_eq!(&pkt[7..13], &B.0);
        assert_eq!(&pkt[13..17], &[0xff, 0xff, 0xff, 0xfd]);
    }

    #[test]
    fn position_update_uses_big_endian_floats() {
        let pkt = Request::position(A, &Position::new(1.0, -2.0, 0.5)).encode();
        assert_eq!(pkt.len(), TAG_LEN + MAC_LEN + 3 * FLOAT_LEN);
        assert_eq!(pkt[0], WSERVER_POSITION_UPDATE_REQUEST_TYPE);
        assert_eq!(&pkt[7..11], &1.0f32.to_be_bytes());
        assert_eq!(&pkt[11..15], &[0xc0, 0x00, 0x00, 0x00]);
        assert_eq!(&pkt[15..19], &0.5f32.to_be_bytes());
    }

    #[test]
    fn spec_prob_carries_full_matrix_row_major() {
        let mut errprobs = Box::new([0i32; SPECPROB_LEN]);
        errprobs[1] = 7;
        errprobs[SPECPROB_LEN - 1] = 9;
        let pkt = Request::SpecProbUpdate { from: A, to: B, errprobs }.encode();
        assert_eq!(pkt.len(), TAG_LEN + 2 * MAC_LEN + SPECPROB_LEN * INT_LEN);
        assert_eq!(&pkt[17..21], &7i32.to_be_bytes());
        assert_eq!(&pkt[pkt.len() - 4..], &9i32.to_be_bytes());
    }

    #[test]
    fn short_requests() {
        assert_eq!(Request::Shutdown.encode(), vec![WSERVER_SHUTDOWN_REQUEST_TYPE]);
        assert_eq!(Request::DeleteById { id: StationId(258) }.encode(), vec![WSERVER_DEL_BY_ID_REQUEST_TYPE, 0, 0, 1, 2]);
        let add = Request::Add { mac: B }.encode();
        assert_eq!(add[0], WSERVER_ADD_REQUEST_TYPE);
        assert_eq!(&add[1..], &B.0);
    }
}
