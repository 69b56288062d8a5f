//! Blocking client for the channel daemon's control socket.
//!
//! One request is in flight at a time: callers are serialised by an internal
//! mutex, so the bridge can be shared behind an `Arc`. Every request gets a
//! local id for log correlation, and its response must echo the request body.
//! A request that times out leaves the stream in an unknown position, so the
//! connection is marked poisoned and later requests fail fast until
//! `reconnect` is called. Requests are never retried automatically.

use std::collections::BTreeMap;
use std::io::{ErrorKind, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::error::{Error, ProtocolError, Result};
use crate::simulation::types::Position;

use super::protocol::{
    MacAddr, Request, Response, SPECPROB_LEN, SPECPROB_RATES, SpecProbMatrix, StationId, UpdateStatus, parse_response, probability_to_fixed, response_len,
};

struct Connection {
    stream: UnixStream,
    poisoned: bool,
    stations: BTreeMap<MacAddr, StationId>,
}

/// Client side of the daemon's update protocol.
pub struct ChannelBridge {
    conn: Mutex<Connection>,
    next_request_id: AtomicU64,
    timeout: Option<Duration>,
}

impl ChannelBridge {
    /// Connect to the daemon socket at `path`. `timeout` bounds every wait
    /// for a response; `None` waits forever.
    pub fn connect(path: &Path, timeout: Option<Duration>) -> Result<Self> {
        let stream = UnixStream::connect(path)?;
        Self::from_stream(stream, timeout)
    }

    /// Keep trying to connect until `deadline` has passed, sleeping
    /// `interval` between attempts. Used right after launching the daemon,
    /// which needs a moment before it listens.
    pub fn connect_with_retry(path: &Path, timeout: Option<Duration>, deadline: Duration, interval: Duration) -> Result<Self> {
        let start = Instant::now();
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match UnixStream::connect(path) {
                Ok(stream) => {
                    log::info!("Connected to channel daemon at {:?} after {} attempt(s)", path, attempts);
                    return Self::from_stream(stream, timeout);
                }
                Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::ConnectionRefused) => {
                    if start.elapsed() >= deadline {
                        return Err(Error::DaemonUnavailable {
                            path: path.to_path_buf(),
                            waited: start.elapsed(),
                        });
                    }
                    log::debug!("Channel daemon not listening yet ({}), retrying", e);
                    std::thread::sleep(interval);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Wrap an already connected stream.
    pub fn from_stream(stream: UnixStream, timeout: Option<Duration>) -> Result<Self> {
        stream.set_read_timeout(timeout)?;
        stream.set_write_timeout(timeout)?;
        Ok(Self {
            conn: Mutex::new(Connection {
                stream,
                poisoned: false,
                stations: BTreeMap::new(),
            }),
            next_request_id: AtomicU64::new(1),
            timeout,
        })
    }

    /// Replace the underlying connection, clearing the poisoned flag.
    /// The registered station map is kept; the daemon keeps its stations
    /// across client connections.
    pub fn reconnect(&self, path: &Path) -> Result<()> {
        let stream = UnixStream::connect(path)?;
        stream.set_read_timeout(self.timeout)?;
        stream.set_write_timeout(self.timeout)?;
        let mut conn = self.lock()?;
        conn.stream = stream;
        conn.poisoned = false;
        Ok(())
    }

    pub fn is_poisoned(&self) -> bool {
        self.conn.lock().map(|c| c.poisoned).unwrap_or(true)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| ProtocolError::Poisoned.into())
    }

    /// Send one request and wait for its response. Non-success statuses
    /// become `ProtocolError::Status`.
    fn transact(&self, conn: &mut Connection, request: &Request) -> Result<Response> {
        if conn.poisoned {
            return Err(ProtocolError::Poisoned.into());
        }
        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let pkt = request.encode();
        let tag = request.tag();
        log::debug!("wmediumd #{} -> type {} ({} bytes) for {}", id, tag, pkt.len(), request.subject());

        if let Err(e) = conn.stream.write_all(&pkt) {
            conn.poisoned = true;
            return Err(self.io_error(e));
        }
        let mut buf = vec![0u8; response_len(tag, pkt.len())];
        if let Err(e) = conn.stream.read_exact(&mut buf) {
            conn.poisoned = true;
            log::warn!("wmediumd #{} got no response: {}", id, e);
            return Err(self.io_error(e));
        }
        let response = match parse_response(&pkt, &buf) {
            Ok(r) => r,
            Err(e) => {
                conn.poisoned = true;
                log::error!("wmediumd #{} response out of step: {}", id, e);
                return Err(e.into());
            }
        };
        log::debug!("wmediumd #{} <- type {} status {:?}", id, response.tag, response.status);
        if response.status != UpdateStatus::Success {
            log::warn!("wmediumd #{} type {} for {} rejected: {:?}", id, tag, request.subject(), response.status);
            return Err(ProtocolError::Status {
                tag,
                mac: request.subject(),
                status: response.status,
            }
            .into());
        }
        Ok(response)
    }

    fn io_error(&self, e: std::io::Error) -> Error {
        match (e.kind(), self.timeout) {
            (ErrorKind::WouldBlock | ErrorKind::TimedOut, Some(t)) => Error::Timeout(t),
            _ => e.into(),
        }
    }

    fn request(&self, request: &Request) -> Result<Response> {
        let mut conn = self.lock()?;
        self.transact(&mut conn, request)
    }

    /// Register a station and return the index the daemon gave it.
    pub fn register(&self, mac: MacAddr) -> Result<StationId> {
        let mut conn = self.lock()?;
        let response = self.transact(&mut conn, &Request::Add { mac })?;
        let id = response.station_id.ok_or(ProtocolError::EchoMismatch { tag: response.tag })?;
        conn.stations.insert(mac, id);
        log::info!("Registered {} with channel daemon as station {}", mac, id);
        Ok(id)
    }

    /// Record a station the daemon already knows from its config file.
    pub fn adopt(&self, mac: MacAddr, id: StationId) -> Result<()> {
        self.lock()?.stations.insert(mac, id);
        Ok(())
    }

    pub fn unregister(&self, mac: MacAddr) -> Result<()> {
        let mut conn = self.lock()?;
        if !conn.stations.contains_key(&mac) {
            return Err(ProtocolError::UnknownStation(mac).into());
        }
        self.transact(&mut conn, &Request::DeleteByMac { mac })?;
        conn.stations.remove(&mac);
        log::info!("Unregistered {} from channel daemon", mac);
        Ok(())
    }

    pub fn unregister_by_id(&self, id: StationId) -> Result<()> {
        let mut conn = self.lock()?;
        self.transact(&mut conn, &Request::DeleteById { id })?;
        conn.stations.retain(|_, v| *v != id);
        Ok(())
    }

    pub fn station_id(&self, mac: MacAddr) -> Result<StationId> {
        self.lock()?.stations.get(&mac).copied().ok_or_else(|| ProtocolError::UnknownStation(mac).into())
    }

    /// MACs currently registered through this bridge.
    pub fn registered(&self) -> Vec<MacAddr> {
        self.conn.lock().map(|c| c.stations.keys().copied().collect()).unwrap_or_default()
    }

    /// SNR (dB) of the directed link `from → to`.
    pub fn update_snr(&self, from: MacAddr, to: MacAddr, snr: i32) -> Result<()> {
        self.request(&Request::SnrUpdate { from, to, snr }).map(|_| ())
    }

    pub fn update_position(&self, mac: MacAddr, position: &Position) -> Result<()> {
        self.request(&Request::position(mac, position)).map(|_| ())
    }

    pub fn update_txpower(&self, mac: MacAddr, tx_power: i32) -> Result<()> {
        self.request(&Request::TxPowerUpdate { mac, tx_power }).map(|_| ())
    }

    pub fn update_gain(&self, mac: MacAddr, gain: i32) -> Result<()> {
        self.request(&Request::GainUpdate { mac, gain }).map(|_| ())
    }

    pub fn update_height(&self, mac: MacAddr, height: i32) -> Result<()> {
        self.request(&Request::HeightUpdate { mac, height }).map(|_| ())
    }

    pub fn update_gaussian_random(&self, mac: MacAddr, gaussian_random: f32) -> Result<()> {
        self.request(&Request::GaussianRandomUpdate { mac, gaussian_random }).map(|_| ())
    }

    /// Frame error probability in `[0, 1]` of the directed link `from → to`.
    pub fn update_error_prob(&self, from: MacAddr, to: MacAddr, probability: f64) -> Result<()> {
        let errprob = probability_to_fixed(probability)?;
        self.request(&Request::ErrorProbUpdate { from, to, errprob }).map(|_| ())
    }

    /// Error probability per packet size (rows) and data rate (columns).
    pub fn update_spec_prob(&self, from: MacAddr, to: MacAddr, matrix: &SpecProbMatrix) -> Result<()> {
        let mut errprobs = Box::new([0i32; SPECPROB_LEN]);
        for (i, row) in matrix.iter().enumerate() {
            for (j, p) in row.iter().enumerate() {
                errprobs[i * SPECPROB_RATES + j] = probability_to_fixed(*p)?;
            }
        }
        self.request(&Request::SpecProbUpdate { from, to, errprobs }).map(|_| ())
    }

    /// Ask the daemon to exit. There is no response; the connection is
    /// unusable afterwards.
    pub fn shutdown(&self) -> Result<()> {
        let mut conn = self.lock()?;
        if conn.poisoned {
            return Err(ProtocolError::Poisoned.into());
        }
        conn.stream.write_all(&Request::Shutdown.encode())?;
        conn.poisoned = true;
        conn.stations.clear();
        log::info!("Sent shutdown to channel daemon");
        Ok(())
    }
}

/// Where the bridge connects by default.
pub fn default_socket_path() -> PathBuf {
    PathBuf::from(super::protocol::DEFAULT_SOCKET_PATH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wmediumd::protocol::{WSERVER_SNR_UPDATE_REQUEST_TYPE, WUPDATE_INTF_NOTFOUND, WUPDATE_SUCCESS};
    use std::thread;

    const STA: MacAddr = MacAddr([2, 0, 0, 0, 0, 1]);
    const STA2: MacAddr = MacAddr([2, 0, 0, 0, 0, 2]);

    /// Reply to each scripted request: `(request length, trailing fields, status)`.
    fn fake_daemon(mut stream: UnixStream, script: Vec<(usize, Vec<u8>, u8)>) -> thread::JoinHandle<Vec<Vec<u8>>> {
        thread::spawn(move || {
            let mut seen = Vec::new();
            for (len, extra, status) in script {
                let mut req = vec![0u8; len];
                stream.read_exact(&mut req).unwrap();
                let mut resp = vec![req[0] + 1];
                resp.extend_from_slice(&req);
                resp.extend_from_slice(&extra);
                resp.push(status);
                stream.write_all(&resp).unwrap();
                seen.push(req);
            }
            seen
        })
    }

    fn bridge_pair(script: Vec<(usize, Vec<u8>, u8)>) -> (ChannelBridge, thread::JoinHandle<Vec<Vec<u8>>>) {
        let (client, server) = UnixStream::pair().unwrap();
        let daemon = fake_daemon(server, script);
        (ChannelBridge::from_stream(client, Some(Duration::from_secs(5))).unwrap(), daemon)
    }

    #[test]
    fn register_then_unregister_leaves_no_stations() {
        let (bridge, daemon) = bridge_pair(vec![(7, 0i32.to_be_bytes().to_vec(), WUPDATE_SUCCESS), (7, vec![], WUPDATE_SUCCESS)]);
        let mac: MacAddr = "02:00:00:00:00:01".parse().unwrap();
        assert_eq!(bridge.register(mac).unwrap(), StationId(0));
        assert_eq!(bridge.registered(), vec![mac]);
        bridge.unregister(mac).unwrap();
        assert!(bridge.registered().is_empty());
        daemon.join().unwrap();
    }

    #[test]
    fn interface_not_found_is_a_protocol_error() {
        let (bridge, daemon) = bridge_pair(vec![(17, vec![], WUPDATE_INTF_NOTFOUND)]);
        let err = bridge.update_snr(STA, STA2, 25).unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::Status {
                tag: WSERVER_SNR_UPDATE_REQUEST_TYPE,
                status: UpdateStatus::InterfaceNotFound,
                ..
            })
        ));
        // A rejected update does not poison the stream.
        assert!(!bridge.is_poisoned());
        daemon.join().unwrap();
    }

    #[test]
    fn updates_reach_the_daemon_in_order() {
        let (bridge, daemon) = bridge_pair(vec![(19, vec![], WUPDATE_SUCCESS), (11, vec![], WUPDATE_SUCCESS), (17, vec![], WUPDATE_SUCCESS)]);
        bridge.update_position(STA, &Position::new(1.0, 2.0, 3.0)).unwrap();
        bridge.update_txpower(STA, 20).unwrap();
        bridge.update_error_prob(STA, STA2, 0.5).unwrap();
        let seen = daemon.join().unwrap();
        assert_eq!(seen[0][0], 13);
        assert_eq!(seen[1][0], 15);
        assert_eq!(&seen[2][13..17], &(1i32 << 30).to_be_bytes());
    }

    #[test]
    fn antenna_updates_and_removal_by_index() {
        let (bridge, daemon) = bridge_pair(vec![
            (7, 3i32.to_be_bytes().to_vec(), WUPDATE_SUCCESS),
            (11, vec![], WUPDATE_SUCCESS),
            (11, vec![], WUPDATE_SUCCESS),
            (5, vec![], WUPDATE_SUCCESS),
        ]);
        let id = bridge.register(STA).unwrap();
        bridge.update_gain(STA, 6).unwrap();
        bridge.update_height(STA, -2).unwrap();
        bridge.unregister_by_id(id).unwrap();
        assert!(bridge.registered().is_empty());
        assert!(matches!(bridge.station_id(STA), Err(Error::Protocol(ProtocolError::UnknownStation(_)))));

        let seen = daemon.join().unwrap();
        assert_eq!((seen[1][0], &seen[1][7..11]), (19, &6i32.to_be_bytes()[..]));
        assert_eq!((seen[2][0], &seen[2][7..11]), (21, &(-2i32).to_be_bytes()[..]));
        assert_eq!((seen[3][0], &seen[3][1..5]), (5, &3i32.to_be_bytes()[..]));
    }

    #[test]
    fn spec_prob_sends_the_whole_matrix() {
        let (bridge, daemon) = bridge_pair(vec![(13 + 4 * SPECPROB_LEN, vec![], WUPDATE_SUCCESS)]);
        let mut matrix = [[0.0; SPECPROB_RATES]; 12];
        matrix[11][11] = 1.0;
        bridge.update_spec_prob(STA, STA2, &matrix).unwrap();
        let seen = daemon.join().unwrap();
        assert_eq!(&seen[0][seen[0].len() - 4..], &i32::MAX.to_be_bytes());
    }

    #[test]
    fn invalid_probability_is_rejected_before_sending() {
        let (client, _server) = UnixStream::pair().unwrap();
        let bridge = ChannelBridge::from_stream(client, Some(Duration::from_millis(50))).unwrap();
        assert!(matches!(bridge.update_error_prob(STA, STA2, 1.2), Err(Error::Configuration(_))));
        assert!(!bridge.is_poisoned());
    }

    #[test]
    fn unknown_station_cannot_be_unregistered() {
        let (client, _server) = UnixStream::pair().unwrap();
        let bridge = ChannelBridge::from_stream(client, None).unwrap();
        assert!(matches!(bridge.unregister(STA), Err(Error::Protocol(ProtocolError::UnknownStation(_)))));
    }

    #[test]
    fn timeout_poisons_the_connection() {
        let (client, server) = UnixStream::pair().unwrap();
        let silent = thread::spawn(move || {
            let mut req = [0u8; 11];
            let mut server = server;
            server.read_exact(&mut req).unwrap();
            thread::sleep(Duration::from_millis(300));
        });
        let bridge = ChannelBridge::from_stream(client, Some(Duration::from_millis(50))).unwrap();
        assert!(matches!(bridge.update_gain(STA, 3), Err(Error::Timeout(_))));
        assert!(bridge.is_poisoned());
        assert!(matches!(bridge.update_gain(STA, 3), Err(Error::Protocol(ProtocolError::Poisoned))));
        silent.join().unwrap();
    }

    #[test]
    fn connect_with_retry_gives_up_after_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.sock");
        let err = ChannelBridge::connect_with_retry(&path, None, Duration::from_millis(60), Duration::from_millis(20)).err().unwrap();
        assert!(matches!(err, Error::DaemonUnavailable { .. }));
    }
}
