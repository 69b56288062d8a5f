//! Association state machine.
//!
//! One `pass` over the world:
//! 1) draws a fresh shadowing sample per receiving interface,
//! 2) for every station interface, finds the access points in range,
//!    associates, hands over or disassociates, and refreshes the link metrics,
//! 3) links or unlinks ad-hoc/mesh peers,
//! 4) in interference mode, pushes positions and shadowing draws to the
//!    channel daemon.
//!
//! Link side effects are either local shaping or daemon updates, never both.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;

use crate::error::{Error, Result};
use crate::propagation::PropagationModel;
use crate::simulation::types::{IntfRef, LinkEvent, LinkMetrics, Position};
use crate::simulation::world::World;
use crate::wmediumd::ChannelBridge;
use crate::wmediumd::config::DaemonMode;
use crate::wmediumd::protocol::MacAddr;

use super::policy::{AssociationPolicy, Candidate};
use super::shaping::{LinkShaper, ShapingParams, ShapingStrategy};

/// SNR pushed for a link that no longer exists.
pub const DISCONNECTED_SNR: i32 = -10;

/// What happens to a link besides the association bookkeeping.
pub enum LinkSideEffect {
    None,
    /// Shape the station interface locally.
    Shaping { strategy: ShapingStrategy, shaper: Box<dyn LinkShaper> },
    /// Keep the channel daemon in step; it owns drop and latency behaviour.
    Daemon { bridge: Arc<ChannelBridge>, mode: DaemonMode },
}

impl std::fmt::Debug for LinkSideEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkSideEffect::None => f.write_str("None"),
            LinkSideEffect::Shaping { strategy, .. } => f.debug_struct("Shaping").field("strategy", strategy).finish(),
            LinkSideEffect::Daemon { mode, .. } => f.debug_struct("Daemon").field("mode", mode).finish(),
        }
    }
}

/// Result of one controller pass.
#[derive(Debug, Default)]
pub struct PassOutcome {
    pub events: Vec<LinkEvent>,
    /// Side effects that failed. The association state is already updated.
    pub failures: Vec<Error>,
}

#[derive(Debug)]
pub struct AssociationController {
    propagation: PropagationModel,
    policy: AssociationPolicy,
    side_effect: LinkSideEffect,
    /// Last value pushed per directed link (SNR or fixed-point error probability).
    pushed_links: HashMap<(MacAddr, MacAddr), i32>,
    pushed_positions: HashMap<MacAddr, Position>,
}

impl AssociationController {
    pub fn new(propagation: PropagationModel, policy: AssociationPolicy, side_effect: LinkSideEffect) -> Self {
        Self {
            propagation,
            policy,
            side_effect,
            pushed_links: HashMap::new(),
            pushed_positions: HashMap::new(),
        }
    }

    pub fn propagation(&self) -> &PropagationModel {
        &self.propagation
    }

    pub fn policy(&self) -> &AssociationPolicy {
        &self.policy
    }

    fn bridge(&self) -> Option<(Arc<ChannelBridge>, DaemonMode)> {
        match &self.side_effect {
            LinkSideEffect::Daemon { bridge, mode } => Some((bridge.clone(), *mode)),
            _ => None,
        }
    }

    /// Give every interface without an explicit range the distance its
    /// transmit power reaches.
    pub fn init_ranges(&self, world: &mut World) -> Result<()> {
        let refs: Vec<IntfRef> = world.interfaces().collect();
        for r in refs {
            if world.intf(r).range <= 0.0 {
                let range = self.propagation.max_distance_for_threshold(&world.intf(r).radio())?;
                world.intf_mut(r).range = range;
                log::debug!("{} range {:.1} m at {} dBm", world.intf_label(r), range, world.intf(r).tx_power);
            }
        }
        Ok(())
    }

    /// Set tx power and recompute the range it covers.
    pub fn set_tx_power(&mut self, world: &mut World, r: IntfRef, dbm: f64) -> Result<()> {
        let mut radio = world.intf(r).radio();
        radio.tx_power = dbm;
        let range = self.propagation.max_distance_for_threshold(&radio)?;
        let intf = world.intf_mut(r);
        intf.tx_power = dbm;
        intf.range = range;
        log::info!("{} tx power {} dBm, range {:.1} m", world.intf_label(r), dbm, range);
        self.push_tx_power(world, r)
    }

    /// Set the range and derive the tx power needed to cover it.
    pub fn set_range(&mut self, world: &mut World, r: IntfRef, meters: f64) -> Result<()> {
        let tx_power = self.propagation.required_tx_power(meters, &world.intf(r).radio())?;
        let intf = world.intf_mut(r);
        intf.tx_power = tx_power;
        intf.range = meters;
        log::info!("{} range {:.1} m, tx power {:.2} dBm", world.intf_label(r), meters, tx_power);
        self.push_tx_power(world, r)
    }

    /// Set the antenna gain (dBi); the range follows the new radio.
    pub fn set_antenna_gain(&mut self, world: &mut World, r: IntfRef, dbi: f64) -> Result<()> {
        let mut radio = world.intf(r).radio();
        radio.antenna_gain = dbi;
        let range = self.propagation.max_distance_for_threshold(&radio)?;
        let intf = world.intf_mut(r);
        intf.antenna_gain = dbi;
        intf.range = range;
        log::info!("{} antenna gain {} dBi, range {:.1} m", world.intf_label(r), dbi, range);
        if let Some((bridge, DaemonMode::Interference)) = self.bridge() {
            bridge.update_gain(world.intf(r).mac, dbi.round() as i32)?;
        }
        Ok(())
    }

    /// Set the antenna height (m); the range follows the new radio.
    pub fn set_antenna_height(&mut self, world: &mut World, r: IntfRef, meters: f64) -> Result<()> {
        let mut radio = world.intf(r).radio();
        radio.antenna_height = meters;
        let range = self.propagation.max_distance_for_threshold(&radio)?;
        let intf = world.intf_mut(r);
        intf.antenna_height = meters;
        intf.range = range;
        log::info!("{} antenna height {} m, range {:.1} m", world.intf_label(r), meters, range);
        if let Some((bridge, DaemonMode::Interference)) = self.bridge() {
            bridge.update_height(world.intf(r).mac, meters.round() as i32)?;
        }
        Ok(())
    }

    fn push_tx_power(&self, world: &World, r: IntfRef) -> Result<()> {
        if let Some((bridge, DaemonMode::Interference)) = self.bridge() {
            let intf = world.intf(r);
            bridge.update_txpower(intf.mac, intf.tx_power.round() as i32)?;
        }
        Ok(())
    }

    /// Metrics of the signal from `tx` as received at `rx`.
    fn link_metrics(&self, world: &World, tx: IntfRef, rx: IntfRef) -> LinkMetrics {
        let distance = world.distance(tx.node, rx.node);
        let rx_intf = world.intf(rx);
        let rssi = self.propagation.received_power(distance, &world.intf(tx).radio(), &rx_intf.radio(), rx_intf.gaussian_random);
        LinkMetrics {
            distance,
            rssi,
            snr: self.propagation.snr(rssi),
        }
    }

    pub fn pass<R: Rng + ?Sized>(&mut self, world: &mut World, rng: &mut R) -> Result<PassOutcome> {
        let mut out = PassOutcome::default();
        let refs: Vec<IntfRef> = world.interfaces().collect();
        for r in &refs {
            world.intf_mut(*r).gaussian_random = self.propagation.sample_shadowing(rng);
        }
        self.station_pass(world, &mut out)?;
        self.peer_pass(world, &mut out);
        if let Some((bridge, DaemonMode::Interference)) = self.bridge() {
            self.sync_interference(world, &bridge, &mut out);
        }
        Ok(out)
    }

    fn station_pass(&mut self, world: &mut World, out: &mut PassOutcome) -> Result<()> {
        let aps = world.ap_interfaces();
        for sta in world.station_interfaces() {
            let in_range: Vec<(IntfRef, LinkMetrics)> = aps
                .iter()
                .filter(|ap| ap.node != sta.node)
                .map(|ap| (*ap, self.link_metrics(world, *ap, sta)))
                .filter(|(ap, m)| m.distance <= world.intf(*ap).range)
                .collect();
            world.set_aps_in_range(sta, in_range.iter().map(|(ap, m)| (*ap, m.rssi)).collect());

            let candidates: Vec<Candidate> = in_range
                .iter()
                .map(|(ap, m)| Candidate {
                    load: world.intf(*ap).associated_stations().len(),
                    rssi: m.rssi,
                })
                .collect();
            let current = world.intf(sta).associated_to();
            let current_idx = current.and_then(|c| in_range.iter().position(|(ap, _)| *ap == c));
            let target = match current_idx {
                Some(ci) => {
                    let firing: Vec<usize> = (0..candidates.len())
                        .filter(|&i| i != ci && self.policy.should_handover(candidates[ci], candidates[i]))
                        .collect();
                    let firing_candidates: Vec<Candidate> = firing.iter().map(|&i| candidates[i]).collect();
                    Some(self.policy.choose(&firing_candidates).map_or(ci, |k| firing[k]))
                }
                None => self.policy.choose(&candidates),
            };
            let target = target.map(|i| in_range[i]);

            let sta_name = world.node(sta.node).name.clone();
            match (current, target) {
                (None, None) => {}
                (Some(old), None) => {
                    world.disassociate(sta);
                    let ap = world.node(old.node).name.clone();
                    log::info!("{} disassociated from {} (out of range)", world.intf_label(sta), ap);
                    out.events.push(LinkEvent::Disassociated {
                        station: sta_name,
                        wlan: sta.wlan,
                        ap,
                    });
                    self.link_down(world, sta, old, out);
                    if let LinkSideEffect::Shaping { shaper, .. } = &mut self.side_effect {
                        apply_shaping(shaper.as_mut(), world, sta, ShapingParams::disconnected(), out);
                    }
                }
                (None, Some((ap, _))) => {
                    world.associate(sta, ap)?;
                    let ap_name = world.node(ap.node).name.clone();
                    log::info!("{} associated to {}", world.intf_label(sta), ap_name);
                    out.events.push(LinkEvent::Associated {
                        station: sta_name,
                        wlan: sta.wlan,
                        ap: ap_name,
                    });
                }
                (Some(old), Some((ap, _))) if old != ap => {
                    world.associate(sta, ap)?;
                    let from = world.node(old.node).name.clone();
                    let to = world.node(ap.node).name.clone();
                    log::info!("{} handover {} -> {}", world.intf_label(sta), from, to);
                    out.events.push(LinkEvent::Handover {
                        station: sta_name,
                        wlan: sta.wlan,
                        from,
                        to,
                    });
                    self.link_down(world, sta, old, out);
                }
                _ => {}
            }

            match target {
                Some((ap, metrics)) => {
                    world.set_link(sta, metrics);
                    let intf = world.intf_mut(sta);
                    intf.rssi = metrics.rssi;
                    intf.snr = metrics.snr;
                    log::debug!("{}: d={:.1} m rssi={:.1} dBm snr={:.1} dB", world.intf_label(sta), metrics.distance, metrics.rssi, metrics.snr);
                    self.link_up(world, sta, ap, metrics, out);
                }
                None => {
                    let intf = world.intf_mut(sta);
                    intf.rssi = f64::NEG_INFINITY;
                    intf.snr = f64::NEG_INFINITY;
                }
            }
        }
        Ok(())
    }

    fn peer_pass(&mut self, world: &mut World, out: &mut PassOutcome) {
        let peers = world.peer_interfaces();
        for (i, &a) in peers.iter().enumerate() {
            for &b in &peers[i + 1..] {
                if a.node == b.node || world.intf(a).mode != world.intf(b).mode {
                    continue;
                }
                let reach = world.intf(a).range.min(world.intf(b).range);
                let at_a = self.link_metrics(world, b, a);
                let at_b = self.link_metrics(world, a, b);
                let (name_a, name_b) = (world.node(a.node).name.clone(), world.node(b.node).name.clone());
                if at_a.distance <= reach {
                    if world.link_peers(a, b, at_a, at_b) {
                        log::info!("{} <-> {} linked at {:.1} m", world.intf_label(a), world.intf_label(b), at_a.distance);
                        out.events.push(LinkEvent::PeerUp { a: name_a, b: name_b });
                    }
                    self.push_link(world, b, a, at_a.snr, out);
                    self.push_link(world, a, b, at_b.snr, out);
                } else if world.unlink_peers(a, b) {
                    log::info!("{} <-> {} unlinked at {:.1} m", world.intf_label(a), world.intf_label(b), at_a.distance);
                    out.events.push(LinkEvent::PeerDown { a: name_a, b: name_b });
                    self.push_disconnect(world, a, b, out);
                }
            }
        }
        for r in peers {
            let best = world.intf(r).neighbors().values().map(|m| m.rssi).reduce(f64::max);
            let intf = world.intf_mut(r);
            intf.rssi = best.unwrap_or(f64::NEG_INFINITY);
            intf.snr = best.map_or(f64::NEG_INFINITY, |rssi| self.propagation.snr(rssi));
        }
    }

    /// Side effects for a live association, run every pass.
    fn link_up(&mut self, world: &mut World, sta: IntfRef, ap: IntfRef, metrics: LinkMetrics, out: &mut PassOutcome) {
        if matches!(self.side_effect, LinkSideEffect::Daemon { .. }) {
            let reverse = self.link_metrics(world, sta, ap);
            self.push_link(world, ap, sta, metrics.snr, out);
            self.push_link(world, sta, ap, reverse.snr, out);
            return;
        }
        if let LinkSideEffect::Shaping { strategy, shaper } = &mut self.side_effect {
            let params = strategy.params(&metrics).rounded();
            apply_shaping(shaper.as_mut(), world, sta, params, out);
        }
    }

    fn link_down(&mut self, world: &World, sta: IntfRef, ap: IntfRef, out: &mut PassOutcome) {
        self.push_disconnect(world, sta, ap, out);
    }

    /// Push the quality of the directed link `from → to` if it changed.
    fn push_link(&mut self, world: &World, from: IntfRef, to: IntfRef, snr: f64, out: &mut PassOutcome) {
        let Some((bridge, mode)) = self.bridge() else {
            return;
        };
        let (from, to) = (world.intf(from).mac, world.intf(to).mac);
        let value = match mode {
            DaemonMode::Snr => snr.round() as i32,
            DaemonMode::ErrorProb => 0,
            DaemonMode::Interference => return,
        };
        if self.pushed_links.get(&(from, to)) == Some(&value) {
            return;
        }
        let sent = match mode {
            DaemonMode::Snr => bridge.update_snr(from, to, value),
            _ => bridge.update_error_prob(from, to, 0.0),
        };
        match sent {
            Ok(()) => {
                self.pushed_links.insert((from, to), value);
            }
            Err(e) => out.failures.push(e),
        }
    }

    fn push_disconnect(&mut self, world: &World, a: IntfRef, b: IntfRef, out: &mut PassOutcome) {
        let Some((bridge, mode)) = self.bridge() else {
            return;
        };
        let (a, b) = (world.intf(a).mac, world.intf(b).mac);
        for (from, to) in [(a, b), (b, a)] {
            let (value, sent) = match mode {
                DaemonMode::Snr => (DISCONNECTED_SNR, bridge.update_snr(from, to, DISCONNECTED_SNR)),
                DaemonMode::ErrorProb => (i32::MAX, bridge.update_error_prob(from, to, 1.0)),
                DaemonMode::Interference => return,
            };
            match sent {
                Ok(()) => {
                    self.pushed_links.insert((from, to), value);
                }
                Err(e) => out.failures.push(e),
            }
        }
    }

    fn sync_interference(&mut self, world: &World, bridge: &ChannelBridge, out: &mut PassOutcome) {
        let stochastic = self.propagation.is_stochastic();
        for node in world.nodes() {
            for intf in &node.interfaces {
                if self.pushed_positions.get(&intf.mac) != Some(&node.position) {
                    match bridge.update_position(intf.mac, &node.position) {
                        Ok(()) => {
                            self.pushed_positions.insert(intf.mac, node.position);
                        }
                        Err(e) => out.failures.push(e),
                    }
                }
                if stochastic {
                    if let Err(e) = bridge.update_gaussian_random(intf.mac, intf.gaussian_random as f32) {
                        out.failures.push(e);
                    }
                }
            }
        }
    }
}

/// Shape `sta` unless `params` are already in place.
fn apply_shaping(shaper: &mut dyn LinkShaper, world: &mut World, sta: IntfRef, params: ShapingParams, out: &mut PassOutcome) {
    if world.intf(sta).applied_shaping == Some(params) {
        return;
    }
    let name = world.intf(sta).name.clone();
    match shaper.apply_link_shaping(&name, params.bandwidth_mbit, params.loss_percent, params.latency_ms) {
        Ok(()) => world.intf_mut(sta).applied_shaping = Some(params),
        Err(e) => {
            log::warn!("Shaping {} failed: {}", name, e);
            out.failures.push(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::association::policy::PolicyKind;
    use crate::mobility::random_waypoint::RandomWaypoint;
    use crate::mobility::{BorderPolicy, NodeBounds, PositionGenerator};
    use crate::propagation::{ModelKind, PathLossParameters};
    use crate::simulation::types::{InterfaceMode, Node, Role, WirelessInterface};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::io::{Read, Write};
    use std::os::unix::net::UnixStream;
    use std::sync::Mutex;
    use std::time::Duration;

    fn log_distance() -> PropagationModel {
        PropagationModel::new(PathLossParameters {
            model: ModelKind::LogDistance,
            path_loss_exponent: 3.0,
            system_loss: 1.0,
            ..Default::default()
        })
        .unwrap()
    }

    fn controller(policy: PolicyKind, side_effect: LinkSideEffect) -> AssociationController {
        AssociationController::new(log_distance(), AssociationPolicy::new(policy), side_effect)
    }

    fn intf(name: &str, index: u32, mode: InterfaceMode, range: f64) -> WirelessInterface {
        let mut i = WirelessInterface::new(format!("{name}-wlan0"), MacAddr::local(index), mode, 1, 2.412);
        i.range = range;
        i
    }

    fn add(world: &mut World, name: &str, role: Role, mode: InterfaceMode, x: f64, range: f64) -> usize {
        let index = world.len() as u32 + 1;
        world
            .add_node(Node::new(name, role, Position::new(x, 0.0, 0.0)).with_interface(intf(name, index, mode, range)))
            .unwrap()
    }

    /// Station at 0, ap1 at 40 m, ap2 at 5 m.
    fn handover_world() -> (World, IntfRef, IntfRef, IntfRef) {
        let mut world = World::new();
        let sta = add(&mut world, "sta1", Role::Station, InterfaceMode::Managed, 0.0, 100.0);
        let ap1 = add(&mut world, "ap1", Role::AccessPoint, InterfaceMode::Master, 40.0, 100.0);
        let ap2 = add(&mut world, "ap2", Role::AccessPoint, InterfaceMode::Master, 5.0, 100.0);
        (world, IntfRef::new(sta, 0), IntfRef::new(ap1, 0), IntfRef::new(ap2, 0))
    }

    #[test]
    fn ssf_moves_station_to_stronger_ap() {
        let (mut world, sta, ap1, ap2) = handover_world();
        world.associate(sta, ap1).unwrap();
        let mut c = controller(PolicyKind::Ssf, LinkSideEffect::None);
        let mut rng = StdRng::seed_from_u64(1);
        let out = c.pass(&mut world, &mut rng).unwrap();

        assert_eq!(world.intf(sta).associated_to(), Some(ap2));
        assert!(world.intf(ap1).associated_stations().is_empty());
        assert_eq!(
            out.events,
            vec![LinkEvent::Handover {
                station: "sta1".into(),
                wlan: 0,
                from: "ap1".into(),
                to: "ap2".into()
            }]
        );
        let aps = world.intf(sta).aps_in_range();
        assert!(aps[&ap2] > aps[&ap1]);
        world.check_consistency().unwrap();
    }

    #[test]
    fn without_policy_station_stays_while_in_range() {
        let (mut world, sta, ap1, _) = handover_world();
        world.associate(sta, ap1).unwrap();
        let mut c = controller(PolicyKind::None, LinkSideEffect::None);
        let out = c.pass(&mut world, &mut StdRng::seed_from_u64(1)).unwrap();
        assert!(out.events.is_empty());
        assert_eq!(world.intf(sta).associated_to(), Some(ap1));
        assert!((world.intf(sta).link().unwrap().distance - 40.0).abs() < 1e-9);
    }

    #[test]
    fn unassociated_station_picks_strongest_and_leaves_when_out_of_range() {
        let (mut world, sta, _, ap2) = handover_world();
        let mut c = controller(PolicyKind::None, LinkSideEffect::None);
        let mut rng = StdRng::seed_from_u64(1);
        c.pass(&mut world, &mut rng).unwrap();
        assert_eq!(world.intf(sta).associated_to(), Some(ap2));

        world.set_position(sta.node, Position::new(-500.0, 0.0, 0.0));
        let out = c.pass(&mut world, &mut rng).unwrap();
        assert_eq!(world.intf(sta).associated_to(), None);
        assert!(matches!(&out.events[0], LinkEvent::Disassociated { ap, .. } if ap == "ap2"));
        assert!(world.intf(sta).link().is_none());
        world.check_consistency().unwrap();
    }

    #[test]
    fn three_station_adhoc_scenario() {
        let mut world = World::new();
        for (i, x) in [0.0, 50.0, 100.0].into_iter().enumerate() {
            add(&mut world, &format!("sta{}", i + 1), Role::Station, InterfaceMode::Adhoc, x, 60.0);
        }
        let mut c = controller(PolicyKind::None, LinkSideEffect::None);
        let out = c.pass(&mut world, &mut StdRng::seed_from_u64(1)).unwrap();

        let s1 = IntfRef::new(0, 0);
        let s2 = IntfRef::new(1, 0);
        let s3 = IntfRef::new(2, 0);
        assert!(world.intf(s1).neighbors().contains_key(&s2));
        assert!(!world.intf(s1).neighbors().contains_key(&s3));
        assert!(world.intf(s2).neighbors().contains_key(&s3));
        assert_eq!(out.events.len(), 2);

        world.set_position(1, Position::new(200.0, 0.0, 0.0));
        let out = c.pass(&mut world, &mut StdRng::seed_from_u64(2)).unwrap();
        assert!(world.intf(s1).neighbors().is_empty());
        assert!(out.events.contains(&LinkEvent::PeerDown { a: "sta1".into(), b: "sta2".into() }));
    }

    #[test]
    fn association_invariant_holds_under_mobility() {
        let mut world = World::new();
        add(&mut world, "ap1", Role::AccessPoint, InterfaceMode::Master, 20.0, 45.0);
        add(&mut world, "ap2", Role::AccessPoint, InterfaceMode::Master, 80.0, 45.0);
        let stations: Vec<usize> = (0..5).map(|i| add(&mut world, &format!("sta{i}"), Role::Station, InterfaceMode::Managed, 10.0 * i as f64, 30.0)).collect();

        let bounds = NodeBounds::new(Position::new(0.0, 0.0, 0.0), Position::new(100.0, 30.0, 0.0), (1.0, 5.0));
        let mut rng = StdRng::seed_from_u64(99);
        let initial = stations.iter().map(|n| world.position(*n)).collect();
        let mut mobility = RandomWaypoint::new(&mut rng, vec![bounds; stations.len()], initial, BorderPolicy::Reflect, Some(3.0));
        for policy in [PolicyKind::None, PolicyKind::Llf, PolicyKind::Ssf] {
            let mut c = controller(policy, LinkSideEffect::None);
            for _ in 0..200 {
                let positions = mobility.next_positions(&mut rng, 1.0).to_vec();
                for (n, p) in stations.iter().zip(positions) {
                    world.set_position(*n, p);
                }
                c.pass(&mut world, &mut rng).unwrap();
                world.check_consistency().unwrap();
                for sta in world.station_interfaces() {
                    if let Some(ap) = world.intf(sta).associated_to() {
                        assert!(world.distance(sta.node, ap.node) <= 45.0);
                    }
                }
            }
        }
    }

    #[derive(Clone, Default)]
    struct RecordingShaper(Arc<Mutex<Vec<(String, ShapingParams)>>>);

    impl LinkShaper for RecordingShaper {
        fn apply_link_shaping(&mut self, interface: &str, bandwidth_mbit: f64, loss_percent: f64, latency_ms: f64) -> Result<()> {
            self.0.lock().unwrap().push((
                interface.to_string(),
                ShapingParams {
                    bandwidth_mbit,
                    loss_percent,
                    latency_ms,
                },
            ));
            Ok(())
        }
    }

    #[test]
    fn shaping_is_reapplied_only_when_parameters_change() {
        let (mut world, sta, _, _) = handover_world();
        let shaper = RecordingShaper::default();
        let mut c = controller(
            PolicyKind::None,
            LinkSideEffect::Shaping {
                strategy: ShapingStrategy::DistanceDecay { base_mbit: 54.0 },
                shaper: Box::new(shaper.clone()),
            },
        );
        let mut rng = StdRng::seed_from_u64(3);
        c.pass(&mut world, &mut rng).unwrap();
        c.pass(&mut world, &mut rng).unwrap();
        assert_eq!(shaper.0.lock().unwrap().len(), 1);

        world.set_position(sta.node, Position::new(-20.0, 0.0, 0.0));
        c.pass(&mut world, &mut rng).unwrap();
        let applied = shaper.0.lock().unwrap();
        assert_eq!(applied.len(), 2);
        assert_eq!(applied[1].0, "sta1-wlan0");
        assert!((applied[1].1.latency_ms - 3.5).abs() < 1e-9);
    }

    #[test]
    fn daemon_mode_pushes_snr_instead_of_shaping() {
        let (mut world, sta, _, ap2) = handover_world();
        let (client, mut server) = UnixStream::pair().unwrap();
        let daemon = std::thread::spawn(move || {
            let mut seen = Vec::new();
            for _ in 0..2 {
                let mut req = [0u8; 17];
                server.read_exact(&mut req).unwrap();
                let mut resp = vec![req[0] + 1];
                resp.extend_from_slice(&req);
                resp.push(0);
                server.write_all(&resp).unwrap();
                seen.push(req);
            }
            seen
        });
        let bridge = Arc::new(ChannelBridge::from_stream(client, Some(Duration::from_secs(5))).unwrap());
        let mut c = controller(PolicyKind::None, LinkSideEffect::Daemon { bridge, mode: DaemonMode::Snr });
        let mut rng = StdRng::seed_from_u64(4);
        let out = c.pass(&mut world, &mut rng).unwrap();
        assert!(out.failures.is_empty());
        // Unchanged SNR is not pushed again.
        let out = c.pass(&mut world, &mut rng).unwrap();
        assert!(out.failures.is_empty());

        let seen = daemon.join().unwrap();
        let sta_mac = world.intf(sta).mac;
        let ap_mac = world.intf(ap2).mac;
        assert_eq!(&seen[0][1..7], &ap_mac.0);
        assert_eq!(&seen[0][7..13], &sta_mac.0);
        assert_eq!(&seen[1][1..7], &sta_mac.0);
        let snr = i32::from_be_bytes([seen[0][13], seen[0][14], seen[0][15], seen[0][16]]);
        assert_eq!(snr, world.intf(sta).snr.round() as i32);
        assert!(world.intf(sta).applied_shaping.is_none());
    }

    #[test]
    fn range_and_tx_power_stay_coupled() {
        let (mut world, sta, _, _) = handover_world();
        world.intf_mut(sta).antenna_gain = 0.0;
        let mut c = controller(PolicyKind::None, LinkSideEffect::None);
        c.set_range(&mut world, sta, 60.0).unwrap();
        let tx = world.intf(sta).tx_power;
        assert!(tx > 1.0 && tx < 5.0);
        let back = c.propagation().max_distance_for_threshold(&world.intf(sta).radio()).unwrap();
        assert!((back - 60.0).abs() < 1e-6);

        c.set_tx_power(&mut world, sta, 20.0).unwrap();
        assert!(world.intf(sta).range > 60.0);

        let err = c.set_range(&mut world, sta, 1.0).unwrap_err();
        assert!(matches!(err, Error::Configuration(crate::error::ConfigurationError::InvalidPower(_))));
        assert_eq!(world.intf(sta).tx_power, 20.0);
    }

    #[test]
    fn init_ranges_fills_missing_ranges_only() {
        let (mut world, sta, ap1, _) = handover_world();
        world.intf_mut(sta).range = 0.0;
        let c = controller(PolicyKind::None, LinkSideEffect::None);
        c.init_ranges(&mut world).unwrap();
        assert!(world.intf(sta).range > 100.0);
        assert_eq!(world.intf(ap1).range, 100.0);
    }

    #[test]
    fn lost_station_is_shaped_as_disconnected() {
        let (mut world, sta, _, _) = handover_world();
        let shaper = RecordingShaper::default();
        let mut c = controller(
            PolicyKind::None,
            LinkSideEffect::Shaping {
                strategy: ShapingStrategy::DistanceDecay { base_mbit: 54.0 },
                shaper: Box::new(shaper.clone()),
            },
        );
        let mut rng = StdRng::seed_from_u64(3);
        c.pass(&mut world, &mut rng).unwrap();

        world.set_position(sta.node, Position::new(-5000.0, 0.0, 0.0));
        let out = c.pass(&mut world, &mut rng).unwrap();
        assert!(matches!(&out.events[..], [LinkEvent::Disassociated { ap, .. }] if ap == "ap2"));
        {
            let applied = shaper.0.lock().unwrap();
            assert_eq!(applied.len(), 2);
            assert_eq!(applied[1], ("sta1-wlan0".to_string(), ShapingParams::disconnected()));
        }
        // Staying out of range does not reshape.
        c.pass(&mut world, &mut rng).unwrap();
        assert_eq!(shaper.0.lock().unwrap().len(), 2);

        world.set_position(sta.node, Position::new(0.0, 0.0, 0.0));
        c.pass(&mut world, &mut rng).unwrap();
        let applied = shaper.0.lock().unwrap();
        assert_eq!(applied.len(), 3);
        assert!(applied[2].1.loss_percent < 1.0);
    }

    #[test]
    fn llf_moves_one_station_off_the_crowded_ap() {
        let mut world = World::new();
        let ap1 = IntfRef::new(add(&mut world, "ap1", Role::AccessPoint, InterfaceMode::Master, 0.0, 100.0), 0);
        let ap2 = IntfRef::new(add(&mut world, "ap2", Role::AccessPoint, InterfaceMode::Master, 10.0, 100.0), 0);
        for i in 0..4 {
            let sta = add(&mut world, &format!("sta{i}"), Role::Station, InterfaceMode::Managed, 5.0, 100.0);
            world.associate(IntfRef::new(sta, 0), ap1).unwrap();
        }
        let mut c = controller(PolicyKind::Llf, LinkSideEffect::None);
        let mut rng = StdRng::seed_from_u64(6);

        let out = c.pass(&mut world, &mut rng).unwrap();
        // 4 vs 0 exceeds the margin of 2; 3 vs 1 does not.
        assert_eq!(
            out.events,
            vec![LinkEvent::Handover {
                station: "sta0".into(),
                wlan: 0,
                from: "ap1".into(),
                to: "ap2".into()
            }]
        );
        assert_eq!(world.intf(ap1).associated_stations().len(), 3);
        assert_eq!(world.intf(ap2).associated_stations().len(), 1);

        let out = c.pass(&mut world, &mut rng).unwrap();
        assert!(out.events.is_empty());
        world.check_consistency().unwrap();
    }

    fn payload_len(tag: u8) -> usize {
        match tag {
            1 | 9 => 16,
            13 => 18,
            15 | 17 | 19 | 21 => 10,
            t => panic!("unexpected request type {t}"),
        }
    }

    /// Acknowledges every request until the bridge is dropped, then returns
    /// the requests in arrival order.
    fn acking_daemon() -> (Arc<ChannelBridge>, std::thread::JoinHandle<Vec<Vec<u8>>>) {
        let (client, mut server) = UnixStream::pair().unwrap();
        let daemon = std::thread::spawn(move || {
            let mut seen = Vec::new();
            let mut tag = [0u8; 1];
            while server.read_exact(&mut tag).is_ok() {
                let mut req = vec![tag[0]; 1 + payload_len(tag[0])];
                server.read_exact(&mut req[1..]).unwrap();
                let mut resp = vec![tag[0] + 1];
                resp.extend_from_slice(&req);
                resp.push(0);
                server.write_all(&resp).unwrap();
                seen.push(req);
            }
            seen
        });
        (Arc::new(ChannelBridge::from_stream(client, Some(Duration::from_secs(5))).unwrap()), daemon)
    }

    fn f32_at(frame: &[u8], at: usize) -> f32 {
        f32::from_be_bytes([frame[at], frame[at + 1], frame[at + 2], frame[at + 3]])
    }

    fn i32_at(frame: &[u8], at: usize) -> i32 {
        i32::from_be_bytes([frame[at], frame[at + 1], frame[at + 2], frame[at + 3]])
    }

    #[test]
    fn interference_mode_forwards_positions_and_shadowing() {
        let (mut world, sta, _, ap2) = handover_world();
        let (bridge, daemon) = acking_daemon();
        let shadowed = PropagationModel::new(PathLossParameters {
            model: ModelKind::LogNormalShadowing,
            path_loss_exponent: 3.0,
            shadowing_sigma: 4.0,
            ..Default::default()
        })
        .unwrap();
        let mut c = AssociationController::new(
            shadowed,
            AssociationPolicy::new(PolicyKind::None),
            LinkSideEffect::Daemon {
                bridge,
                mode: DaemonMode::Interference,
            },
        );
        let mut rng = StdRng::seed_from_u64(8);

        let out = c.pass(&mut world, &mut rng).unwrap();
        assert!(out.failures.is_empty());
        let drawn: Vec<f64> = world.interfaces().map(|r| world.intf(r).gaussian_random).collect();
        assert!(drawn.iter().any(|g| *g != 0.0));
        let sta_draw = world.intf(sta).gaussian_random;
        let expected_rssi = c.propagation().received_power(5.0, &world.intf(ap2).radio(), &world.intf(sta).radio(), sta_draw);
        assert!((world.intf(sta).rssi - expected_rssi).abs() < 1e-9);

        // Nothing moved: only fresh shadowing draws.
        c.pass(&mut world, &mut rng).unwrap();
        c.set_tx_power(&mut world, sta, 20.0).unwrap();
        c.set_antenna_gain(&mut world, sta, 3.0).unwrap();
        c.set_antenna_height(&mut world, sta, 2.0).unwrap();
        world.set_position(sta.node, Position::new(2.0, 0.0, 0.0));
        c.pass(&mut world, &mut rng).unwrap();
        drop(c);

        let seen = daemon.join().unwrap();
        let tags: Vec<u8> = seen.iter().map(|f| f[0]).collect();
        assert_eq!(tags, vec![13, 17, 13, 17, 13, 17, 17, 17, 17, 15, 19, 21, 13, 17, 17, 17]);

        let sta_mac = world.intf(sta).mac;
        assert_eq!(&seen[0][1..7], &sta_mac.0);
        assert_eq!(&seen[1][1..7], &sta_mac.0);
        assert_eq!(f32_at(&seen[1], 7), sta_draw as f32);
        for (frame, draw) in [&seen[1], &seen[3], &seen[5]].into_iter().zip(&drawn) {
            assert_eq!(f32_at(frame, 7), *draw as f32);
        }
        assert_eq!(i32_at(&seen[9], 7), 20);
        assert_eq!(i32_at(&seen[10], 7), 3);
        assert_eq!(i32_at(&seen[11], 7), 2);
        assert_eq!(f32_at(&seen[12], 7), 2.0);
    }

    #[test]
    fn error_prob_mode_pushes_clear_and_lost_links() {
        let (mut world, sta, _, ap2) = handover_world();
        let (bridge, daemon) = acking_daemon();
        let mut c = controller(
            PolicyKind::None,
            LinkSideEffect::Daemon {
                bridge,
                mode: DaemonMode::ErrorProb,
            },
        );
        let mut rng = StdRng::seed_from_u64(5);
        c.pass(&mut world, &mut rng).unwrap();
        c.pass(&mut world, &mut rng).unwrap();
        world.set_position(sta.node, Position::new(-500.0, 0.0, 0.0));
        let out = c.pass(&mut world, &mut rng).unwrap();
        assert!(out.failures.is_empty());
        drop(c);

        let seen = daemon.join().unwrap();
        assert_eq!(seen.len(), 4);
        assert!(seen.iter().all(|f| f[0] == 9));
        let (sta_mac, ap_mac) = (world.intf(sta).mac, world.intf(ap2).mac);
        assert_eq!((&seen[0][1..7], &seen[0][7..13]), (&ap_mac.0[..], &sta_mac.0[..]));
        assert_eq!(i32_at(&seen[0], 13), 0);
        assert_eq!(i32_at(&seen[1], 13), 0);
        assert_eq!((&seen[2][1..7], &seen[2][7..13]), (&sta_mac.0[..], &ap_mac.0[..]));
        assert_eq!(i32_at(&seen[2], 13), i32::MAX);
        assert_eq!(i32_at(&seen[3], 13), i32::MAX);
    }
}
