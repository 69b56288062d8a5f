//! The simulated world: node storage plus the single mutation path for the
//! association relation.

use std::collections::HashMap;

use chrono::Utc;

use crate::error::{ConsistencyError, Error, Result};

use super::types::{InterfaceMode, InterfaceSnapshot, IntfRef, LinkMetrics, Node, NodeSnapshot, Position, Role, WirelessInterface, WorldSnapshot};

/// All nodes of the emulated network, addressable by index or by name.
#[derive(Debug, Clone, Default)]
pub struct World {
    nodes: Vec<Node>,
    by_name: HashMap<String, usize>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node and return its index. Names must be unique.
    pub fn add_node(&mut self, node: Node) -> Result<usize> {
        if self.by_name.contains_key(&node.name) {
            return Err(Error::Other(anyhow::anyhow!("duplicate node name {}", node.name)));
        }
        let idx = self.nodes.len();
        self.by_name.insert(node.name.clone(), idx);
        self.nodes.push(node);
        Ok(idx)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, idx: usize) -> &Node {
        &self.nodes[idx]
    }

    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.by_name.get(name).copied().ok_or_else(|| Error::UnknownNode(name.to_string()))
    }

    pub fn intf_ref(&self, name: &str, wlan: usize) -> Result<IntfRef> {
        let node = self.index_of(name)?;
        if wlan >= self.nodes[node].interfaces.len() {
            return Err(Error::UnknownInterface { node: name.to_string(), wlan });
        }
        Ok(IntfRef::new(node, wlan))
    }

    pub fn intf(&self, r: IntfRef) -> &WirelessInterface {
        &self.nodes[r.node].interfaces[r.wlan]
    }

    /// Mutable access to the non-relational attributes of an interface.
    pub(crate) fn intf_mut(&mut self, r: IntfRef) -> &mut WirelessInterface {
        &mut self.nodes[r.node].interfaces[r.wlan]
    }

    pub fn position(&self, node: usize) -> Position {
        self.nodes[node].position
    }

    pub fn set_position(&mut self, node: usize, position: Position) {
        self.nodes[node].position = position;
    }

    pub fn distance(&self, a: usize, b: usize) -> f64 {
        self.nodes[a].position.distance_to(&self.nodes[b].position)
    }

    /// Every interface reference, in node then wlan order.
    pub fn interfaces(&self) -> impl Iterator<Item = IntfRef> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .flat_map(|(n, node)| (0..node.interfaces.len()).map(move |w| IntfRef::new(n, w)))
    }

    /// Interfaces that look for an access point to associate with.
    pub fn station_interfaces(&self) -> Vec<IntfRef> {
        self.interfaces()
            .filter(|r| self.nodes[r.node].role != Role::AccessPoint && self.intf(*r).mode == InterfaceMode::Managed)
            .collect()
    }

    pub fn ap_interfaces(&self) -> Vec<IntfRef> {
        self.interfaces().filter(|r| self.intf(*r).mode == InterfaceMode::Master).collect()
    }

    pub fn peer_interfaces(&self) -> Vec<IntfRef> {
        self.interfaces().filter(|r| self.intf(*r).mode.is_peer()).collect()
    }

    pub fn intf_label(&self, r: IntfRef) -> String {
        format!("{}-wlan{}", self.nodes[r.node].name, r.wlan)
    }

    /// Associate `sta` to `ap`, first leaving any previous access point.
    /// Returns the previous access point, if any.
    pub fn associate(&mut self, sta: IntfRef, ap: IntfRef) -> Result<Option<IntfRef>> {
        if self.intf(ap).mode != InterfaceMode::Master {
            return Err(ConsistencyError::NotAnAccessPoint(self.intf_label(ap)).into());
        }
        if self.intf(sta).associated_to == Some(ap) {
            return Ok(Some(ap));
        }
        let previous = self.disassociate(sta);
        self.intf_mut(sta).associated_to = Some(ap);
        self.intf_mut(ap).associated_stations.insert(sta);
        Ok(previous)
    }

    /// Drop the association of `sta`, clearing both sides and the link metrics.
    pub fn disassociate(&mut self, sta: IntfRef) -> Option<IntfRef> {
        let previous = self.intf_mut(sta).associated_to.take()?;
        self.intf_mut(previous).associated_stations.remove(&sta);
        let intf = self.intf_mut(sta);
        intf.link = None;
        intf.applied_shaping = None;
        Some(previous)
    }

    pub(crate) fn set_link(&mut self, sta: IntfRef, metrics: LinkMetrics) {
        self.intf_mut(sta).link = Some(metrics);
    }

    pub(crate) fn set_aps_in_range(&mut self, sta: IntfRef, aps: std::collections::BTreeMap<IntfRef, f64>) {
        self.intf_mut(sta).aps_in_range = aps;
    }

    /// Record a symmetric peer link. Returns true when the link is new.
    pub(crate) fn link_peers(&mut self, a: IntfRef, b: IntfRef, ab: LinkMetrics, ba: LinkMetrics) -> bool {
        let new = self.intf_mut(a).neighbors.insert(b, ab).is_none();
        self.intf_mut(b).neighbors.insert(a, ba);
        new
    }

    /// Remove a symmetric peer link. Returns true when a link existed.
    pub(crate) fn unlink_peers(&mut self, a: IntfRef, b: IntfRef) -> bool {
        let existed = self.intf_mut(a).neighbors.remove(&b).is_some();
        self.intf_mut(b).neighbors.remove(&a);
        existed
    }

    /// Verify that every station's `associated_to` is mirrored exactly once
    /// by its access point and that no access point lists a stranger.
    pub fn check_consistency(&self) -> std::result::Result<(), ConsistencyError> {
        let refs: Vec<IntfRef> = self.interfaces().collect();
        for &sta in &refs {
            let listed = refs.iter().filter(|ap| self.intf(**ap).associated_stations.contains(&sta)).count();
            match self.intf(sta).associated_to {
                Some(ap) => {
                    if !self.intf(ap).associated_stations.contains(&sta) {
                        return Err(ConsistencyError::MissingFromAccessPoint {
                            station: self.intf_label(sta),
                            ap: self.intf_label(ap),
                        });
                    }
                    if listed != 1 {
                        return Err(ConsistencyError::DuplicateStation {
                            station: self.intf_label(sta),
                            count: listed,
                        });
                    }
                }
                None => {
                    if let Some(ap) = refs.iter().find(|ap| self.intf(**ap).associated_stations.contains(&sta)) {
                        return Err(ConsistencyError::StaleStation {
                            station: self.intf_label(sta),
                            ap: self.intf_label(*ap),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    pub fn snapshot(&self, tick: u64) -> WorldSnapshot {
        let name = |r: IntfRef| self.nodes[r.node].name.clone();
        WorldSnapshot {
            tick,
            timestamp: Utc::now(),
            nodes: self
                .nodes
                .iter()
                .map(|node| NodeSnapshot {
                    name: node.name.clone(),
                    role: node.role,
                    position: node.position,
                    interfaces: node
                        .interfaces
                        .iter()
                        .map(|intf| InterfaceSnapshot {
                            name: intf.name.clone(),
                            mac: intf.mac.to_string(),
                            tx_power: intf.tx_power,
                            range: intf.range,
                            rssi: intf.rssi,
                            snr: intf.snr,
                            associated_to: intf.associated_to.map(name),
                            associated_stations: intf.associated_stations.iter().map(|r| name(*r)).collect(),
                            neighbors: intf.neighbors.keys().map(|r| name(*r)).collect(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}
