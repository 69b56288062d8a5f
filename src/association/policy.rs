//! Handover policies.

use serde::{Deserialize, Serialize};

fn default_llf_margin() -> usize {
    2
}
fn default_ssf_margin() -> f64 {
    0.1
}

/// Which rule may move an associated station to another access point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    /// Hand over only when the current access point drops out of range.
    #[default]
    None,
    /// Least loaded first.
    Llf,
    /// Strongest signal first.
    Ssf,
}

/// Access point as seen by a station deciding where to associate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    /// Stations currently associated to the access point.
    pub load: usize,
    pub rssi: f64,
}

/// Handover policy with its margins.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssociationPolicy {
    #[serde(default)]
    pub kind: PolicyKind,
    /// llf: the candidate must carry this many fewer stations.
    #[serde(default = "default_llf_margin")]
    pub llf_margin: usize,
    /// ssf: the candidate must be this many dB stronger.
    #[serde(default = "default_ssf_margin")]
    pub ssf_margin: f64,
}

impl Default for AssociationPolicy {
    fn default() -> Self {
        Self {
            kind: PolicyKind::None,
            llf_margin: default_llf_margin(),
            ssf_margin: default_ssf_margin(),
        }
    }
}

impl AssociationPolicy {
    pub fn new(kind: PolicyKind) -> Self {
        Self { kind, ..Default::default() }
    }

    /// Whether the policy moves a station from `current` to `candidate`.
    /// `current.load` includes the station itself.
    pub fn should_handover(&self, current: Candidate, candidate: Candidate) -> bool {
        match self.kind {
            PolicyKind::None => false,
            PolicyKind::Llf => candidate.load + self.llf_margin < current.load,
            PolicyKind::Ssf => candidate.rssi > current.rssi + self.ssf_margin,
        }
    }

    /// Pick the access point for an unassociated station, or the handover
    /// target among candidates the policy accepted. Returns an index into
    /// `candidates`.
    pub fn choose(&self, candidates: &[Candidate]) -> Option<usize> {
        let better = |a: &Candidate, b: &Candidate| match self.kind {
            PolicyKind::Llf => a.load < b.load || (a.load == b.load && a.rssi > b.rssi),
            PolicyKind::None | PolicyKind::Ssf => a.rssi > b.rssi,
        };
        let mut best: Option<usize> = None;
        for (i, c) in candidates.iter().enumerate() {
            match best {
                Some(b) if !better(c, &candidates[b]) => {}
                _ => best = Some(i),
            }
        }
        best
    }
}
