//! Association and handover.
//!
//! - `policy`: llf / ssf handover rules and their margins
//! - `shaping`: link-quality to bandwidth/loss/latency strategies and the
//!   shaper collaborator
//! - `controller`: the per-pass state machine

pub mod controller;
pub mod policy;
pub mod shaping;

pub use controller::{AssociationController, DISCONNECTED_SNR, LinkSideEffect, PassOutcome};
pub use policy::{AssociationPolicy, Candidate, PolicyKind};
pub use shaping::{LinkShaper, LogShaper, NetemShaper, ShapingConfig, ShapingParams, ShapingStrategy};
