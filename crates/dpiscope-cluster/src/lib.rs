//! # dpiscope-cluster: Batch Coordination
//!
//! Fans probes out over many targets and gathers them back: the DPI
//! orchestrator for a roster, and the subnet sweep for address blocks.

pub mod orchestrator;
pub mod sweep;

pub use orchestrator::{DpiOrchestrator, StageUpdate};
pub use sweep::{sample_hosts, HostOutcome, Ipv4Cidr, SubnetSweep, SweepReport};
