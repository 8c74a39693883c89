//! # dpiscope-transport: Network Probes
//!
//! Everything that touches the network: the per-request transport seam, the
//! liveness prober, both DPI methods, and the GitHub and RIPEstat lookups.

pub mod client;
pub mod github;
pub mod liveness;
pub mod methods;
pub mod ripe;

pub use client::{HttpTransport, ProbeRequest, ProbeTransport, RequestKind};
pub use github::{api_client, GithubRegistry, GithubRevisionSource};
pub use liveness::probe_liveness;
pub use methods::{huge_body, large_reqline, run_method, DpiMethod, MethodParams};
pub use ripe::{announced_prefixes, whoami, ClientIdentity};
