pub mod config;
pub mod error;
pub mod registry;
pub mod session;
pub mod verdict;

pub use config::{AppConfig, ProbeConfig, RegistryConfig, SweepConfig, WhoamiConfig};
pub use error::{
    CodecError, ConfigError, DpiScopeError, OrchestratorError, ProbeError, RegistryError,
    SweepError,
};
pub use registry::{
    CachingRegistry, Revision, RevisionSource, SchemaLayout, SchemaRegistry, SchemaSnapshot,
    StaticRegistry, StaticRevisionSource, REVISION_BITS,
};
pub use session::{AliveState, DpiVerdict, ProbeResult, ProbeTarget, Session};
pub use verdict::{corroborate, ProbeStage, RawOutcome};

/// Sorts a roster by id and rejects duplicate ids.
///
/// The share token is positional, so every consumer of a roster must agree on
/// this ordering.
pub fn normalize_roster(mut roster: Vec<ProbeTarget>) -> Result<Vec<ProbeTarget>, OrchestratorError> {
    roster.sort_by(|a, b| a.id.cmp(&b.id));
    if let Some(pair) = roster.windows(2).find(|w| w[0].id == w[1].id) {
        return Err(OrchestratorError::DuplicateTarget(pair[0].id.clone()));
    }
    Ok(roster)
}
