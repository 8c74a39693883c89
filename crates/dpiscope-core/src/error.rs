use crate::registry::Revision;
use thiserror::Error;

/// Failure of a single timed probe. Always recovered into a verdict, never
/// surfaced to the caller of the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("probe timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("revision {0} not found")]
    NotFound(Revision),

    #[error("registry fetch failed: {0}")]
    Fetch(String),

    #[error("invalid schema: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unknown revision {0}")]
    UnknownRevision(String),

    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("revision lookup failed: {0}")]
    RevisionLookupFailed(String),

    #[error("timestamp {timestamp_ms} precedes layout epoch {epoch_ms}")]
    TimestampBeforeEpoch { timestamp_ms: u64, epoch_ms: u64 },

    #[error("{field} value {value} does not fit in {bits} bits")]
    FieldOverflow {
        field: &'static str,
        value: u128,
        bits: u32,
    },

    #[error("invalid layout: {0}")]
    InvalidLayout(String),

    #[error("session does not match the roster of revision {revision}: {detail}")]
    RosterMismatch { revision: String, detail: String },

    #[error("registry unavailable: {0}")]
    Registry(String),
}

impl From<RegistryError> for CodecError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound(rev) => CodecError::UnknownRevision(rev.to_hex()),
            RegistryError::Invalid(msg) => CodecError::InvalidLayout(msg),
            RegistryError::Fetch(msg) => CodecError::Registry(msg),
        }
    }
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("duplicate target id `{0}`")]
    DuplicateTarget(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SweepError {
    #[error("invalid IPv4 CIDR `{0}`")]
    InvalidCidr(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[derive(Debug, Error)]
pub enum DpiScopeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error(transparent)]
    Sweep(#[from] SweepError),

    #[error("transport: {0}")]
    Transport(String),

    #[error("roster: {0}")]
    Roster(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
