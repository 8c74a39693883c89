use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// A host to probe, as listed in the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeTarget {
    pub id: String,
    pub provider: String,
    #[serde(alias = "url")]
    pub host: String,
    #[serde(default)]
    pub country: String,
}

impl ProbeTarget {
    pub fn new(id: &str, provider: &str, host: &str, country: &str) -> Self {
        Self {
            id: id.to_string(),
            provider: provider.to_string(),
            host: host.to_string(),
            country: country.to_string(),
        }
    }
}

/// Outcome of the liveness probe. Discriminants are the wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AliveState {
    /// The liveness probe timed out.
    No = 0,
    Yes = 1,
    /// The probe failed for a reason other than a timeout.
    Unknown = 2,
}

impl AliveState {
    pub const CARDINALITY: u32 = 3;
    pub const ALL: [AliveState; 3] = [AliveState::No, AliveState::Yes, AliveState::Unknown];

    pub fn index(self) -> u32 {
        self as u32
    }

    pub fn from_index(idx: u32) -> Option<Self> {
        Self::ALL.get(idx as usize).copied()
    }
}

impl fmt::Display for AliveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AliveState::No => "dead",
            AliveState::Yes => "alive",
            AliveState::Unknown => "unknown",
        })
    }
}

/// Final DPI classification of a target. Discriminants are the wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DpiVerdict {
    NotDetected = 0,
    Detected = 1,
    Probably = 2,
    Possible = 3,
    Unlikely = 4,
}

impl DpiVerdict {
    pub const CARDINALITY: u32 = 5;
    pub const ALL: [DpiVerdict; 5] = [
        DpiVerdict::NotDetected,
        DpiVerdict::Detected,
        DpiVerdict::Probably,
        DpiVerdict::Possible,
        DpiVerdict::Unlikely,
    ];

    pub fn index(self) -> u32 {
        self as u32
    }

    pub fn from_index(idx: u32) -> Option<Self> {
        Self::ALL.get(idx as usize).copied()
    }
}

impl fmt::Display for DpiVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DpiVerdict::NotDetected => "not detected",
            DpiVerdict::Detected => "detected",
            DpiVerdict::Probably => "probably detected",
            DpiVerdict::Possible => "possibly detected",
            DpiVerdict::Unlikely => "unlikely",
        })
    }
}

/// One row of a measurement session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub target: ProbeTarget,
    pub alive: AliveState,
    pub dpi: DpiVerdict,
    /// Set when the probing task itself failed. Never encoded into a share token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<String>,
}

impl ProbeResult {
    pub fn new(target: ProbeTarget, alive: AliveState, dpi: DpiVerdict) -> Self {
        Self { target, alive, dpi, fault: None }
    }

    /// Row for a task that died before producing a verdict.
    pub fn faulted(target: ProbeTarget, reason: impl Into<String>) -> Self {
        Self {
            target,
            alive: AliveState::Unknown,
            dpi: DpiVerdict::NotDetected,
            fault: Some(reason.into()),
        }
    }

    pub fn is_faulted(&self) -> bool {
        self.fault.is_some()
    }
}

/// Results of one probing run, keyed and ordered by target id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    results: BTreeMap<String, ProbeResult>,
    timestamp_ms: u64,
    asn: u32,
}

impl Session {
    /// Empty session stamped with the current wall-clock time.
    pub fn new(asn: u32) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self::with_timestamp(asn, now)
    }

    pub fn with_timestamp(asn: u32, timestamp_ms: u64) -> Self {
        Self {
            results: BTreeMap::new(),
            timestamp_ms,
            asn,
        }
    }

    /// Stores a result under its target id, returning any result it replaced.
    pub fn record(&mut self, result: ProbeResult) -> Option<ProbeResult> {
        self.results.insert(result.target.id.clone(), result)
    }

    pub fn get(&self, id: &str) -> Option<&ProbeResult> {
        self.results.get(id)
    }

    /// Results in ascending id order.
    pub fn results(&self) -> impl Iterator<Item = &ProbeResult> {
        self.results.values()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Unix milliseconds at which the run started.
    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    pub fn asn(&self) -> u32 {
        self.asn
    }

    pub fn set_asn(&mut self, asn: u32) {
        self.asn = asn;
    }
}
