//! # Verdict derivation
//!
//! A DPI probe only ever observes one of three things: it finished, it failed
//! right away, or it ran out of time. Whether that observation means anything
//! depends on what the liveness probe said about the host beforehand.

use crate::session::{AliveState, DpiVerdict};
use std::fmt;

/// What a single timed DPI method observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawOutcome {
    TimedOut,
    InstantError,
    Completed,
}

/// Corroboration matrix.
///
/// | outcome      | alive = Yes | alive = Unknown |
/// |--------------|-------------|-----------------|
/// | TimedOut     | Detected    | Probably        |
/// | InstantError | Possible    | Unlikely        |
/// | Completed    | NotDetected | NotDetected     |
///
/// A dead host (`AliveState::No`) is skipped before any DPI method runs, so it
/// maps to `NotDetected` here.
pub fn corroborate(outcome: RawOutcome, alive: AliveState) -> DpiVerdict {
    match (alive, outcome) {
        (AliveState::No, _) => DpiVerdict::NotDetected,
        (_, RawOutcome::Completed) => DpiVerdict::NotDetected,
        (AliveState::Yes, RawOutcome::TimedOut) => DpiVerdict::Detected,
        (AliveState::Yes, RawOutcome::InstantError) => DpiVerdict::Possible,
        (AliveState::Unknown, RawOutcome::TimedOut) => DpiVerdict::Probably,
        (AliveState::Unknown, RawOutcome::InstantError) => DpiVerdict::Unlikely,
    }
}

/// Per-target progress through the probing state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeStage {
    Queued,
    CheckingAlive,
    /// Host timed out on liveness; no DPI method was run.
    Skipped,
    CheckingDpiMethod1,
    CheckingDpiMethod2,
    Done,
}

impl ProbeStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, ProbeStage::Skipped | ProbeStage::Done)
    }
}

impl fmt::Display for ProbeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProbeStage::Queued => "queued",
            ProbeStage::CheckingAlive => "checking alive",
            ProbeStage::Skipped => "skipped",
            ProbeStage::CheckingDpiMethod1 => "checking dpi (huge body)",
            ProbeStage::CheckingDpiMethod2 => "checking dpi (large reqline)",
            ProbeStage::Done => "done",
        })
    }
}
