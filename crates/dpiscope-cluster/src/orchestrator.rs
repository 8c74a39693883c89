use dpiscope_core::{
    corroborate, normalize_roster, AliveState, DpiVerdict, OrchestratorError, ProbeConfig,
    ProbeResult, ProbeStage, ProbeTarget, Session,
};
use dpiscope_transport::{probe_liveness, run_method, DpiMethod, MethodParams, ProbeTransport};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio::time::Instant;

/// A target moved to a new stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageUpdate {
    pub id: String,
    pub stage: ProbeStage,
}

/// Optional progress sink. A dropped receiver is not an error.
#[derive(Clone, Default)]
struct Progress(Option<mpsc::UnboundedSender<StageUpdate>>);

impl Progress {
    fn emit(&self, id: &str, stage: ProbeStage) {
        tracing::debug!("target[{}]: {}", id, stage);
        if let Some(tx) = &self.0 {
            let _ = tx.send(StageUpdate {
                id: id.to_string(),
                stage,
            });
        }
    }
}

/// DpiOrchestrator: Classifies a roster of targets, one task per target.
///
/// ## Per-target state machine
/// `Queued → CheckingAlive → (Skipped | CheckingDpiMethod1 → CheckingDpiMethod2? → Done)`
///
/// ## Fault isolation
/// A panicking task never takes its siblings down. It is caught at the join
/// and recorded as a faulted row (`Unknown` / `NotDetected` with a reason).
pub struct DpiOrchestrator {
    transport: Arc<dyn ProbeTransport>,
    params: MethodParams,
    progress: Progress,
}

impl DpiOrchestrator {
    pub fn new(transport: Arc<dyn ProbeTransport>, config: &ProbeConfig) -> Self {
        Self {
            transport,
            params: MethodParams::from(config),
            progress: Progress::default(),
        }
    }

    pub fn with_params(mut self, params: MethodParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_progress(mut self, tx: mpsc::UnboundedSender<StageUpdate>) -> Self {
        self.progress = Progress(Some(tx));
        self
    }

    pub fn params(&self) -> &MethodParams {
        &self.params
    }

    /// Probes every target concurrently and returns once all tasks have settled.
    ///
    /// The only error is a roster with duplicate ids; per-target failures are
    /// always folded into that target's row.
    pub async fn run(&self, targets: Vec<ProbeTarget>, asn: u32) -> Result<Session, OrchestratorError> {
        let roster = normalize_roster(targets)?;
        let started = Instant::now();
        let mut session = Session::new(asn);
        tracing::info!("orchestrator: probing {} targets (AS{})", roster.len(), asn);

        let mut handles = Vec::with_capacity(roster.len());
        for target in roster {
            self.progress.emit(&target.id, ProbeStage::Queued);
            let handle = tokio::spawn(classify_target(
                self.transport.clone(),
                target.clone(),
                self.params,
                self.progress.clone(),
            ));
            handles.push((target, handle));
        }

        for (target, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    let reason = fault_reason(e);
                    tracing::warn!("target[{}]: task failed: {}", target.id, reason);
                    self.progress.emit(&target.id, ProbeStage::Done);
                    ProbeResult::faulted(target, reason)
                }
            };
            session.record(result);
        }

        tracing::info!(
            "orchestrator: done, {} results in {:?}",
            session.len(),
            started.elapsed()
        );
        Ok(session)
    }
}

fn fault_reason(e: JoinError) -> String {
    if !e.is_panic() {
        return e.to_string();
    }
    let payload = e.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

async fn classify_target(
    transport: Arc<dyn ProbeTransport>,
    target: ProbeTarget,
    params: MethodParams,
    progress: Progress,
) -> ProbeResult {
    progress.emit(&target.id, ProbeStage::CheckingAlive);
    let alive = probe_liveness(transport.as_ref(), &target.host, params.timeout).await;

    if alive == AliveState::No {
        progress.emit(&target.id, ProbeStage::Skipped);
        return ProbeResult::new(target, alive, DpiVerdict::NotDetected);
    }

    progress.emit(&target.id, ProbeStage::CheckingDpiMethod1);
    let outcome = run_method(DpiMethod::HugeBody, transport.as_ref(), &target.host, &params).await;
    let verdict = corroborate(outcome, alive);

    // A strong positive from the cheap method is enough.
    if verdict == DpiVerdict::Detected {
        progress.emit(&target.id, ProbeStage::Done);
        return ProbeResult::new(target, alive, verdict);
    }

    progress.emit(&target.id, ProbeStage::CheckingDpiMethod2);
    let outcome = run_method(DpiMethod::LargeReqline, transport.as_ref(), &target.host, &params).await;
    let verdict = corroborate(outcome, alive);

    progress.emit(&target.id, ProbeStage::Done);
    ProbeResult::new(target, alive, verdict)
}
