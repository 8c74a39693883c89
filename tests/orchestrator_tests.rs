//! # Cluster Layer Tests: DPI Orchestrator
//!
//! Drives the per-target state machine over a scripted transport in virtual
//! time: verdict scenarios, short-circuits, fault isolation, progress events.

mod common;

use common::{target, Reply, ScriptedTransport};
use dpiscope_cluster::{DpiOrchestrator, StageUpdate};
use dpiscope_core::{AliveState, DpiVerdict, OrchestratorError, ProbeConfig, ProbeStage};
use dpiscope_transport::RequestKind;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

use Reply::{Hang, Panic, Refused, Status};

fn orchestrator(transport: &Arc<ScriptedTransport>) -> DpiOrchestrator {
    DpiOrchestrator::new(transport.clone(), &ProbeConfig::default())
}

/// Reachable host, method 1 times out ⇒ Detected, method 2 never runs.
#[tokio::test(start_paused = true)]
async fn test_scenario_detected_short_circuits() {
    let t = Instant::now();

    let transport = Arc::new(ScriptedTransport::new().host("dpi.example", Status(200), Hang, Status(200)));
    let session = orchestrator(&transport)
        .run(vec![target("T1", "dpi.example")], 64_500)
        .await
        .unwrap();

    let row = session.get("T1").unwrap();
    assert_eq!(row.alive, AliveState::Yes);
    assert_eq!(row.dpi, DpiVerdict::Detected);
    assert_eq!(transport.calls("dpi.example", RequestKind::Post), 1);
    assert_eq!(transport.calls("dpi.example", RequestKind::Get), 0);
    assert_eq!(session.asn(), 64_500);

    let overhead = t.elapsed();
    println!("test_scenario_detected_short_circuits: Testing Overhead = {:?}", overhead);
}

/// Reachable host, method 1 completes, method 2 fails instantly ⇒ Possible.
#[tokio::test(start_paused = true)]
async fn test_scenario_possible() {
    let t = Instant::now();

    let transport = Arc::new(ScriptedTransport::new().host("h", Status(404), Status(200), Refused));
    let session = orchestrator(&transport).run(vec![target("T1", "h")], 1).await.unwrap();

    let row = session.get("T1").unwrap();
    assert_eq!(row.alive, AliveState::Yes);
    assert_eq!(row.dpi, DpiVerdict::Possible);
    // The sequence stops at its first failure.
    assert_eq!(transport.calls("h", RequestKind::Get), 1);

    let overhead = t.elapsed();
    println!("test_scenario_possible: Testing Overhead = {:?}", overhead);
}

/// Unknown liveness, method 1 completes, method 2 times out ⇒ Probably.
#[tokio::test(start_paused = true)]
async fn test_scenario_probably() {
    let t = Instant::now();

    let transport = Arc::new(ScriptedTransport::new().host("h", Refused, Status(200), Hang));
    let session = orchestrator(&transport).run(vec![target("T1", "h")], 1).await.unwrap();

    let row = session.get("T1").unwrap();
    assert_eq!(row.alive, AliveState::Unknown);
    assert_eq!(row.dpi, DpiVerdict::Probably);
    assert_eq!(transport.calls("h", RequestKind::Post), 1);
    assert_eq!(transport.calls("h", RequestKind::Get), 1);

    let overhead = t.elapsed();
    println!("test_scenario_probably: Testing Overhead = {:?}", overhead);
}

/// Liveness timeout ⇒ Skipped, NotDetected, no DPI traffic at all.
#[tokio::test(start_paused = true)]
async fn test_dead_host_is_skipped() {
    let transport = Arc::new(ScriptedTransport::new().host("dead", Hang, Status(200), Status(200)));
    let session = orchestrator(&transport).run(vec![target("T1", "dead")], 1).await.unwrap();

    let row = session.get("T1").unwrap();
    assert_eq!(row.alive, AliveState::No);
    assert_eq!(row.dpi, DpiVerdict::NotDetected);
    assert_eq!(transport.calls("dead", RequestKind::Post), 0);
    assert_eq!(transport.calls("dead", RequestKind::Get), 0);
}

/// A clean host runs the whole request-line sequence.
#[tokio::test(start_paused = true)]
async fn test_clean_host_runs_both_methods() {
    let transport = Arc::new(ScriptedTransport::new());
    let orch = orchestrator(&transport);
    let expected_gets = orch.params().reqline_requests();
    assert_eq!(expected_gets, 32);

    let session = orch.run(vec![target("T1", "clean")], 1).await.unwrap();
    let row = session.get("T1").unwrap();
    assert_eq!(row.alive, AliveState::Yes);
    assert_eq!(row.dpi, DpiVerdict::NotDetected);
    assert_eq!(transport.calls("clean", RequestKind::Head), 1);
    assert_eq!(transport.calls("clean", RequestKind::Post), 1);
    assert_eq!(transport.calls("clean", RequestKind::Get), expected_gets);
}

/// One panicking task becomes a faulted row; its siblings finish normally.
#[tokio::test(start_paused = true)]
async fn test_task_panic_is_isolated() {
    let t = Instant::now();

    let transport = Arc::new(
        ScriptedTransport::new()
            .host("boom", Panic, Status(200), Status(200))
            .host("dpi", Status(200), Hang, Status(200))
            .host("dead", Hang, Status(200), Status(200)),
    );
    let session = orchestrator(&transport)
        .run(
            vec![target("B", "boom"), target("A", "dpi"), target("C", "dead"), target("D", "ok")],
            1,
        )
        .await
        .unwrap();

    assert_eq!(session.len(), 4);
    let ids: Vec<&str> = session.results().map(|r| r.target.id.as_str()).collect();
    assert_eq!(ids, ["A", "B", "C", "D"]);

    let faulted = session.get("B").unwrap();
    assert!(faulted.is_faulted());
    assert_eq!(faulted.alive, AliveState::Unknown);
    assert_eq!(faulted.dpi, DpiVerdict::NotDetected);
    assert!(faulted.fault.as_deref().unwrap().contains("scripted panic"));

    assert_eq!(session.get("A").unwrap().dpi, DpiVerdict::Detected);
    assert_eq!(session.get("C").unwrap().alive, AliveState::No);
    assert_eq!(session.get("D").unwrap().dpi, DpiVerdict::NotDetected);
    assert!(!session.get("D").unwrap().is_faulted());

    let overhead = t.elapsed();
    println!("test_task_panic_is_isolated: Testing Overhead = {:?}", overhead);
}

#[tokio::test]
async fn test_duplicate_ids_rejected() {
    let transport = Arc::new(ScriptedTransport::new());
    let result = orchestrator(&transport)
        .run(vec![target("X", "a"), target("X", "b")], 1)
        .await;

    assert!(matches!(result, Err(OrchestratorError::DuplicateTarget(id)) if id == "X"));
    assert_eq!(transport.total_calls(), 0);
}

/// Each target reports its own path through the state machine, in order.
#[tokio::test(start_paused = true)]
async fn test_progress_events() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .host("dead", Hang, Status(200), Status(200))
            .host("dpi", Status(200), Hang, Status(200)),
    );
    let (tx, mut rx) = mpsc::unbounded_channel();
    let orch = orchestrator(&transport).with_progress(tx);

    orch.run(
        vec![target("dead", "dead"), target("dpi", "dpi"), target("clean", "clean")],
        1,
    )
    .await
    .unwrap();
    drop(orch);

    let mut updates: Vec<StageUpdate> = Vec::new();
    while let Some(u) = rx.recv().await {
        updates.push(u);
    }
    let path = |id: &str| -> Vec<ProbeStage> {
        updates.iter().filter(|u| u.id == id).map(|u| u.stage).collect()
    };

    use ProbeStage::*;
    assert_eq!(path("dead"), [Queued, CheckingAlive, Skipped]);
    assert_eq!(path("dpi"), [Queued, CheckingAlive, CheckingDpiMethod1, Done]);
    assert_eq!(
        path("clean"),
        [Queued, CheckingAlive, CheckingDpiMethod1, CheckingDpiMethod2, Done]
    );
}
