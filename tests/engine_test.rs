mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use common::{Reply, ScriptedBackend, plan_json, step_json};
use stepchain::chain::NodePayload;
use stepchain::runtime::clock::TokioClock;
use stepchain::runtime::engine::{ChainEngine, EngineHandle};
use stepchain::runtime::session::SessionSnapshot;
use stepchain::sequencer::SequencerState;
use tokio::task::JoinHandle;

fn spawn_engine(backend: Arc<ScriptedBackend>) -> (EngineHandle, JoinHandle<()>) {
    let (engine, handle) = ChainEngine::new(&common::test_config(), backend, Arc::new(TokioClock::new()));
    (handle, tokio::spawn(engine.run()))
}

async fn settle(handle: &EngineHandle, predicate: impl FnMut(&SessionSnapshot) -> bool) -> SessionSnapshot {
    tokio::time::timeout(Duration::from_secs(600), handle.wait_for(predicate))
        .await
        .expect("condition not reached in time")
        .expect("engine stopped")
}

fn complete(s: &SessionSnapshot) -> bool {
    s.state == SequencerState::PlanComplete
}

fn errored(s: &SessionSnapshot) -> bool {
    matches!(s.state, SequencerState::Error { .. })
}

#[tokio::test(start_paused = true)]
async fn test_engine_follows_plan_to_completion() {
    let backend = Arc::new(
        ScriptedBackend::new("agent-1")
            .plan(vec![plan_json(0, &["s1", "s2", "s3"])])
            .step("s1", vec![step_json("s1", "not_started", "search"), step_json("s1", "not_started", "search"), step_json("s1", "updated", "search")])
            .step("s2", vec![step_json("s2", "started", "summarize"), step_json("s2", "updated", "summarize")])
            .step("s3", vec![step_json("s3", "updated", "answer")]),
    );
    let (handle, task) = spawn_engine(backend.clone());

    handle.launch("plan a trip").await.unwrap();
    let snapshot = settle(&handle, complete).await;

    assert_eq!(snapshot.agent_id.as_deref(), Some("agent-1"));
    let ids: Vec<&str> = snapshot.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["s1", "s2", "s3"]);
    let labels: Vec<&str> = snapshot.nodes.iter().map(|n| n.label.as_str()).collect();
    assert_eq!(labels, vec!["search", "summarize", "answer"]);
    assert_eq!(snapshot.nodes[0].payload.details.as_deref(), Some("search details"));
    assert_eq!(snapshot.nodes[0].payload.server_ref.as_deref(), Some("search"));
    assert_eq!(snapshot.edges.len(), 2);
    assert!(!snapshot.polling);
    assert!(!snapshot.plan_polling);
    assert!(snapshot.error.is_none());

    assert_eq!(backend.create_calls.load(Ordering::SeqCst), 1);
    assert_eq!(backend.plan_calls(), 1);
    assert_eq!(backend.step_calls(), 6);
    assert_eq!(*backend.step_log.lock().unwrap(), vec!["s1", "s1", "s1", "s2", "s2", "s3"]);

    // Nothing is fetched once the plan is complete.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(backend.step_calls(), 6);
    assert_eq!(backend.plan_calls(), 1);

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_plan_refreshed_until_ready() {
    let backend = Arc::new(
        ScriptedBackend::new("agent-1")
            .plan(vec![plan_json(2, &[]), plan_json(1, &["s1"]), plan_json(0, &["s1"])])
            .step("s1", vec![step_json("s1", "not_started", "fetch"), step_json("s1", "not_started", "fetch"), step_json("s1", "not_started", "fetch"), step_json("s1", "updated", "fetch")]),
    );
    let (handle, _task) = spawn_engine(backend.clone());

    handle.attach("agent-1").await.unwrap();
    let snapshot = settle(&handle, complete).await;

    assert_eq!(snapshot.nodes.len(), 1);
    assert_eq!(backend.plan_calls(), 3);
    assert_eq!(backend.create_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_slow_backend_never_sees_overlapping_step_fetches() {
    let backend = Arc::new(
        ScriptedBackend::new("agent-1")
            .plan(vec![plan_json(0, &["s1", "s2"])])
            .step("s1", vec![step_json("s1", "started", "a"), step_json("s1", "started", "a"), step_json("s1", "updated", "a")])
            .step("s2", vec![step_json("s2", "updated", "b")])
            .step_delay(Duration::from_secs(5)),
    );
    let (handle, _task) = spawn_engine(backend.clone());

    handle.launch("slow").await.unwrap();
    let snapshot = settle(&handle, complete).await;

    assert_eq!(snapshot.nodes.len(), 2);
    assert_eq!(backend.max_step_outstanding.load(Ordering::SeqCst), 1);
    assert_eq!(backend.step_calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_step_fetch_times_out_into_error() {
    let backend = Arc::new(
        ScriptedBackend::new("agent-1")
            .plan(vec![plan_json(0, &["s1", "s2"])])
            .step("s1", vec![Reply::Hang]),
    );
    let (handle, _task) = spawn_engine(backend.clone());

    handle.launch("stuck").await.unwrap();
    let snapshot = settle(&handle, errored).await;

    let error = snapshot.error.expect("error is surfaced");
    assert!(error.contains("step_info"), "{}", error);
    assert!(snapshot.nodes.is_empty());
    assert!(!snapshot.polling);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(backend.step_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_plan_fetch_failure_surfaces_error() {
    let backend = Arc::new(ScriptedBackend::new("agent-1").plan(vec![Reply::Fail(503)]));
    let (handle, _task) = spawn_engine(backend.clone());

    handle.launch("broken").await.unwrap();
    let snapshot = settle(&handle, errored).await;

    assert!(snapshot.error.unwrap().contains("503"));
    assert!(!snapshot.plan_polling);
    assert_eq!(backend.step_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reset_stops_polling_and_clears_graph() {
    let backend = Arc::new(
        ScriptedBackend::new("agent-1")
            .plan(vec![plan_json(0, &["s1", "s2"])])
            .step("s1", vec![step_json("s1", "updated", "first")])
            .step("s2", vec![step_json("s2", "not_started", "second")]),
    );
    let (handle, _task) = spawn_engine(backend.clone());

    handle.launch("reset me").await.unwrap();
    settle(&handle, |s| s.nodes.len() == 1 && s.awaited_step.as_deref() == Some("s2")).await;

    handle.reset().await.unwrap();
    let snapshot = settle(&handle, |s| s.state == SequencerState::Idle && s.agent_id.is_none()).await;
    assert!(snapshot.nodes.is_empty());
    assert!(snapshot.edges.is_empty());
    assert!(!snapshot.polling);

    let calls = backend.step_calls();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(backend.step_calls(), calls);
    assert!(handle.snapshot().nodes.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_manual_node_through_handle() {
    let backend = Arc::new(ScriptedBackend::new("agent-1"));
    let (handle, _task) = spawn_engine(backend);

    let payload = NodePayload { details: Some("added by hand".to_string()), ..Default::default() };
    handle.add_node("note", payload).await.unwrap();
    let snapshot = settle(&handle, |s| s.nodes.len() == 1).await;

    assert!(snapshot.nodes[0].id.starts_with("node-"));
    assert_eq!(snapshot.nodes[0].label, "note");
    assert!(snapshot.camera.is_some());
    assert_eq!(snapshot.state, SequencerState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_handle_fails_after_shutdown() {
    let (handle, task) = spawn_engine(Arc::new(ScriptedBackend::new("agent-1")));

    handle.shutdown().await.unwrap();
    task.await.unwrap();
    assert!(handle.launch("too late").await.is_err());
}
