use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use anyhow::{Result, anyhow};
use tracing::{info, debug, warn};
use crate::backend::{BackendError, WorkflowBackend, ActionPlanReport, StepReport};
use crate::chain::NodePayload;
use crate::config::VisualizerConfig;
use crate::runtime::clock::Clock;
use crate::runtime::scheduler::PollTicket;
use crate::runtime::session::{SessionState, SessionSnapshot, FetchRequest};

/// Commands accepted by the engine loop. All session mutation goes through here.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Create an agent for `query`, then follow its plan.
    Launch { query: String },
    /// Follow an agent that already exists.
    Attach { agent_id: String },
    AddNode { label: String, payload: NodePayload },
    Resize { width: f64, height: f64 },
    Reset,
    Shutdown,
}

// Results of spawned backend calls, fed back into the loop.
enum Completed {
    Launch { epoch: u64, result: Result<String, BackendError> },
    Plan { ticket: PollTicket, result: Result<ActionPlanReport, BackendError> },
    Step { ticket: PollTicket, step_id: String, result: Result<StepReport, BackendError> },
}

/// 链引擎 (Chain Engine)
/// Single cooperative loop over commands, fetch completions and the next
/// polling deadline. Network calls run in spawned tasks; their results are
/// applied one at a time on this loop.
pub struct ChainEngine {
    state: SessionState,
    backend: Arc<dyn WorkflowBackend>,
    clock: Arc<dyn Clock>,
    request_timeout: Duration,
    commands: mpsc::Receiver<Command>,
    completed_tx: mpsc::Sender<Completed>,
    completed_rx: mpsc::Receiver<Completed>,
    snapshots: watch::Sender<SessionSnapshot>,
    // Bumped on reset so a late createAgent answer cannot attach.
    launch_epoch: u64,
}

/// Cloneable front door to a running engine.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<SessionSnapshot>,
}

impl ChainEngine {
    pub fn new(config: &VisualizerConfig, backend: Arc<dyn WorkflowBackend>, clock: Arc<dyn Clock>) -> (Self, EngineHandle) {
        let state = SessionState::new(config, clock.clone());
        Self::with_state(state, config, backend, clock)
    }

    pub fn with_state(
        state: SessionState,
        config: &VisualizerConfig,
        backend: Arc<dyn WorkflowBackend>,
        clock: Arc<dyn Clock>,
    ) -> (Self, EngineHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(100);
        let (done_tx, done_rx) = mpsc::channel(100);
        let (snap_tx, snap_rx) = watch::channel(state.snapshot());

        let engine = Self {
            state,
            backend,
            clock,
            request_timeout: Duration::from_millis(config.backend.request_timeout_ms),
            commands: cmd_rx,
            completed_tx: done_tx,
            completed_rx: done_rx,
            snapshots: snap_tx,
            launch_epoch: 0,
        };
        let handle = EngineHandle {
            commands: cmd_tx,
            snapshots: snap_rx,
        };
        (engine, handle)
    }

    pub async fn run(mut self) {
        info!(session_id = %self.state.session_id(), "Engine started.");

        loop {
            for request in self.state.due_fetches() {
                self.spawn_fetch(request);
            }
            self.publish();

            let now = self.clock.now_ms();
            let wait = self.state.next_due().map(|due| Duration::from_millis(due.saturating_sub(now)));

            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Shutdown) | None => break,
                    Some(cmd) => self.handle_command(cmd),
                },
                Some(done) = self.completed_rx.recv() => self.handle_completed(done),
                _ = tokio::time::sleep(wait.unwrap_or_default()), if wait.is_some() => {}
            }
        }

        self.publish();
        info!(session_id = %self.state.session_id(), "Engine stopped.");
    }

    fn publish(&self) {
        let snapshot = self.state.snapshot();
        self.snapshots.send_if_modified(|current| {
            if *current != snapshot {
                *current = snapshot;
                true
            } else {
                false
            }
        });
    }

    fn handle_command(&mut self, cmd: Command) {
        debug!(command = ?cmd, "Engine command");
        match cmd {
            Command::Launch { query } => {
                self.launch_epoch += 1;
                let epoch = self.launch_epoch;
                let backend = self.backend.clone();
                let limit = self.request_timeout;
                let tx = self.completed_tx.clone();
                tokio::spawn(async move {
                    let result = bounded(limit, "create_agent", backend.create_agent(&query)).await;
                    deliver(tx, Completed::Launch { epoch, result }).await;
                });
            }
            Command::Attach { agent_id } => self.state.attach_agent(&agent_id),
            Command::AddNode { label, payload } => {
                self.state.add_node(&label, payload);
            }
            Command::Resize { width, height } => self.state.resize(width, height),
            Command::Reset => {
                self.launch_epoch += 1;
                self.state.reset();
            }
            Command::Shutdown => {}
        }
    }

    fn handle_completed(&mut self, done: Completed) {
        match done {
            Completed::Launch { epoch, result } => {
                if epoch != self.launch_epoch {
                    warn!("Launch answered after reset, ignored");
                    return;
                }
                match result {
                    Ok(agent_id) => self.state.attach_agent(&agent_id),
                    Err(e) => self.state.on_launch_failed(&e),
                }
            }
            Completed::Plan { ticket, result } => self.state.on_plan_fetched(ticket, result),
            Completed::Step { ticket, step_id, result } => {
                if let Some(outcome) = self.state.on_step_fetched(ticket, &step_id, result) {
                    debug!(step_id = %step_id, outcome = ?outcome, "Step poll applied");
                }
            }
        }
    }

    fn spawn_fetch(&self, request: FetchRequest) {
        let backend = self.backend.clone();
        let limit = self.request_timeout;
        let tx = self.completed_tx.clone();

        tokio::spawn(async move {
            let done = match request {
                FetchRequest::Plan { ticket, agent_id } => {
                    let result = bounded(limit, "action_plan", backend.action_plan(&agent_id)).await;
                    Completed::Plan { ticket, result }
                }
                FetchRequest::Step { ticket, agent_id, step_id } => {
                    let result = bounded(limit, "step_info", backend.step_info(&agent_id, &step_id)).await;
                    Completed::Step { ticket, step_id, result }
                }
            };
            deliver(tx, done).await;
        });
    }
}

async fn bounded<T>(
    limit: Duration,
    endpoint: &str,
    call: impl Future<Output = Result<T, BackendError>>,
) -> Result<T, BackendError> {
    match timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(BackendError::Timeout {
            endpoint: endpoint.to_string(),
            after_ms: limit.as_millis() as u64,
        }),
    }
}

async fn deliver(tx: mpsc::Sender<Completed>, done: Completed) {
    if tx.send(done).await.is_err() {
        debug!("Engine stopped, fetch result dropped");
    }
}

impl EngineHandle {
    async fn send(&self, cmd: Command) -> Result<()> {
        self.commands.send(cmd).await
            .map_err(|e| anyhow!("Engine is not running: {}", e))
    }

    pub async fn launch(&self, query: &str) -> Result<()> {
        self.send(Command::Launch { query: query.to_string() }).await
    }

    pub async fn attach(&self, agent_id: &str) -> Result<()> {
        self.send(Command::Attach { agent_id: agent_id.to_string() }).await
    }

    pub async fn add_node(&self, label: &str, payload: NodePayload) -> Result<()> {
        self.send(Command::AddNode { label: label.to_string(), payload }).await
    }

    pub async fn resize(&self, width: f64, height: f64) -> Result<()> {
        self.send(Command::Resize { width, height }).await
    }

    pub async fn reset(&self) -> Result<()> {
        self.send(Command::Reset).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown).await
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    /// Resolves with the first snapshot satisfying `predicate`.
    pub async fn wait_for(&self, predicate: impl FnMut(&SessionSnapshot) -> bool) -> Result<SessionSnapshot> {
        let mut rx = self.snapshots.clone();
        let snapshot = rx.wait_for(predicate).await
            .map_err(|e| anyhow!("Engine stopped before condition was met: {}", e))?;
        Ok(snapshot.clone())
    }
}
