use std::sync::Arc;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tracing::{info, warn, error};
use uuid::Uuid;
use crate::backend::{BackendError, ActionPlanReport, StepReport};
use crate::chain::{GraphState, Node, Edge, NodePayload, Position, Appended};
use crate::config::VisualizerConfig;
use crate::layout::{Canvas, LayoutEngine, ViewportFramer, Viewport, CameraTransform};
use crate::plan::Plan;
use crate::runtime::clock::Clock;
use crate::runtime::scheduler::{PollingScheduler, PollTicket, Completion};
use crate::sequencer::{StepSequencer, SequencerState, StepOutcome, Advance};

pub const STEP_STREAM: &str = "step";
pub const PLAN_STREAM: &str = "plan";

/// A fetch the driver has to perform on behalf of the session.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchRequest {
    Plan { ticket: PollTicket, agent_id: String },
    Step { ticket: PollTicket, agent_id: String, step_id: String },
}

/// Read-only view handed to the display layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub agent_id: Option<String>,
    pub state: SequencerState,
    pub awaited_step: Option<String>,
    pub polling: bool,
    pub plan_polling: bool,
    pub plan: Option<Plan>,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub viewport: Option<Viewport>,
    pub camera: Option<CameraTransform>,
    pub error: Option<String>,
    pub last_mutation_ms: u64,
}

/// 会话状态 (Session State)
/// Everything a visualization session mutates, behind transition methods
/// that are only ever called from one serialized entry point.
#[derive(Debug)]
pub struct SessionState {
    session_id: Uuid,
    clock: Arc<dyn Clock>,
    graph: GraphState,
    sequencer: StepSequencer,
    layout: LayoutEngine,
    framer: ViewportFramer,
    step_poll: PollingScheduler,
    plan_poll: PollingScheduler,
    rng: StdRng,
    canvas: Canvas,
    agent_id: Option<String>,
    viewport: Option<Viewport>,
    error: Option<String>,
}

impl SessionState {
    pub fn new(config: &VisualizerConfig, clock: Arc<dyn Clock>) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(config, clock, rng)
    }

    pub fn with_rng(config: &VisualizerConfig, clock: Arc<dyn Clock>, rng: StdRng) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            graph: GraphState::with_shift(clock.clone(), config.graph.shift),
            clock,
            sequencer: StepSequencer::new(),
            layout: LayoutEngine::new(config.layout.clone()),
            framer: ViewportFramer::new(config.viewport.clone()),
            step_poll: PollingScheduler::new(STEP_STREAM, config.polling.step_interval_ms),
            plan_poll: PollingScheduler::new(PLAN_STREAM, config.polling.plan_interval_ms).immediate(),
            rng,
            canvas: config.canvas,
            agent_id: None,
            viewport: None,
            error: None,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn agent_id(&self) -> Option<&str> {
        self.agent_id.as_deref()
    }

    pub fn graph(&self) -> &GraphState {
        &self.graph
    }

    pub fn sequencer(&self) -> &StepSequencer {
        &self.sequencer
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    pub fn is_polling(&self) -> bool {
        self.step_poll.is_active()
    }

    pub fn is_plan_polling(&self) -> bool {
        self.plan_poll.is_active()
    }

    /// Binds the session to a backend agent and starts refreshing its plan.
    pub fn attach_agent(&mut self, agent_id: &str) {
        if self.agent_id.is_some() {
            warn!(agent_id = %agent_id, "Session already attached, resetting before re-attach");
            self.reset();
        }
        info!(session_id = %self.session_id, agent_id = %agent_id, "Agent attached");
        self.agent_id = Some(agent_id.to_string());
        self.plan_poll.start(self.clock.now_ms());
    }

    /// Fetches whose timers have fired, at most one per stream.
    pub fn due_fetches(&mut self) -> Vec<FetchRequest> {
        let now = self.clock.now_ms();
        let mut requests = Vec::new();
        let Some(agent_id) = self.agent_id.clone() else {
            return requests;
        };

        if let Some(ticket) = self.plan_poll.poll_due(now) {
            requests.push(FetchRequest::Plan { ticket, agent_id: agent_id.clone() });
        }

        // Read the awaited step before releasing a ticket so the timer
        // never fires into a request it cannot make.
        if let Some(step_id) = self.sequencer.awaited_step().map(str::to_string) {
            if let Some(ticket) = self.step_poll.poll_due(now) {
                requests.push(FetchRequest::Step { ticket, agent_id, step_id });
            }
        }
        requests
    }

    /// Earliest pending deadline across both streams.
    pub fn next_due(&self) -> Option<u64> {
        match (self.plan_poll.next_due(), self.step_poll.next_due()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn on_plan_fetched(&mut self, ticket: PollTicket, result: Result<ActionPlanReport, BackendError>) {
        let now = self.clock.now_ms();
        if self.plan_poll.complete(ticket, now) == Completion::Discard {
            return;
        }

        let report = match result {
            Ok(r) => r,
            Err(e) => {
                self.fail_transport(&e);
                return;
            }
        };

        match report.plan {
            Some(plan) if !plan.is_empty() => {
                if let Some(first) = self.sequencer.on_plan(plan) {
                    info!(step_id = %first, "Plan available, polling first step");
                    self.step_poll.start(now);
                }
            }
            _ => info!(status = ?report.status, "Plan has no steps yet"),
        }

        if report.status.is_ready() {
            info!("Plan reported ready, plan polling stopped");
            self.plan_poll.stop();
            if self.sequencer.complete_empty() {
                self.step_poll.stop();
            }
        }
    }

    pub fn on_step_fetched(
        &mut self,
        ticket: PollTicket,
        step_id: &str,
        result: Result<StepReport, BackendError>,
    ) -> Option<StepOutcome> {
        let now = self.clock.now_ms();
        if self.step_poll.complete(ticket, now) == Completion::Discard {
            return None;
        }

        let report = match result {
            Ok(r) => r,
            Err(e) => {
                self.fail_transport(&e);
                return None;
            }
        };

        let outcome = self.sequencer.on_step_report(step_id, &report, &self.graph);
        match &outcome {
            StepOutcome::Confirmed { confirmation, advance } => {
                let position = self.next_position();
                self.graph.append_from_step(
                    &confirmation.step_id,
                    &confirmation.label,
                    confirmation.payload.clone(),
                    position,
                );
                self.reframe();
                if *advance == Advance::Complete {
                    self.step_poll.stop();
                    self.plan_poll.stop();
                }
            }
            StepOutcome::Failed(message) => {
                self.error = Some(message.clone());
                self.stop_polling();
            }
            _ => {}
        }
        Some(outcome)
    }

    /// A failed launch leaves nothing to poll; surface it like any transport failure.
    pub fn on_launch_failed(&mut self, e: &BackendError) {
        self.fail_transport(e);
    }

    /// Operator-triggered node outside the polling flow.
    pub fn add_node(&mut self, label: &str, payload: NodePayload) -> Option<Appended> {
        let position = self.next_position();
        let appended = self.graph.append_manual(label, payload, position);
        self.reframe();
        appended
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.canvas = Canvas::new(width, height);
        self.reframe();
    }

    /// Explicit clear + return to idle. The only way out of a terminal state.
    pub fn reset(&mut self) {
        self.stop_polling();
        self.graph.clear();
        self.sequencer.reset();
        self.agent_id = None;
        self.viewport = None;
        self.error = None;
        info!(session_id = %self.session_id, "Session reset");
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let transition_ms = self.framer.config().transition_ms;
        SessionSnapshot {
            session_id: self.session_id,
            agent_id: self.agent_id.clone(),
            state: self.sequencer.state().clone(),
            awaited_step: self.sequencer.awaited_step().map(str::to_string),
            polling: self.step_poll.is_active(),
            plan_polling: self.plan_poll.is_active(),
            plan: self.sequencer.plan().cloned(),
            nodes: self.graph.nodes().to_vec(),
            edges: self.graph.edges().to_vec(),
            viewport: self.viewport,
            camera: self.viewport.map(|v| v.transform(self.canvas, transition_ms)),
            error: self.error.clone(),
            last_mutation_ms: self.graph.last_mutation_ms(),
        }
    }

    fn next_position(&mut self) -> Position {
        let nodes = self.graph.nodes();
        self.layout.compute_position(self.canvas, nodes, nodes.last(), &mut self.rng)
    }

    fn reframe(&mut self) {
        self.viewport = self.framer.frame(self.graph.nodes(), self.canvas);
    }

    fn stop_polling(&mut self) {
        self.step_poll.stop();
        self.plan_poll.stop();
    }

    fn fail_transport(&mut self, e: &BackendError) {
        error!(error = %e, "Backend fetch failed, polling halted");
        let message = e.to_string();
        self.sequencer.fail(message.clone());
        self.error = Some(message);
        self.stop_polling();
    }
}
