use serde::Serialize;
use tracing::{debug, info, warn, error};
use crate::backend::payload::StepReport;
use crate::chain::{GraphState, NodePayload};
use crate::plan::{Plan, StepStatus};

/// 步骤状态机 (Step Sequencer)
/// `idle -> awaiting_step -> plan_complete`, with `error` reachable from
/// anywhere. Terminal states are only left through `reset`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SequencerState {
    Idle,
    AwaitingStep { step_id: String, index: usize },
    PlanComplete,
    Error { message: String },
}

impl SequencerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::PlanComplete | Self::Error { .. })
    }
}

/// What the caller must append for a confirmed step.
#[derive(Debug, Clone, PartialEq)]
pub struct Confirmation {
    pub step_id: String,
    pub label: String,
    pub payload: NodePayload,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    Next(String),
    Complete,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Non-terminal status for the awaited step; keep polling.
    Pending(StepStatus),
    /// Payload carried nothing usable; nothing changes.
    NoInformation,
    /// Report for a step that is not awaited, or whose node already exists.
    Stale,
    /// The awaited step finished. The sequencer has already moved on.
    Confirmed { confirmation: Confirmation, advance: Advance },
    /// The backend reported the awaited step as failed.
    Failed(String),
}

fn progress_rank(status: StepStatus) -> u8 {
    match status {
        StepStatus::NotStarted => 0,
        StepStatus::Started => 1,
        StepStatus::Updated | StepStatus::Failed => 2,
    }
}

#[derive(Debug, Clone)]
pub struct StepSequencer {
    state: SequencerState,
    plan: Option<Plan>,
}

impl Default for StepSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl StepSequencer {
    pub fn new() -> Self {
        Self {
            state: SequencerState::Idle,
            plan: None,
        }
    }

    pub fn state(&self) -> &SequencerState {
        &self.state
    }

    pub fn plan(&self) -> Option<&Plan> {
        self.plan.as_ref()
    }

    pub fn awaited_step(&self) -> Option<&str> {
        match &self.state {
            SequencerState::AwaitingStep { step_id, .. } => Some(step_id),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Stores the latest plan. From `idle` with a non-empty plan, selects the
    /// first step and returns its id.
    pub fn on_plan(&mut self, mut plan: Plan) -> Option<String> {
        let first = plan.first().map(|s| s.id.clone());

        if let SequencerState::AwaitingStep { step_id, index } = &mut self.state {
            if let Some(found) = plan.position(step_id) {
                *index = found;
            }
        }
        // Progress observed locally is never rolled back by a refresh.
        if let Some(previous) = &self.plan {
            for step in &mut plan.steps {
                if let Some(old) = previous.steps.iter().find(|s| s.id == step.id) {
                    if progress_rank(old.status) > progress_rank(step.status) {
                        step.status = old.status;
                    }
                }
            }
        }
        self.plan = Some(plan);

        if self.state != SequencerState::Idle {
            return None;
        }
        let step_id = first?;
        info!(step_id = %step_id, "Awaiting first step");
        self.state = SequencerState::AwaitingStep { step_id: step_id.clone(), index: 0 };
        Some(step_id)
    }

    /// Consumes the status fetched for `requested_step`.
    pub fn on_step_report(&mut self, requested_step: &str, report: &StepReport, graph: &GraphState) -> StepOutcome {
        let (awaited, index) = match &self.state {
            SequencerState::AwaitingStep { step_id, index } => (step_id.clone(), *index),
            other => {
                debug!(step_id = %requested_step, state = ?other, "Report while not awaiting, ignored");
                return StepOutcome::Stale;
            }
        };

        if requested_step != awaited {
            debug!(step_id = %requested_step, awaited = %awaited, "Report for a step no longer awaited");
            return StepOutcome::Stale;
        }
        if let Some(reported) = &report.step_id {
            if reported != &awaited {
                warn!(step_id = %reported, awaited = %awaited, "Report names a different step, ignored");
                return StepOutcome::Stale;
            }
        }

        let status = match report.status {
            Some(s) => s,
            None => {
                warn!(step_id = %awaited, "Step report without a usable status");
                return StepOutcome::NoInformation;
            }
        };

        match status {
            StepStatus::Updated => {
                if graph.contains(&awaited) {
                    debug!(step_id = %awaited, "Step already has a node, confirmation ignored");
                    return StepOutcome::Stale;
                }
                let label = match &report.action {
                    Some(a) => a.clone(),
                    None => {
                        warn!(step_id = %awaited, "Updated step without an action name");
                        return StepOutcome::NoInformation;
                    }
                };
                let confirmation = Confirmation {
                    step_id: awaited,
                    label,
                    payload: report.payload(),
                };
                self.mark(&confirmation.step_id, StepStatus::Updated);
                let advance = self.advance_from(index, &confirmation.step_id);
                StepOutcome::Confirmed { confirmation, advance }
            }
            StepStatus::Failed => {
                self.mark(&awaited, StepStatus::Failed);
                let message = format!("step {} failed", awaited);
                self.fail(message.clone());
                StepOutcome::Failed(message)
            }
            pending => {
                self.mark(&awaited, pending);
                StepOutcome::Pending(pending)
            }
        }
    }

    // Mirrors observed progress into the plan copy shown by the checklist.
    fn mark(&mut self, step_id: &str, status: StepStatus) {
        let step = self.plan.as_mut().and_then(|p| p.steps.iter_mut().find(|s| s.id == step_id));
        if let Some(step) = step {
            if progress_rank(status) >= progress_rank(step.status) {
                step.status = status;
            }
        }
    }

    fn advance_from(&mut self, index: usize, step_id: &str) -> Advance {
        let plan = self.plan.as_ref();
        let current = plan.and_then(|p| p.position(step_id)).unwrap_or(index);
        match plan.and_then(|p| p.get(current + 1)) {
            Some(next) => {
                info!(step_id = %next.id, index = current + 1, "Advancing to next step");
                self.state = SequencerState::AwaitingStep { step_id: next.id.clone(), index: current + 1 };
                Advance::Next(next.id.clone())
            }
            None => {
                info!(step_id = %step_id, "Last step confirmed, plan complete");
                self.state = SequencerState::PlanComplete;
                Advance::Complete
            }
        }
    }

    /// A final plan with nothing to execute completes from `idle`. Returns
    /// `false` if a step is already awaited or the sequencer is terminal.
    pub fn complete_empty(&mut self) -> bool {
        if self.state != SequencerState::Idle {
            return false;
        }
        info!("Plan ready without steps, nothing to run");
        self.state = SequencerState::PlanComplete;
        true
    }

    /// Moves to `error` from any state.
    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        error!(error = %message, "Sequencer failed");
        self.state = SequencerState::Error { message };
    }

    pub fn reset(&mut self) {
        self.state = SequencerState::Idle;
        self.plan = None;
    }
}
