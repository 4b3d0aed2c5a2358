#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use stepchain::backend::{BackendError, WorkflowBackend, ActionPlanReport, StepReport};
use stepchain::config::VisualizerConfig;

#[derive(Debug, Clone)]
pub enum Reply {
    Json(Value),
    Fail(u16),
    Hang,
}

pub fn step_json(step_id: &str, status: &str, action: &str) -> Reply {
    Reply::Json(json!({
        "step_id": step_id,
        "status": status,
        "action": action,
        "details": format!("{} details", action),
        "mcp_server": "search",
        "mcp_server_img_url": "https://example.com/search.png"
    }))
}

pub fn plan_json(status: i64, ids: &[&str]) -> Reply {
    let steps: Vec<Value> = ids.iter().map(|id| json!({ "id": id, "name": format!("do {}", id) })).collect();
    Reply::Json(json!({ "status": status, "steps": steps }))
}

/// Backend stand-in. Each stream replays its queue; the last reply repeats.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    agent_id: String,
    plan: Mutex<VecDeque<Reply>>,
    steps: Mutex<HashMap<String, VecDeque<Reply>>>,
    step_delay: Option<Duration>,
    pub create_calls: AtomicUsize,
    pub plan_calls: AtomicUsize,
    pub step_calls: AtomicUsize,
    step_outstanding: AtomicUsize,
    pub max_step_outstanding: AtomicUsize,
    pub step_log: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new(agent_id: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            ..Default::default()
        }
    }

    pub fn plan(self, replies: Vec<Reply>) -> Self {
        *self.plan.lock().unwrap() = replies.into();
        self
    }

    pub fn step(self, step_id: &str, replies: Vec<Reply>) -> Self {
        self.steps.lock().unwrap().insert(step_id.to_string(), replies.into());
        self
    }

    pub fn step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = Some(delay);
        self
    }

    pub fn step_calls(&self) -> usize {
        self.step_calls.load(Ordering::SeqCst)
    }

    pub fn plan_calls(&self) -> usize {
        self.plan_calls.load(Ordering::SeqCst)
    }

    fn next(queue: &mut VecDeque<Reply>) -> Option<Reply> {
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }

    async fn resolve(reply: Option<Reply>, endpoint: &str) -> Result<Value, BackendError> {
        match reply {
            Some(Reply::Json(v)) => Ok(v),
            Some(Reply::Fail(status)) => Err(BackendError::Status { endpoint: endpoint.to_string(), status }),
            Some(Reply::Hang) => std::future::pending().await,
            None => Err(BackendError::Status { endpoint: endpoint.to_string(), status: 404 }),
        }
    }
}

#[async_trait]
impl WorkflowBackend for ScriptedBackend {
    async fn create_agent(&self, _query: &str) -> Result<String, BackendError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.agent_id.clone())
    }

    async fn action_plan(&self, _agent_id: &str) -> Result<ActionPlanReport, BackendError> {
        self.plan_calls.fetch_add(1, Ordering::SeqCst);
        let reply = Self::next(&mut self.plan.lock().unwrap());
        let body = Self::resolve(reply, "action_plan").await?;
        Ok(ActionPlanReport::from_value(&body))
    }

    async fn step_info(&self, _agent_id: &str, step_id: &str) -> Result<StepReport, BackendError> {
        self.step_calls.fetch_add(1, Ordering::SeqCst);
        self.step_log.lock().unwrap().push(step_id.to_string());

        let outstanding = self.step_outstanding.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_step_outstanding.fetch_max(outstanding, Ordering::SeqCst);
        if let Some(delay) = self.step_delay {
            tokio::time::sleep(delay).await;
        }
        self.step_outstanding.fetch_sub(1, Ordering::SeqCst);

        let reply = self.steps.lock().unwrap().get_mut(step_id).and_then(Self::next);
        let body = Self::resolve(reply, "step_info").await?;
        Ok(StepReport::from_value(&body))
    }
}

pub fn test_config() -> VisualizerConfig {
    VisualizerConfig {
        seed: Some(7),
        ..Default::default()
    }
}
