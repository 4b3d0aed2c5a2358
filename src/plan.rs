use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 步骤状态 (Step Status)
/// Canonical step lifecycle. The backend speaks either a string vocabulary
/// or its integer enum; both are folded into this type at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    NotStarted,
    Started,
    Updated,
    Failed,
}

impl StepStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "not_started" | "pending" => Some(Self::NotStarted),
            "started" | "in_progress" => Some(Self::Started),
            "updated" | "completed" => Some(Self::Updated),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Backend integer enum: 0 not started, 1 started, 2 updated, 3 failed.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::NotStarted),
            1 => Some(Self::Started),
            2 => Some(Self::Updated),
            3 => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Self::parse(s),
            Value::Number(n) => n.as_i64().and_then(Self::from_code),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Updated | Self::Failed)
    }
}

/// Plan-level status. The backend reports `0` once the plan is final;
/// any other integer means the plan is still being generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "code")]
pub enum PlanStatus {
    Ready,
    Pending(i64),
    Unknown,
}

impl PlanStatus {
    pub fn from_value(value: Option<&Value>) -> Self {
        match value.and_then(|v| v.as_i64()) {
            Some(0) => Self::Ready,
            Some(code) => Self::Pending(code),
            None => Self::Unknown,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub name: String,
    pub status: StepStatus,
}

impl Step {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: StepStatus::NotStarted,
        }
    }
}

/// Externally supplied, ordered execution plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<Step>,
}

impl Plan {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn position(&self, step_id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == step_id)
    }

    pub fn get(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn first(&self) -> Option<&Step> {
        self.steps.first()
    }
}
