use serde::Serialize;
use serde_json::Value;
use crate::chain::NodePayload;
use crate::plan::{Plan, PlanStatus, Step, StepStatus};

// Ids arrive as strings or bare integers depending on the backend build.
fn id_of(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn text_of(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Response of the action-plan endpoint, accepted either flat or nested under `data`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionPlanReport {
    pub status: PlanStatus,
    /// `None` when the backend has not produced any steps yet.
    pub plan: Option<Plan>,
}

impl ActionPlanReport {
    pub fn from_value(value: &Value) -> Self {
        let nested = value.get("data").filter(|d| d.is_object());
        let body = match nested {
            Some(data) if value.get("steps").is_none() => data,
            _ => value,
        };

        let status_field = value.get("status").or_else(|| nested.and_then(|d| d.get("status")));
        let status = PlanStatus::from_value(status_field);

        let plan = body.get("steps").and_then(|s| s.as_array()).map(|items| {
            let steps = items
                .iter()
                .filter_map(|item| {
                    let id = id_of(item.get("id").or_else(|| item.get("step_id")))?;
                    let name = text_of(item.get("name").or_else(|| item.get("action")))
                        .unwrap_or_else(|| id.clone());
                    let status = item
                        .get("status")
                        .and_then(StepStatus::from_value)
                        .unwrap_or(StepStatus::NotStarted);
                    Some(Step { id, name, status })
                })
                .collect();
            Plan::new(steps)
        });

        Self { status, plan }
    }
}

/// Response of the step-info endpoint. Every field is optional; the
/// sequencer decides what is usable.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StepReport {
    pub step_id: Option<String>,
    pub status: Option<StepStatus>,
    pub action: Option<String>,
    pub details: Option<String>,
    pub server_ref: Option<String>,
    pub server_image_ref: Option<String>,
    pub metric: Option<f64>,
}

impl StepReport {
    pub fn from_value(value: &Value) -> Self {
        Self {
            step_id: id_of(value.get("step_id").or_else(|| value.get("id"))),
            status: value.get("status").and_then(StepStatus::from_value),
            action: text_of(value.get("action")).filter(|a| !a.is_empty()),
            details: text_of(value.get("details")),
            server_ref: text_of(value.get("mcp_server")),
            server_image_ref: text_of(value.get("mcp_server_img_url")),
            metric: value
                .get("metric")
                .or_else(|| value.get("value"))
                .and_then(|v| v.as_f64()),
        }
    }

    pub fn updated(step_id: &str, action: &str) -> Self {
        Self {
            step_id: Some(step_id.to_string()),
            status: Some(StepStatus::Updated),
            action: Some(action.to_string()),
            ..Default::default()
        }
    }

    pub fn with_status(status: StepStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn payload(&self) -> NodePayload {
        NodePayload {
            details: self.details.clone(),
            server_ref: self.server_ref.clone(),
            server_image_ref: self.server_image_ref.clone(),
            metric: self.metric,
        }
    }
}
