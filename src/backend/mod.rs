use async_trait::async_trait;
use std::fmt::Debug;
use thiserror::Error;

pub mod http;
pub mod payload;

pub use payload::{ActionPlanReport, StepReport};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request to {endpoint} failed: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },
    #[error("could not decode response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },
    #[error("response from {endpoint} carries no agent_id")]
    MissingAgentId { endpoint: String },
    #[error("{endpoint} did not answer within {after_ms}ms")]
    Timeout { endpoint: String, after_ms: u64 },
}

/// 工作流后端接口 (Workflow Backend)
/// Request/response calls the visualizer makes against the agent backend.
#[async_trait]
pub trait WorkflowBackend: Send + Sync + Debug {
    /// Creates an agent session for `query` and returns its id.
    async fn create_agent(&self, query: &str) -> Result<String, BackendError>;

    async fn action_plan(&self, agent_id: &str) -> Result<ActionPlanReport, BackendError>;

    async fn step_info(&self, agent_id: &str, step_id: &str) -> Result<StepReport, BackendError>;
}
