use async_trait::async_trait;
use serde_json::{Value, json};
use crate::backend::{BackendError, WorkflowBackend};
use crate::backend::payload::{ActionPlanReport, StepReport};
use reqwest::{Client, RequestBuilder};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send_json(&self, endpoint: String, builder: RequestBuilder) -> Result<Value, BackendError> {
        debug!(endpoint = %endpoint, "Backend request");
        let response = builder.send().await
            .map_err(|source| BackendError::Request { endpoint: endpoint.clone(), source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status { endpoint, status: status.as_u16() });
        }

        response.json::<Value>().await
            .map_err(|e| BackendError::Decode { endpoint, message: e.to_string() })
    }
}

#[async_trait]
impl WorkflowBackend for HttpBackend {
    async fn create_agent(&self, query: &str) -> Result<String, BackendError> {
        let endpoint = self.url("/user-query");
        let builder = self.client.post(&endpoint).json(&json!({ "query": query }));
        let body = self.send_json(endpoint.clone(), builder).await?;

        body.get("agent_id")
            .and_then(|v| match v {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .ok_or(BackendError::MissingAgentId { endpoint })
    }

    async fn action_plan(&self, agent_id: &str) -> Result<ActionPlanReport, BackendError> {
        let endpoint = self.url(&format!("/workflow/{}/steps", agent_id));
        let builder = self.client.get(&endpoint);
        let body = self.send_json(endpoint, builder).await?;
        Ok(ActionPlanReport::from_value(&body))
    }

    async fn step_info(&self, agent_id: &str, step_id: &str) -> Result<StepReport, BackendError> {
        let endpoint = self.url(&format!("/workflow/{}/{}", agent_id, step_id));
        let builder = self.client.get(&endpoint);
        let body = self.send_json(endpoint, builder).await?;
        Ok(StepReport::from_value(&body))
    }
}
