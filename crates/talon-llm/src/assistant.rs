use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use talon_core::{ScheduledJob, SchedulerFireError};
use tracing::{debug, info};

/// What a fired job hands to the assistant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantRequest {
    pub job_id: String,
    /// The job's task text, resubmitted verbatim.
    pub task: String,
    pub description: String,
}

impl From<&ScheduledJob> for AssistantRequest {
    fn from(job: &ScheduledJob) -> Self {
        Self {
            job_id: job.id.clone(),
            task: job.task.clone(),
            description: job.description.clone(),
        }
    }
}

/// Re-entry point for scheduled work: the scheduler loop submits a job's task
/// text here as if a user had just asked for it.
#[async_trait]
pub trait Assistant: Send + Sync {
    /// Run the task and return the assistant's reply.
    async fn submit(&self, request: AssistantRequest) -> Result<String, SchedulerFireError>;

    /// Name used in logs.
    fn name(&self) -> &str;
}

/// Posts fired jobs to an external assistant endpoint as JSON.
pub struct WebhookAssistant {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl WebhookAssistant {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_default(),
            url: url.into(),
            token: None,
        }
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Assistant for WebhookAssistant {
    async fn submit(&self, request: AssistantRequest) -> Result<String, SchedulerFireError> {
        let job_id = request.job_id.clone();
        let fail = |reason: String| SchedulerFireError {
            job_id: job_id.clone(),
            reason,
        };

        debug!(job_id = %request.job_id, url = %self.url, "posting job to assistant webhook");

        let mut req = self.client.post(&self.url).json(&request);
        if let Some(ref token) = self.token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| fail(format!("webhook request failed: {}", e)))?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(fail(format!("webhook HTTP {}: {}", status, body)));
        }

        info!(job_id = %request.job_id, status = %status, "assistant webhook accepted job");
        Ok(body)
    }

    fn name(&self) -> &str {
        "webhook"
    }
}
