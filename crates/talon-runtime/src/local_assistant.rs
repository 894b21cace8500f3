use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use talon_config::AssistantConfig;
use talon_core::{SchedulerFireError, SkillOutcome};
use talon_llm::{Assistant, AssistantRequest, WebhookAssistant};
use talon_skills::Params;
use tracing::{debug, info};

use crate::runtime::SkillRuntime;

/// Re-enters the local skill runtime: the task text is matched against the
/// catalog and the best skill runs with `task` as its input.
pub struct LocalAssistant {
    runtime: Arc<SkillRuntime>,
    min_score: f32,
}

impl LocalAssistant {
    pub fn new(runtime: Arc<SkillRuntime>) -> Self {
        Self {
            runtime,
            min_score: 0.05,
        }
    }

    /// Matches scoring below this are treated as "no skill".
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }
}

#[async_trait]
impl Assistant for LocalAssistant {
    async fn submit(&self, request: AssistantRequest) -> Result<String, SchedulerFireError> {
        let fail = |reason: String| SchedulerFireError {
            job_id: request.job_id.clone(),
            reason,
        };

        let best = self
            .runtime
            .retrieve(&request.task, 1)
            .await
            .into_iter()
            .next()
            .filter(|hit| hit.score >= self.min_score)
            .ok_or_else(|| fail(format!("no skill matches task '{}'", request.task)))?;
        debug!(job_id = %request.job_id, skill = %best.skill_id, score = best.score, "local re-entry");

        let mut params = Params::new();
        params.insert("task".into(), Value::String(request.task.clone()));
        params.insert("query".into(), Value::String(request.task.clone()));

        let outcome = self
            .runtime
            .invoke(&best.skill_id, params, None)
            .await
            .map_err(|e| fail(e.to_string()))?;

        match outcome {
            SkillOutcome::Text { text } => Ok(text),
            SkillOutcome::SchedulerMutation { notice } => Ok(notice.to_string()),
            SkillOutcome::PendingConfirmation { .. } => Err(fail(format!(
                "skill '{}' needs confirmation, which a scheduled run cannot give",
                best.skill_id
            ))),
        }
    }

    fn name(&self) -> &str {
        "local"
    }
}

/// The webhook assistant when one is configured, otherwise local re-entry.
pub fn assistant_from_config(config: &AssistantConfig, runtime: Arc<SkillRuntime>) -> Arc<dyn Assistant> {
    let url = config.webhook_url.trim();
    if url.is_empty() {
        info!("fired jobs re-enter the local skill runtime");
        Arc::new(LocalAssistant::new(runtime))
    } else {
        info!(url, "fired jobs are posted to the assistant webhook");
        Arc::new(WebhookAssistant::new(url).with_token(config.webhook_token.clone()))
    }
}
