use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a scheduled job.
pub type JobId = String;

/// Identifier of a skill (the file stem of its source document).
pub type SkillId = String;

/// A persisted schedule entry: run `task` through the assistant whenever
/// `cron` matches the wall clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: JobId,
    /// Literal instruction text resubmitted to the assistant on fire.
    pub task: String,
    /// Five-field cron expression.
    pub cron: String,
    /// Human-readable label.
    pub description: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
}

fn default_enabled() -> bool {
    true
}

impl ScheduledJob {
    /// Build a fresh, enabled job. An absent or blank description becomes
    /// `"cron: <cron>"`.
    pub fn new(id: JobId, task: String, cron: String, description: Option<String>) -> Self {
        let description = default_description(description, &cron);
        Self {
            id,
            task,
            cron,
            description,
            enabled: true,
            created_at: Utc::now(),
            last_run: None,
        }
    }
}

/// Description fallback used when the caller did not supply one.
pub fn default_description(description: Option<String>, cron: &str) -> String {
    match description {
        Some(d) if !d.trim().is_empty() => d,
        _ => format!("cron: {cron}"),
    }
}

/// Generate a short job id (eight hex characters, the form users type back).
pub fn new_job_id() -> JobId {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}
