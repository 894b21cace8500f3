//! The tagged value every skill invocation produces.
//!
//! A skill answers with plain text, with a [`Proposal`] that must be
//! confirmed before anything is committed, or with a [`SchedulerNotice`]
//! describing a mutation it already applied to the job store. Callers match
//! on the variant; nothing is inferred from the text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{JobId, ScheduledJob};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkillOutcome {
    /// A finished answer to show as-is.
    Text { text: String },
    /// A mutating action awaiting explicit user confirmation.
    PendingConfirmation { proposal: Proposal },
    /// A scheduling change that has been applied.
    SchedulerMutation { notice: SchedulerNotice },
}

impl SkillOutcome {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn proposal(proposal: Proposal) -> Self {
        Self::PendingConfirmation { proposal }
    }

    pub fn notice(notice: SchedulerNotice) -> Self {
        Self::SchedulerMutation { notice }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::PendingConfirmation { .. })
    }
}

impl fmt::Display for SkillOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text { text } => f.write_str(text),
            Self::PendingConfirmation { proposal } => f.write_str(&proposal.render()),
            Self::SchedulerMutation { notice } => write!(f, "{notice}"),
        }
    }
}

// ── Proposals ─────────────────────────────────────────────────

/// Lifecycle of a proposal. `Committed` and `Discarded` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalState {
    Proposed,
    Committed,
    Discarded,
}

/// The literal mutation a proposal would perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ProposedAction {
    CreateSchedule {
        task: String,
        cron: String,
        description: String,
        /// Human-readable rendering of `cron`, e.g. "every day at 08:00".
        schedule: String,
    },
}

/// An unconfirmed mutating action. The payload is kept verbatim so the
/// confirmation surface can show exactly what will be committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: JobId,
    pub action: ProposedAction,
    pub state: ProposalState,
    pub created_at: DateTime<Utc>,
}

impl Proposal {
    pub fn new(id: JobId, action: ProposedAction) -> Self {
        Self {
            id,
            action,
            state: ProposalState::Proposed,
            created_at: Utc::now(),
        }
    }

    /// The text shown to the user before they confirm or decline.
    pub fn render(&self) -> String {
        match &self.action {
            ProposedAction::CreateSchedule {
                task,
                cron,
                description,
                schedule,
            } => format!(
                "Create scheduled job?\n\
                 Task: {task}\n\
                 Cron: {cron}\n\
                 Schedule: {schedule}\n\
                 Description: {description}\n\
                 Confirm with id {}",
                self.id
            ),
        }
    }
}

// ── Scheduler notices ─────────────────────────────────────────

/// A job store mutation announced to the scheduler loop and the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum SchedulerNotice {
    Created { job: ScheduledJob },
    Deleted { job_id: JobId },
    Paused { job_id: JobId },
    Resumed { job_id: JobId },
    NotFound { job_id: JobId },
}

impl SchedulerNotice {
    pub fn job_id(&self) -> &str {
        match self {
            Self::Created { job } => &job.id,
            Self::Deleted { job_id }
            | Self::Paused { job_id }
            | Self::Resumed { job_id }
            | Self::NotFound { job_id } => job_id,
        }
    }
}

impl fmt::Display for SchedulerNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created { job } => write!(
                f,
                "Scheduled job {} created: {} ({})",
                job.id, job.description, job.cron
            ),
            Self::Deleted { job_id } => write!(f, "Scheduled job {job_id} deleted."),
            Self::Paused { job_id } => write!(f, "Scheduled job {job_id} paused."),
            Self::Resumed { job_id } => write!(f, "Scheduled job {job_id} resumed."),
            Self::NotFound { job_id } => write!(f, "No scheduled job with id {job_id}."),
        }
    }
}
