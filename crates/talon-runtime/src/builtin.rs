//! Built-in scheduling skills.
//!
//! `schedule_create` never touches the store: it answers with a proposal
//! that the user has to confirm. The other four act immediately and answer
//! with a [`SchedulerNotice`] (or a listing).

use chrono::{DateTime, Local, Utc};
use futures::FutureExt;
use serde_json::Value;
use std::sync::Arc;
use talon_core::{
    ExecutionError, Proposal, ProposedAction, SchedulerNotice, SkillOutcome, default_description,
    new_job_id,
};
use talon_scheduler::{CronExpr, JobStore, ScheduleTimezone, resolve_id};
use talon_skills::{FnBody, ParamSpec, ParamType, Params, SkillDefinition};

/// Ids of the skills returned by [`scheduling_skills`].
pub const SCHEDULING_SKILLS: [&str; 5] = [
    "schedule_create",
    "schedule_list",
    "schedule_delete",
    "schedule_pause",
    "schedule_resume",
];

pub fn scheduling_skills(store: JobStore, timezone: ScheduleTimezone) -> Vec<SkillDefinition> {
    vec![
        create_skill(store.clone()),
        list_skill(store.clone(), timezone),
        toggle_skill(store.clone(), Toggle::Delete),
        toggle_skill(store.clone(), Toggle::Pause),
        toggle_skill(store, Toggle::Resume),
    ]
}

/// The value as supplied. Blank text counts as absent.
fn text_param(params: &Params, name: &str) -> Option<String> {
    params
        .get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

fn required_text(skill: &str, params: &Params, name: &str) -> Result<String, ExecutionError> {
    text_param(params, name).ok_or_else(|| ExecutionError::MissingParameter {
        skill: skill.to_string(),
        name: name.to_string(),
    })
}

// ── schedule_create ───────────────────────────────────────────

async fn propose_schedule(store: JobStore, params: Params) -> anyhow::Result<SkillOutcome> {
    let task = required_text("schedule_create", &params, "task")?;
    let raw_cron = required_text("schedule_create", &params, "cron")?;
    let cron = CronExpr::parse(&raw_cron).map_err(|e| ExecutionError::InvalidParameter {
        skill: "schedule_create".into(),
        name: "cron".into(),
        reason: e.to_string(),
    })?;
    let description = default_description(text_param(&params, "description"), &raw_cron);

    let mut id = new_job_id();
    while store.get(&id).await.is_some() {
        id = new_job_id();
    }

    let proposal = Proposal::new(
        id,
        ProposedAction::CreateSchedule {
            task,
            cron: raw_cron,
            description,
            schedule: cron.describe(),
        },
    );
    Ok(SkillOutcome::proposal(proposal))
}

fn create_skill(store: JobStore) -> SkillDefinition {
    let body = FnBody::new(move |params| propose_schedule(store.clone(), params).boxed());

    SkillDefinition::builtin(
        "schedule_create",
        "Schedule a recurring task with a five-field cron expression (minute hour day month weekday). \
         Asks for confirmation before anything is saved.",
        vec![
            ParamSpec::required("task", ParamType::String)
                .describe("Instruction to run each time the schedule fires"),
            ParamSpec::required("cron", ParamType::String).describe("Cron expression, e.g. 0 8 * * *"),
            ParamSpec::optional("description", ParamType::String).describe("Short label for listings"),
        ],
        Arc::new(body),
    )
}

// ── schedule_list ─────────────────────────────────────────────

async fn list_jobs(store: JobStore, timezone: ScheduleTimezone) -> anyhow::Result<SkillOutcome> {
    let jobs = store.list().await;
    if jobs.is_empty() {
        return Ok(SkillOutcome::text("No scheduled jobs."));
    }

    let now = Utc::now();
    let active = jobs.iter().filter(|j| j.enabled).count();
    let mut lines = Vec::with_capacity(jobs.len() + 1);
    lines.push(format!("{} job(s) ({active} active):", jobs.len()));

    for job in &jobs {
        let status = if job.enabled { "active" } else { "paused" };
        let (schedule, next) = match CronExpr::parse(&job.cron) {
            Ok(cron) => {
                let next = if job.enabled {
                    timezone
                        .next_run(&cron, &now)
                        .map(|t| format_time(timezone, t))
                        .unwrap_or_else(|| "never".into())
                } else {
                    "-".into()
                };
                (cron.describe(), next)
            }
            Err(_) => ("invalid cron".into(), "never".into()),
        };
        let last = job
            .last_run
            .map(|t| format_time(timezone, t))
            .unwrap_or_else(|| "never".into());
        lines.push(format!(
            "• [{status}] {} | {} ({schedule}) | {} | next: {next} | last: {last}",
            job.id, job.cron, job.description
        ));
    }
    Ok(SkillOutcome::text(lines.join("\n")))
}

fn list_skill(store: JobStore, timezone: ScheduleTimezone) -> SkillDefinition {
    let body = FnBody::new(move |_params| list_jobs(store.clone(), timezone).boxed());

    SkillDefinition::builtin(
        "schedule_list",
        "List all scheduled jobs with their cron schedule, status and next run time.",
        Vec::new(),
        Arc::new(body),
    )
}

fn format_time(timezone: ScheduleTimezone, t: DateTime<Utc>) -> String {
    match timezone {
        ScheduleTimezone::Utc => t.format("%Y-%m-%d %H:%M UTC").to_string(),
        ScheduleTimezone::Local => t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
    }
}

// ── schedule_delete / pause / resume ──────────────────────────

#[derive(Debug, Clone, Copy)]
enum Toggle {
    Delete,
    Pause,
    Resume,
}

impl Toggle {
    fn id(self) -> &'static str {
        match self {
            Self::Delete => "schedule_delete",
            Self::Pause => "schedule_pause",
            Self::Resume => "schedule_resume",
        }
    }

    fn description(self) -> &'static str {
        match self {
            Self::Delete => "Delete a scheduled job permanently by its id.",
            Self::Pause => "Pause a scheduled job so it stops firing until resumed.",
            Self::Resume => "Resume a paused scheduled job.",
        }
    }
}

async fn apply_toggle(store: JobStore, toggle: Toggle, params: Params) -> anyhow::Result<SkillOutcome> {
    let input = required_text(toggle.id(), &params, "job_id")?.trim().to_string();
    let jobs = store.list().await;
    let Some(job_id) = resolve_id(&jobs, &input) else {
        return Ok(SkillOutcome::notice(SchedulerNotice::NotFound { job_id: input }));
    };

    let found = match toggle {
        Toggle::Delete => store.delete(&job_id).await?,
        Toggle::Pause => store.set_enabled(&job_id, false).await?,
        Toggle::Resume => store.set_enabled(&job_id, true).await?,
    };
    let notice = match (found, toggle) {
        (false, _) => SchedulerNotice::NotFound { job_id },
        (true, Toggle::Delete) => SchedulerNotice::Deleted { job_id },
        (true, Toggle::Pause) => SchedulerNotice::Paused { job_id },
        (true, Toggle::Resume) => SchedulerNotice::Resumed { job_id },
    };
    Ok(SkillOutcome::notice(notice))
}

fn toggle_skill(store: JobStore, toggle: Toggle) -> SkillDefinition {
    let body = FnBody::new(move |params| apply_toggle(store.clone(), toggle, params).boxed());

    SkillDefinition::builtin(
        toggle.id(),
        toggle.description(),
        vec![ParamSpec::required("job_id", ParamType::String).describe("Id shown by schedule_list")],
        Arc::new(body),
    )
}
