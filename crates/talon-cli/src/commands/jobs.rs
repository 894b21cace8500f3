use serde_json::Value;
use talon_config::TalonConfig;
use talon_core::{SchedulerNotice, SkillOutcome, TalonError};
use talon_runtime::scheduling_skills;
use talon_scheduler::{JobStore, ScheduleTimezone};
use talon_skills::{Params, Sandbox};

use super::JobAction;

/// Job commands go straight to the store through the built-in scheduling
/// skills, so they need no skill directories or embedding provider.
pub(super) async fn cmd_jobs(config: TalonConfig, action: JobAction) -> talon_core::Result<()> {
    let timezone = config
        .scheduler
        .timezone
        .parse::<ScheduleTimezone>()
        .map_err(TalonError::Config)?;
    let store = JobStore::new(config.scheduler.jobs_file.clone());

    let (skill, job_id) = match action {
        JobAction::List => ("schedule_list", None),
        JobAction::Delete { id } => ("schedule_delete", Some(id)),
        JobAction::Pause { id } => ("schedule_pause", Some(id)),
        JobAction::Resume { id } => ("schedule_resume", Some(id)),
    };

    let mut params = Params::new();
    if let Some(id) = job_id {
        params.insert("job_id".into(), Value::String(id));
    }

    let Some(def) = scheduling_skills(store, timezone)
        .into_iter()
        .find(|s| s.id == skill)
    else {
        return Err(TalonError::Config(format!("built-in skill '{skill}' is missing")));
    };
    let outcome = Sandbox::default().invoke(&def, params, None).await?;

    println!("{outcome}");
    if let SkillOutcome::SchedulerMutation {
        notice: SchedulerNotice::NotFound { job_id },
    } = outcome
    {
        return Err(TalonError::Other(anyhow::anyhow!("no scheduled job with id {job_id}")));
    }
    Ok(())
}
