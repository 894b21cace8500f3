use console::style;
use serde_json::Value;
use std::time::Duration;
use talon_config::TalonConfig;
use talon_core::{SkillOutcome, TalonError};
use talon_runtime::{Decision, SkillRuntime};
use talon_skills::{LoadReport, Params};

use super::SkillAction;

pub(super) async fn cmd_skills(config: TalonConfig, action: SkillAction) -> talon_core::Result<()> {
    let (runtime, report) = SkillRuntime::from_config(&config).await?;
    print_skipped(&report);

    match action {
        SkillAction::List => {
            let skills = runtime.skills();
            println!("{}\n", style(format!("Available Skills ({}):", skills.len())).bold());
            for s in skills {
                let origin = match &s.source {
                    Some(path) => path.display().to_string(),
                    None => "built-in".to_string(),
                };
                println!("  {} {}", style(&s.id).cyan(), style(format!("({})", s.body.kind())).dim());
                println!("    {}", s.description);
                for p in &s.parameters {
                    let need = if p.required { "required" } else { "optional" };
                    println!("    - {}: {} ({need})", p.name, p.kind);
                }
                println!("    {}", style(origin).dim());
                println!();
            }
        }
        SkillAction::Search { query, k } => {
            let hits = runtime.retrieve(&query, k).await;
            if hits.is_empty() {
                println!("No matching skills.");
            }
            for (rank, hit) in hits.iter().enumerate() {
                println!("{:>2}. {:<24} {:.3}", rank + 1, hit.skill_id, hit.score);
            }
        }
        SkillAction::Run {
            id,
            param,
            timeout,
            yes,
        } => {
            let params: Params = param
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect();
            let outcome = match runtime
                .invoke(&id, params, timeout.map(Duration::from_secs))
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    eprintln!("{}", style(e.user_message()).red());
                    return Err(TalonError::Execution(e));
                }
            };
            show_outcome(&runtime, outcome, yes).await?;
        }
        SkillAction::Reload => {
            let report = runtime.reload().await;
            println!(
                "Loaded {} skill source(s), skipped {}.",
                report.loaded.len(),
                report.skipped.len()
            );
            print_skipped(&report);
        }
    }
    Ok(())
}

async fn show_outcome(runtime: &SkillRuntime, outcome: SkillOutcome, yes: bool) -> talon_core::Result<()> {
    match outcome {
        SkillOutcome::Text { text } => println!("{text}"),
        SkillOutcome::SchedulerMutation { notice } => println!("{notice}"),
        SkillOutcome::PendingConfirmation { mut proposal } => {
            println!("{}", proposal.render());
            let decision = if yes || ask_confirmation() {
                Decision::Confirm
            } else {
                Decision::Decline
            };
            match runtime.resolve(&mut proposal, decision).await? {
                Some(notice) => println!("{} {notice}", style("✔").green()),
                None => println!("Nothing was scheduled."),
            }
        }
    }
    Ok(())
}

/// Ask on the terminal. Anything but an explicit yes declines.
fn ask_confirmation() -> bool {
    dialoguer::Confirm::with_theme(&dialoguer::theme::ColorfulTheme::default())
        .with_prompt("Create this job?")
        .default(false)
        .interact()
        .unwrap_or(false)
}

fn print_skipped(report: &LoadReport) {
    for (path, err) in &report.skipped {
        eprintln!("{} {}: {err}", style("skipped").yellow(), path.display());
    }
}
