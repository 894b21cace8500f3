use console::style;
use std::sync::Arc;
use std::time::Duration;
use talon_config::TalonConfig;
use talon_core::TalonError;
use talon_runtime::{SkillRuntime, assistant_from_config};
use talon_scheduler::{ScheduleTimezone, SchedulerLoop, SchedulerSettings};
use talon_skills::SkillWatcher;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub(super) async fn cmd_serve(config: TalonConfig) -> talon_core::Result<()> {
    println!("🦅 Talon v{}", env!("CARGO_PKG_VERSION"));

    let (runtime, report) = SkillRuntime::from_config(&config).await?;
    let runtime = Arc::new(runtime);
    println!(
        "   Skills: {} loaded, {} skipped",
        runtime.skills().len(),
        report.skipped.len()
    );
    for (path, err) in &report.skipped {
        println!("   {} {}: {err}", style("skipped").yellow(), path.display());
    }

    let cancel = CancellationToken::new();
    let mut tasks = Vec::new();

    // Skill hot-reload, kept alive for the lifetime of the command.
    let _watcher = if config.skills.watch {
        match SkillWatcher::start(runtime.skill_dirs(), Duration::from_millis(500)) {
            Ok((watcher, mut reloads)) => {
                println!("   Skill hot-reload: enabled");
                let runtime = Arc::clone(&runtime);
                let cancel = cancel.clone();
                tasks.push(tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            next = reloads.recv() => match next {
                                Some(()) => {
                                    let report = runtime.reload().await;
                                    info!(loaded = report.loaded.len(), skipped = report.skipped.len(), "skills reloaded");
                                }
                                None => break,
                            },
                        }
                    }
                }));
                Some(watcher)
            }
            Err(e) => {
                warn!(error = %e, "skill hot-reload disabled");
                None
            }
        }
    } else {
        None
    };

    if config.scheduler.enabled {
        let timezone = config
            .scheduler
            .timezone
            .parse::<ScheduleTimezone>()
            .map_err(TalonError::Config)?;
        let assistant = assistant_from_config(&config.assistant, Arc::clone(&runtime));
        println!(
            "   Scheduler: {} ({:?}, assistant: {})",
            runtime.store().path().display(),
            timezone,
            assistant.name()
        );

        let scheduler = Arc::new(SchedulerLoop::new(
            runtime.store().clone(),
            assistant,
            SchedulerSettings {
                timezone,
                fire_timeout: Duration::from_secs(config.scheduler.fire_timeout_secs),
            },
        ));
        runtime.attach_scheduler(scheduler.handle());
        tasks.push(tokio::spawn(scheduler.run(cancel.clone())));
    } else {
        println!("   Scheduler: disabled");
    }

    println!();
    println!("   Press Ctrl-C to stop.");
    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    cancel.cancel();
    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "background task ended abnormally");
        }
    }
    Ok(())
}
