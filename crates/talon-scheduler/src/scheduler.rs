//! # Scheduler Loop
//!
//! One long-lived task wakes at every minute boundary, reads the job store,
//! and hands each enabled job whose cron matches that minute to the
//! assistant re-entry point. Jobs are always read fresh from the store, so
//! a delete or pause made through a skill applies at the next tick.
//!
//! A fire that fails is logged and leaves `last_run` untouched; the job
//! simply runs again at its next natural occurrence.

use chrono::{DateTime, Local, Timelike, Utc};
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use talon_core::{JobId, ScheduledJob, SchedulerFireError, SchedulerNotice};
use talon_llm::{Assistant, AssistantRequest};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cron::CronExpr;
use crate::store::JobStore;

/// Wall clock that cron expressions are evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScheduleTimezone {
    #[default]
    Local,
    Utc,
}

impl FromStr for ScheduleTimezone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "utc" => Ok(Self::Utc),
            other => Err(format!("unknown timezone '{other}' (expected local or utc)")),
        }
    }
}

impl ScheduleTimezone {
    pub fn matches(&self, cron: &CronExpr, minute: &DateTime<Utc>) -> bool {
        match self {
            Self::Utc => cron.matches(minute),
            Self::Local => cron.matches(&minute.with_timezone(&Local)),
        }
    }

    /// Next time `cron` fires strictly after `after`.
    pub fn next_run(&self, cron: &CronExpr, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Utc => cron.next_after(after),
            Self::Local => cron
                .next_after(&after.with_timezone(&Local))
                .map(|t| t.with_timezone(&Utc)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub timezone: ScheduleTimezone,
    /// Upper bound on a single assistant call.
    pub fire_timeout: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            timezone: ScheduleTimezone::Local,
            fire_timeout: Duration::from_secs(300),
        }
    }
}

/// What one evaluation of one minute did.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub minute: Option<DateTime<Utc>>,
    /// The minute had already been evaluated; nothing was read or fired.
    pub repeated_minute: bool,
    pub fired: Vec<JobId>,
    pub failed: Vec<SchedulerFireError>,
    pub skipped_disabled: Vec<JobId>,
    /// Due, but a previous fire of the same job is still running.
    pub skipped_in_flight: Vec<JobId>,
    /// Due, but `last_run` already falls in this minute.
    pub skipped_already_run: Vec<JobId>,
    /// Stored cron no longer parses.
    pub invalid: Vec<JobId>,
}

impl TickReport {
    pub fn attempted(&self) -> usize {
        self.fired.len() + self.failed.len()
    }
}

/// Clone-able handle for announcing store mutations to a running loop.
#[derive(Clone)]
pub struct SchedulerHandle {
    notices: mpsc::Sender<SchedulerNotice>,
}

impl SchedulerHandle {
    /// Announce a mutation. Dropped silently when the loop is not running.
    pub fn notify(&self, notice: SchedulerNotice) {
        if let Err(e) = self.notices.try_send(notice) {
            debug!(error = %e, "scheduler notice not delivered");
        }
    }
}

/// The cron scheduler.
pub struct SchedulerLoop {
    store: JobStore,
    assistant: Arc<dyn Assistant>,
    settings: SchedulerSettings,
    in_flight: Arc<Mutex<HashSet<JobId>>>,
    last_minute: Mutex<Option<DateTime<Utc>>>,
    notice_tx: mpsc::Sender<SchedulerNotice>,
    notice_rx: Mutex<Option<mpsc::Receiver<SchedulerNotice>>>,
}

impl SchedulerLoop {
    pub fn new(store: JobStore, assistant: Arc<dyn Assistant>, settings: SchedulerSettings) -> Self {
        let (notice_tx, notice_rx) = mpsc::channel(64);
        Self {
            store,
            assistant,
            settings,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            last_minute: Mutex::new(None),
            notice_tx,
            notice_rx: Mutex::new(Some(notice_rx)),
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            notices: self.notice_tx.clone(),
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Evaluate the minute containing `now` and fire every due job.
    ///
    /// Returns once all fires started by this tick have finished or timed
    /// out. A minute is evaluated at most once per loop instance.
    pub async fn tick(&self, now: DateTime<Utc>) -> TickReport {
        let minute = truncate_to_minute(now);
        let mut report = TickReport {
            minute: Some(minute),
            ..Default::default()
        };

        {
            let mut last = self.last_minute.lock();
            if last.is_some_and(|m| m >= minute) {
                report.repeated_minute = true;
                return report;
            }
            *last = Some(minute);
        }

        let jobs = self.store.list().await;
        debug!(minute = %minute, jobs = jobs.len(), "scheduler tick");

        let mut due = Vec::new();
        for job in jobs {
            if !job.enabled {
                report.skipped_disabled.push(job.id);
                continue;
            }

            let cron = match CronExpr::parse(&job.cron) {
                Ok(cron) => cron,
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "stored cron expression is invalid, skipping");
                    report.invalid.push(job.id);
                    continue;
                }
            };
            if !self.settings.timezone.matches(&cron, &minute) {
                continue;
            }

            if job.last_run.is_some_and(|t| truncate_to_minute(t) == minute) {
                report.skipped_already_run.push(job.id);
                continue;
            }
            if !self.in_flight.lock().insert(job.id.clone()) {
                warn!(job_id = %job.id, "previous fire still running, skipping this occurrence");
                report.skipped_in_flight.push(job.id);
                continue;
            }
            due.push(job);
        }

        let results = join_all(due.into_iter().map(|job| self.fire(job, now))).await;
        for result in results {
            match result {
                Ok(id) => report.fired.push(id),
                Err(e) => report.failed.push(e),
            }
        }

        if report.attempted() > 0 {
            info!(
                minute = %minute,
                fired = report.fired.len(),
                failed = report.failed.len(),
                "scheduler tick complete"
            );
        }
        report
    }

    async fn fire(&self, job: ScheduledJob, now: DateTime<Utc>) -> Result<JobId, SchedulerFireError> {
        let _guard = InFlight {
            set: self.in_flight.clone(),
            id: job.id.clone(),
        };

        info!(job_id = %job.id, task = %job.task, assistant = self.assistant.name(), "firing scheduled job");
        let request = AssistantRequest::from(&job);
        let outcome = tokio::time::timeout(self.settings.fire_timeout, self.assistant.submit(request)).await;

        let reply = match outcome {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                warn!(job_id = %job.id, error = %e, "scheduled job failed, will retry at next occurrence");
                return Err(e);
            }
            Err(_) => {
                let e = SchedulerFireError {
                    job_id: job.id.clone(),
                    reason: format!(
                        "assistant did not answer within {}s",
                        self.settings.fire_timeout.as_secs()
                    ),
                };
                warn!(job_id = %job.id, error = %e, "scheduled job timed out");
                return Err(e);
            }
        };
        debug!(job_id = %job.id, reply_len = reply.len(), "assistant replied");

        match self.store.record_run(&job.id, now).await {
            Ok(true) => {}
            Ok(false) => debug!(job_id = %job.id, "job removed while it was running"),
            Err(e) => warn!(job_id = %job.id, error = %e, "failed to record last run"),
        }
        Ok(job.id)
    }

    /// Run until `cancel` fires. Each tick runs on its own task so a slow
    /// assistant never delays the next minute.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let Some(mut notices) = self.notice_rx.lock().take() else {
            warn!("scheduler loop is already running");
            return;
        };
        info!(timezone = ?self.settings.timezone, "scheduler started");

        self.spawn_tick(Utc::now());
        loop {
            let wait = until_next_minute(Utc::now());
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("scheduler stopping");
                    return;
                }
                Some(notice) = notices.recv() => {
                    info!(job_id = notice.job_id(), notice = %notice, "job store changed");
                }
                _ = tokio::time::sleep(wait) => {
                    self.spawn_tick(Utc::now());
                }
            }
        }
    }

    fn spawn_tick(self: &Arc<Self>, now: DateTime<Utc>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.tick(now).await;
        });
    }
}

/// Removes a job from the in-flight set when its fire ends, however it ends.
struct InFlight {
    set: Arc<Mutex<HashSet<JobId>>>,
    id: JobId,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.set.lock().remove(&self.id);
    }
}

fn truncate_to_minute(t: DateTime<Utc>) -> DateTime<Utc> {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

fn until_next_minute(now: DateTime<Utc>) -> Duration {
    let next = truncate_to_minute(now) + chrono::Duration::minutes(1);
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timezone_parsing() {
        assert_eq!("UTC".parse::<ScheduleTimezone>(), Ok(ScheduleTimezone::Utc));
        assert_eq!(" local ".parse::<ScheduleTimezone>(), Ok(ScheduleTimezone::Local));
        assert!("mars".parse::<ScheduleTimezone>().is_err());
    }

    #[test]
    fn waits_until_the_next_boundary() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 45).unwrap();
        assert_eq!(until_next_minute(now), Duration::from_secs(15));
        let on_boundary = Utc.with_ymd_and_hms(2026, 3, 2, 8, 1, 0).unwrap();
        assert_eq!(until_next_minute(on_boundary), Duration::from_secs(60));
    }

    #[test]
    fn next_run_in_utc() {
        let cron = CronExpr::parse("0 8 * * *").unwrap();
        let after = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        let next = ScheduleTimezone::Utc.next_run(&cron, &after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 3, 8, 0, 0).unwrap());
    }
}
