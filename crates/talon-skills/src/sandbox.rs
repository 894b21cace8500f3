use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};
use talon_core::{ExecutionError, SkillOutcome};
use tracing::{debug, info, warn};

use crate::definition::SkillDefinition;
use crate::params::{Params, bind};

/// Runs skill bodies with bound parameters under a wall-clock budget.
///
/// The body runs on its own tokio task: a panic inside it surfaces as
/// `SkillFailed`, and on timeout the task is aborted (child processes are
/// killed on drop). The caller always gets control back within the budget.
#[derive(Debug, Clone)]
pub struct Sandbox {
    default_timeout: Duration,
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl Sandbox {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Budget for `skill`: explicit timeout, else the skill's own, else the
    /// sandbox default.
    pub fn budget(&self, skill: &SkillDefinition, timeout: Option<Duration>) -> Duration {
        timeout.or(skill.timeout).unwrap_or(self.default_timeout)
    }

    pub async fn invoke(
        &self,
        skill: &SkillDefinition,
        params: Params,
        timeout: Option<Duration>,
    ) -> Result<SkillOutcome, ExecutionError> {
        let bound = bind(&skill.id, &skill.parameters, params)?;
        let budget = self.budget(skill, timeout);
        let body = Arc::clone(&skill.body);
        let started = Instant::now();

        debug!(skill = %skill.id, budget_secs = budget.as_secs_f64(), "invoking skill");

        let mut handle = tokio::spawn(async move { body.call(bound).await });

        let result = match tokio::time::timeout(budget, &mut handle).await {
            Err(_) => {
                handle.abort();
                warn!(skill = %skill.id, budget_secs = budget.as_secs_f64(), "skill timed out");
                return Err(ExecutionError::Timeout {
                    skill: skill.id.clone(),
                    after: budget,
                });
            }
            Ok(Err(join_err)) if join_err.is_panic() => Err(ExecutionError::SkillFailed {
                skill: skill.id.clone(),
                message: format!("panicked: {}", panic_message(join_err.into_panic())),
            }),
            Ok(Err(join_err)) => Err(ExecutionError::SkillFailed {
                skill: skill.id.clone(),
                message: join_err.to_string(),
            }),
            Ok(Ok(Err(e))) => Err(match e.downcast::<ExecutionError>() {
                Ok(exec) => exec,
                Err(e) => ExecutionError::SkillFailed {
                    skill: skill.id.clone(),
                    message: format!("{e:#}"),
                },
            }),
            Ok(Ok(Ok(outcome))) => Ok(outcome),
        };

        match &result {
            Ok(_) => info!(
                skill = %skill.id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "skill completed"
            ),
            Err(e) => warn!(skill = %skill.id, error = %e, "skill failed"),
        }
        result
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}
