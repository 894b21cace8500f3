//! Commit or discard a proposed mutation.
//!
//! A [`Proposal`] only ever leaves `Proposed` through an explicit call here.
//! Nothing is held open while it waits: the proposal is plain data owned by
//! whoever is showing it to the user.

use talon_core::{
    Proposal, ProposalState, ProposedAction, SchedulerNotice, StoreError, TalonError,
};
use talon_scheduler::{CronExpr, JobStore};
use tracing::info;

/// The user's answer to a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Confirm,
    Decline,
}

/// Commit `proposal` to the job store.
///
/// The proposal id becomes the job id, so confirming the same payload twice
/// is rejected instead of creating a second job.
pub async fn confirm(store: &JobStore, proposal: &mut Proposal) -> Result<SchedulerNotice, TalonError> {
    ensure_open(proposal)?;

    match &proposal.action {
        ProposedAction::CreateSchedule {
            task,
            cron,
            description,
            ..
        } => {
            CronExpr::validate(cron)?;
            let job = store
                .create_with_id(&proposal.id, task, cron, Some(description.clone()))
                .await
                .map_err(|e| match e {
                    StoreError::DuplicateId(id) => {
                        TalonError::ConfirmationRejected(format!("proposal {id} was already committed"))
                    }
                    other => TalonError::Store(other),
                })?;

            proposal.state = ProposalState::Committed;
            info!(proposal = %proposal.id, job_id = %job.id, "proposal committed");
            Ok(SchedulerNotice::Created { job })
        }
    }
}

/// Mark `proposal` as declined. Nothing is written anywhere.
pub fn discard(proposal: &mut Proposal) -> Result<(), TalonError> {
    ensure_open(proposal)?;
    proposal.state = ProposalState::Discarded;
    info!(proposal = %proposal.id, "proposal discarded");
    Ok(())
}

fn ensure_open(proposal: &Proposal) -> Result<(), TalonError> {
    match proposal.state {
        ProposalState::Proposed => Ok(()),
        ProposalState::Committed => Err(TalonError::ConfirmationRejected(format!(
            "proposal {} was already committed",
            proposal.id
        ))),
        ProposalState::Discarded => Err(TalonError::ConfirmationRejected(format!(
            "proposal {} was discarded",
            proposal.id
        ))),
    }
}
