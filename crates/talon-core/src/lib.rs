//! # talon-core
//!
//! Core types and error taxonomy for the Talon skill runtime.
//! This crate defines the shared vocabulary used by every other crate in the workspace.

pub mod error;
pub mod outcome;
pub mod types;

pub use error::{
    ExecutionError, LoadError, Result, RetrievalError, SchedulerFireError, StoreError, TalonError,
};
pub use outcome::{Proposal, ProposalState, ProposedAction, SchedulerNotice, SkillOutcome};
pub use types::*;
