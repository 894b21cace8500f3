//! # talon-scheduler
//!
//! Recurring jobs for the Talon runtime: five-field cron expressions, a
//! JSON-backed [`JobStore`] that serialises every mutation, and the
//! minute-aligned [`SchedulerLoop`] that resubmits due jobs to an
//! [`Assistant`](talon_llm::Assistant).

pub mod cron;
pub mod scheduler;
pub mod store;

pub use cron::CronExpr;
pub use scheduler::{
    ScheduleTimezone, SchedulerHandle, SchedulerLoop, SchedulerSettings, TickReport,
};
pub use store::{JobStore, resolve_id};
