//! # talon-runtime
//!
//! Ties the pieces together for a caller that has a piece of user text:
//!
//! ```text
//!   text ──► retrieve ──► invoke (sandbox) ──► SkillOutcome
//!                                               │
//!               ┌───────────────────────────────┼─────────────────────┐
//!               ▼                               ▼                     ▼
//!             Text                   PendingConfirmation      SchedulerMutation
//!          shown as-is            confirm / discard ──► store     ──► scheduler loop
//! ```
//!
//! The registry table and the retrieval index are held as one [`Catalog`]
//! and replaced together on reload.

pub mod builtin;
pub mod confirmation;
pub mod local_assistant;
pub mod runtime;

pub use builtin::{SCHEDULING_SKILLS, scheduling_skills};
pub use confirmation::Decision;
pub use local_assistant::{LocalAssistant, assistant_from_config};
pub use runtime::{Catalog, RuntimeOptions, SkillRuntime, embedder_from_config};
