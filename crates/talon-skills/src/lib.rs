//! # talon-skills
//!
//! Skills are small, independently defined capabilities. Each one is a
//! Markdown document with frontmatter (name, description, dependencies), an
//! optional `# Parameters` list, and an executable body: a shell block, or a
//! reference to a native handler compiled into the binary.
//!
//! ## Pieces
//!
//! - [`SkillRegistry`] loads documents from skill directories and swaps the
//!   whole table atomically on reload. One broken document is skipped and
//!   reported; the rest still load.
//! - [`SkillIndex`] ranks skills against a free-text request by embedding
//!   similarity, delegating vectors to an [`EmbeddingProvider`](talon_llm::EmbeddingProvider).
//! - [`Sandbox`] binds parameters and runs a body under a timeout. Whatever
//!   goes wrong comes back as an [`ExecutionError`](talon_core::ExecutionError).
//! - [`SkillWatcher`] requests a reload when a skill file changes.

pub mod body;
pub mod definition;
pub mod index;
pub mod params;
pub mod registry;
pub mod sandbox;
pub mod watcher;

pub use body::{FnBody, HandlerTable, ScriptBody, SkillBody};
pub use definition::SkillDefinition;
pub use index::{ScoredSkill, SkillIndex, cosine_similarity};
pub use params::{ParamSpec, ParamType, Params};
pub use registry::{LoadReport, SkillRegistry, SkillTable};
pub use sandbox::Sandbox;
pub use watcher::SkillWatcher;
