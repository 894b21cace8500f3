//! # talon-config
//!
//! Configuration system for the Talon runtime. Reads from `talon.toml` and
//! environment variables, with environment values overriding the file.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::TalonConfig;
pub use schema::{
    AssistantConfig, ConfigWarning, EmbeddingConfig, LoggingConfig, SchedulerConfig, SkillsConfig,
    WarningSeverity,
};
