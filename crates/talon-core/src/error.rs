use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Unified error type for the entire Talon runtime.
#[derive(Error, Debug)]
pub enum TalonError {
    // ── Skill errors ───────────────────────────────────────────
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    // ── Scheduling errors ──────────────────────────────────────
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    SchedulerFire(#[from] SchedulerFireError),

    #[error("confirmation rejected: {0}")]
    ConfirmationRejected(String),

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    #[error("config validation failed: {field}: {reason}")]
    ConfigValidation { field: String, reason: String },

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, TalonError>;

/// A skill source that could not be turned into a definition.
///
/// Load errors are never fatal: the registry skips the source, logs it, and
/// lists it in its load report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("failed to read {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("invalid frontmatter: {0}")]
    Frontmatter(String),

    #[error("skill source has no usable id")]
    MissingName,

    #[error("skill '{0}' has no description")]
    EmptyDescription(String),

    #[error("skill '{0}' has no executable body (expected a ```sh block or a handler)")]
    MissingBody(String),

    #[error("skill '{skill}' refers to unknown handler '{handler}'")]
    UnknownHandler { skill: String, handler: String },

    #[error("skill '{skill}' declares an invalid parameter: {reason}")]
    InvalidParameter { skill: String, reason: String },

    #[error("skill '{id}' is already loaded from {first}")]
    DuplicateId { id: String, first: PathBuf },
}

/// The embedding collaborator could not produce comparable vectors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetrievalError {
    #[error("embedding provider failed: {0}")]
    Embedding(String),

    #[error("embedding provider returned {got} vectors for {expected} inputs")]
    CountMismatch { expected: usize, got: usize },
}

/// Failure of a single skill invocation inside the sandbox.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("unknown skill: {0}")]
    UnknownSkill(String),

    #[error("skill '{skill}' requires parameter '{name}'")]
    MissingParameter { skill: String, name: String },

    #[error("skill '{skill}' parameter '{name}' is invalid: {reason}")]
    InvalidParameter {
        skill: String,
        name: String,
        reason: String,
    },

    #[error("skill '{skill}' failed: {message}")]
    SkillFailed { skill: String, message: String },

    #[error("skill '{skill}' timed out after {}s", .after.as_secs_f64())]
    Timeout { skill: String, after: Duration },
}

impl ExecutionError {
    /// Text suitable for showing to the end user in place of a result.
    pub fn user_message(&self) -> String {
        match self {
            Self::UnknownSkill(id) => format!("I don't have a skill called '{id}'."),
            Self::MissingParameter { name, .. } => {
                format!("I need a value for '{name}' before I can do that.")
            }
            Self::InvalidParameter { name, reason, .. } => {
                format!("The value given for '{name}' is not usable: {reason}.")
            }
            Self::SkillFailed { message, .. } => format!("That didn't work: {message}"),
            Self::Timeout { after, .. } => {
                format!("That took too long (gave up after {}s).", after.as_secs())
            }
        }
    }
}

/// Job store failures. Reads degrade to an empty store; writes surface these.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("job store io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("job store at {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("invalid cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },

    #[error("job id already exists: {0}")]
    DuplicateId(String),

    #[error("failed to encode job store: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The assistant re-entry for a fired job failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("job {job_id} failed to fire: {reason}")]
pub struct SchedulerFireError {
    pub job_id: String,
    pub reason: String,
}
