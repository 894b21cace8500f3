use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration: maps to `talon.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TalonConfig {
    pub skills: SkillsConfig,
    pub embedding: EmbeddingConfig,
    pub scheduler: SchedulerConfig,
    pub assistant: AssistantConfig,
    pub logging: LoggingConfig,
}

// ── Skills ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillsConfig {
    /// Directories scanned for skill documents, in precedence order.
    pub dirs: Vec<PathBuf>,
    /// Reload the registry when a skill file changes.
    pub watch: bool,
    /// Wall-clock budget for one skill invocation.
    pub default_timeout_secs: u64,
    /// Upper bound on the number of retrieval candidates.
    pub max_top_k: usize,
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self {
            dirs: vec![PathBuf::from("./skills")],
            watch: false,
            default_timeout_secs: 30,
            max_top_k: 5,
        }
    }
}

// ── Embedding ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// "hashing" (offline), "openai", or "ollama".
    pub provider: String,
    /// Model name for remote providers (empty = provider default).
    pub model: String,
    /// Base URL override for remote providers (empty = provider default).
    pub base_url: String,
    /// Vector size for the hashing provider.
    pub dims: usize,
    /// API key for OpenAI-compatible endpoints. Falls back to `OPENAI_API_KEY`.
    pub api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "hashing".into(),
            model: String::new(),
            base_url: String::new(),
            dims: 256,
            api_key: None,
        }
    }
}

impl EmbeddingConfig {
    /// The configured model, or the provider's usual embedding model.
    pub fn effective_model(&self) -> &str {
        match (self.model.trim(), self.provider.as_str()) {
            ("", "ollama") => "nomic-embed-text",
            ("", _) => "text-embedding-3-small",
            (model, _) => model,
        }
    }
}

// ── Scheduler ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Run the background scheduler loop.
    pub enabled: bool,
    /// JSON document holding all scheduled jobs.
    pub jobs_file: PathBuf,
    /// Timezone cron expressions are evaluated in: "local" or "utc".
    pub timezone: String,
    /// Maximum seconds one fired job may spend in the assistant.
    pub fire_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            jobs_file: PathBuf::from("./data/jobs.json"),
            timezone: "local".into(),
            fire_timeout_secs: 300,
        }
    }
}

// ── Assistant ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Endpoint that receives fired jobs. Empty = re-enter through the local
    /// skill runtime.
    pub webhook_url: String,
    /// Optional bearer token sent with webhook requests.
    pub webhook_token: Option<String>,
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty", "json", "compact".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

// ── Validation ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let icon = match self.severity {
            WarningSeverity::Error => "❌",
            WarningSeverity::Warning => "⚠️ ",
            WarningSeverity::Info => "💡",
        };
        write!(f, "{} {}: {}", icon, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, "\n   ↳ {}", h)?;
        }
        Ok(())
    }
}

pub const EMBEDDING_PROVIDERS: [&str; 3] = ["hashing", "openai", "ollama"];
pub const TIMEZONES: [&str; 2] = ["local", "utc"];

impl TalonConfig {
    /// Check the configuration. Returns non-fatal warnings, or an error
    /// message listing every problem of `Error` severity.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        // ── Skills ───
        if self.skills.dirs.is_empty() {
            warnings.push(ConfigWarning {
                field: "skills.dirs".into(),
                message: "no skill directories configured: only built-in skills will load".into(),
                severity: WarningSeverity::Info,
                hint: Some("Add e.g. dirs = [\"./skills\"]".into()),
            });
        }
        if self.skills.default_timeout_secs == 0 {
            warnings.push(ConfigWarning {
                field: "skills.default_timeout_secs".into(),
                message: "timeout is 0: every skill invocation will time out".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 30".into()),
            });
        }
        if self.skills.max_top_k == 0 {
            warnings.push(ConfigWarning {
                field: "skills.max_top_k".into(),
                message: "max_top_k is 0: retrieval will be treated as top-1".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Set to e.g. 5".into()),
            });
        }

        // ── Embedding ───
        if !EMBEDDING_PROVIDERS.contains(&self.embedding.provider.as_str()) {
            warnings.push(ConfigWarning {
                field: "embedding.provider".into(),
                message: format!("unknown embedding provider '{}'", self.embedding.provider),
                severity: WarningSeverity::Error,
                hint: Some(format!("Valid values: {}", EMBEDDING_PROVIDERS.join(", "))),
            });
        }
        if self.embedding.provider == "openai" && self.embedding.api_key.is_none() {
            warnings.push(ConfigWarning {
                field: "embedding.api_key".into(),
                message: "openai embeddings selected without an API key".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Set embedding.api_key or OPENAI_API_KEY".into()),
            });
        }
        if self.embedding.provider == "hashing" && self.embedding.dims < 16 {
            warnings.push(ConfigWarning {
                field: "embedding.dims".into(),
                message: format!("{} dimensions is too few for useful matching", self.embedding.dims),
                severity: WarningSeverity::Warning,
                hint: Some("Use 128 or more".into()),
            });
        }

        // ── Scheduler ───
        if !TIMEZONES.contains(&self.scheduler.timezone.as_str()) {
            warnings.push(ConfigWarning {
                field: "scheduler.timezone".into(),
                message: format!("unknown timezone '{}'", self.scheduler.timezone),
                severity: WarningSeverity::Error,
                hint: Some(format!("Valid values: {}", TIMEZONES.join(", "))),
            });
        }
        if self.scheduler.fire_timeout_secs == 0 {
            warnings.push(ConfigWarning {
                field: "scheduler.fire_timeout_secs".into(),
                message: "fire timeout is 0: every fired job will fail".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 300".into()),
            });
        }

        // ── Assistant ───
        let url = &self.assistant.webhook_url;
        if !url.is_empty() && !(url.starts_with("http://") || url.starts_with("https://")) {
            warnings.push(ConfigWarning {
                field: "assistant.webhook_url".into(),
                message: format!("'{}' is not an http(s) URL", url),
                severity: WarningSeverity::Error,
                hint: None,
            });
        }

        // ── Logging format ───
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }

        // ── Logging level ───
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_levels.join(", "))),
            });
        }

        // Check for hard errors
        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();

        if !errors.is_empty() {
            return Err(format!("Configuration errors:\n  • {}", errors.join("\n  • ")));
        }

        Ok(warnings)
    }
}
