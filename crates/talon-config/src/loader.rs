use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::schema::TalonConfig;

/// Loads the Talon configuration once per command.
pub struct ConfigLoader {
    config: TalonConfig,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > TALON_CONFIG env > ~/.talon/talon.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("TALON_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".talon")
            .join("talon.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> talon_core::Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            let raw = std::fs::read_to_string(&config_path)?;
            Self::parse(&raw, &config_path)?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            TalonConfig::default()
        };

        let config = Self::apply_env_overrides(config, |key| std::env::var(key).ok());

        // Validate config: log warnings, fail on errors
        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => {
                return Err(talon_core::TalonError::Config(e));
            }
        }

        Ok(Self {
            config,
            config_path,
        })
    }

    pub fn get(&self) -> &TalonConfig {
        &self.config
    }

    pub fn into_config(self) -> TalonConfig {
        self.config
    }

    /// Path the config was loaded from.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    fn parse(raw: &str, path: &Path) -> talon_core::Result<TalonConfig> {
        toml::from_str::<TalonConfig>(raw).map_err(|e| {
            talon_core::TalonError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Apply env var overrides (TALON_SKILLS_DIR, TALON_JOBS_FILE, etc.).
    ///
    /// `lookup` is the environment; tests pass a closure over a map.
    pub fn apply_env_overrides<F>(mut config: TalonConfig, lookup: F) -> TalonConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("TALON_SKILLS_DIR") {
            config.skills.dirs = std::env::split_paths(&v).collect();
        }
        if let Some(v) = lookup("TALON_JOBS_FILE") {
            config.scheduler.jobs_file = PathBuf::from(v);
        }
        if let Some(v) = lookup("TALON_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Some(v) = lookup("TALON_EMBEDDING_PROVIDER") {
            config.embedding.provider = v;
        }
        if let Some(v) = lookup("TALON_ASSISTANT_WEBHOOK") {
            config.assistant.webhook_url = v;
        }
        if let Some(v) = lookup("TALON_SKILL_TIMEOUT") {
            if let Ok(secs) = v.parse::<u64>() {
                config.skills.default_timeout_secs = secs;
            }
        }
        // API key: config file takes priority, env is the fallback.
        if config.embedding.api_key.is_none() {
            if let Some(v) = lookup("OPENAI_API_KEY") {
                config.embedding.api_key = Some(v);
            }
        }
        config
    }
}
