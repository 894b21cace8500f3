#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;
    use std::path::PathBuf;
    use talon_config::ConfigLoader;
    use talon_config::schema::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    // ── Default tests ──────────────────────────────────────────

    #[test]
    fn test_skills_config_defaults() {
        let config = SkillsConfig::default();
        assert_eq!(config.dirs, vec![PathBuf::from("./skills")]);
        assert_eq!(config.default_timeout_secs, 30);
        assert_eq!(config.max_top_k, 5);
        assert!(!config.watch);
    }

    #[test]
    fn test_scheduler_config_defaults() {
        let config = SchedulerConfig::default();
        assert!(config.enabled);
        assert_eq!(config.jobs_file, PathBuf::from("./data/jobs.json"));
        assert_eq!(config.timezone, "local");
        assert_eq!(config.fire_timeout_secs, 300);
    }

    #[test]
    fn test_embedding_and_logging_defaults() {
        let config = TalonConfig::default();
        assert_eq!(config.embedding.provider, "hashing");
        assert_eq!(config.embedding.dims, 256);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "pretty");
        assert!(config.assistant.webhook_url.is_empty());
    }

    #[test]
    fn test_embedding_model_follows_provider() {
        let mut embedding = TalonConfig::default().embedding;
        embedding.provider = "ollama".into();
        assert_eq!(embedding.effective_model(), "nomic-embed-text");

        embedding.provider = "openai".into();
        assert_eq!(embedding.effective_model(), "text-embedding-3-small");

        embedding.model = "mxbai-embed-large".into();
        embedding.provider = "ollama".into();
        assert_eq!(embedding.effective_model(), "mxbai-embed-large");
    }

    #[test]
    fn test_defaults_validate_cleanly() {
        let warnings = TalonConfig::default().validate().unwrap();
        assert!(warnings.iter().all(|w| w.severity != WarningSeverity::Error));
    }

    // ── TOML tests ─────────────────────────────────────────────

    #[test]
    fn test_partial_toml_applies_defaults() {
        let toml_str = r#"
[scheduler]
timezone = "utc"

[skills]
dirs = ["/opt/skills", "./skills"]
"#;
        let config: TalonConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.scheduler.timezone, "utc");
        assert_eq!(config.skills.dirs.len(), 2);
        // Defaults should fill in
        assert_eq!(config.skills.default_timeout_secs, 30);
        assert_eq!(config.scheduler.fire_timeout_secs, 300);
        assert_eq!(config.embedding.provider, "hashing");
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let config = TalonConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let restored: TalonConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(restored.scheduler.jobs_file, config.scheduler.jobs_file);
        assert_eq!(restored.skills.max_top_k, config.skills.max_top_k);
    }

    // ── Validation tests ───────────────────────────────────────

    #[test]
    fn test_unknown_provider_is_an_error() {
        let mut config = TalonConfig::default();
        config.embedding.provider = "word2vec".into();
        let err = config.validate().unwrap_err();
        assert!(err.contains("embedding.provider"));
    }

    #[test]
    fn test_bad_timezone_and_zero_timeout_reported_together() {
        let mut config = TalonConfig::default();
        config.scheduler.timezone = "Mars/Olympus".into();
        config.skills.default_timeout_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.contains("scheduler.timezone"));
        assert!(err.contains("skills.default_timeout_secs"));
    }

    #[test]
    fn test_openai_without_key_warns() {
        let mut config = TalonConfig::default();
        config.embedding.provider = "openai".into();
        let warnings = config.validate().unwrap();
        assert!(warnings.iter().any(|w| w.field == "embedding.api_key"));
    }

    #[test]
    fn test_webhook_must_be_http() {
        let mut config = TalonConfig::default();
        config.assistant.webhook_url = "ftp://example.com/hook".into();
        assert!(config.validate().is_err());
        config.assistant.webhook_url = "https://example.com/hook".into();
        assert!(config.validate().is_ok());
    }

    // ── Env override tests ─────────────────────────────────────

    #[test]
    fn test_env_overrides() {
        let config = ConfigLoader::apply_env_overrides(
            TalonConfig::default(),
            env(&[
                ("TALON_JOBS_FILE", "/var/lib/talon/jobs.json"),
                ("TALON_LOG_LEVEL", "debug"),
                ("TALON_SKILL_TIMEOUT", "12"),
                ("OPENAI_API_KEY", "sk-test"),
            ]),
        );
        assert_eq!(config.scheduler.jobs_file, PathBuf::from("/var/lib/talon/jobs.json"));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.skills.default_timeout_secs, 12);
        assert_eq!(config.embedding.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_env_api_key_does_not_override_file() {
        let mut base = TalonConfig::default();
        base.embedding.api_key = Some("from-file".into());
        let config = ConfigLoader::apply_env_overrides(base, env(&[("OPENAI_API_KEY", "from-env")]));
        assert_eq!(config.embedding.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn test_env_unparseable_timeout_ignored() {
        let config = ConfigLoader::apply_env_overrides(
            TalonConfig::default(),
            env(&[("TALON_SKILL_TIMEOUT", "soon")]),
        );
        assert_eq!(config.skills.default_timeout_secs, 30);
    }

    // ── ConfigLoader tests ─────────────────────────────────────

    #[test]
    fn test_config_loader_with_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("talon.toml");
        let mut f = std::fs::File::create(&config_path).unwrap();
        writeln!(
            f,
            r#"
[skills]
default_timeout_secs = 10

[scheduler]
timezone = "utc"
fire_timeout_secs = 60
"#
        )
        .unwrap();

        let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();
        let config = loader.get();
        assert_eq!(config.skills.default_timeout_secs, 10);
        assert_eq!(config.scheduler.timezone, "utc");
        assert_eq!(config.scheduler.fire_timeout_secs, 60);
        assert_eq!(loader.path(), config_path.as_path());
    }

    #[test]
    fn test_config_loader_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("talon.toml");
        std::fs::write(&config_path, "[scheduler]\ntimezone = \"somewhere\"\n").unwrap();
        assert!(ConfigLoader::load(Some(config_path.as_path())).is_err());

        std::fs::write(&config_path, "this is = = not toml").unwrap();
        assert!(ConfigLoader::load(Some(config_path.as_path())).is_err());
    }

    #[test]
    fn test_config_loader_without_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("missing.toml");

        let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();
        assert_eq!(loader.path(), config_path.as_path());
        let config = loader.into_config();
        assert_eq!(config.scheduler.fire_timeout_secs, 300);
        assert!(config.scheduler.enabled);
    }
}
