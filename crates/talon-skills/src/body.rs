//! Executable skill bodies.
//!
//! Every skill, whether backed by a shell script in its source document or
//! by a native handler compiled into the binary, is invoked through the same
//! [`SkillBody`] contract: bound parameters in, [`SkillOutcome`] out.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use talon_core::SkillOutcome;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::params::Params;

/// A uniformly-typed callable handle behind every skill.
///
/// Errors returned here are the skill's own failures; the sandbox turns them
/// into `ExecutionError::SkillFailed` (or passes an `ExecutionError` through
/// unchanged when the body returns one).
#[async_trait]
pub trait SkillBody: Send + Sync {
    async fn call(&self, params: Params) -> anyhow::Result<SkillOutcome>;

    /// Short label for listings: "script", "native".
    fn kind(&self) -> &'static str;
}

// ── Script bodies ─────────────────────────────────────────────

/// A shell snippet from a skill document, run with `sh -c`.
///
/// Each bound parameter is exported as `TALON_PARAM_<NAME>`; the whole
/// binding is written to stdin as JSON. Stdout is the result.
#[derive(Debug, Clone)]
pub struct ScriptBody {
    pub script: String,
    pub dependencies: Vec<String>,
    pub entry: String,
    pub workdir: PathBuf,
}

impl ScriptBody {
    pub fn new(script: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
            dependencies: Vec::new(),
            entry: "execute".into(),
            workdir: workdir.into(),
        }
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = entry.into();
        self
    }

    /// Dependencies that cannot be found on `PATH`.
    pub fn missing_dependencies(&self) -> Vec<String> {
        self.dependencies
            .iter()
            .filter(|dep| find_in_path(dep).is_none())
            .cloned()
            .collect()
    }
}

/// Locate an executable by name on `PATH`.
pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|p| p.is_file())
}

/// Environment variable name for a parameter.
pub fn param_env_name(name: &str) -> String {
    format!("TALON_PARAM_{}", name.to_uppercase())
}

fn env_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl SkillBody for ScriptBody {
    async fn call(&self, params: Params) -> anyhow::Result<SkillOutcome> {
        let missing = self.missing_dependencies();
        if !missing.is_empty() {
            anyhow::bail!("missing dependency: {}", missing.join(", "));
        }

        let workdir = if self.workdir.is_dir() {
            self.workdir.clone()
        } else {
            PathBuf::from(".")
        };

        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c")
            .arg(&self.script)
            .current_dir(&workdir)
            .env("TALON_ENTRY", &self.entry)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (name, value) in &params {
            cmd.env(param_env_name(name), env_value(value));
        }

        let mut child = cmd.spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            let payload = serde_json::to_vec(&params)?;
            // A script that never reads stdin closes the pipe early.
            if let Err(e) = stdin.write_all(&payload).await {
                debug!(error = %e, "script did not consume stdin");
            }
        }

        let output = child.wait_with_output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let detail = if stderr.is_empty() { stdout } else { stderr };
            match output.status.code() {
                Some(code) => anyhow::bail!("exit code {}: {}", code, detail),
                None => anyhow::bail!("terminated by signal: {}", detail),
            }
        }

        Ok(SkillOutcome::text(stdout))
    }

    fn kind(&self) -> &'static str {
        "script"
    }
}

// ── Native handlers ───────────────────────────────────────────

type HandlerFn = dyn Fn(Params) -> BoxFuture<'static, anyhow::Result<SkillOutcome>> + Send + Sync;

/// A native handler built from an async closure.
pub struct FnBody {
    f: Box<HandlerFn>,
}

impl FnBody {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Params) -> BoxFuture<'static, anyhow::Result<SkillOutcome>> + Send + Sync + 'static,
    {
        Self { f: Box::new(f) }
    }
}

#[async_trait]
impl SkillBody for FnBody {
    async fn call(&self, params: Params) -> anyhow::Result<SkillOutcome> {
        (self.f)(params).await
    }

    fn kind(&self) -> &'static str {
        "native"
    }
}

/// Native handlers a skill document may bind to with `handler: <name>`.
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: HashMap<String, Arc<dyn SkillBody>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Re-registering a name replaces it.
    pub fn register(&mut self, name: &str, body: Arc<dyn SkillBody>) {
        self.handlers.insert(name.to_string(), body);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn SkillBody>> {
        self.handlers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use serde_json::json;

    #[test]
    fn param_env_names() {
        assert_eq!(param_env_name("format"), "TALON_PARAM_FORMAT");
        assert_eq!(param_env_name("job_id"), "TALON_PARAM_JOB_ID");
    }

    #[test]
    fn finds_sh_on_path() {
        assert!(find_in_path("sh").is_some());
        assert!(find_in_path("definitely-not-a-real-binary-4821").is_none());
    }

    #[tokio::test]
    async fn script_reads_params_from_env_and_stdin() {
        let body = ScriptBody::new("echo \"$TALON_PARAM_NAME\"; cat", ".");
        let mut params = Params::new();
        params.insert("name".into(), json!("talon"));
        let out = body.call(params).await.unwrap();
        assert_eq!(out, SkillOutcome::text("talon\n{\"name\":\"talon\"}"));
    }

    #[tokio::test]
    async fn script_nonzero_exit_carries_stderr() {
        let body = ScriptBody::new("echo broken >&2; exit 3", ".");
        let err = body.call(Params::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "exit code 3: broken");
    }

    #[tokio::test]
    async fn script_missing_dependency_fails_before_running() {
        let body = ScriptBody::new("echo hi", ".")
            .with_dependencies(vec!["definitely-not-a-real-binary-4821".into()]);
        let err = body.call(Params::new()).await.unwrap_err();
        assert!(err.to_string().starts_with("missing dependency"));
    }

    #[tokio::test]
    async fn fn_body_and_handler_table() {
        let mut table = HandlerTable::new();
        table.register(
            "echo",
            Arc::new(FnBody::new(|params| {
                async move {
                    let text = params.get("text").and_then(|v| v.as_str()).unwrap_or("").to_string();
                    Ok(SkillOutcome::text(text))
                }
                .boxed()
            })),
        );
        assert_eq!(table.names(), vec!["echo"]);

        let body = table.get("echo").unwrap();
        let mut params = Params::new();
        params.insert("text".into(), json!("hello"));
        assert_eq!(body.call(params).await.unwrap(), SkillOutcome::text("hello"));
        assert_eq!(body.kind(), "native");
        assert!(table.get("missing").is_none());
    }
}
