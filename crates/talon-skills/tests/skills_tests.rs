#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use futures::FutureExt;
    use serde_json::json;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use talon_core::{ExecutionError, LoadError, RetrievalError, SkillOutcome};
    use talon_llm::{EmbeddingProvider, HashingEmbedding, MockEmbedding};
    use talon_skills::*;

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    fn script_skill(description: &str, script: &str) -> String {
        format!("---\ndescription: {description}\n---\n```sh\n{script}\n```\n")
    }

    fn native(id: &str, description: &str, params: Vec<ParamSpec>, body: FnBody) -> SkillDefinition {
        SkillDefinition::builtin(id, description, params, Arc::new(body))
    }

    fn params(v: serde_json::Value) -> Params {
        v.as_object().cloned().unwrap()
    }

    /// Every text maps to the same vector, so every score ties.
    struct FlatEmbedding;

    #[async_trait]
    impl EmbeddingProvider for FlatEmbedding {
        async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RetrievalError> {
            Ok(texts.iter().map(|_| vec![1.0, 1.0]).collect())
        }
        fn dimensions(&self) -> usize {
            2
        }
        fn name(&self) -> &str {
            "flat"
        }
    }

    // ── Registry tests ─────────────────────────────────────────

    #[test]
    fn test_one_invalid_four_valid_sources() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a_time.md", &script_skill("Tell the time", "date"));
        write(dir.path(), "b_echo.md", &script_skill("Echo text back", "cat"));
        write(dir.path(), "c_files.md", &script_skill("List files in a directory", "ls"));
        write(dir.path(), "d_disk.md", &script_skill("Show free disk space", "df -h"));
        write(dir.path(), "e_broken.md", "---\ndescription: No body at all\n---\nJust prose.\n");

        let (reg, report) = SkillRegistry::load(vec![dir.path().to_path_buf()], HandlerTable::new());

        assert_eq!(reg.count(), 4);
        assert_eq!(report.loaded, vec!["a_time", "b_echo", "c_files", "d_disk"]);
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].0.ends_with("e_broken.md"));
        assert_eq!(report.skipped[0].1, LoadError::MissingBody("e_broken".into()));
        assert!(reg.get("e_broken").is_none());
    }

    #[test]
    fn test_reload_picks_up_fixed_source() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "greet.md", "---\nname: Greet\n---\n```sh\necho hi\n```\n");

        let (reg, report) = SkillRegistry::load(vec![dir.path().to_path_buf()], HandlerTable::new());
        assert!(reg.is_empty());
        assert_eq!(report.skipped[0].1, LoadError::EmptyDescription("greet".into()));

        write(dir.path(), "greet.md", &script_skill("Say hello", "echo hi"));
        let report = reg.reload();
        assert!(report.is_clean());
        assert_eq!(reg.get("greet").unwrap().description, "Say hello");
    }

    #[test]
    fn test_list_in_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.md", &script_skill("Second", "true"));
        write(dir.path(), "a.md", &script_skill("First", "true"));

        let (reg, _) = SkillRegistry::load(vec![dir.path().to_path_buf()], HandlerTable::new());
        let ids: Vec<String> = reg.list().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_document_bound_to_native_handler() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "ping.md",
            "---\ndescription: Reply with pong\nhandler: pong\n---\n",
        );
        let mut handlers = HandlerTable::new();
        handlers.register(
            "pong",
            Arc::new(FnBody::new(|_| async { Ok(SkillOutcome::text("pong")) }.boxed())),
        );

        let (reg, report) = SkillRegistry::load(vec![dir.path().to_path_buf()], handlers);
        assert!(report.is_clean());
        assert_eq!(reg.get("ping").unwrap().body.kind(), "native");
    }

    // ── Retrieval tests ────────────────────────────────────────

    fn two_skill_table() -> SkillTable {
        let mut table = SkillTable::new();
        let noop = || FnBody::new(|_| async { Ok(SkillOutcome::text("")) }.boxed());
        table.insert(native("web_search", "search the web", vec![], noop()));
        table.insert(native("current_time", "tell the time", vec![], noop()));
        table
    }

    #[tokio::test]
    async fn test_time_query_ranks_time_skill_first() {
        let index = SkillIndex::build(&two_skill_table(), Arc::new(HashingEmbedding::default()), 5)
            .await
            .unwrap();
        assert_eq!(index.len(), 2);

        let hits = index.query("what time is it", 2).await;
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].skill_id, "current_time");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn test_ties_keep_insertion_order() {
        let index = SkillIndex::build(&two_skill_table(), Arc::new(FlatEmbedding), 5)
            .await
            .unwrap();
        let hits = index.query("anything", 5).await;
        let ids: Vec<&str> = hits.iter().map(|h| h.skill_id.as_str()).collect();
        assert_eq!(ids, vec!["web_search", "current_time"]);
    }

    #[tokio::test]
    async fn test_k_is_clamped() {
        let index = SkillIndex::build(&two_skill_table(), Arc::new(FlatEmbedding), 1)
            .await
            .unwrap();
        assert_eq!(index.query("x", 10).await.len(), 1);
        assert_eq!(index.query("x", 0).await.len(), 1);
    }

    #[tokio::test]
    async fn test_embedding_failure_degrades_to_no_match() {
        let table = two_skill_table();
        let err = SkillIndex::build(&table, Arc::new(MockEmbedding::Unavailable("down".into())), 5)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, RetrievalError::Embedding(_)));

        let err = SkillIndex::build(&table, Arc::new(MockEmbedding::ShortBatch { dims: 4 }), 5)
            .await
            .err()
            .unwrap();
        assert_eq!(err, RetrievalError::CountMismatch { expected: 2, got: 1 });

        // Built fine, then the service goes away.
        let index = SkillIndex::build(&table, Arc::new(FailsAfterFirst::default()), 5)
            .await
            .unwrap();
        assert_eq!(index.len(), 2);
        assert!(index.query("what time is it", 1).await.is_empty());
        assert!(index.try_query("what time is it", 1).await.is_err());
        assert!(index.best("anything").await.is_none());
    }

    /// Answers the first batch, then reports the service as down.
    #[derive(Default)]
    struct FailsAfterFirst {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for FailsAfterFirst {
        async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RetrievalError> {
            if self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
            } else {
                Err(RetrievalError::Embedding("connection reset".into()))
            }
        }
        fn dimensions(&self) -> usize {
            2
        }
        fn name(&self) -> &str {
            "flaky"
        }
    }

    // ── Sandbox tests ──────────────────────────────────────────

    #[tokio::test]
    async fn test_timeout_unblocks_caller() {
        let skill = native(
            "sleepy",
            "sleeps",
            vec![],
            FnBody::new(|_| {
                async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(SkillOutcome::text("too late"))
                }
                .boxed()
            }),
        );

        let started = Instant::now();
        let err = Sandbox::default()
            .invoke(&skill, Params::new(), Some(Duration::from_secs(1)))
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert_eq!(
            err,
            ExecutionError::Timeout {
                skill: "sleepy".into(),
                after: Duration::from_secs(1)
            }
        );
        assert!(elapsed >= Duration::from_millis(900));
        assert!(elapsed < Duration::from_secs(3), "caller blocked for {elapsed:?}");
    }

    #[tokio::test]
    async fn test_script_timeout_kills_process() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "slow.md", &script_skill("Sleep for a while", "sleep 5; echo done"));
        let (reg, _) = SkillRegistry::load(vec![dir.path().to_path_buf()], HandlerTable::new());
        let skill = reg.get("slow").unwrap();

        let started = Instant::now();
        let err = Sandbox::new(Duration::from_secs(1))
            .invoke(&skill, Params::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_skill_timeout_from_frontmatter() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "quick.md",
            "---\ndescription: Must be quick\ntimeout_secs: 1\n---\n```sh\nsleep 5\n```\n",
        );
        let (reg, _) = SkillRegistry::load(vec![dir.path().to_path_buf()], HandlerTable::new());
        let skill = reg.get("quick").unwrap();
        let sandbox = Sandbox::new(Duration::from_secs(30));
        assert_eq!(sandbox.budget(&skill, None), Duration::from_secs(1));
        assert_eq!(sandbox.budget(&skill, Some(Duration::from_secs(7))), Duration::from_secs(7));
    }

    #[tokio::test]
    async fn test_missing_parameter_is_reported() {
        let skill = native(
            "ls",
            "list a directory",
            vec![ParamSpec::required("path", ParamType::String)],
            FnBody::new(|_| async { Ok(SkillOutcome::text("listing")) }.boxed()),
        );
        let err = Sandbox::default()
            .invoke(&skill, Params::new(), None)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ExecutionError::MissingParameter {
                skill: "ls".into(),
                name: "path".into()
            }
        );
        assert_eq!(err.to_string(), "skill 'ls' requires parameter 'path'");
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let skill = native(
            "boom",
            "always panics",
            vec![],
            FnBody::new(|params| {
                async move {
                    if params.is_empty() {
                        panic!("kaboom");
                    }
                    Ok(SkillOutcome::text("unreachable"))
                }
                .boxed()
            }),
        );
        let err = Sandbox::default()
            .invoke(&skill, Params::new(), None)
            .await
            .unwrap_err();
        match err {
            ExecutionError::SkillFailed { skill, message } => {
                assert_eq!(skill, "boom");
                assert!(message.contains("kaboom"));
            }
            other => panic!("expected SkillFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_body_error_becomes_skill_failed() {
        let skill = native(
            "fails",
            "returns an error",
            vec![],
            FnBody::new(|_| async { Err(anyhow::anyhow!("service unavailable")) }.boxed()),
        );
        let err = Sandbox::default()
            .invoke(&skill, Params::new(), None)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ExecutionError::SkillFailed {
                skill: "fails".into(),
                message: "service unavailable".into()
            }
        );
    }

    #[tokio::test]
    async fn test_body_execution_error_passes_through() {
        let skill = native(
            "picky",
            "rejects its input",
            vec![],
            FnBody::new(|_| {
                async {
                    Err(anyhow::Error::new(ExecutionError::InvalidParameter {
                        skill: "picky".into(),
                        name: "cron".into(),
                        reason: "bad".into(),
                    }))
                }
                .boxed()
            }),
        );
        let err = Sandbox::default()
            .invoke(&skill, Params::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidParameter { ref name, .. } if name == "cron"));
    }

    #[tokio::test]
    async fn test_script_receives_bound_parameters() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "greet.md",
            "---\ndescription: Greet someone\n---\n# Parameters\n- who: string\n- times: integer = 2\n\n```sh\necho \"$TALON_PARAM_WHO x$TALON_PARAM_TIMES\"\n```\n",
        );
        let (reg, _) = SkillRegistry::load(vec![dir.path().to_path_buf()], HandlerTable::new());
        let skill = reg.get("greet").unwrap();

        let out = Sandbox::default()
            .invoke(&skill, params(json!({"who": "Ada", "extra": true})), None)
            .await
            .unwrap();
        assert_eq!(out, SkillOutcome::text("Ada x2"));
    }

    #[tokio::test]
    async fn test_script_failure_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "bad.md", &script_skill("Always fails", "echo nope >&2; exit 1"));
        let (reg, _) = SkillRegistry::load(vec![dir.path().to_path_buf()], HandlerTable::new());
        let err = Sandbox::default()
            .invoke(&reg.get("bad").unwrap(), Params::new(), None)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ExecutionError::SkillFailed {
                skill: "bad".into(),
                message: "exit code 1: nope".into()
            }
        );
    }
}
