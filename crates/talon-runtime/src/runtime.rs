//! The skill runtime: registry, retrieval index and sandbox behind one
//! handle, plus the path from skill outcomes to the scheduler loop.

use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use talon_config::{EmbeddingConfig, TalonConfig};
use talon_core::{
    ExecutionError, Proposal, SchedulerNotice, SkillOutcome, TalonError,
};
use talon_llm::{EmbeddingProvider, HashingEmbedding, OllamaEmbedding, OpenAiEmbedding};
use talon_scheduler::{JobStore, ScheduleTimezone, SchedulerHandle};
use talon_skills::{
    HandlerTable, LoadReport, Params, Sandbox, ScoredSkill, SkillDefinition, SkillIndex,
    SkillRegistry, SkillTable,
};
use tracing::{debug, info, warn};

use crate::builtin::scheduling_skills;
use crate::confirmation::{self, Decision};

/// A registry table and the index built from it. Always replaced together,
/// so retrieval never returns an id the table does not know.
pub struct Catalog {
    pub table: Arc<SkillTable>,
    pub index: SkillIndex,
}

/// Everything needed to start a runtime.
pub struct RuntimeOptions {
    pub skill_dirs: Vec<PathBuf>,
    pub handlers: HandlerTable,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub default_timeout: Duration,
    pub max_top_k: usize,
    pub jobs_file: PathBuf,
    pub timezone: ScheduleTimezone,
}

impl RuntimeOptions {
    pub fn from_config(config: &TalonConfig) -> Result<Self, TalonError> {
        let timezone = config
            .scheduler
            .timezone
            .parse::<ScheduleTimezone>()
            .map_err(TalonError::Config)?;
        Ok(Self {
            skill_dirs: config.skills.dirs.clone(),
            handlers: HandlerTable::new(),
            embedder: embedder_from_config(&config.embedding)?,
            default_timeout: Duration::from_secs(config.skills.default_timeout_secs),
            max_top_k: config.skills.max_top_k,
            jobs_file: config.scheduler.jobs_file.clone(),
            timezone,
        })
    }
}

/// Pick the embedding provider named in the config.
pub fn embedder_from_config(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>, TalonError> {
    let base_url = Some(config.base_url.trim()).filter(|u| !u.is_empty());
    match config.provider.as_str() {
        "hashing" => Ok(Arc::new(HashingEmbedding::new(config.dims))),
        "openai" => {
            let key = config.api_key.clone().filter(|k| !k.is_empty()).ok_or_else(|| {
                TalonError::Config("embedding.provider = \"openai\" needs an api_key (or OPENAI_API_KEY)".into())
            })?;
            let model = config.effective_model();
            let mut provider = OpenAiEmbedding::new(key).with_model(model.to_string(), openai_dims(model));
            if let Some(url) = base_url {
                provider = provider.with_base_url(url.to_string());
            }
            Ok(Arc::new(provider))
        }
        "ollama" => {
            let mut provider = OllamaEmbedding::new(config.effective_model());
            if let Some(url) = base_url {
                provider = provider.with_base_url(url.to_string());
            }
            Ok(Arc::new(provider))
        }
        other => Err(TalonError::Config(format!("unknown embedding provider '{other}'"))),
    }
}

fn openai_dims(model: &str) -> usize {
    match model {
        "text-embedding-3-large" => 3072,
        _ => 1536,
    }
}

/// Shared entry point for retrieval, invocation and confirmation.
pub struct SkillRuntime {
    registry: SkillRegistry,
    catalog: RwLock<Arc<Catalog>>,
    embedder: Arc<dyn EmbeddingProvider>,
    sandbox: Sandbox,
    store: JobStore,
    timezone: ScheduleTimezone,
    max_top_k: usize,
    scheduler: RwLock<Option<SchedulerHandle>>,
    reloading: tokio::sync::Mutex<()>,
}

impl SkillRuntime {
    /// Load the skill directories, register the built-in scheduling skills
    /// and build the first index.
    pub async fn start(options: RuntimeOptions) -> (Self, LoadReport) {
        let store = JobStore::new(options.jobs_file);
        let (registry, report) = SkillRegistry::load(options.skill_dirs, options.handlers);
        for skill in scheduling_skills(store.clone(), options.timezone) {
            registry.register(skill);
        }

        let catalog = build_catalog(&registry, &options.embedder, options.max_top_k).await;
        info!(
            skills = catalog.table.len(),
            jobs_file = %store.path().display(),
            "skill runtime ready"
        );

        let runtime = Self {
            registry,
            catalog: RwLock::new(Arc::new(catalog)),
            embedder: options.embedder,
            sandbox: Sandbox::new(options.default_timeout),
            store,
            timezone: options.timezone,
            max_top_k: options.max_top_k,
            scheduler: RwLock::new(None),
            reloading: tokio::sync::Mutex::new(()),
        };
        (runtime, report)
    }

    pub async fn from_config(config: &TalonConfig) -> Result<(Self, LoadReport), TalonError> {
        Ok(Self::start(RuntimeOptions::from_config(config)?).await)
    }

    /// Forward scheduler notices produced by skills to a running loop.
    pub fn attach_scheduler(&self, handle: SchedulerHandle) {
        *self.scheduler.write() = Some(handle);
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn timezone(&self) -> ScheduleTimezone {
        self.timezone
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    pub fn skill_dirs(&self) -> &[PathBuf] {
        self.registry.dirs()
    }

    /// Current table and index.
    pub fn catalog(&self) -> Arc<Catalog> {
        Arc::clone(&self.catalog.read())
    }

    pub fn skills(&self) -> Vec<SkillDefinition> {
        self.catalog().table.list().into_iter().cloned().collect()
    }

    pub fn skill(&self, id: &str) -> Option<SkillDefinition> {
        self.catalog().table.get(id).cloned()
    }

    // ── Retrieval & execution ──────────────────────────────────

    /// Best-matching skills for `text`. Embedding failures degrade to an
    /// empty result.
    pub async fn retrieve(&self, text: &str, k: usize) -> Vec<ScoredSkill> {
        let catalog = self.catalog();
        catalog.index.query(text, k).await
    }

    /// Run skill `id`. A scheduler notice in the outcome is passed on to the
    /// attached scheduler loop.
    pub async fn invoke(
        &self,
        id: &str,
        params: Params,
        timeout: Option<Duration>,
    ) -> Result<SkillOutcome, ExecutionError> {
        let skill = self
            .skill(id)
            .ok_or_else(|| ExecutionError::UnknownSkill(id.to_string()))?;
        let outcome = self.sandbox.invoke(&skill, params, timeout).await?;
        if let SkillOutcome::SchedulerMutation { notice } = &outcome {
            self.announce(notice.clone());
        }
        Ok(outcome)
    }

    /// Retrieve the best match for `text` and run it.
    pub async fn ask(&self, text: &str, params: Params) -> Result<Option<(ScoredSkill, SkillOutcome)>, ExecutionError> {
        let Some(best) = self.retrieve(text, 1).await.into_iter().next() else {
            return Ok(None);
        };
        debug!(skill = %best.skill_id, score = best.score, "best match");
        let outcome = self.invoke(&best.skill_id, params, None).await?;
        Ok(Some((best, outcome)))
    }

    // ── Confirmation ───────────────────────────────────────────

    pub async fn confirm(&self, proposal: &mut Proposal) -> Result<SchedulerNotice, TalonError> {
        let notice = confirmation::confirm(&self.store, proposal).await?;
        self.announce(notice.clone());
        Ok(notice)
    }

    pub fn discard(&self, proposal: &mut Proposal) -> Result<(), TalonError> {
        confirmation::discard(proposal)
    }

    pub async fn resolve(
        &self,
        proposal: &mut Proposal,
        decision: Decision,
    ) -> Result<Option<SchedulerNotice>, TalonError> {
        match decision {
            Decision::Confirm => self.confirm(proposal).await.map(Some),
            Decision::Decline => self.discard(proposal).map(|_| None),
        }
    }

    // ── Reload ─────────────────────────────────────────────────

    /// Re-read the skill directories and rebuild the index, then swap both
    /// in at once. Reloads run one at a time so the last table read is the
    /// last catalog swapped in.
    pub async fn reload(&self) -> LoadReport {
        let _reloading = self.reloading.lock().await;
        let report = self.registry.reload();
        let catalog = build_catalog(&self.registry, &self.embedder, self.max_top_k).await;
        *self.catalog.write() = Arc::new(catalog);
        report
    }

    fn announce(&self, notice: SchedulerNotice) {
        match self.scheduler.read().as_ref() {
            Some(handle) => handle.notify(notice),
            None => debug!(notice = %notice, "no scheduler attached"),
        }
    }
}

async fn build_catalog(
    registry: &SkillRegistry,
    embedder: &Arc<dyn EmbeddingProvider>,
    max_top_k: usize,
) -> Catalog {
    let table = registry.snapshot();
    let index = match SkillIndex::build(&table, Arc::clone(embedder), max_top_k).await {
        Ok(index) => index,
        Err(e) => {
            warn!(error = %e, "failed to build retrieval index, retrieval will find nothing");
            SkillIndex::empty(Arc::clone(embedder), max_top_k)
        }
    };
    Catalog { table, index }
}
