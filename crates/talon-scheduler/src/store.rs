//! Durable job store.
//!
//! All jobs live in one pretty-printed JSON document, `{"jobs": [...]}`.
//! Every mutation is a full read-modify-write that holds both the handle's
//! async mutex and an exclusive advisory lock on `<file>.lock`. The lock file
//! is shared by every handle and every process on the same path (`talon serve`
//! and a concurrent `talon jobs ...`). The document lands on disk through a
//! per-write temp file and rename, so readers never see a half-written file.

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use talon_core::{JobId, ScheduledJob, StoreError, new_job_id};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cron::CronExpr;

static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Default, Serialize, Deserialize)]
struct JobDocument {
    #[serde(default)]
    jobs: Vec<ScheduledJob>,
}

/// Handle to the job file. Clones share the in-process mutex; separate
/// handles and processes meet at the lock file.
#[derive(Clone)]
pub struct JobStore {
    path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

impl JobStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ── Reads ──────────────────────────────────────────────────

    /// All jobs, in creation order. An unreadable or corrupt file reads as
    /// an empty store.
    pub async fn list(&self) -> Vec<ScheduledJob> {
        match self.read_document().await {
            Ok(doc) => doc.jobs,
            Err(e) => {
                warn!(error = %e, "job store unreadable, treating as empty");
                Vec::new()
            }
        }
    }

    pub async fn get(&self, id: &str) -> Option<ScheduledJob> {
        self.list().await.into_iter().find(|j| j.id == id)
    }

    // ── Mutations ──────────────────────────────────────────────

    /// Create an enabled job with a fresh id. The cron expression must
    /// already be valid; it is checked again here and rejected if not.
    pub async fn create(
        &self,
        task: &str,
        cron: &str,
        description: Option<String>,
    ) -> Result<ScheduledJob, StoreError> {
        let cron = CronExpr::parse(cron)?;
        self.mutate(|jobs| {
            let mut id = new_job_id();
            while jobs.iter().any(|j| j.id == id) {
                id = new_job_id();
            }
            let job = ScheduledJob::new(id, task.to_string(), cron.as_str().to_string(), description);
            jobs.push(job.clone());
            Ok(job)
        })
        .await
        .inspect(|job| info!(job_id = %job.id, cron = %job.cron, "job created"))
    }

    /// Create a job under a caller-chosen id. Fails with `DuplicateId` if
    /// that id is already present.
    pub async fn create_with_id(
        &self,
        id: &str,
        task: &str,
        cron: &str,
        description: Option<String>,
    ) -> Result<ScheduledJob, StoreError> {
        let cron = CronExpr::parse(cron)?;
        self.mutate(|jobs| {
            if jobs.iter().any(|j| j.id == id) {
                return Err(StoreError::DuplicateId(id.to_string()));
            }
            let job = ScheduledJob::new(
                id.to_string(),
                task.to_string(),
                cron.as_str().to_string(),
                description,
            );
            jobs.push(job.clone());
            Ok(job)
        })
        .await
        .inspect(|job| info!(job_id = %job.id, cron = %job.cron, "job created"))
    }

    /// Remove a job. `false` if it was not there.
    pub async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let removed = self
            .mutate(|jobs| {
                let before = jobs.len();
                jobs.retain(|j| j.id != id);
                Ok(jobs.len() != before)
            })
            .await?;
        if removed {
            info!(job_id = id, "job deleted");
        }
        Ok(removed)
    }

    /// Flip a job's enabled flag. `false` if the job does not exist.
    pub async fn set_enabled(&self, id: &str, enabled: bool) -> Result<bool, StoreError> {
        let found = self
            .mutate(|jobs| match jobs.iter_mut().find(|j| j.id == id) {
                Some(job) => {
                    job.enabled = enabled;
                    Ok(true)
                }
                None => Ok(false),
            })
            .await?;
        if found {
            info!(job_id = id, enabled, "job toggled");
        }
        Ok(found)
    }

    /// Stamp `last_run`. `false` if the job was deleted in the meantime.
    pub async fn record_run(&self, id: &str, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let found = self
            .mutate(|jobs| match jobs.iter_mut().find(|j| j.id == id) {
                Some(job) => {
                    job.last_run = Some(at);
                    Ok(true)
                }
                None => Ok(false),
            })
            .await?;
        debug!(job_id = id, found, "recorded run");
        Ok(found)
    }

    // ── Internals ──────────────────────────────────────────────

    async fn read_document(&self) -> Result<JobDocument, StoreError> {
        let raw = match tokio::fs::read_to_string(self.path.as_path()).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(JobDocument::default()),
            Err(e) => {
                return Err(StoreError::Io {
                    path: self.path.to_path_buf(),
                    source: e,
                });
            }
        };
        if raw.trim().is_empty() {
            return Ok(JobDocument::default());
        }
        serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
            path: self.path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Run `f` over the current job list and persist the result, all under
    /// the store lock. Nothing is written when `f` fails.
    async fn mutate<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Vec<ScheduledJob>) -> Result<T, StoreError>,
    {
        let _guard = self.lock.lock().await;
        let _file_lock = self.lock_file().await?;

        let mut doc = match self.read_document().await {
            Ok(doc) => doc,
            Err(StoreError::Corrupt { reason, .. }) => {
                let backup = self.backup_path();
                warn!(
                    path = %self.path.display(),
                    backup = %backup.display(),
                    reason = %reason,
                    "job store corrupt, moving it aside and starting empty"
                );
                tokio::fs::rename(self.path.as_path(), &backup)
                    .await
                    .map_err(|e| self.io_error(e))?;
                JobDocument::default()
            }
            Err(e) => return Err(e),
        };

        let out = f(&mut doc.jobs)?;
        self.write_document(&doc).await?;
        Ok(out)
    }

    /// Block (off the runtime) until this process holds the lock file.
    async fn lock_file(&self) -> Result<FileLock, StoreError> {
        self.ensure_parent().await?;
        let path = self.lock_path();
        let locked = tokio::task::spawn_blocking(move || -> std::io::Result<File> {
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&path)?;
            file.lock_exclusive()?;
            Ok(file)
        })
        .await
        .map_err(|e| self.io_error(std::io::Error::other(e)))?;
        locked.map(FileLock).map_err(|e| self.io_error(e))
    }

    async fn ensure_parent(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| self.io_error(e))?;
            }
        }
        Ok(())
    }

    async fn write_document(&self, doc: &JobDocument) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(doc)?;
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, json.as_bytes())
            .await
            .map_err(|e| self.io_error(e))?;
        if let Err(e) = tokio::fs::rename(&tmp, self.path.as_path()).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(self.io_error(e));
        }
        Ok(())
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.to_path_buf(),
            source,
        }
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "jobs.json".into());
        name.push(suffix);
        self.path.with_file_name(name)
    }

    fn temp_path(&self) -> PathBuf {
        let seq = WRITE_SEQ.fetch_add(1, Ordering::Relaxed);
        self.sibling(&format!(".{}.{seq}.tmp", std::process::id()))
    }

    /// The advisory lock file every writer on this path takes.
    pub fn lock_path(&self) -> PathBuf {
        self.sibling(".lock")
    }

    /// Where a corrupt document is preserved.
    pub fn backup_path(&self) -> PathBuf {
        self.sibling(".corrupt")
    }
}

/// Exclusive hold on the lock file, released on drop.
struct FileLock(File);

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.0);
    }
}

/// Look up a job id, accepting an unambiguous prefix of at least four
/// characters (ids are shown to users and typed back).
pub fn resolve_id(jobs: &[ScheduledJob], input: &str) -> Option<JobId> {
    let input = input.trim();
    if let Some(job) = jobs.iter().find(|j| j.id == input) {
        return Some(job.id.clone());
    }
    if input.len() < 4 {
        return None;
    }
    let mut matches = jobs.iter().filter(|j| j.id.starts_with(input));
    match (matches.next(), matches.next()) {
        (Some(job), None) => Some(job.id.clone()),
        _ => None,
    }
}
