use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use talon_core::LoadError;
use tracing::{debug, info, warn};

use crate::body::HandlerTable;
use crate::definition::{SkillDefinition, id_for_path};

/// An immutable table of skills keyed by id, remembering insertion order.
#[derive(Debug, Clone, Default)]
pub struct SkillTable {
    order: Vec<String>,
    skills: HashMap<String, SkillDefinition>,
}

impl SkillTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a skill. Re-inserting an id replaces the definition in place
    /// and keeps its original position.
    pub fn insert(&mut self, def: SkillDefinition) {
        if !self.skills.contains_key(&def.id) {
            self.order.push(def.id.clone());
        }
        self.skills.insert(def.id.clone(), def);
    }

    pub fn get(&self, id: &str) -> Option<&SkillDefinition> {
        self.skills.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.skills.contains_key(id)
    }

    /// All skills in insertion order.
    pub fn list(&self) -> Vec<&SkillDefinition> {
        self.order.iter().filter_map(|id| self.skills.get(id)).collect()
    }

    pub fn ids(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Outcome of a load or reload pass.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Ids loaded from documents, in load order.
    pub loaded: Vec<String>,
    /// Sources that were not loaded, with the reason.
    pub skipped: Vec<(PathBuf, LoadError)>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// The skill registry: discovers skill documents and serves lookups.
///
/// Skill directories are listed in precedence order; when two directories
/// define the same id, the first one wins and the other is reported as
/// skipped. Built-in skills added with [`register`](Self::register) survive
/// every reload.
///
/// Readers take a snapshot (`Arc<SkillTable>`); a reload builds a complete
/// new table and swaps it in one step, so no reader sees a half-built one.
pub struct SkillRegistry {
    table: RwLock<Arc<SkillTable>>,
    dirs: Vec<PathBuf>,
    handlers: HandlerTable,
    builtins: RwLock<Vec<SkillDefinition>>,
}

impl SkillRegistry {
    /// Create a registry over the given directories without loading anything.
    pub fn new(dirs: Vec<PathBuf>, handlers: HandlerTable) -> Self {
        Self {
            table: RwLock::new(Arc::new(SkillTable::new())),
            dirs,
            handlers,
            builtins: RwLock::new(Vec::new()),
        }
    }

    /// Create a registry and load every source in `dirs`.
    pub fn load(dirs: Vec<PathBuf>, handlers: HandlerTable) -> (Self, LoadReport) {
        let registry = Self::new(dirs, handlers);
        let report = registry.reload();
        (registry, report)
    }

    /// Re-read all skill directories and atomically replace the table.
    pub fn reload(&self) -> LoadReport {
        let (mut table, report) = build_table(&self.dirs, &self.handlers);

        // Lock order: builtins, then table.
        let builtins = self.builtins.read();
        for def in builtins.iter() {
            table.insert(def.clone());
        }
        let count = table.len();
        *self.table.write() = Arc::new(table);
        drop(builtins);

        for (path, err) in &report.skipped {
            warn!(path = %path.display(), error = %err, "skipped skill source");
        }
        info!(
            skills = count,
            loaded = report.loaded.len(),
            skipped = report.skipped.len(),
            "skill registry loaded"
        );
        report
    }

    /// Register a skill programmatically. Replaces any skill with the same id
    /// and is re-applied on every reload.
    pub fn register(&self, def: SkillDefinition) {
        let mut builtins = self.builtins.write();
        builtins.retain(|b| b.id != def.id);
        builtins.push(def.clone());

        let mut guard = self.table.write();
        let mut table = SkillTable::clone(&guard);
        debug!(skill = %def.id, "registering skill");
        table.insert(def);
        *guard = Arc::new(table);
    }

    /// Current table. Cheap to clone and safe to hold across a reload.
    pub fn snapshot(&self) -> Arc<SkillTable> {
        Arc::clone(&self.table.read())
    }

    pub fn get(&self, id: &str) -> Option<SkillDefinition> {
        self.table.read().get(id).cloned()
    }

    /// All skills in insertion order.
    pub fn list(&self) -> Vec<SkillDefinition> {
        self.table.read().list().into_iter().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    pub fn handlers(&self) -> &HandlerTable {
        &self.handlers
    }
}

/// Candidate skill documents under `dir`, sorted by path: `*.md` files and
/// `*/SKILL.md` directories.
pub fn discover(dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let entries = std::fs::read_dir(dir).map_err(|e| LoadError::Read {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut sources = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            let skill_md = path.join("SKILL.md");
            if skill_md.is_file() {
                sources.push(skill_md);
            }
        } else if path.extension().is_some_and(|e| e == "md") {
            sources.push(path);
        }
    }
    sources.sort();
    Ok(sources)
}

fn build_table(dirs: &[PathBuf], handlers: &HandlerTable) -> (SkillTable, LoadReport) {
    let mut table = SkillTable::new();
    let mut report = LoadReport::default();
    let mut origins: HashMap<String, PathBuf> = HashMap::new();

    for dir in dirs {
        if !dir.exists() {
            debug!(dir = %dir.display(), "skills directory does not exist, skipping");
            continue;
        }

        let sources = match discover(dir) {
            Ok(sources) => sources,
            Err(e) => {
                report.skipped.push((dir.clone(), e));
                continue;
            }
        };

        for path in sources {
            if let Some(id) = id_for_path(&path) {
                if let Some(first) = origins.get(&id) {
                    let err = LoadError::DuplicateId {
                        id,
                        first: first.clone(),
                    };
                    report.skipped.push((path, err));
                    continue;
                }
            }

            match SkillDefinition::from_file(&path, handlers) {
                Ok(def) => {
                    debug!(skill = %def.id, path = %path.display(), "loaded skill");
                    origins.insert(def.id.clone(), path);
                    report.loaded.push(def.id.clone());
                    table.insert(def);
                }
                Err(e) => report.skipped.push((path, e)),
            }
        }
    }

    (table, report)
}
