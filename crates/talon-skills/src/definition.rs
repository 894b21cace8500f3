use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use talon_core::{LoadError, SkillId};

use crate::body::{HandlerTable, ScriptBody, SkillBody};
use crate::params::ParamSpec;

/// A loaded skill: metadata for retrieval plus a callable body.
///
/// Skill documents are Markdown files with frontmatter:
///
/// ~~~text
/// ---
/// name: Current Time
/// description: Tell the current date and time
/// dependencies: [date]
/// timeout_secs: 10
/// ---
///
/// # Parameters
/// - format: string = "%H:%M"
///
/// ```sh
/// date +"$TALON_PARAM_FORMAT"
/// ```
/// ~~~
///
/// Instead of a script block, `handler: <name>` binds the skill to a native
/// handler from the [`HandlerTable`].
#[derive(Clone)]
pub struct SkillDefinition {
    /// Stable id: the lower-cased file stem, or the directory name for `SKILL.md`.
    pub id: SkillId,
    pub name: String,
    /// Text used for semantic matching. Never empty.
    pub description: String,
    /// Declared parameters, in document order.
    pub parameters: Vec<ParamSpec>,
    pub dependencies: Vec<String>,
    /// Designated entry point label.
    pub entry: String,
    /// Per-skill timeout, overriding the sandbox default.
    pub timeout: Option<Duration>,
    pub version: String,
    pub tags: Vec<String>,
    pub author: Option<String>,
    /// Source document, `None` for built-in skills.
    pub source: Option<PathBuf>,
    pub body: Arc<dyn SkillBody>,
}

impl fmt::Debug for SkillDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SkillDefinition")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .field("body", &self.body.kind())
            .field("source", &self.source)
            .finish()
    }
}

fn default_version() -> String {
    "1.0.0".into()
}

impl SkillDefinition {
    /// A programmatic skill that does not come from a document.
    pub fn builtin(
        id: &str,
        description: &str,
        parameters: Vec<ParamSpec>,
        body: Arc<dyn SkillBody>,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: title_case(id),
            description: description.to_string(),
            parameters,
            dependencies: Vec::new(),
            entry: "execute".into(),
            timeout: None,
            version: default_version(),
            tags: vec!["builtin".into()],
            author: None,
            source: None,
            body,
        }
    }

    pub fn is_builtin(&self) -> bool {
        self.source.is_none()
    }

    /// Text embedded by the retrieval index.
    pub fn embedding_text(&self) -> String {
        format!("{}\n\n{}", self.name, self.description)
    }

    /// Load a skill document from disk.
    pub fn from_file(path: &Path, handlers: &HandlerTable) -> Result<Self, LoadError> {
        let id = id_for_path(path).ok_or(LoadError::MissingName)?;
        let content = std::fs::read_to_string(path).map_err(|e| LoadError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::parse(&content, &id, Some(path), handlers)
    }

    /// Parse document content under a known id.
    pub fn parse(
        content: &str,
        id: &str,
        path: Option<&Path>,
        handlers: &HandlerTable,
    ) -> Result<Self, LoadError> {
        let id = id.trim().to_lowercase();
        if id.is_empty() {
            return Err(LoadError::MissingName);
        }

        let (frontmatter, body) = split_frontmatter(content)?;
        let meta = parse_frontmatter(&frontmatter)?;
        let sections = Sections::parse(&body);

        let description = meta
            .description
            .clone()
            .filter(|d| !d.trim().is_empty())
            .or_else(|| sections.description.clone())
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .ok_or_else(|| LoadError::EmptyDescription(id.clone()))?;

        let mut parameters: Vec<ParamSpec> = Vec::new();
        for line in &sections.parameters {
            let spec = ParamSpec::parse(line).map_err(|reason| LoadError::InvalidParameter {
                skill: id.clone(),
                reason,
            })?;
            if parameters.iter().any(|p| p.name == spec.name) {
                return Err(LoadError::InvalidParameter {
                    skill: id.clone(),
                    reason: format!("parameter '{}' declared twice", spec.name),
                });
            }
            parameters.push(spec);
        }

        let mut dependencies = meta.dependencies.clone();
        for dep in &sections.dependencies {
            if !dependencies.contains(dep) {
                dependencies.push(dep.clone());
            }
        }

        let entry = meta.entry.clone().unwrap_or_else(|| "execute".into());
        let workdir = path
            .and_then(|p| p.parent())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let body: Arc<dyn SkillBody> = match (&meta.handler, &sections.script) {
            (Some(handler), _) => handlers.get(handler).ok_or_else(|| LoadError::UnknownHandler {
                skill: id.clone(),
                handler: handler.clone(),
            })?,
            (None, Some(script)) => Arc::new(
                ScriptBody::new(script.clone(), workdir)
                    .with_dependencies(dependencies.clone())
                    .with_entry(entry.clone()),
            ),
            (None, None) => return Err(LoadError::MissingBody(id)),
        };

        Ok(Self {
            name: meta.name.clone().unwrap_or_else(|| title_case(&id)),
            id,
            description,
            parameters,
            dependencies,
            entry,
            timeout: meta.timeout_secs.map(Duration::from_secs),
            version: meta.version.clone().unwrap_or_else(default_version),
            tags: meta.tags.clone(),
            author: meta.author.clone(),
            source: path.map(Path::to_path_buf),
            body,
        })
    }
}

/// Derive a skill id from its document path.
pub fn id_for_path(path: &Path) -> Option<String> {
    let is_skill_md = path.file_name().is_some_and(|n| n == "SKILL.md");
    let raw = if is_skill_md {
        path.parent()?.file_name()?.to_str()?
    } else {
        path.file_stem()?.to_str()?
    };
    let id = raw.trim().to_lowercase();
    (!id.is_empty()).then_some(id)
}

/// "current_time" -> "Current Time"
fn title_case(id: &str) -> String {
    id.split(['_', '-', ' '])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Frontmatter ───────────────────────────────────────────────

#[derive(Debug, Default)]
struct Frontmatter {
    name: Option<String>,
    description: Option<String>,
    dependencies: Vec<String>,
    entry: Option<String>,
    handler: Option<String>,
    timeout_secs: Option<u64>,
    version: Option<String>,
    author: Option<String>,
    tags: Vec<String>,
}

/// Split a document into frontmatter and Markdown body. A document without
/// frontmatter has an empty frontmatter block.
fn split_frontmatter(content: &str) -> Result<(String, String), LoadError> {
    let trimmed = content.trim_start();

    if !trimmed.starts_with("---") {
        return Ok((String::new(), trimmed.to_string()));
    }

    let after_first = &trimmed[3..];
    let end_pos = after_first
        .find("\n---")
        .ok_or_else(|| LoadError::Frontmatter("missing closing --- for frontmatter".into()))?;

    let frontmatter = after_first[..end_pos].trim().to_string();
    let body = after_first[end_pos + 4..].trim().to_string();

    Ok((frontmatter, body))
}

/// Parse simple `key: value` frontmatter. Unknown keys are ignored.
fn parse_frontmatter(yaml: &str) -> Result<Frontmatter, LoadError> {
    let mut meta = Frontmatter::default();
    let mut open_list: Option<&str> = None;

    for line in yaml.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // Block-style list items under `dependencies:` or `tags:`
        if let (Some(key), Some(item)) = (open_list, line.strip_prefix("- ")) {
            let item = unquote(strip_comment(item.trim()));
            match key {
                "dependencies" => meta.dependencies.push(item),
                _ => meta.tags.push(item),
            }
            continue;
        }
        open_list = None;

        let Some((key, value)) = line.split_once(':') else {
            return Err(LoadError::Frontmatter(format!("expected 'key: value', got '{line}'")));
        };
        let key = key.trim();
        let value = strip_comment(value.trim());

        if value.is_empty() && matches!(key, "dependencies" | "tags") {
            open_list = Some(if key == "dependencies" { "dependencies" } else { "tags" });
            continue;
        }

        match key {
            "name" => meta.name = non_empty(unquote(value)),
            "description" => meta.description = non_empty(unquote(value)),
            "dependencies" => meta.dependencies = parse_list(value),
            "entry" => meta.entry = non_empty(unquote(value)),
            "handler" => meta.handler = non_empty(unquote(value)),
            "timeout_secs" => {
                let secs = unquote(value).parse::<u64>().map_err(|_| {
                    LoadError::Frontmatter(format!("timeout_secs must be a whole number, got '{value}'"))
                })?;
                meta.timeout_secs = Some(secs);
            }
            "version" => meta.version = non_empty(unquote(value)),
            "author" => meta.author = non_empty(unquote(value)),
            "tags" => meta.tags = parse_list(value),
            _ => {}
        }
    }

    Ok(meta)
}

/// Drop a trailing ` # comment` from an unquoted value.
fn strip_comment(value: &str) -> &str {
    if value.starts_with('"') || value.starts_with('\'') {
        return value;
    }
    match value.find(" #") {
        Some(pos) => value[..pos].trim(),
        None => value,
    }
}

/// Parse `[a, b]` or `a, b`.
fn parse_list(value: &str) -> Vec<String> {
    let inner = value.trim().trim_start_matches('[').trim_end_matches(']');
    inner
        .split(',')
        .map(|t| unquote(t.trim()))
        .filter(|t| !t.is_empty())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}

/// Remove surrounding quotes from a YAML value.
fn unquote(s: &str) -> String {
    let s = s.trim();
    if s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
    {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

// ── Body sections ─────────────────────────────────────────────

/// The parts of the Markdown body the loader understands.
#[derive(Debug, Default)]
struct Sections {
    description: Option<String>,
    parameters: Vec<String>,
    dependencies: Vec<String>,
    script: Option<String>,
}

impl Sections {
    fn parse(body: &str) -> Self {
        let mut sections = Sections::default();
        let mut current: Option<String> = None;
        let mut description = String::new();
        let mut fence: Option<(String, String)> = None;

        for line in body.lines() {
            let trimmed = line.trim();

            if let Some((lang, mut buf)) = fence.take() {
                if trimmed.starts_with("```") {
                    if sections.script.is_none() && matches!(lang.as_str(), "sh" | "bash" | "shell") {
                        if buf.ends_with('\n') {
                            buf.pop();
                        }
                        sections.script = Some(buf);
                    }
                } else {
                    buf.push_str(line);
                    buf.push('\n');
                    fence = Some((lang, buf));
                }
                continue;
            }

            if let Some(lang) = trimmed.strip_prefix("```") {
                fence = Some((lang.trim().to_lowercase(), String::new()));
                continue;
            }

            if let Some(heading) = trimmed.strip_prefix("# ") {
                current = Some(heading.trim().to_lowercase());
                continue;
            }

            match current.as_deref() {
                Some("description") => {
                    description.push_str(line);
                    description.push('\n');
                }
                Some("parameters") if is_list_item(trimmed) => {
                    sections.parameters.push(trimmed.to_string());
                }
                Some("dependencies") if is_list_item(trimmed) => {
                    let dep = unquote(trimmed.trim_start_matches(['-', '*']).trim());
                    if !dep.is_empty() {
                        sections.dependencies.push(dep);
                    }
                }
                _ => {}
            }
        }

        let description = description.trim();
        if !description.is_empty() {
            sections.description = Some(description.to_string());
        }
        sections
    }
}

fn is_list_item(line: &str) -> bool {
    line.starts_with("- ") || line.starts_with("* ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::FnBody;
    use futures::FutureExt;
    use talon_core::SkillOutcome;

    fn handlers() -> HandlerTable {
        let mut table = HandlerTable::new();
        table.register(
            "noop",
            Arc::new(FnBody::new(|_| async { Ok(SkillOutcome::text("done")) }.boxed())),
        );
        table
    }

    #[test]
    fn parse_full_document() {
        let content = r#"---
name: Current Time
description: Tell the current date and time
dependencies: [date]
timeout_secs: 10
tags: [clock, utility]
author: Talon Team
---

# Parameters
- format: string = "%H:%M"
- zone: string (required)

```sh
date +"$TALON_PARAM_FORMAT"
```
"#;
        let def = SkillDefinition::parse(content, "current_time", None, &handlers()).unwrap();
        assert_eq!(def.id, "current_time");
        assert_eq!(def.name, "Current Time");
        assert_eq!(def.description, "Tell the current date and time");
        assert_eq!(def.dependencies, vec!["date"]);
        assert_eq!(def.timeout, Some(Duration::from_secs(10)));
        assert_eq!(def.tags, vec!["clock", "utility"]);
        assert_eq!(def.author.as_deref(), Some("Talon Team"));
        assert_eq!(def.parameters.len(), 2);
        assert_eq!(def.parameters[0].name, "format");
        assert_eq!(def.parameters[1].name, "zone");
        assert!(def.parameters[1].required);
        assert_eq!(def.body.kind(), "script");
    }

    #[test]
    fn description_section_fallback() {
        let content = "# Description\nSearch the web for a query.\n\n# Dependencies\n- curl\n\n```bash\ncurl -s example.com\n```\n";
        let def = SkillDefinition::parse(content, "Web_Search", None, &handlers()).unwrap();
        assert_eq!(def.id, "web_search");
        assert_eq!(def.name, "Web Search");
        assert_eq!(def.description, "Search the web for a query.");
        assert_eq!(def.dependencies, vec!["curl"]);
    }

    #[test]
    fn handler_binding() {
        let content = "---\ndescription: Does nothing\nhandler: noop\n---\n";
        let def = SkillDefinition::parse(content, "noop_skill", None, &handlers()).unwrap();
        assert_eq!(def.body.kind(), "native");

        let content = "---\ndescription: Does nothing\nhandler: ghost\n---\n";
        let err = SkillDefinition::parse(content, "ghost_skill", None, &handlers()).unwrap_err();
        assert_eq!(
            err,
            LoadError::UnknownHandler {
                skill: "ghost_skill".into(),
                handler: "ghost".into()
            }
        );
    }

    #[test]
    fn missing_description_errors() {
        let content = "---\nname: x\n---\n```sh\necho hi\n```";
        let err = SkillDefinition::parse(content, "x", None, &handlers()).unwrap_err();
        assert_eq!(err, LoadError::EmptyDescription("x".into()));
    }

    #[test]
    fn missing_body_errors() {
        let content = "---\ndescription: Prose only\n---\n\n```python\nprint('no')\n```";
        let err = SkillDefinition::parse(content, "prose", None, &handlers()).unwrap_err();
        assert_eq!(err, LoadError::MissingBody("prose".into()));
    }

    #[test]
    fn unterminated_frontmatter_errors() {
        let content = "---\ndescription: never closed\n```sh\necho\n```";
        let err = SkillDefinition::parse(content, "broken", None, &handlers()).unwrap_err();
        assert!(matches!(err, LoadError::Frontmatter(_)));
    }

    #[test]
    fn bad_parameter_line_errors() {
        let content = "---\ndescription: d\n---\n# Parameters\n- count: integer = many\n```sh\necho\n```";
        let err = SkillDefinition::parse(content, "bad", None, &handlers()).unwrap_err();
        assert!(matches!(err, LoadError::InvalidParameter { .. }));
    }

    #[test]
    fn block_style_lists_in_frontmatter() {
        let content = "---\ndescription: d\ndependencies:\n  - curl\n  - jq\ntags:\n  - net\n---\n```sh\necho\n```";
        let def = SkillDefinition::parse(content, "lists", None, &handlers()).unwrap();
        assert_eq!(def.dependencies, vec!["curl", "jq"]);
        assert_eq!(def.tags, vec!["net"]);

        let content = "---\ndescription: d\nnot yaml at all\n---\n```sh\necho\n```";
        let err = SkillDefinition::parse(content, "junk", None, &handlers()).unwrap_err();
        assert!(matches!(err, LoadError::Frontmatter(_)));
    }

    #[test]
    fn ids_from_paths() {
        assert_eq!(id_for_path(Path::new("/s/Current_Time.md")).as_deref(), Some("current_time"));
        assert_eq!(id_for_path(Path::new("/s/weather/SKILL.md")).as_deref(), Some("weather"));
    }

    #[test]
    fn frontmatter_comments_and_quotes() {
        let content = "---\nname: \"Quoted\"\ndescription: 'Single quoted'\nentry: run   # label\n---\n```sh\necho\n```";
        let def = SkillDefinition::parse(content, "q", None, &handlers()).unwrap();
        assert_eq!(def.name, "Quoted");
        assert_eq!(def.description, "Single quoted");
        assert_eq!(def.entry, "run");
    }

    #[test]
    fn from_file_works() {
        let dir = tempfile::tempdir().unwrap();
        let skill_dir = dir.path().join("greet");
        std::fs::create_dir_all(&skill_dir).unwrap();
        let path = skill_dir.join("SKILL.md");
        std::fs::write(&path, "---\ndescription: Say hello\n---\n```sh\necho hello\n```\n").unwrap();

        let def = SkillDefinition::from_file(&path, &handlers()).unwrap();
        assert_eq!(def.id, "greet");
        assert_eq!(def.source.as_deref(), Some(path.as_path()));
        assert!(!def.is_builtin());
        assert_eq!(def.embedding_text(), "Greet\n\nSay hello");
    }
}
