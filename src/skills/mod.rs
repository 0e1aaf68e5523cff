//! Skill definitions and the SKILL.md document format.
//!
//! A skill is a named capability bundle: instructional markdown plus an
//! optional executable [`Capability`].  Instruction-only skills live on
//! disk as `SKILL.md` manifests (YAML front-matter between `---` fences,
//! markdown body = instructions), one directory per skill:
//!
//! ```text
//! <skills_dir>/
//! └── calendar/
//!     └── SKILL.md
//! ```
//!
//! Capability-backed skills are registered in code by the host and are
//! never touched by a storage re-sync.

pub mod defaults;
pub mod watch;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::SkillsConfig;
use crate::error::SkillError;
use crate::tools::{InvocationRequest, InvocationResult};

// ── Capability ──────────────────────────────────────────────

/// Executable handle behind an app-backed skill.
///
/// The engine forwards the raw request unchanged and returns whatever the
/// capability produces; it never inspects the capability itself.
#[async_trait]
pub trait Capability: Send + Sync {
    async fn execute(&self, request: InvocationRequest) -> InvocationResult;
}

// ── Front-matter ────────────────────────────────────────────

/// Metadata parsed from a `SKILL.md` front-matter.
///
/// The canonical identifier field is `name`; the legacy `id` field is
/// accepted as an alias.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SkillFrontMatter {
    #[serde(alias = "id", default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Phrases whose case-insensitive presence in a user message marks
    /// the skill as relevant.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<String>,
    /// Tool allow-list applied while the skill is active.  Empty means
    /// unrestricted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub priority: i32,
    /// Turns of inactivity tolerated before eviction.  `0` or absent
    /// falls back to the activation-class default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<u32>,
}

fn is_zero(v: &i32) -> bool {
    *v == 0
}

// ── Definition ──────────────────────────────────────────────

/// A registry entry.
#[derive(Clone)]
pub struct SkillDefinition {
    pub slug: String,
    pub display_name: String,
    /// One-line summary used in the catalog and in trigger hints.
    pub description: String,
    /// Full instructional content.
    pub body: String,
    pub capability: Option<Arc<dyn Capability>>,
    pub triggers: Vec<String>,
    pub tool_restrictions: Vec<String>,
    pub priority: i32,
    pub ttl_override: Option<u32>,
}

impl fmt::Debug for SkillDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SkillDefinition")
            .field("slug", &self.slug)
            .field("display_name", &self.display_name)
            .field("description", &self.description)
            .field("body_len", &self.body.len())
            .field("capability", &self.capability.is_some())
            .field("triggers", &self.triggers)
            .field("tool_restrictions", &self.tool_restrictions)
            .field("priority", &self.priority)
            .field("ttl_override", &self.ttl_override)
            .finish()
    }
}

impl SkillDefinition {
    /// Create an instruction-only skill with no triggers or restrictions.
    pub fn new(
        slug: impl Into<String>,
        description: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        let slug = slug.into();
        Self {
            display_name: slug.clone(),
            slug,
            description: description.into(),
            body: body.into(),
            capability: None,
            triggers: Vec::new(),
            tool_restrictions: Vec::new(),
            priority: 0,
            ttl_override: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_capability(mut self, capability: Arc<dyn Capability>) -> Self {
        self.capability = Some(capability);
        self
    }

    pub fn with_triggers<I, S>(mut self, triggers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.triggers = triggers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tool_restrictions = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the TTL override.  `0` clears it.
    pub fn with_ttl(mut self, turns: u32) -> Self {
        self.ttl_override = (turns > 0).then_some(turns);
        self
    }

    pub fn has_capability(&self) -> bool {
        self.capability.is_some()
    }

    /// Build a definition from parsed front-matter and body, enforcing the
    /// required fields.
    pub fn from_parts(meta: SkillFrontMatter, body: &str) -> Result<Self, SkillError> {
        validate_slug(&meta.name)?;
        let description = meta
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .ok_or_else(|| SkillError::invalid("front-matter field 'description' is required"))?
            .to_string();
        let body = body.trim();
        if body.is_empty() {
            return Err(SkillError::invalid("skill body must not be empty"));
        }
        let display_name = meta
            .display_name
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| meta.name.clone());

        Ok(Self {
            slug: meta.name,
            display_name,
            description,
            body: body.to_string(),
            capability: None,
            triggers: clean_list(meta.triggers),
            tool_restrictions: clean_list(meta.tools),
            priority: meta.priority,
            ttl_override: meta.max_turns.filter(|t| *t > 0),
        })
    }

    /// Front-matter view of this definition, used when persisting.
    pub fn front_matter(&self) -> SkillFrontMatter {
        SkillFrontMatter {
            name: self.slug.clone(),
            description: Some(self.description.clone()),
            display_name: (self.display_name != self.slug).then(|| self.display_name.clone()),
            triggers: self.triggers.clone(),
            tools: self.tool_restrictions.clone(),
            priority: self.priority,
            max_turns: self.ttl_override,
        }
    }
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Slugs are URL-safe: ASCII lowercase alphanumerics, hyphens and
/// underscores.
pub fn validate_slug(slug: &str) -> Result<(), SkillError> {
    if slug.is_empty() {
        return Err(SkillError::invalid("front-matter field 'name' is required"));
    }
    if !slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err(SkillError::invalid(format!(
            "skill name '{slug}' may only contain lowercase letters, digits, hyphens, or underscores"
        )));
    }
    Ok(())
}

// ── SKILL.md parser ──────────────────────────────────────────

/// Split a `SKILL.md` file into `(yaml_front_matter, markdown_body)`.
///
/// Expected format:
/// ```text
/// ---
/// name: calendar
/// description: Manage meetings
/// ---
/// # Instructions
/// markdown body…
/// ```
pub fn parse_skill_md(content: &str) -> Result<(String, String), SkillError> {
    let trimmed = content.trim_start();
    let Some(after_open) = trimmed.strip_prefix("---") else {
        return Err(SkillError::invalid(
            "SKILL.md must begin with YAML front-matter (---)",
        ));
    };
    let after_open = after_open.strip_prefix('\n').unwrap_or(after_open);

    let close_pos = after_open
        .find("\n---")
        .ok_or_else(|| SkillError::invalid("missing closing --- in SKILL.md front-matter"))?;

    let yaml = after_open[..close_pos].to_string();
    let rest = &after_open[close_pos + 4..];
    let body = rest.strip_prefix('\n').unwrap_or(rest).to_string();

    Ok((yaml, body))
}

/// Parse and validate a complete `SKILL.md` document.
pub fn parse_skill_document(content: &str) -> Result<SkillDefinition, SkillError> {
    let (yaml, body) = parse_skill_md(content)?;
    let meta: SkillFrontMatter = serde_yaml::from_str(&yaml)
        .map_err(|e| SkillError::invalid(format!("front-matter is not valid YAML: {e}")))?;
    SkillDefinition::from_parts(meta, &body)
}

/// Render a definition back into `SKILL.md` text.
pub fn render_skill_md(def: &SkillDefinition) -> Result<String, SkillError> {
    let yaml = serde_yaml::to_string(&def.front_matter())
        .map_err(|e| SkillError::invalid(format!("cannot serialise front-matter: {e}")))?;
    Ok(format!("---\n{}---\n\n{}\n", yaml, def.body.trim()))
}

// ── Directory loading ────────────────────────────────────────

/// Load every `<base>/*/SKILL.md` and apply the optional gating config.
///
/// Malformed documents are skipped with a warning so one bad file never
/// blocks a re-sync.  A missing directory yields zero skills.
pub fn load_skills_from(
    base: &Path,
    gating: Option<&SkillsConfig>,
) -> anyhow::Result<Vec<SkillDefinition>> {
    if !base.is_dir() {
        debug!("no skills directory at {}", base.display());
        return Ok(Vec::new());
    }

    let mut entries: Vec<_> = std::fs::read_dir(base)
        .with_context(|| format!("reading skills dir {}", base.display()))?
        .collect::<Result<_, _>>()
        .with_context(|| format!("listing skills dir {}", base.display()))?;
    entries.sort_by_key(|e| e.file_name());

    let mut out: Vec<SkillDefinition> = Vec::new();
    for entry in entries {
        let skill_dir = entry.path();
        let skill_md = skill_dir.join("SKILL.md");
        if !skill_md.is_file() {
            debug!("skipping {} (no SKILL.md)", skill_dir.display());
            continue;
        }
        let content = match std::fs::read_to_string(&skill_md) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %skill_md.display(), error = %e, "skipping unreadable skill");
                continue;
            }
        };
        let def = match parse_skill_document(&content) {
            Ok(def) => def,
            Err(e) => {
                warn!(path = %skill_md.display(), error = %e, "skipping malformed skill");
                continue;
            }
        };
        if out.iter().any(|d| d.slug == def.slug) {
            warn!(skill = %def.slug, "duplicate skill name; keeping first");
            continue;
        }
        debug!(skill = %def.slug, path = %skill_dir.display(), "loaded skill");
        out.push(def);
    }

    if let Some(cfg) = gating {
        apply_skills_filter(&mut out, cfg);
    }
    info!(count = out.len(), dir = %base.display(), "skills loaded from storage");
    Ok(out)
}

/// Remove skills that fail the [`SkillsConfig`] gate.
pub fn apply_skills_filter(skills: &mut Vec<SkillDefinition>, cfg: &SkillsConfig) {
    if !cfg.enabled {
        info!("skills disabled by config; removing all");
        skills.clear();
        return;
    }

    if !cfg.allow.is_empty() {
        skills.retain(|s| {
            let keep = cfg.allow.iter().any(|a| *a == s.slug);
            if !keep {
                debug!(skill = %s.slug, "skill not in allow-list; removed");
            }
            keep
        });
    }

    if !cfg.deny.is_empty() {
        skills.retain(|s| {
            let denied = cfg.deny.iter().any(|d| *d == s.slug);
            if denied {
                debug!(skill = %s.slug, "skill in deny-list; removed");
            }
            !denied
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CALENDAR: &str = "---\nname: calendar\ndescription: Manage meetings\ntriggers:\n  - meeting\n  - Schedule\ntools: [calendar_api]\npriority: 2\nmax_turns: 5\n---\n# Calendar\n\nUse the calendar API.\n";

    #[test]
    fn parse_skill_md_valid() {
        let (yaml, body) = parse_skill_md(CALENDAR).unwrap();
        assert!(yaml.contains("name: calendar"));
        assert!(body.contains("Use the calendar API."));
    }

    #[test]
    fn parse_skill_md_no_frontmatter() {
        assert!(parse_skill_md("# Just markdown\n").is_err());
    }

    #[test]
    fn parse_skill_md_unclosed_frontmatter() {
        assert!(parse_skill_md("---\nname: x\n").is_err());
    }

    #[test]
    fn document_fields_map_onto_definition() {
        let def = parse_skill_document(CALENDAR).unwrap();
        assert_eq!(def.slug, "calendar");
        assert_eq!(def.display_name, "calendar");
        assert_eq!(def.triggers, vec!["meeting", "Schedule"]);
        assert_eq!(def.tool_restrictions, vec!["calendar_api"]);
        assert_eq!(def.priority, 2);
        assert_eq!(def.ttl_override, Some(5));
        assert!(def.body.starts_with("# Calendar"));
        assert!(!def.has_capability());
    }

    #[test]
    fn legacy_id_alias_is_accepted() {
        let def = parse_skill_document("---\nid: notes\ndescription: Notes\n---\nbody\n").unwrap();
        assert_eq!(def.slug, "notes");
    }

    #[test]
    fn zero_max_turns_means_default() {
        let def =
            parse_skill_document("---\nname: a\ndescription: d\nmax_turns: 0\n---\nbody\n").unwrap();
        assert_eq!(def.ttl_override, None);
    }

    #[test]
    fn missing_description_is_rejected() {
        let err = parse_skill_document("---\nname: a\n---\nbody\n").unwrap_err();
        assert!(matches!(err, SkillError::ValidationFailed(_)));
    }

    #[test]
    fn missing_name_is_rejected() {
        let err = parse_skill_document("---\ndescription: d\n---\nbody\n").unwrap_err();
        assert!(matches!(err, SkillError::ValidationFailed(_)));
    }

    #[test]
    fn empty_body_is_rejected() {
        let err = parse_skill_document("---\nname: a\ndescription: d\n---\n   \n").unwrap_err();
        assert!(matches!(err, SkillError::ValidationFailed(_)));
    }

    #[test]
    fn unsafe_slug_is_rejected() {
        assert!(validate_slug("../etc").is_err());
        assert!(validate_slug("Has Space").is_err());
        assert!(validate_slug("ok-name_2").is_ok());
    }

    #[test]
    fn render_then_parse_preserves_definition() {
        let def = SkillDefinition::new("notes", "Take notes", "Write things down.")
            .with_display_name("Notes")
            .with_triggers(["note"])
            .with_ttl(3);
        let text = render_skill_md(&def).unwrap();
        let back = parse_skill_document(&text).unwrap();
        assert_eq!(back.display_name, "Notes");
        assert_eq!(back.triggers, vec!["note"]);
        assert_eq!(back.ttl_override, Some(3));
        assert_eq!(back.body, "Write things down.");
    }

    #[test]
    fn load_skips_malformed_and_applies_gating() {
        let tmp = tempfile::tempdir().unwrap();
        let write = |slug: &str, text: &str| {
            let dir = tmp.path().join(slug);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("SKILL.md"), text).unwrap();
        };
        write("calendar", CALENDAR);
        write("broken", "no front matter");
        write("notes", "---\nname: notes\ndescription: Notes\n---\nbody\n");

        let all = load_skills_from(tmp.path(), None).unwrap();
        let slugs: Vec<&str> = all.iter().map(|d| d.slug.as_str()).collect();
        assert_eq!(slugs, vec!["calendar", "notes"]);

        let cfg = SkillsConfig {
            enabled: true,
            allow: vec![],
            deny: vec!["notes".into()],
        };
        let gated = load_skills_from(tmp.path(), Some(&cfg)).unwrap();
        assert_eq!(gated.len(), 1);
        assert_eq!(gated[0].slug, "calendar");
    }

    #[test]
    fn load_missing_dir_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let skills = load_skills_from(&tmp.path().join("absent"), None).unwrap();
        assert!(skills.is_empty());
    }
}
