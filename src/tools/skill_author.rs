//! Skill self-authoring: create, update, and delete instruction skills on
//! durable storage, then re-sync the registry.
//!
//! Reached through the `skill` tool actions:
//! - `create { payload: { name, description, body, ... } }` or
//!   `create { payload: { document } }` with full SKILL.md text
//! - `update { name, payload: { <fields to change> } }`
//! - `delete { name }`
//!
//! Every document is validated before anything touches disk, and a write
//! only reports success once the registry has been re-synced.  Concurrent
//! edits from outside the process are last-write-wins.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::SkillsConfig;
use crate::engine::SkillEngine;
use crate::error::SkillError;
use crate::skills::{
    parse_skill_document, render_skill_md, validate_slug, SkillDefinition, SkillFrontMatter,
};

/// Fields accepted in a create/update payload.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SkillPayload {
    /// Complete SKILL.md text; when present the other fields are ignored.
    #[serde(default)]
    document: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, alias = "instructions")]
    body: Option<String>,
    #[serde(default)]
    triggers: Option<Vec<String>>,
    #[serde(default)]
    tools: Option<Vec<String>>,
    #[serde(default)]
    priority: Option<i32>,
    #[serde(default)]
    max_turns: Option<u32>,
}

impl SkillPayload {
    fn parse(payload: Option<&Value>) -> Result<Self, SkillError> {
        match payload {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(v) => serde_json::from_value(v.clone())
                .map_err(|e| SkillError::invalid(format!("malformed payload: {e}"))),
        }
    }

    /// Overlay the provided fields onto `base` and `body`, returning the
    /// merged front-matter and the names of the fields that changed.
    fn apply(
        self,
        mut base: SkillFrontMatter,
        body: &mut String,
    ) -> (SkillFrontMatter, Vec<&'static str>) {
        let mut changed = Vec::new();
        if let Some(v) = self.display_name {
            base.display_name = Some(v);
            changed.push("display_name");
        }
        if let Some(v) = self.description {
            base.description = Some(v);
            changed.push("description");
        }
        if let Some(v) = self.triggers {
            base.triggers = v;
            changed.push("triggers");
        }
        if let Some(v) = self.tools {
            base.tools = v;
            changed.push("tools");
        }
        if let Some(v) = self.priority {
            base.priority = v;
            changed.push("priority");
        }
        if let Some(v) = self.max_turns {
            base.max_turns = Some(v);
            changed.push("max_turns");
        }
        if let Some(v) = self.body {
            *body = v;
            changed.push("body");
        }
        (base, changed)
    }
}

/// Location of persisted skill documents.
///
/// An unconfigured store rejects every lifecycle action with
/// [`SkillError::Unconfigured`].
#[derive(Debug, Clone, Default)]
pub struct SkillStore {
    root: Option<PathBuf>,
    gating: Option<SkillsConfig>,
}

impl SkillStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            gating: None,
        }
    }

    pub fn unconfigured() -> Self {
        Self::default()
    }

    pub fn with_gating(mut self, gating: Option<SkillsConfig>) -> Self {
        self.gating = gating;
        self
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    fn require_root(&self) -> Result<&Path, SkillError> {
        self.root().ok_or(SkillError::Unconfigured)
    }

    fn skill_md(root: &Path, slug: &str) -> PathBuf {
        root.join(slug).join("SKILL.md")
    }

    /// Reload instruction skills from storage into `engine`.
    pub fn resync(&self, engine: &SkillEngine) -> anyhow::Result<usize> {
        match self.root() {
            Some(root) => engine.sync_from_dir(root, self.gating.as_ref()),
            None => Ok(0),
        }
    }

    fn resync_after_write(&self, engine: &SkillEngine) -> Result<(), SkillError> {
        self.resync(engine).map(|_| ()).map_err(|e| {
            warn!(error = %e, "skill registry re-sync failed after write");
            SkillError::SyncFailed(format!("{e:#}"))
        })
    }

    /// Suffix for a write whose skill the gating config keeps out of the
    /// registry.
    fn gated_note(&self, engine: &SkillEngine, slug: &str) -> &'static str {
        if engine.get(slug).is_some() {
            return "";
        }
        warn!(skill = %slug, "written skill is filtered out by the skills config");
        " It is disabled by the skills config and was not loaded."
    }

    // ── create ──────────────────────────────────────────────

    /// Persist a new skill.  `name` from the request is used when the
    /// payload carries structured fields without its own `name`.
    pub fn create(
        &self,
        engine: &SkillEngine,
        name: &str,
        payload: Option<&Value>,
    ) -> Result<String, SkillError> {
        let root = self.require_root()?;
        let payload = SkillPayload::parse(payload)?;

        let (def, text) = match payload.document.clone() {
            Some(doc) => {
                let def = parse_skill_document(&doc)?;
                (def, doc)
            }
            None => {
                let meta = SkillFrontMatter {
                    name: payload
                        .name
                        .clone()
                        .unwrap_or_else(|| name.to_string())
                        .trim()
                        .to_string(),
                    ..Default::default()
                };
                let mut body = String::new();
                let (meta, _) = payload.apply(meta, &mut body);
                let def = SkillDefinition::from_parts(meta, &body)?;
                let text = render_skill_md(&def)?;
                (def, text)
            }
        };

        let path = Self::skill_md(root, &def.slug);
        if path.exists() || engine.get(&def.slug).is_some_and(|d| d.has_capability()) {
            return Err(SkillError::AlreadyExists(def.slug));
        }

        write_document(&path, &text)?;
        info!(skill = %def.slug, path = %path.display(), "skill created");
        self.resync_after_write(engine)?;

        Ok(format!(
            "Created skill '{}' at {}.{}",
            def.slug,
            path.display(),
            self.gated_note(engine, &def.slug)
        ))
    }

    // ── update ──────────────────────────────────────────────

    /// Change fields of a persisted skill.  Fields absent from the payload
    /// keep their stored values; a `document` replaces the file outright.
    pub fn update(
        &self,
        engine: &SkillEngine,
        slug: &str,
        payload: Option<&Value>,
    ) -> Result<String, SkillError> {
        let root = self.require_root()?;
        validate_slug(slug)?;
        let path = Self::skill_md(root, slug);
        if !path.is_file() {
            return Err(SkillError::NotFound(slug.to_string()));
        }
        let payload = SkillPayload::parse(payload)?;

        let (text, changed) = match payload.document.clone() {
            Some(doc) => {
                let def = parse_skill_document(&doc)?;
                if def.slug != slug {
                    return Err(SkillError::invalid(format!(
                        "document names '{}' but '{slug}' is being updated; skills cannot be renamed",
                        def.slug
                    )));
                }
                (doc, vec!["document"])
            }
            None => {
                if payload.name.as_deref().map(str::trim).is_some_and(|n| n != slug) {
                    return Err(SkillError::invalid("skills cannot be renamed"));
                }
                let existing = std::fs::read_to_string(&path)?;
                let current = parse_skill_document(&existing).map_err(|e| {
                    SkillError::invalid(format!(
                        "stored document is malformed ({e}); send a full `document` instead"
                    ))
                })?;
                let mut body = current.body.clone();
                let (meta, changed) = payload.apply(current.front_matter(), &mut body);
                if changed.is_empty() {
                    return Err(SkillError::invalid("update needs at least one field to change"));
                }
                let def = SkillDefinition::from_parts(meta, &body)?;
                (render_skill_md(&def)?, changed)
            }
        };

        write_document(&path, &text)?;
        info!(skill = %slug, changed = ?changed, "skill updated");
        self.resync_after_write(engine)?;

        Ok(format!(
            "Updated skill '{slug}' ({}).{}",
            changed.join(", "),
            self.gated_note(engine, slug)
        ))
    }

    // ── delete ──────────────────────────────────────────────

    /// Remove a persisted skill directory.
    pub fn delete(&self, engine: &SkillEngine, slug: &str) -> Result<String, SkillError> {
        let root = self.require_root()?;
        validate_slug(slug)?;
        let dir = root.join(slug);
        if !dir.join("SKILL.md").is_file() {
            return Err(SkillError::NotFound(slug.to_string()));
        }

        std::fs::remove_dir_all(&dir)?;
        info!(skill = %slug, path = %dir.display(), "skill deleted");
        self.resync_after_write(engine)?;

        Ok(format!("Deleted skill '{slug}'."))
    }
}

fn write_document(path: &Path, text: &str) -> Result<(), SkillError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, text)?;
    Ok(())
}
