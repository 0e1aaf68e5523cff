//! Session-scoped skill engine.
//!
//! [`SkillEngine`] owns the skill registry and every session's activation
//! state behind one reader/writer lock.  Each public method takes the lock
//! exactly once; the helpers it calls operate on the already-locked
//! [`EngineState`] and never lock again, so no code path can re-enter the
//! lock it already holds.
//!
//! Per-turn flow for a host agent loop:
//! 1. [`SkillEngine::tick`] on every inbound user message (advance the
//!    turn, expire idle skills, refresh re-mentioned ones, collect hints).
//! 2. [`crate::tools::invoke`] whenever the model calls the `skill` tool.
//! 3. [`SkillEngine::active_content`] and
//!    [`SkillEngine::active_tool_restrictions`] before each model call.

pub mod content;
pub mod schema;
pub mod session;
pub mod triggers;

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, warn};

use crate::config::{Config, SkillsConfig};
use crate::skills::SkillDefinition;

pub use schema::{ToolSchema, TOOL_NAME};
pub use session::{ActivationRecord, ActiveSkill, SessionState, TickOutcome};
pub use triggers::{format_hints, SkillHint};

/// Character budget for injected skill content per turn.
pub const DEFAULT_CONTENT_BUDGET: usize = 16_000;
/// Inactivity TTL for skills activated by invocation or trigger.
pub const DEFAULT_INVOKE_TTL: u32 = 4;
/// Inactivity TTL for skills loaded explicitly.
pub const DEFAULT_MANUAL_TTL: u32 = 6;
/// Maximum trigger hints surfaced per turn.
pub const DEFAULT_MAX_HINTS: usize = 3;

/// Tunables fixed at engine construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub content_budget: usize,
    pub invoke_ttl: u32,
    pub manual_ttl: u32,
    pub max_hints: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            content_budget: DEFAULT_CONTENT_BUDGET,
            invoke_ttl: DEFAULT_INVOKE_TTL,
            manual_ttl: DEFAULT_MANUAL_TTL,
            max_hints: DEFAULT_MAX_HINTS,
        }
    }
}

impl From<&Config> for EngineSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            content_budget: cfg.content_budget,
            invoke_ttl: cfg.invoke_ttl,
            manual_ttl: cfg.manual_ttl,
            max_hints: cfg.max_hints,
        }
    }
}

impl EngineSettings {
    /// TTL for a new activation: the skill's override, else the class default.
    pub fn ttl_for(&self, def: &SkillDefinition, manual: bool) -> u32 {
        match def.ttl_override {
            Some(t) if t > 0 => t,
            _ if manual => self.manual_ttl,
            _ => self.invoke_ttl,
        }
    }
}

/// Everything guarded by the engine lock.
#[derive(Default)]
pub(crate) struct EngineState {
    pub(crate) skills: BTreeMap<String, SkillDefinition>,
    pub(crate) sessions: HashMap<String, SessionState>,
    /// Memoised tool schema; `None` marks it stale.
    pub(crate) schema: Option<Arc<ToolSchema>>,
}

impl EngineState {
    fn invalidate_schema(&mut self) {
        self.schema = None;
    }
}

/// The skill registry plus per-session activation tracking.
///
/// Construct one per host and share it by reference (or `Arc`); there is
/// no process-wide instance.
pub struct SkillEngine {
    settings: EngineSettings,
    state: RwLock<EngineState>,
}

impl Default for SkillEngine {
    fn default() -> Self {
        Self::new(EngineSettings::default())
    }
}

impl SkillEngine {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            state: RwLock::new(EngineState::default()),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    // State is only mutated through whole operations, so a poisoned lock
    // still guards a consistent value.
    pub(crate) fn read(&self) -> RwLockReadGuard<'_, EngineState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, EngineState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Registry ────────────────────────────────────────────

    /// Insert or replace a skill by slug.
    pub fn register(&self, def: SkillDefinition) {
        let mut state = self.write();
        let slug = def.slug.clone();
        let capability = def.has_capability();
        let replaced = state.skills.insert(slug.clone(), def).is_some();
        state.invalidate_schema();
        info!(skill = %slug, capability, replaced, "skill registered");
    }

    /// Remove a skill.  Returns whether it was present.
    pub fn unregister(&self, slug: &str) -> bool {
        let mut state = self.write();
        let removed = state.skills.remove(slug).is_some();
        if removed {
            state.invalidate_schema();
            info!(skill = %slug, "skill unregistered");
        }
        removed
    }

    /// Drop every instruction-only skill, keeping capability-backed ones.
    /// Returns how many were removed.
    pub fn unregister_all_without_capability(&self) -> usize {
        let mut state = self.write();
        let removed = remove_instruction_skills(&mut state);
        if removed > 0 {
            state.invalidate_schema();
        }
        removed
    }

    pub fn get(&self, slug: &str) -> Option<SkillDefinition> {
        self.read().skills.get(slug).cloned()
    }

    /// All registered skills, ordered by slug.
    pub fn list(&self) -> Vec<SkillDefinition> {
        self.read().skills.values().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.read().skills.len()
    }

    /// Replace every instruction-only skill with `defs` in one critical
    /// section.  Documents that collide with a capability-backed slug are
    /// skipped.
    pub fn sync_instruction_skills(&self, defs: Vec<SkillDefinition>) {
        let mut state = self.write();
        let removed = remove_instruction_skills(&mut state);
        let mut added = 0usize;
        for def in defs {
            if state.skills.get(&def.slug).is_some_and(|d| d.has_capability()) {
                warn!(
                    skill = %def.slug,
                    "stored skill shadows an app-backed skill; keeping the app-backed one"
                );
                continue;
            }
            state.skills.insert(def.slug.clone(), def);
            added += 1;
        }
        state.invalidate_schema();
        info!(
            removed,
            added,
            total = state.skills.len(),
            "instruction skills synced"
        );
    }

    /// Reload instruction skills from a skills directory.  Disk I/O runs
    /// before the lock is taken.  Returns the number of skills loaded.
    pub fn sync_from_dir(&self, dir: &Path, gating: Option<&SkillsConfig>) -> anyhow::Result<usize> {
        let defs = crate::skills::load_skills_from(dir, gating)?;
        let loaded = defs.len();
        self.sync_instruction_skills(defs);
        Ok(loaded)
    }

    // ── Catalog ─────────────────────────────────────────────

    /// Human-readable listing grouped into app-backed and
    /// instruction-only skills, each sorted by slug.
    pub fn catalog(&self) -> String {
        format_catalog(self.read().skills.values())
    }
}

fn remove_instruction_skills(state: &mut EngineState) -> usize {
    let before = state.skills.len();
    state.skills.retain(|_, d| d.has_capability());
    let removed = before - state.skills.len();
    debug!(removed, "instruction skills removed");
    removed
}

fn format_catalog<'a>(skills: impl Iterator<Item = &'a SkillDefinition>) -> String {
    let (apps, guides): (Vec<&SkillDefinition>, Vec<&SkillDefinition>) =
        skills.partition(|d| d.has_capability());
    if apps.is_empty() && guides.is_empty() {
        return "No skills are installed.".to_string();
    }

    let line = |d: &SkillDefinition| {
        if d.display_name == d.slug {
            format!("- `{}`: {}", d.slug, d.description)
        } else {
            format!("- `{}` ({}): {}", d.slug, d.display_name, d.description)
        }
    };

    let mut out = format!("## Skills ({} installed)\n", apps.len() + guides.len());
    if !apps.is_empty() {
        out.push_str("\n### App-backed skills\n");
        for d in &apps {
            out.push_str(&line(d));
            out.push('\n');
        }
    }
    if !guides.is_empty() {
        out.push_str("\n### Instruction skills\n");
        for d in &guides {
            out.push_str(&line(d));
            out.push('\n');
        }
    }
    out.push_str(
        "\nCall `skill` with `name` to read a skill's instructions, or `action: \"load\"` to keep it active.",
    );
    out
}
