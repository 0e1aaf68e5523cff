//! Per-session activation tracking and the turn-advance tick.
//!
//! A session owns a monotonic turn counter and one [`ActivationRecord`]
//! per active skill.  Records are created by invocation, trigger
//! re-activation, or explicit load, refreshed whenever the skill is used
//! or mentioned again, and dropped once they sit idle for longer than
//! their TTL.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use super::triggers::{self, SkillHint};
use super::{EngineSettings, EngineState, SkillEngine};
use crate::error::SkillError;
use crate::skills::SkillDefinition;

/// State of one skill while it is active in a session.
#[derive(Debug, Clone)]
pub struct ActivationRecord {
    pub last_active_turn: u64,
    /// Copy of the skill body taken at first activation.  Later registry
    /// edits do not change it.
    pub content_snapshot: String,
    pub display_name: String,
    pub tool_restrictions: Vec<String>,
    /// Fixed when the record is created.
    pub effective_ttl: u32,
    /// Set by explicit load; never cleared while the record lives.
    pub manual: bool,
    pub activated_at: DateTime<Utc>,
}

impl ActivationRecord {
    fn new(def: &SkillDefinition, turn: u64, manual: bool, settings: &EngineSettings) -> Self {
        Self {
            last_active_turn: turn,
            content_snapshot: def.body.clone(),
            display_name: def.display_name.clone(),
            tool_restrictions: def.tool_restrictions.clone(),
            effective_ttl: settings.ttl_for(def, manual),
            manual,
            activated_at: Utc::now(),
        }
    }

    /// Idle for strictly more than the TTL.
    pub fn is_expired(&self, turn: u64) -> bool {
        turn.saturating_sub(self.last_active_turn) > u64::from(self.effective_ttl)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub turn: u64,
    pub active: HashMap<String, ActivationRecord>,
}

/// Snapshot of an active skill for status displays.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveSkill {
    pub slug: String,
    pub display_name: String,
    pub last_active_turn: u64,
    pub effective_ttl: u32,
    /// Last turn on which the skill survives without further activity.
    pub expires_after_turn: u64,
    pub manual: bool,
    pub activated_at: DateTime<Utc>,
}

/// What a single [`SkillEngine::tick`] changed.
#[derive(Debug, Clone, Default)]
pub struct TickOutcome {
    /// Session turn after the tick.
    pub turn: u64,
    /// Skills evicted for inactivity (sorted).  Skills that were evicted and
    /// re-activated by the same message are listed in `reactivated` instead.
    pub expired: Vec<String>,
    /// Skills evicted this turn and immediately re-created because the
    /// message matched one of their triggers.
    pub reactivated: Vec<String>,
    /// Surviving skills whose idle clock was reset by a trigger match.
    pub refreshed: Vec<String>,
    /// Suggestions for skills that are not active.
    pub hints: Vec<SkillHint>,
}

impl TickOutcome {
    /// Markdown hint block for prompt injection; empty when there are none.
    pub fn hints_markdown(&self) -> String {
        triggers::format_hints(&self.hints)
    }
}

/// Result of a locked activation.
pub(crate) struct Activation {
    pub(crate) ttl: u32,
    pub(crate) created: bool,
}

impl EngineState {
    /// Create or refresh the record for `(session, slug)`.  Returns `None`
    /// when the skill is not registered.
    pub(crate) fn activate(
        &mut self,
        settings: &EngineSettings,
        session: &str,
        slug: &str,
        manual: bool,
    ) -> Option<Activation> {
        let def = self.skills.get(slug)?;
        let state = self.sessions.entry(session.to_string()).or_default();
        let turn = state.turn;

        if let Some(rec) = state.active.get_mut(slug) {
            rec.last_active_turn = turn;
            rec.manual |= manual;
            debug!(session, skill = slug, turn, manual = rec.manual, "skill refreshed");
            return Some(Activation {
                ttl: rec.effective_ttl,
                created: false,
            });
        }

        let rec = ActivationRecord::new(def, turn, manual, settings);
        let ttl = rec.effective_ttl;
        state.active.insert(slug.to_string(), rec);
        debug!(session, skill = slug, turn, ttl, manual, "skill activated");
        Some(Activation { ttl, created: true })
    }
}

impl SkillEngine {
    // ── Activation ──────────────────────────────────────────

    /// Record that `slug` was used in `session`.  No-op (returns `false`)
    /// if the skill is not registered.
    pub fn record_activation(&self, session: &str, slug: &str, manual: bool) -> bool {
        let mut state = self.write();
        state
            .activate(&self.settings, session, slug, manual)
            .is_some()
    }

    /// Explicitly load a skill, keeping it active on the longer manual TTL.
    /// Returns the skill body with an activation notice.
    pub fn load(&self, session: &str, slug: &str) -> Result<String, SkillError> {
        let mut state = self.write();
        let activation = state
            .activate(&self.settings, session, slug, true)
            .ok_or_else(|| SkillError::NotFound(slug.to_string()))?;
        let def = state
            .skills
            .get(slug)
            .ok_or_else(|| SkillError::NotFound(slug.to_string()))?;

        let verb = if activation.created { "loaded" } else { "refreshed" };
        Ok(format!(
            "Skill '{}' {verb}. It stays active until it has been idle for {} turns.\n\n{}",
            def.display_name, activation.ttl, def.body
        ))
    }

    /// Load a skill on the system's behalf (e.g. onboarding).  Returns
    /// whether the skill exists and is now active.
    pub fn force_load(&self, session: &str, slug: &str) -> bool {
        let mut state = self.write();
        let loaded = state.activate(&self.settings, session, slug, true).is_some();
        if !loaded {
            debug!(session, skill = slug, "force-load skipped: unknown skill");
        }
        loaded
    }

    /// Drop a skill's record.  Returns whether one existed.
    pub fn unload(&self, session: &str, slug: &str) -> bool {
        let mut state = self.write();
        let removed = state
            .sessions
            .get_mut(session)
            .and_then(|s| s.active.remove(slug))
            .is_some();
        if removed {
            debug!(session, skill = slug, "skill unloaded");
        }
        removed
    }

    /// Forget a session entirely: turn counter and every record.
    pub fn clear_session(&self, session: &str) -> bool {
        let removed = self.write().sessions.remove(session).is_some();
        if removed {
            debug!(session, "session cleared");
        }
        removed
    }

    // ── Turn advance ────────────────────────────────────────

    /// Advance `session` by one turn for the inbound user `message`.
    ///
    /// Phases, in order: advance the counter, evict records idle longer
    /// than their TTL, refresh surviving records whose triggers match,
    /// then rank trigger matches among inactive skills as hints.  A skill
    /// evicted in this tick whose trigger matches the same message is
    /// re-created as a fresh, non-manual record.
    pub fn tick(&self, session: &str, message: &str) -> TickOutcome {
        let mut guard = self.write();
        let state: &mut EngineState = &mut guard;
        let settings = &self.settings;
        let lowered = message.to_lowercase();

        let sess = state.sessions.entry(session.to_string()).or_default();
        sess.turn += 1;
        let turn = sess.turn;

        let mut expired = Vec::new();
        sess.active.retain(|slug, rec| {
            if rec.is_expired(turn) {
                expired.push(slug.clone());
                false
            } else {
                true
            }
        });
        expired.sort();

        let mut refreshed = Vec::new();
        for (slug, rec) in sess.active.iter_mut() {
            let Some(def) = state.skills.get(slug) else {
                continue;
            };
            if triggers::matches(&def.triggers, &lowered) {
                rec.last_active_turn = turn;
                refreshed.push(slug.clone());
            }
        }
        refreshed.sort();

        let mut reactivated = Vec::new();
        expired.retain(|slug| {
            let Some(def) = state.skills.get(slug) else {
                return true;
            };
            if !triggers::matches(&def.triggers, &lowered) {
                return true;
            }
            sess.active
                .insert(slug.clone(), ActivationRecord::new(def, turn, false, settings));
            reactivated.push(slug.clone());
            false
        });

        let hints = triggers::rank_hints(
            state
                .skills
                .values()
                .filter(|d| !sess.active.contains_key(&d.slug)),
            &lowered,
            settings.max_hints,
        );

        debug!(
            session,
            turn,
            expired = ?expired,
            reactivated = ?reactivated,
            refreshed = ?refreshed,
            hints = hints.len(),
            "session tick"
        );

        TickOutcome {
            turn,
            expired,
            reactivated,
            refreshed,
            hints,
        }
    }

    // ── Introspection ───────────────────────────────────────

    /// Current turn of `session`; `0` if it has never ticked.
    pub fn turn(&self, session: &str) -> u64 {
        self.read().sessions.get(session).map_or(0, |s| s.turn)
    }

    pub fn is_active(&self, session: &str, slug: &str) -> bool {
        self.read()
            .sessions
            .get(session)
            .is_some_and(|s| s.active.contains_key(slug))
    }

    /// Copy of one activation record, if present.
    pub fn activation(&self, session: &str, slug: &str) -> Option<ActivationRecord> {
        self.read()
            .sessions
            .get(session)
            .and_then(|s| s.active.get(slug).cloned())
    }

    /// Active skills, most recently used first (ties by slug).
    pub fn active_skills(&self, session: &str) -> Vec<ActiveSkill> {
        let state = self.read();
        let Some(sess) = state.sessions.get(session) else {
            return Vec::new();
        };
        let mut out: Vec<ActiveSkill> = sess
            .active
            .iter()
            .map(|(slug, rec)| ActiveSkill {
                slug: slug.clone(),
                display_name: rec.display_name.clone(),
                last_active_turn: rec.last_active_turn,
                effective_ttl: rec.effective_ttl,
                expires_after_turn: rec.last_active_turn + u64::from(rec.effective_ttl),
                manual: rec.manual,
                activated_at: rec.activated_at,
            })
            .collect();
        out.sort_by(|a, b| {
            b.last_active_turn
                .cmp(&a.last_active_turn)
                .then_with(|| a.slug.cmp(&b.slug))
        });
        out
    }

    pub fn session_count(&self) -> usize {
        self.read().sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> SkillEngine {
        let engine = SkillEngine::default();
        engine.register(
            SkillDefinition::new("calendar", "Meetings", "Use the calendar.")
                .with_triggers(["meeting"]),
        );
        engine.register(SkillDefinition::new("notes", "Notes", "Write notes."));
        engine
    }

    #[test]
    fn record_unknown_skill_is_noop() {
        let engine = engine();
        assert!(!engine.record_activation("s", "ghost", false));
        assert!(engine.active_skills("s").is_empty());
    }

    #[test]
    fn manual_flag_only_upgrades() {
        let engine = engine();
        engine.record_activation("s", "notes", true);
        engine.record_activation("s", "notes", false);
        let rec = engine.activation("s", "notes").unwrap();
        assert!(rec.manual);
        assert_eq!(rec.effective_ttl, 6);
    }

    #[test]
    fn ttl_fixed_at_creation() {
        let engine = engine();
        engine.record_activation("s", "notes", false);
        assert_eq!(engine.activation("s", "notes").unwrap().effective_ttl, 4);
        // A later load upgrades the flag but keeps the original TTL.
        engine.load("s", "notes").unwrap();
        let rec = engine.activation("s", "notes").unwrap();
        assert!(rec.manual);
        assert_eq!(rec.effective_ttl, 4);
    }

    #[test]
    fn snapshot_ignores_later_edits() {
        let engine = engine();
        engine.record_activation("s", "notes", false);
        engine.register(SkillDefinition::new("notes", "Notes", "Rewritten."));
        assert_eq!(
            engine.activation("s", "notes").unwrap().content_snapshot,
            "Write notes."
        );
    }

    #[test]
    fn load_unknown_is_not_found() {
        let engine = engine();
        assert!(matches!(
            engine.load("s", "ghost"),
            Err(SkillError::NotFound(_))
        ));
        assert_eq!(engine.session_count(), 0);
    }

    #[test]
    fn load_returns_body() {
        let engine = engine();
        let text = engine.load("s", "notes").unwrap();
        assert!(text.contains("loaded"));
        assert!(text.ends_with("Write notes."));
    }

    #[test]
    fn unload_and_force_load() {
        let engine = engine();
        assert!(engine.force_load("s", "notes"));
        assert!(!engine.force_load("s", "ghost"));
        assert!(engine.unload("s", "notes"));
        assert!(!engine.unload("s", "notes"));
        assert!(!engine.unload("other", "notes"));
    }

    #[test]
    fn expired_and_retriggered_skill_comes_back_fresh() {
        let engine = engine();
        engine.tick("s", "hello");
        engine.load("s", "calendar").unwrap(); // manual, ttl 6, turn 1
        for _ in 0..6 {
            engine.tick("s", "unrelated");
        }
        assert!(engine.is_active("s", "calendar"));
        let out = engine.tick("s", "Book a MEETING please"); // turn 8
        assert_eq!(out.reactivated, vec!["calendar"]);
        assert!(out.expired.is_empty());
        let rec = engine.activation("s", "calendar").unwrap();
        assert!(!rec.manual);
        assert_eq!(rec.effective_ttl, 4);
        assert_eq!(rec.last_active_turn, 8);
    }

    #[test]
    fn clear_session_resets_counter() {
        let engine = engine();
        engine.tick("s", "a");
        engine.record_activation("s", "notes", false);
        assert!(engine.clear_session("s"));
        assert_eq!(engine.turn("s"), 0);
        assert!(!engine.is_active("s", "notes"));
    }

    #[test]
    fn active_skills_most_recent_first() {
        let engine = engine();
        engine.record_activation("s", "notes", false);
        engine.tick("s", "x");
        engine.record_activation("s", "calendar", false);
        let active = engine.active_skills("s");
        assert_eq!(active[0].slug, "calendar");
        assert_eq!(active[0].expires_after_turn, 5);
        assert_eq!(active[1].slug, "notes");
    }
}
