//! Prompt-facing views of a session: budgeted skill content and the
//! aggregated tool allow-list.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use super::session::ActivationRecord;
use super::SkillEngine;

impl SkillEngine {
    /// Markdown block with the content of every active skill that fits the
    /// character budget, most recently used first.  Empty when nothing is
    /// active.
    pub fn active_content(&self, session: &str) -> String {
        let state = self.read();
        match state.sessions.get(session) {
            Some(sess) => assemble(&sess.active, self.settings.content_budget),
            None => String::new(),
        }
    }

    /// Union of the tool allow-lists declared by active skills, sorted and
    /// de-duplicated.  `None` means unrestricted: no active skill declares
    /// a list.
    ///
    /// This is additive: each restricting skill widens the allowed set.
    /// Skills without a list do not contribute.
    pub fn active_tool_restrictions(&self, session: &str) -> Option<Vec<String>> {
        let state = self.read();
        state
            .sessions
            .get(session)
            .and_then(|sess| union_restrictions(sess.active.values()))
    }
}

/// Serialise records under `budget` characters of skill content.
///
/// A record whose snapshot does not fit the remaining budget is skipped
/// whole; later (smaller) records may still fit.  Headers do not count
/// against the budget.
pub(crate) fn assemble(records: &HashMap<String, ActivationRecord>, budget: usize) -> String {
    if records.is_empty() {
        return String::new();
    }

    let mut ordered: Vec<(&String, &ActivationRecord)> = records.iter().collect();
    ordered.sort_by(|a, b| {
        b.1.last_active_turn
            .cmp(&a.1.last_active_turn)
            .then_with(|| a.0.cmp(b.0))
    });

    let mut remaining = budget;
    let mut sections = Vec::new();
    for (slug, rec) in ordered {
        let len = rec.content_snapshot.chars().count();
        if len > remaining {
            debug!(skill = %slug, len, remaining, "skill content over budget; skipped");
            continue;
        }
        remaining -= len;
        sections.push(format!(
            "## Skill: {}\n\n{}",
            rec.display_name, rec.content_snapshot
        ));
    }

    if sections.is_empty() {
        return String::new();
    }
    format!("# Active skills\n\n{}\n", sections.join("\n\n"))
}

pub(crate) fn union_restrictions<'a>(
    records: impl Iterator<Item = &'a ActivationRecord>,
) -> Option<Vec<String>> {
    let mut allowed = BTreeSet::new();
    let mut restricted = false;
    for rec in records {
        if rec.tool_restrictions.is_empty() {
            continue;
        }
        restricted = true;
        allowed.extend(rec.tool_restrictions.iter().cloned());
    }
    restricted.then(|| allowed.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::SkillDefinition;

    #[test]
    fn nothing_active_is_empty() {
        let engine = SkillEngine::default();
        assert!(engine.active_content("s").is_empty());
        assert!(engine.active_tool_restrictions("s").is_none());
    }

    #[test]
    fn oversized_skill_is_skipped_whole() {
        let engine = SkillEngine::default();
        engine.register(SkillDefinition::new("big", "d", "x".repeat(16_001)));
        engine.register(SkillDefinition::new("small", "d", "tiny body"));
        engine.record_activation("s", "small", false);
        engine.tick("s", "");
        engine.record_activation("s", "big", false);

        let out = engine.active_content("s");
        assert!(out.contains("tiny body"));
        assert!(!out.contains("xxxx"));
    }

    #[test]
    fn budget_counts_characters() {
        let engine = SkillEngine::new(crate::engine::EngineSettings {
            content_budget: 4,
            ..Default::default()
        });
        engine.register(SkillDefinition::new("accent", "d", "éééé"));
        engine.record_activation("s", "accent", false);
        assert!(engine.active_content("s").contains("éééé"));
    }

    #[test]
    fn restrictions_union_only_declaring_skills() {
        let engine = SkillEngine::default();
        engine.register(SkillDefinition::new("a", "d", "b").with_tools(["file", "shell"]));
        engine.register(SkillDefinition::new("b", "d", "b"));
        engine.register(SkillDefinition::new("c", "d", "b").with_tools(["web", "file"]));

        engine.record_activation("s", "b", false);
        assert_eq!(engine.active_tool_restrictions("s"), None);

        engine.record_activation("s", "a", false);
        engine.record_activation("s", "c", false);
        assert_eq!(
            engine.active_tool_restrictions("s"),
            Some(vec!["file".into(), "shell".into(), "web".into()])
        );
    }
}
