//! Trigger-phrase matching and hint ranking.
//!
//! Matching is literal: a trigger fires when its lowercased text occurs
//! anywhere in the lowercased user message.

use serde::Serialize;

use crate::skills::SkillDefinition;

/// Suggestion surfaced to the model for a skill that is not active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkillHint {
    pub slug: String,
    pub description: String,
}

/// Whether any trigger occurs in `lowered_message`, which the caller has
/// already lowercased.  Blank triggers never match.
pub fn matches(triggers: &[String], lowered_message: &str) -> bool {
    triggers.iter().any(|t| {
        let t = t.trim();
        !t.is_empty() && lowered_message.contains(&t.to_lowercase())
    })
}

/// Hints for every candidate whose triggers match, highest priority first,
/// ties broken by ascending slug, truncated to `limit`.
pub(crate) fn rank_hints<'a>(
    candidates: impl Iterator<Item = &'a SkillDefinition>,
    lowered_message: &str,
    limit: usize,
) -> Vec<SkillHint> {
    let mut hits: Vec<&SkillDefinition> = candidates
        .filter(|d| matches(&d.triggers, lowered_message))
        .collect();
    hits.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.slug.cmp(&b.slug)));
    hits.into_iter()
        .take(limit)
        .map(|d| SkillHint {
            slug: d.slug.clone(),
            description: d.description.clone(),
        })
        .collect()
}

/// Render hints as a markdown block for the system prompt.
pub fn format_hints(hints: &[SkillHint]) -> String {
    if hints.is_empty() {
        return String::new();
    }
    let mut out = String::from(
        "## Relevant skills\n\nThese skills may help with the latest message. Invoke one with the `skill` tool before relying on it:\n",
    );
    for h in hints {
        out.push_str(&format!("- `{}`: {}\n", h.slug, h.description));
    }
    out
}
