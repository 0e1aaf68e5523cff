//! Integration tests for the per-session activation clock, content
//! budget, and tool allow-list aggregation.

use claw_skills::engine::{EngineSettings, SkillEngine};
use claw_skills::skills::SkillDefinition;

fn engine() -> SkillEngine {
    let engine = SkillEngine::default();
    engine.register(
        SkillDefinition::new("calendar", "Schedule meetings", "Use the calendar API.")
            .with_triggers(["meeting"])
            .with_tools(["calendar_api"]),
    );
    engine.register(SkillDefinition::new("notes", "Take notes", "Write things down."));
    engine
}

#[test]
fn turn_counter_counts_ticks() {
    let engine = engine();
    assert_eq!(engine.turn("a"), 0);
    for n in 1..=7 {
        assert_eq!(engine.tick("a", "hello").turn, n);
    }
    assert_eq!(engine.turn("a"), 7);
    assert_eq!(engine.turn("b"), 0, "sessions have independent clocks");
}

#[test]
fn invoked_skill_evicted_after_idle_ttl() {
    let engine = engine();
    engine.tick("s", "hi");
    assert!(engine.record_activation("s", "calendar", false));

    for turn in 2..=5 {
        let out = engine.tick("s", "unrelated chatter");
        assert!(out.expired.is_empty(), "evicted early at turn {turn}");
        assert!(engine.is_active("s", "calendar"));
    }

    let out = engine.tick("s", "still unrelated");
    assert_eq!(out.turn, 6);
    assert_eq!(out.expired, vec!["calendar".to_string()]);
    assert!(!engine.is_active("s", "calendar"));
}

#[test]
fn loaded_skill_is_sticky_for_longer() {
    let engine = engine();
    engine.tick("s", "hi");
    let text = engine.load("s", "notes").unwrap();
    assert!(text.contains("Write things down."));

    for _ in 2..=7 {
        assert!(engine.tick("s", "...").expired.is_empty());
    }
    assert!(engine.is_active("s", "notes"));

    let out = engine.tick("s", "...");
    assert_eq!(out.turn, 8);
    assert_eq!(out.expired, vec!["notes".to_string()]);
}

#[test]
fn trigger_match_refreshes_active_skill() {
    let engine = engine();
    engine.tick("s", "hi");
    engine.record_activation("s", "calendar", false);

    engine.tick("s", "x");
    engine.tick("s", "x");
    let out = engine.tick("s", "move the Meeting to noon");
    assert_eq!(out.turn, 4);
    assert_eq!(out.refreshed, vec!["calendar".to_string()]);
    assert!(out.hints.is_empty(), "active skills are not hinted");
    assert_eq!(engine.activation("s", "calendar").unwrap().last_active_turn, 4);

    // deadline is now 4 + 4
    for _ in 5..=8 {
        assert!(engine.tick("s", "x").expired.is_empty());
    }
    assert_eq!(engine.tick("s", "x").expired, vec!["calendar".to_string()]);
}

#[test]
fn reinvoke_resets_deadline() {
    let engine = engine();
    engine.tick("s", "hi");
    engine.record_activation("s", "notes", false);
    engine.tick("s", "x");
    engine.tick("s", "x");
    engine.record_activation("s", "notes", false);
    assert_eq!(engine.activation("s", "notes").unwrap().last_active_turn, 3);
}

#[test]
fn trigger_on_inactive_skill_only_hints() {
    let engine = engine();
    let out = engine.tick("s", "Book a MEETING please");
    assert_eq!(out.hints.len(), 1);
    assert_eq!(out.hints[0].slug, "calendar");
    assert!(!engine.is_active("s", "calendar"));
    assert!(out.hints_markdown().contains("`calendar`"));
}

#[test]
fn expired_skill_rematched_same_tick_is_reactivated() {
    let engine = engine();
    engine.tick("s", "hi");
    engine.record_activation("s", "calendar", false);
    for _ in 2..=5 {
        engine.tick("s", "x");
    }

    let out = engine.tick("s", "another meeting");
    assert!(out.expired.is_empty());
    assert_eq!(out.reactivated, vec!["calendar".to_string()]);
    let rec = engine.activation("s", "calendar").unwrap();
    assert_eq!(rec.last_active_turn, 6);
    assert!(!rec.manual);
}

#[test]
fn hints_are_capped_and_ordered() {
    let engine = SkillEngine::new(EngineSettings {
        max_hints: 2,
        ..Default::default()
    });
    for (slug, prio) in [("zeta", 0), ("beta", 0), ("alpha", 0), ("omega", 10)] {
        engine.register(
            SkillDefinition::new(slug, "d", "b")
                .with_triggers(["deploy"])
                .with_priority(prio),
        );
    }
    let slugs: Vec<String> = engine
        .tick("s", "deploy now")
        .hints
        .into_iter()
        .map(|h| h.slug)
        .collect();
    assert_eq!(slugs, vec!["omega", "alpha"]);
}

#[test]
fn budget_skips_skill_that_does_not_fit() {
    let engine = SkillEngine::default();
    engine.register(SkillDefinition::new("older", "d", "o".repeat(9_000)));
    engine.register(SkillDefinition::new("newer", "d", "n".repeat(10_001)));

    engine.tick("s", "hi");
    engine.record_activation("s", "older", false);
    engine.tick("s", "hi");
    engine.record_activation("s", "newer", false);

    let content = engine.active_content("s");
    assert!(content.contains(&"n".repeat(10_001)));
    assert!(!content.contains(&"o".repeat(100)));
    assert!(content.len() < 10_001 + 200);
}

#[test]
fn budget_lets_later_small_skill_through() {
    let engine = SkillEngine::default();
    engine.register(SkillDefinition::new("small", "d", "short body"));
    engine.register(SkillDefinition::new("mid", "d", "m".repeat(9_000)));
    engine.register(SkillDefinition::new("big", "d", "b".repeat(10_001)));

    engine.record_activation("s", "small", false);
    engine.tick("s", "x");
    engine.record_activation("s", "mid", false);
    engine.tick("s", "x");
    engine.record_activation("s", "big", false);

    let content = engine.active_content("s");
    assert!(content.contains("short body"));
    assert!(!content.contains(&"m".repeat(100)));
    let first = content.find("b".repeat(50).as_str()).unwrap();
    let last = content.find("short body").unwrap();
    assert!(first < last, "most recent skill comes first");
}

#[test]
fn content_uses_snapshot_taken_at_activation() {
    let engine = engine();
    engine.record_activation("s", "notes", false);
    engine.register(SkillDefinition::new("notes", "Take notes", "Rewritten body."));

    let content = engine.active_content("s");
    assert!(content.contains("## Skill: notes"));
    assert!(content.contains("Write things down."));
    assert!(!content.contains("Rewritten body."));
}

#[test]
fn restriction_union_ignores_unrestricted_skills() {
    let engine = engine();
    engine.register(SkillDefinition::new("files", "d", "b").with_tools(["file"]));

    engine.record_activation("s", "notes", false);
    assert_eq!(engine.active_tool_restrictions("s"), None);

    engine.record_activation("s", "files", false);
    assert_eq!(engine.active_tool_restrictions("s"), Some(vec!["file".to_string()]));

    engine.record_activation("s", "calendar", false);
    assert_eq!(
        engine.active_tool_restrictions("s"),
        Some(vec!["calendar_api".to_string(), "file".to_string()])
    );
}

#[test]
fn force_load_unload_and_clear() {
    let engine = engine();
    assert!(!engine.force_load("s", "ghost"));
    assert!(engine.force_load("s", "notes"));
    assert!(engine.activation("s", "notes").unwrap().manual);
    assert_eq!(engine.session_count(), 1);

    assert!(engine.unload("s", "notes"));
    assert!(!engine.unload("s", "notes"));

    engine.force_load("s", "calendar");
    engine.tick("s", "x");
    assert!(engine.clear_session("s"));
    assert_eq!(engine.turn("s"), 0);
    assert!(engine.active_skills("s").is_empty());
    assert_eq!(engine.session_count(), 0);
}

#[test]
fn unregistered_skill_content_survives_until_expiry() {
    let engine = engine();
    engine.record_activation("s", "notes", false);
    assert!(engine.unregister("notes"));

    assert!(engine.active_content("s").contains("Write things down."));
    for _ in 0..4 {
        engine.tick("s", "x");
    }
    assert_eq!(engine.tick("s", "x").expired, vec!["notes".to_string()]);
}

#[test]
fn concurrent_sessions_do_not_interfere() {
    let engine = std::sync::Arc::new(engine());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let engine = engine.clone();
            std::thread::spawn(move || {
                let session = format!("s{i}");
                for _ in 0..50 {
                    engine.tick(&session, "meeting");
                    engine.record_activation(&session, "calendar", false);
                    let _ = engine.active_content(&session);
                    let _ = engine.tool_schema();
                }
                engine.turn(&session)
            })
        })
        .collect();
    for h in handles {
        assert_eq!(h.join().unwrap(), 50);
    }
    assert_eq!(engine.session_count(), 8);
}
