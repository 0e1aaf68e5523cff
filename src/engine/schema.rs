//! LLM-facing definition of the `skill` tool.
//!
//! The schema depends on the registry (the `name` parameter lists every
//! installed slug), so it is rebuilt lazily after any registry change and
//! memoised until the next one.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use super::SkillEngine;
use crate::skills::SkillDefinition;
use crate::tools::InvocationRequest;

/// Name under which the engine is exposed as a tool.
pub const TOOL_NAME: &str = "skill";

/// Function-calling definition of the `skill` tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema for the call arguments.
    pub parameters: Value,
}

impl SkillEngine {
    /// Current tool definition, rebuilding it if the registry changed.
    pub fn tool_schema(&self) -> Arc<ToolSchema> {
        if let Some(schema) = self.read().schema.clone() {
            return schema;
        }
        let mut state = self.write();
        // Another writer may have rebuilt it between the two locks.
        if let Some(schema) = state.schema.clone() {
            return schema;
        }
        let schema = Arc::new(build_schema(&state.skills));
        state.schema = Some(schema.clone());
        debug!(skills = state.skills.len(), "tool schema rebuilt");
        schema
    }
}

/// Pure schema construction from the registry contents.
pub fn build_schema(skills: &BTreeMap<String, SkillDefinition>) -> ToolSchema {
    let mut parameters = serde_json::to_value(schemars::schema_for!(InvocationRequest))
        .unwrap_or_else(|_| json!({ "type": "object" }));
    if let Some(obj) = parameters.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    // Not an enum: `create` takes a slug that is not installed yet.
    if let Some(name) = parameters.pointer_mut("/properties/name") {
        let base = name
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let installed = if skills.is_empty() {
            "none".to_string()
        } else {
            skills.keys().map(String::as_str).collect::<Vec<_>>().join(", ")
        };
        let text = format!("{base} Installed skills: {installed}.");
        name["description"] = json!(text.trim_start());
    }

    ToolSchema {
        name: TOOL_NAME.to_string(),
        description: build_description(skills),
        parameters,
    }
}

fn build_description(skills: &BTreeMap<String, SkillDefinition>) -> String {
    let mut out = String::from(
        "Use an installed skill. Call with just `name` to read its instructions; \
         pass an `action` (and optional `payload`) to run it. \
         Special actions: `catalog` lists skills, `load`/`unload` keep a skill \
         in context or drop it, `create`/`update`/`delete` manage stored skills.",
    );
    if skills.is_empty() {
        out.push_str("\n\nNo skills are installed yet.");
        return out;
    }
    out.push_str("\n\nInstalled skills:");
    for def in skills.values() {
        out.push_str(&format!("\n- {}: {}", def.slug, def.description));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_lists_slugs_without_constraining_name() {
        let engine = SkillEngine::default();
        engine.register(SkillDefinition::new("notes", "Take notes", "b"));
        engine.register(SkillDefinition::new("calendar", "Meetings", "b"));
        let schema = engine.tool_schema();
        assert_eq!(schema.name, "skill");
        assert_eq!(schema.parameters["type"], "object");

        let name = &schema.parameters["properties"]["name"];
        assert!(name.get("enum").is_none());
        assert_eq!(name["type"], "string");
        assert!(name["description"]
            .as_str()
            .unwrap()
            .ends_with("Installed skills: calendar, notes."));
        assert!(schema.description.contains("- notes: Take notes"));
    }

    #[test]
    fn schema_is_memoised_until_registry_changes() {
        let engine = SkillEngine::default();
        engine.register(SkillDefinition::new("notes", "d", "b"));
        let first = engine.tool_schema();
        let again = engine.tool_schema();
        assert!(Arc::ptr_eq(&first, &again));

        // Session activity does not invalidate it.
        engine.tick("s", "hi");
        assert!(Arc::ptr_eq(&first, &engine.tool_schema()));

        engine.register(SkillDefinition::new("calendar", "d", "b"));
        let rebuilt = engine.tool_schema();
        assert!(!Arc::ptr_eq(&first, &rebuilt));
        assert!(rebuilt.description.contains("calendar"));
    }

    #[test]
    fn empty_registry_still_builds() {
        let schema = build_schema(&BTreeMap::new());
        assert!(schema.description.contains("No skills"));
        let name = &schema.parameters["properties"]["name"];
        assert!(name.get("enum").is_none());
        assert!(name["description"]
            .as_str()
            .unwrap()
            .contains("Installed skills: none."));
    }
}
