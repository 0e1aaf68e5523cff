//! The `skill` tool: the single entry point the model uses to read, run,
//! load, and author skills.
//!
//! Requests carry a skill `name`, an optional `action`, and an optional
//! `payload`.  A handful of actions are handled by the engine itself
//! (`catalog`, `load`, `unload`, `create`, `update`, `delete`); anything
//! else is routed to the named skill.

pub mod skill_author;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::engine::SkillEngine;
use crate::error::SkillError;
use crate::skills::SkillDefinition;

pub use skill_author::SkillStore;

// ── Wire types ──────────────────────────────────────────────

/// Arguments of a `skill` tool call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InvocationRequest {
    /// Skill to use, or the target of `load`, `unload`, `update` and `delete`.
    /// For `create`, the name of the new skill.
    #[serde(default)]
    pub name: String,
    /// What to do. Omit (or use `help`) to read the skill's instructions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Action-specific arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl InvocationRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Decode raw tool-call arguments.
    pub fn from_args(args: Value) -> Result<Self, SkillError> {
        serde_json::from_value(args)
            .map_err(|e| SkillError::invalid(format!("malformed skill call: {e}")))
    }

    fn action_str(&self) -> &str {
        self.action.as_deref().map(str::trim).unwrap_or("")
    }
}

/// Outcome of a `skill` tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationResult {
    pub content: String,
    #[serde(default)]
    pub is_error: bool,
}

impl InvocationResult {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

impl From<SkillError> for InvocationResult {
    fn from(e: SkillError) -> Self {
        InvocationResult::error(e.to_string())
    }
}

// ── Dispatcher ──────────────────────────────────────────────

/// Handle one `skill` tool call for `session`.
///
/// Never fails: every error is returned as an error result, and error
/// paths leave the registry and session state untouched.
pub async fn invoke(
    engine: &SkillEngine,
    store: &SkillStore,
    session: &str,
    request: InvocationRequest,
) -> InvocationResult {
    let action = request.action_str().to_string();
    let name = request.name.trim().to_string();
    debug!(session, skill = %name, action = %action, "skill call");

    let outcome = match action.as_str() {
        "catalog" => Ok(engine.catalog()),
        "create" => store.create(engine, &name, request.payload.as_ref()),
        "update" => {
            let target = if name.is_empty() {
                payload_name(request.payload.as_ref())
            } else {
                name.clone()
            };
            require_name(&target)
                .and_then(|_| store.update(engine, &target, request.payload.as_ref()))
        }
        "delete" => require_name(&name).and_then(|_| store.delete(engine, &name)),
        "load" => require_name(&name).and_then(|_| engine.load(session, &name)),
        "unload" => require_name(&name).and_then(|_| unload(engine, session, &name)),
        _ => return run_skill(engine, session, &name, &action, request).await,
    };
    outcome.map_or_else(InvocationResult::from, InvocationResult::ok)
}

fn require_name(name: &str) -> Result<(), SkillError> {
    if name.is_empty() {
        return Err(SkillError::invalid("this action needs a skill `name`"));
    }
    Ok(())
}

/// `name` carried inside an authoring payload.
fn payload_name(payload: Option<&Value>) -> String {
    payload
        .and_then(|p| p.get("name"))
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}

fn unload(engine: &SkillEngine, session: &str, slug: &str) -> Result<String, SkillError> {
    if engine.unload(session, slug) {
        return Ok(format!("Skill '{slug}' unloaded."));
    }
    if engine.get(slug).is_some() {
        return Ok(format!("Skill '{slug}' was not active."));
    }
    Err(SkillError::NotFound(slug.to_string()))
}

async fn run_skill(
    engine: &SkillEngine,
    session: &str,
    name: &str,
    action: &str,
    request: InvocationRequest,
) -> InvocationResult {
    if name.is_empty() {
        return SkillError::invalid("a skill `name` is required (use action `catalog` to list skills)")
            .into();
    }
    let Some(def) = engine.get(name) else {
        return SkillError::NotFound(name.to_string()).into();
    };

    engine.record_activation(session, name, false);

    if action.is_empty() || action == "help" {
        return InvocationResult::ok(def.body);
    }
    match def.capability.clone() {
        Some(capability) => capability.execute(request).await,
        None => InvocationResult::ok(orchestration_guide(&def)),
    }
}

/// Instruction-only skills have no side effect of their own; an action on
/// one returns its body framed as a plan of other skill calls.
fn orchestration_guide(def: &SkillDefinition) -> String {
    format!(
        "'{}' is an instruction skill with no executable actions. It describes a \
         workflow built from other skills: follow the steps below, calling each \
         referenced skill with the `{}` tool.\n\n{}",
        def.display_name,
        crate::engine::TOOL_NAME,
        def.body
    )
}
