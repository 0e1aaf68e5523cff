//! claw_skills: session-scoped skill engine for LLM agents.
//!
//! This library crate re-exports modules so integration tests
//! (under `tests/`) can access them.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod skills;
pub mod tools;

/// Return the claw-skills home directory.
///
/// Resolution order:
/// 1. `CLAW_SKILLS_HOME` environment variable
/// 2. `$HOME/.claw-skills`
pub fn claw_home() -> std::path::PathBuf {
    if let Ok(p) = std::env::var("CLAW_SKILLS_HOME") {
        std::path::PathBuf::from(p)
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("."))
            .join(".claw-skills")
    }
}
