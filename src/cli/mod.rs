//! Command-line front end: engine bootstrap and an interactive session
//! driver that plays the role of a host agent loop.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{info, warn};

use crate::config::Config;
use crate::engine::{EngineSettings, SkillEngine};
use crate::skills::{self, defaults};
use crate::tools::{self, InvocationRequest, SkillStore};

/// Build an engine from `config`: seed and load stored skills when a
/// skills directory is configured, otherwise fall back to the embedded
/// defaults.
pub fn bootstrap(config: &Config) -> anyhow::Result<(Arc<SkillEngine>, SkillStore)> {
    let engine = Arc::new(SkillEngine::new(EngineSettings::from(config)));

    let store = match config.skills_path() {
        Some(root) => {
            if let Err(e) = defaults::seed_defaults(&root) {
                warn!(error = %e, dir = %root.display(), "could not seed default skills");
            }
            SkillStore::new(root).with_gating(config.skills.clone())
        }
        None => {
            let mut builtin = defaults::builtin_definitions();
            if let Some(gating) = &config.skills {
                skills::apply_skills_filter(&mut builtin, gating);
            }
            engine.sync_instruction_skills(builtin);
            SkillStore::unconfigured()
        }
    };
    store.resync(&engine).context("loading stored skills")?;

    info!(skills = engine.count(), "skill engine ready");
    Ok((engine, store))
}

/// `validate <FILE>`: parse a SKILL.md and print a summary.
pub fn validate_file(path: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let def = skills::parse_skill_document(&content)
        .with_context(|| format!("validating {}", path.display()))?;
    println!("{} is valid", path.display());
    println!("  name:        {}", def.slug);
    println!("  description: {}", def.description);
    if !def.triggers.is_empty() {
        println!("  triggers:    {}", def.triggers.join(", "));
    }
    if !def.tool_restrictions.is_empty() {
        println!("  tools:       {}", def.tool_restrictions.join(", "));
    }
    if let Some(ttl) = def.ttl_override {
        println!("  max_turns:   {ttl}");
    }
    println!("  body:        {} chars", def.body.chars().count());
    Ok(())
}

/// `init`: write a default configuration file to `path`.  Refuses to
/// replace an existing file unless `force` is set.
pub async fn init_config(path: &Path, force: bool) -> anyhow::Result<Config> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;
    }
    let config = Config::default();
    config.save(path).await?;
    info!(path = %path.display(), "configuration written");
    Ok(config)
}

// ── Session driver ──────────────────────────────────────────

/// One line of interactive input.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    /// A user message: advances the turn.
    Message(String),
    Invoke(InvocationRequest),
    Load(String),
    Unload(String),
    Content,
    Tools,
    Status,
    Catalog,
    Clear,
    Help,
    Quit,
    Invalid(String),
}

const HELP: &str = "\
Plain text is sent as a user message.
/invoke NAME [ACTION [JSON]]  call the skill tool
/load SLUG | /unload SLUG      manage active skills
/content                       show injected skill content
/tools                         show the active tool allow-list
/status                        list active skills
/catalog                       list installed skills
/clear                         reset this session
/quit                          exit";

/// Parse one input line.
pub fn parse_line(line: &str) -> SessionCommand {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return SessionCommand::Message(line.to_string());
    };
    let (cmd, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let args = args.trim();

    match cmd {
        "invoke" => {
            let mut parts = args.splitn(3, char::is_whitespace);
            let name = parts.next().unwrap_or_default();
            if name.is_empty() {
                return SessionCommand::Invalid("usage: /invoke NAME [ACTION [JSON]]".into());
            }
            let mut req = InvocationRequest::new(name);
            if let Some(action) = parts.next().filter(|a| !a.is_empty()) {
                req = req.with_action(action);
            }
            if let Some(raw) = parts.next().map(str::trim).filter(|r| !r.is_empty()) {
                match serde_json::from_str::<Value>(raw) {
                    Ok(v) => req = req.with_payload(v),
                    Err(e) => return SessionCommand::Invalid(format!("payload is not JSON: {e}")),
                }
            }
            SessionCommand::Invoke(req)
        }
        "load" | "unload" if args.is_empty() => {
            SessionCommand::Invalid(format!("usage: /{cmd} SLUG"))
        }
        "load" => SessionCommand::Load(args.to_string()),
        "unload" => SessionCommand::Unload(args.to_string()),
        "content" => SessionCommand::Content,
        "tools" => SessionCommand::Tools,
        "status" => SessionCommand::Status,
        "catalog" => SessionCommand::Catalog,
        "clear" => SessionCommand::Clear,
        "help" => SessionCommand::Help,
        "quit" | "exit" => SessionCommand::Quit,
        other => SessionCommand::Invalid(format!("unknown command: /{other} (try /help)")),
    }
}

/// Force-load the configured onboarding skills into `session`.
fn onboard(engine: &SkillEngine, config: &Config, session: &str) {
    for slug in &config.onboarding {
        if !engine.force_load(session, slug) {
            warn!(session, skill = %slug, "onboarding skill is not installed");
        }
    }
}

/// Drive one session from `input` until EOF or `/quit`, writing replies
/// to `out`.  Onboarding skills from `config` are loaded first.
pub async fn run_session<R, W>(
    engine: &SkillEngine,
    store: &SkillStore,
    config: &Config,
    session: &str,
    input: R,
    out: &mut W,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    onboard(engine, config, session);
    writeln!(out, "session {session} ({} skills installed, /help for commands)", engine.count())?;

    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(&line) {
            SessionCommand::Message(msg) => {
                let outcome = engine.tick(session, &msg);
                writeln!(out, "[turn {}]", outcome.turn)?;
                if !outcome.expired.is_empty() {
                    writeln!(out, "unloaded: {}", outcome.expired.join(", "))?;
                }
                if !outcome.reactivated.is_empty() {
                    writeln!(out, "reactivated: {}", outcome.reactivated.join(", "))?;
                }
                let hints = outcome.hints_markdown();
                if !hints.is_empty() {
                    write!(out, "{hints}")?;
                }
            }
            SessionCommand::Invoke(req) => {
                let res = tools::invoke(engine, store, session, req).await;
                let tag = if res.is_error { "error" } else { "ok" };
                writeln!(out, "[{tag}] {}", res.content)?;
            }
            SessionCommand::Load(slug) => match engine.load(session, &slug) {
                Ok(text) => writeln!(out, "{text}")?,
                Err(e) => writeln!(out, "[error] {e}")?,
            },
            SessionCommand::Unload(slug) => {
                let msg = if engine.unload(session, &slug) { "unloaded" } else { "was not active" };
                writeln!(out, "{slug} {msg}")?;
            }
            SessionCommand::Content => {
                let content = engine.active_content(session);
                if content.is_empty() {
                    writeln!(out, "(no active skills)")?;
                } else {
                    write!(out, "{content}")?;
                }
            }
            SessionCommand::Tools => match engine.active_tool_restrictions(session) {
                Some(tools) => writeln!(out, "allowed tools: {}", tools.join(", "))?,
                None => writeln!(out, "all tools allowed")?,
            },
            SessionCommand::Status => {
                let turn = engine.turn(session);
                writeln!(out, "turn {turn}")?;
                for s in engine.active_skills(session) {
                    writeln!(
                        out,
                        "  {}{}  last active turn {}, unloads after turn {}",
                        s.slug,
                        if s.manual { " (loaded)" } else { "" },
                        s.last_active_turn,
                        s.expires_after_turn
                    )?;
                }
            }
            SessionCommand::Catalog => writeln!(out, "{}", engine.catalog())?,
            SessionCommand::Clear => {
                engine.clear_session(session);
                onboard(engine, config, session);
                writeln!(out, "session cleared")?;
            }
            SessionCommand::Help => writeln!(out, "{HELP}")?,
            SessionCommand::Quit => break,
            SessionCommand::Invalid(msg) => writeln!(out, "[error] {msg}")?,
        }
        out.flush()?;
    }
    Ok(())
}
