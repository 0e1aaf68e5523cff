use claw_skills::cli;
use claw_skills::config::Config;
use claw_skills::skills::watch;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::io::BufReader;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "claw-skills", version, about = "Session-scoped skill engine for LLM agents")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List installed skills
    Catalog,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Check a SKILL.md document without installing it
    Validate {
        /// Path to the SKILL.md file
        file: PathBuf,
    },
    /// Run an interactive session against the engine (default)
    Session {
        /// Session identifier (random when omitted)
        #[arg(long)]
        id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    {
        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::util::SubscriberInitExt;

        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

        // stdout carries the session transcript
        let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
    }

    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| claw_skills::claw_home().join("config.yaml"));

    match &cli.command {
        Some(Command::Validate { file }) => return cli::validate_file(file),
        Some(Command::Init { force }) => {
            cli::init_config(&config_path, *force).await?;
            println!("Wrote {}", config_path.display());
            return Ok(());
        }
        _ => {}
    }

    let config = if cli.config.is_some() {
        Config::load(&config_path).await?
    } else {
        Config::load_or_default(&config_path).await?
    };
    let (engine, store) = cli::bootstrap(&config)?;

    match cli.command {
        Some(Command::Catalog) => {
            println!("{}", engine.catalog());
            Ok(())
        }
        Some(Command::Session { id }) => run(engine, store, &config, id).await,
        None => run(engine, store, &config, None).await,
        Some(Command::Validate { .. } | Command::Init { .. }) => Ok(()),
    }
}

async fn run(
    engine: std::sync::Arc<claw_skills::engine::SkillEngine>,
    store: claw_skills::tools::SkillStore,
    config: &Config,
    id: Option<String>,
) -> anyhow::Result<()> {
    // Held for the life of the session; dropping it stops the watch.
    let _watcher = if config.watch {
        Some(watch::watch_store(engine.clone(), store.clone()).context("starting skills watcher")?)
    } else {
        None
    };

    let session = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    info!(session = %session, "session started");

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    cli::run_session(&engine, &store, config, &session, stdin, &mut stdout).await?;

    info!(session = %session, turns = engine.turn(&session), "session ended");
    Ok(())
}
