//! `backbone` — operational CLI (spec.md §6 "CLI adjuncts"). Wraps the same
//! store/provider wiring `backbone-gateway::serve` uses for `serve`, and
//! drives `backbone-scheduler::JobRunner`'s one-shot dedup/rollup passes
//! directly for `dedup run`, without needing the scheduler's own polling
//! loop. Exit codes follow spec.md §6: `0` success, `1` operational failure
//! or user-cancel.

use std::process::ExitCode;
use std::sync::Arc;

use backbone_core::config::Config;
use backbone_core::types::Id;
use backbone_memory::{FastEmbedEmbedder, MemoryStore};
use backbone_proxy::ProxyPool;
use backbone_scheduler::{JobRunner, ProxyLlm};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "backbone", about = "Operational CLI for the backbone assistant process")]
struct Cli {
    /// Path to a TOML config file; falls back to BACKBONE_-prefixed env vars
    /// and defaults, same resolution as the gateway binary.
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP gateway (same entrypoint as the `backbone-gateway` binary).
    Serve,
    /// Create every store's schema against the configured database, without starting a server.
    Migrate,
    /// Run a background dedup pass for one user, outside the scheduler's own polling loop.
    Dedup {
        #[command(subcommand)]
        action: DedupAction,
    },
}

#[derive(Subcommand)]
enum DedupAction {
    Run {
        /// Contact id to run dedup for.
        #[arg(long)]
        user: String,
        /// Run keyword dedup.
        #[arg(long)]
        keyword: bool,
        /// Run semantic (embedding) dedup.
        #[arg(long)]
        semantic: bool,
        /// Run cross-user topic dedup.
        #[arg(long)]
        topics: bool,
        /// Model tag to use for the dedup LLM calls.
        #[arg(long, default_value = "default")]
        model: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "backbone_cli=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!("config load failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Command::Serve => backbone_gateway::serve(config).await,
        Command::Migrate => migrate(&config),
        Command::Dedup { action } => run_dedup(&config, action).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn migrate(config: &Config) -> anyhow::Result<()> {
    let conn = Connection::open(&config.database.path)?;
    backbone_contacts::db::init_db(&conn)?;
    backbone_ledger::db::init_db(&conn)?;
    backbone_memory::db::init_db(&conn)?;
    backbone_scheduler::db::init_db(&conn)?;
    info!(path = %config.database.path, "schema migration complete");
    Ok(())
}

async fn run_dedup(config: &Config, action: DedupAction) -> anyhow::Result<()> {
    let DedupAction::Run { user, keyword, semantic, topics, model } = action;
    if !keyword && !semantic && !topics {
        anyhow::bail!("pass at least one of --keyword, --semantic, --topics");
    }

    let ledger_conn = Connection::open(&config.database.path)?;
    let ledger = Arc::new(backbone_ledger::Ledger::new(ledger_conn, config.ledger.buffer_window)?);

    let memory_conn = Connection::open(&config.database.path)?;
    let memory = Arc::new(MemoryStore::new(memory_conn, config.memory.clone())?);

    let embedder: Arc<dyn backbone_memory::Embedder> = Arc::new(FastEmbedEmbedder::try_new()?);

    let configured = backbone_provider::providers_from_config(config);
    if configured.entries.is_empty() {
        anyhow::bail!("no providers configured; dedup needs at least one to run its LLM passes");
    }
    let proxy = Arc::new(ProxyPool::start(config, configured.entries));
    let llm = Arc::new(ProxyLlm::new(proxy, model));

    let runner = JobRunner::new(ledger, memory, embedder, llm, config.summary.clone());
    let user_id = Id::from(user.clone());

    if keyword {
        runner.run(&serde_json::to_string(&backbone_scheduler::JobAction::KeywordDedup { user_id: user_id.clone() })?)?;
        info!(%user, "keyword dedup complete");
    }
    if semantic {
        runner.run(&serde_json::to_string(&backbone_scheduler::JobAction::SemanticDedup { user_id: user_id.clone() })?)?;
        info!(%user, "semantic dedup complete");
    }
    if topics {
        runner.run(&serde_json::to_string(&backbone_scheduler::JobAction::TopicDedup)?)?;
        info!("topic dedup complete");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_parses_with_no_extra_args() {
        let cli = Cli::try_parse_from(["backbone", "serve"]).unwrap();
        assert!(matches!(cli.command, Command::Serve));
    }

    #[test]
    fn dedup_run_requires_a_user() {
        let err = Cli::try_parse_from(["backbone", "dedup", "run", "--keyword"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn dedup_run_parses_selected_passes() {
        let cli = Cli::try_parse_from(["backbone", "dedup", "run", "--user", "abc", "--semantic", "--topics"]).unwrap();
        let Command::Dedup { action: DedupAction::Run { user, keyword, semantic, topics, .. } } = cli.command else {
            panic!("expected Dedup::Run");
        };
        assert_eq!(user, "abc");
        assert!(!keyword);
        assert!(semantic);
        assert!(topics);
    }
}
