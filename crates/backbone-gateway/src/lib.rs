//! `backbone-gateway` — external HTTP surface (spec.md §6 External
//! Interfaces). An axum server exposing OpenAI-compatible completion/model
//! endpoints and per-platform webhooks, all backed by a single
//! `backbone_orchestrator::Orchestrator`.

pub mod app;
pub mod error;
pub mod http;
pub mod tokens;

#[cfg(test)]
mod test_support;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use backbone_contacts::ContactStore;
use backbone_core::config::Config;
use backbone_ledger::Ledger;
use backbone_memory::MemoryStore;
use backbone_orchestrator::Orchestrator;
use backbone_provider::providers_from_config;
use backbone_proxy::ProxyPool;
use rusqlite::Connection;
use tracing::info;

pub use app::{build_router, AppState};

/// Wires every leaf store and configured provider into one `Orchestrator`
/// and binds the axum router to `config.gateway.{bind,port}`. Shared by the
/// `backbone-gateway` binary and `backbone-cli serve`, so there is exactly
/// one place that knows how to stand this process up.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let contacts_conn = Connection::open(&config.database.path)?;
    backbone_contacts::db::init_db(&contacts_conn)?;
    let contacts = Arc::new(ContactStore::new(Arc::new(Mutex::new(contacts_conn))));

    let ledger_conn = Connection::open(&config.database.path)?;
    let ledger = Arc::new(Ledger::new(ledger_conn, config.ledger.buffer_window)?);

    let memory_conn = Connection::open(&config.database.path)?;
    let memory = Arc::new(MemoryStore::new(memory_conn, config.memory.clone())?);

    let configured = providers_from_config(&config);
    if configured.entries.is_empty() {
        tracing::warn!("no providers configured; every dispatch will fail with UnknownProvider");
    }
    let proxy = Arc::new(ProxyPool::start(&config, configured.entries));

    let orchestrator = Arc::new(Orchestrator::new(
        contacts,
        ledger,
        memory,
        proxy,
        config.admin_contact_id.clone(),
        config.summary.recent_summary_count,
    ));

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;
    let state = Arc::new(AppState::new(config, orchestrator, configured.ollama));
    let router = build_router(state);

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!("backbone gateway listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
