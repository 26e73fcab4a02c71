//! Shared test harness for the HTTP handler unit tests, mirroring
//! `backbone_orchestrator::pipeline::tests::test_orchestrator` (same
//! in-memory stores, same deterministic echo provider).
#![cfg(test)]

use std::sync::{Arc, Mutex};

use backbone_contacts::ContactStore;
use backbone_core::config::{Config, MemoryConfig};
use backbone_ledger::Ledger;
use backbone_memory::MemoryStore;
use backbone_orchestrator::Orchestrator;
use backbone_provider::{ChatRequest, LlmProvider, ProviderError, ProviderTag, ProxyResponse};
use backbone_proxy::ProxyPool;
use chrono::Utc;

use crate::app::AppState;

pub struct AlwaysOk;

#[async_trait::async_trait]
impl LlmProvider for AlwaysOk {
    fn name(&self) -> &str {
        "always-ok"
    }

    async fn send(&self, request: &ChatRequest) -> Result<ProxyResponse, ProviderError> {
        Ok(ProxyResponse {
            text: format!("echo: {}", request.messages.last().map(|m| m.content.clone()).unwrap_or_default()),
            prompt_tokens: 3,
            completion_tokens: 2,
            tool_calls: None,
            stop_reason: "stop".to_string(),
            timestamp: Utc::now(),
        })
    }
}

pub fn test_state(admin_id: Option<String>) -> Arc<AppState> {
    let contacts_conn = rusqlite::Connection::open_in_memory().unwrap();
    backbone_contacts::db::init_db(&contacts_conn).unwrap();
    let contacts = Arc::new(ContactStore::new(Arc::new(Mutex::new(contacts_conn))));

    let ledger_conn = rusqlite::Connection::open_in_memory().unwrap();
    let ledger = Arc::new(Ledger::new(ledger_conn, 20).unwrap());

    let memory_conn = rusqlite::Connection::open_in_memory().unwrap();
    let memory = Arc::new(MemoryStore::new(memory_conn, MemoryConfig::default()).unwrap());

    let config = Config::default();
    let proxy = Arc::new(ProxyPool::start(&config, vec![(ProviderTag::Ollama, Arc::new(AlwaysOk), 1, None)]));

    let orchestrator = Arc::new(Orchestrator::new(contacts, ledger, memory, proxy, admin_id, 4));

    Arc::new(AppState::new(config, orchestrator, None))
}
