use std::collections::HashMap;
use std::sync::Mutex;

use backbone_contacts::{ContactStore, Resolution};
use backbone_core::error::{BackboneError, Result};
use backbone_core::types::{Id, Mode, Platform, Role};
use backbone_ledger::{Ledger, MessageFilter, SyncEntry};
use backbone_memory::MemoryStore;
use backbone_provider::{ChatMessage, ChatRequest};
use backbone_proxy::ProxyPool;
use chrono::Utc;
use tracing::{error, info, warn};

use crate::brainlet::{BrainletContext, BrainletRegistry};
use crate::intent::{IntentFlags, IntentHandler};
use crate::prompt::SystemPromptContext;
use crate::sanitize::sanitize_content;
use crate::state::ModeState;

/// Fixed stranger-danger reply (spec.md §8 S6); never reaches the LLM or
/// ledger for a platform that requires registration.
const STRANGER_REPLY: &str =
    "I don't recognize you. This assistant only responds to registered contacts.";

/// Interactive turns dispatch at the highest priority so background rollup
/// and dedup jobs (backbone-scheduler's `BACKGROUND_PRIORITY`) never starve
/// them (spec.md §4.2 priority ordering).
const INTERACTIVE_PRIORITY: i32 = 0;

/// Per-turn pipeline states (spec.md §4.5: "Received → Resolved → PreIntent
/// → Enriched → Dispatched → PostIntent → Persisted → Done"). `Failed`
/// replaces `Done` when a state transition the turn cannot recover from is
/// reached; the error that caused it is attached to `TurnOutcome`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Received,
    Resolved,
    PreIntent,
    Enriched,
    Dispatched,
    PostIntent,
    Persisted,
    Done,
    Failed,
}

/// One inbound message to run through the pipeline.
pub struct InboundTurn {
    pub platform: Platform,
    pub external_id: String,
    pub platform_msg_id: Option<String>,
    pub content: String,
    pub model: String,
    pub options: serde_json::Value,
}

pub struct TurnOutcome {
    pub state: TurnState,
    pub reply: String,
    pub contact_id: Option<Id>,
    /// Token accounting from the dispatch response (spec.md §8 S1 "usage.
    /// prompt_tokens > 0"); zero for turns that never reach the LLM (e.g.
    /// the stranger reply).
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Drives the per-turn pipeline (spec.md §4.5 C5). Holds the leaf services
/// it enriches a turn from plus the process-wide mode and brainlet registry;
/// module shape grounded on `skynet-agent::pipeline` (process/context
/// separation into small focused files) with the leaf services held
/// directly rather than behind a `MessageContext` trait object, since this
/// workspace has exactly one channel-agnostic orchestrator rather than many
/// implementors.
pub struct Orchestrator {
    contacts: std::sync::Arc<ContactStore>,
    ledger: std::sync::Arc<Ledger>,
    memory: std::sync::Arc<MemoryStore>,
    proxy: std::sync::Arc<ProxyPool>,
    mode: ModeState,
    brainlets: BrainletRegistry,
    admin_contact_id: Option<String>,
    recent_summary_count: usize,
    last_seen: Mutex<HashMap<(Id, String), chrono::DateTime<Utc>>>,
}

impl Orchestrator {
    pub fn new(
        contacts: std::sync::Arc<ContactStore>,
        ledger: std::sync::Arc<Ledger>,
        memory: std::sync::Arc<MemoryStore>,
        proxy: std::sync::Arc<ProxyPool>,
        admin_contact_id: Option<String>,
        recent_summary_count: usize,
    ) -> Self {
        Self {
            contacts,
            ledger,
            memory,
            proxy,
            mode: ModeState::default(),
            brainlets: BrainletRegistry::new(),
            admin_contact_id,
            recent_summary_count,
            last_seen: Mutex::new(HashMap::new()),
        }
    }

    pub fn brainlets_mut(&mut self) -> &mut BrainletRegistry {
        &mut self.brainlets
    }

    fn is_admin(&self, contact_id: &Id) -> bool {
        self.admin_contact_id.as_deref() == Some(contact_id.as_str())
    }

    /// Runs the full per-turn pipeline. Only a dispatch failure or a
    /// ledger-write failure aborts the turn (spec.md §7 propagation policy);
    /// every other enrichment failure degrades gracefully and is logged.
    pub async fn run_turn(&self, inbound: InboundTurn) -> Result<TurnOutcome> {
        // 1. Identity.
        let resolution = self.contacts.resolve_or_reject(&inbound.platform, &inbound.external_id)?;
        let contact = match resolution {
            Resolution::Stranger => {
                info!(platform = %inbound.platform, external_id = %inbound.external_id, "stranger rejected before LLM/ledger");
                return Ok(TurnOutcome {
                    state: TurnState::Done,
                    reply: STRANGER_REPLY.to_string(),
                    contact_id: None,
                    prompt_tokens: 0,
                    completion_tokens: 0,
                });
            }
            Resolution::Known(c) | Resolution::Placeholder(c) => c,
        };
        let user_id = contact.id.clone();

        // 2. Admin gate.
        let admin = self.is_admin(&user_id);

        // 3. Pre-intent pass (admin only).
        let flags = IntentFlags { mode: admin, memory: admin };
        let content = if admin {
            let handler = IntentHandler::new(&self.mode, &self.memory);
            handler.process(&user_id, &inbound.content, flags)
        } else {
            inbound.content.clone()
        };

        // 4. Mode fetch.
        let mode = if admin { self.mode.get() } else { Mode::guest() };

        // 5. Memory fetch (admin only, up to ~100 memories).
        let memories = if admin {
            match self.memory.list_by_user(&user_id) {
                Ok(mut mems) => {
                    mems.truncate(100);
                    mems.into_iter().map(|m| m.text).collect()
                }
                Err(e) => {
                    warn!("memory fetch failed, continuing with empty context: {e}");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        // 6. Ledger sync: emit just this turn, read back the sanitized buffer.
        let entry = SyncEntry {
            user_id: user_id.clone(),
            platform: inbound.platform.clone(),
            platform_msg_id: inbound.platform_msg_id.clone(),
            role: Role::User,
            content: content.clone(),
            tool_calls: None,
            tool_call_id: None,
        };
        let buffer = self
            .ledger
            .sync(&user_id, &inbound.platform, &[entry])
            .map_err(|e| {
                error!("ledger sync failed, turn unanswerable: {e}");
                e
            })?;

        // 7. Summary fetch.
        let summaries = self
            .ledger
            .summaries(&user_id, None, None, None, self.recent_summary_count)
            .unwrap_or_else(|e| {
                warn!("summary fetch failed, continuing with empty context: {e}");
                Vec::new()
            });

        // Brainlets contribute additional context alongside memories/summaries.
        let brainlet_ctx = BrainletContext {
            user_id: &user_id,
            platform: &inbound.platform,
            mode: &mode,
            content: &content,
        };
        let brainlet_notes = self.brainlets.run_all(&brainlet_ctx).await;
        let mut all_memories = memories;
        all_memories.extend(brainlet_notes);

        // 8. Dispatch.
        let system_prompt = SystemPromptContext {
            mode: mode.clone(),
            memories: all_memories,
            summaries,
            display_name: contact.display_name().to_string(),
            platform: inbound.platform.clone(),
            timestamp: Utc::now(),
        }
        .build();

        let mut messages = vec![ChatMessage::system(system_prompt)];
        messages.extend(buffer.iter().map(|m| ChatMessage {
            role: m.role,
            content: sanitize_content(&m.content),
            tool_calls: m.tool_calls.clone(),
            tool_call_id: m.tool_call_id.clone(),
        }));

        let request = ChatRequest {
            provider: None,
            model: inbound.model,
            messages,
            options: inbound.options,
            tools: None,
            tool_choice: None,
        };

        let response = self
            .proxy
            .dispatch(Id::new().to_string(), request, INTERACTIVE_PRIORITY, None)
            .await
            .map_err(|e| {
                error!("dispatch failed, turn unanswerable: {e}");
                e
            })?;

        // 9. Post-intent pass (admin only). A post-pass failure must never
        // lose the reply (spec.md §7): on any error, fall back to the
        // original text.
        let prompt_tokens = response.prompt_tokens;
        let completion_tokens = response.completion_tokens;
        let reply = if admin {
            let handler = IntentHandler::new(&self.mode, &self.memory);
            handler.process(&user_id, &response.text, IntentFlags { mode: true, memory: true })
        } else {
            response.text
        };

        // 10. Ledger write.
        let reply_entry = SyncEntry {
            user_id: user_id.clone(),
            platform: inbound.platform.clone(),
            platform_msg_id: None,
            role: Role::Assistant,
            content: reply.clone(),
            tool_calls: None,
            tool_call_id: None,
        };
        self.ledger
            .sync(&user_id, &inbound.platform, &[reply_entry])
            .map_err(|e| {
                error!("ledger write-back failed, turn unanswerable: {e}");
                e
            })?;

        // 11. Last-seen update (messaging platforms only; spec.md §4.5 step
        // 11). Not part of the Contact entity (spec.md §3 names no such
        // field), so this is tracked in-process rather than persisted.
        if !matches!(inbound.platform, Platform::Api) {
            let mut last_seen = self.last_seen.lock().unwrap();
            last_seen.insert((user_id.clone(), inbound.platform.to_string()), Utc::now());
        }

        Ok(TurnOutcome {
            state: TurnState::Done,
            reply,
            contact_id: Some(user_id),
            prompt_tokens,
            completion_tokens,
        })
    }

    pub fn last_seen(&self, user_id: &Id, platform: &Platform) -> Option<chrono::DateTime<Utc>> {
        self.last_seen.lock().unwrap().get(&(user_id.clone(), platform.to_string())).copied()
    }

    pub fn recent_messages(&self, user_id: &Id) -> Result<Vec<backbone_core::types::Message>> {
        self.ledger.messages(user_id, &MessageFilter::default())
    }
}

impl From<backbone_contacts::ContactError> for BackboneError {
    fn from(e: backbone_contacts::ContactError) -> Self {
        match e {
            backbone_contacts::ContactError::NotFound(id) => {
                BackboneError::UnknownContact { platform: "unknown".to_string(), external_id: id }
            }
            backbone_contacts::ContactError::DatabaseError(err) => BackboneError::Database(err.to_string()),
            backbone_contacts::ContactError::AlreadyLinked => {
                BackboneError::Input("contact link already claimed".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backbone_core::config::MemoryConfig;
    use backbone_provider::{ProviderError, ProviderTag, ProxyResponse};
    use std::sync::Arc;

    struct AlwaysOk;

    #[async_trait::async_trait]
    impl backbone_provider::LlmProvider for AlwaysOk {
        fn name(&self) -> &str {
            "always-ok"
        }

        async fn send(&self, request: &ChatRequest) -> std::result::Result<ProxyResponse, ProviderError> {
            Ok(ProxyResponse {
                text: format!("echo: {}", request.messages.last().map(|m| m.content.clone()).unwrap_or_default()),
                prompt_tokens: 1,
                completion_tokens: 1,
                tool_calls: None,
                stop_reason: "stop".to_string(),
                timestamp: Utc::now(),
            })
        }
    }

    fn test_orchestrator(admin_id: Option<String>) -> Orchestrator {
        let contacts_conn = rusqlite::Connection::open_in_memory().unwrap();
        backbone_contacts::db::init_db(&contacts_conn).unwrap();
        let contacts = Arc::new(ContactStore::new(Arc::new(Mutex::new(contacts_conn))));

        let ledger_conn = rusqlite::Connection::open_in_memory().unwrap();
        let ledger = Arc::new(Ledger::new(ledger_conn, 20).unwrap());

        let memory_conn = rusqlite::Connection::open_in_memory().unwrap();
        let memory = Arc::new(MemoryStore::new(memory_conn, MemoryConfig::default()).unwrap());

        let config = backbone_core::config::Config::default();
        let proxy = Arc::new(ProxyPool::start(
            &config,
            vec![(ProviderTag::Ollama, Arc::new(AlwaysOk), 1, None)],
        ));

        Orchestrator::new(contacts, ledger, memory, proxy, admin_id, 4)
    }

    #[tokio::test]
    async fn stranger_on_discord_never_reaches_llm_or_ledger() {
        let orchestrator = test_orchestrator(None);
        let outcome = orchestrator
            .run_turn(InboundTurn {
                platform: Platform::Discord,
                external_id: "99999".to_string(),
                platform_msg_id: None,
                content: "hi".to_string(),
                model: "llama3".to_string(),
                options: serde_json::json!({}),
            })
            .await
            .unwrap();

        assert_eq!(outcome.reply, STRANGER_REPLY);
        assert!(outcome.contact_id.is_none());
    }

    #[tokio::test]
    async fn api_happy_path_creates_placeholder_and_persists_both_turns() {
        let orchestrator = test_orchestrator(None);
        let outcome = orchestrator
            .run_turn(InboundTurn {
                platform: Platform::Api,
                external_id: "anon-1".to_string(),
                platform_msg_id: None,
                content: "hello".to_string(),
                model: "llama3".to_string(),
                options: serde_json::json!({}),
            })
            .await
            .unwrap();

        assert!(outcome.reply.contains("echo:"));
        let contact_id = outcome.contact_id.unwrap();
        let messages = orchestrator.recent_messages(&contact_id).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn guest_turn_gets_fixed_guest_mode_and_no_memory() {
        let orchestrator = test_orchestrator(Some("admin-contact".to_string()));
        let outcome = orchestrator
            .run_turn(InboundTurn {
                platform: Platform::Api,
                external_id: "anon-2".to_string(),
                platform_msg_id: None,
                content: "mode('work')".to_string(),
                model: "llama3".to_string(),
                options: serde_json::json!({}),
            })
            .await
            .unwrap();

        assert!(outcome.reply.contains("echo:"));
        assert_eq!(orchestrator.mode.get(), Mode::default());
    }
}
