use std::sync::OnceLock;

use backbone_core::types::{Id, MemoryCategory, Mode};
use backbone_memory::MemoryStore;
use regex::Regex;
use tracing::{debug, warn};

use crate::state::ModeState;

/// Which enrichment passes the caller wants the intent handler to run
/// (spec.md §4.5 "a set of flags {mode, memory}"). Only admin turns set
/// both flags true (spec.md §4.5 step 2 admin gate).
#[derive(Debug, Clone, Copy, Default)]
pub struct IntentFlags {
    pub mode: bool,
    pub memory: bool,
}

fn mode_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // Grounded verbatim on services/brain/app/intents/mode.py's
    // `r'mode\(\s*[\'"]?(.+?)[\'"]?\s*\)'`, case-insensitive.
    PATTERN.get_or_init(|| Regex::new(r#"(?i)mode\(\s*['"]?(.+?)['"]?\s*\)"#).unwrap())
}

fn memory_add_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"(?i)memory_add\(\s*['"]?(.+?)['"]?\s*\)"#).unwrap())
}

fn memory_delete_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"(?i)memory_delete\(\s*['"]?(.+?)['"]?\s*\)"#).unwrap())
}

fn memory_search_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"(?i)memory_search\(\s*['"]?(.+?)['"]?\s*\)"#).unwrap())
}

/// Scans a single message for bracketed directive calls and applies their
/// side effects, generalizing `process_mode`/`process_intents`
/// (services/brain/app/intents/{mode,intents}.py) to the multi-directive set
/// spec.md §4.5 describes: `mode('work')`, `memory_add('text')`,
/// `memory_delete('id')`, `memory_search('query')`. Unknown directives are
/// left in place. A malformed regex match or a failed memory operation is
/// logged and skipped — the handler never propagates an error, matching
/// spec.md §4.5's "the orchestrator must not crash on malformed directives".
pub struct IntentHandler<'a> {
    mode: &'a ModeState,
    memory: &'a MemoryStore,
}

impl<'a> IntentHandler<'a> {
    pub fn new(mode: &'a ModeState, memory: &'a MemoryStore) -> Self {
        Self { mode, memory }
    }

    /// Processes `content` for `user_id` under `flags`, returning the
    /// (possibly rewritten) content. Mode directives are never stripped from
    /// the content (matching the original's behavior: `process_mode` mutates
    /// global state but returns the message unchanged); memory directives are
    /// stripped since their payload has no further use once the side effect
    /// has fired.
    pub fn process(&self, user_id: &Id, content: &str, flags: IntentFlags) -> String {
        let mut out = content.to_string();

        if flags.mode {
            for caps in mode_pattern().captures_iter(content) {
                let Some(arg) = caps.get(1) else { continue };
                let name = arg.as_str().trim();
                if name.is_empty() {
                    continue;
                }
                debug!(mode = name, "intent: mode directive");
                self.mode.set(Mode(name.to_string()));
            }
        }

        if flags.memory {
            out = self.apply_memory_directives(user_id, &out);
        }

        out
    }

    fn apply_memory_directives(&self, user_id: &Id, content: &str) -> String {
        let mut out = memory_add_pattern()
            .replace_all(content, |caps: &regex::Captures| {
                let text = caps[1].trim().to_string();
                if !text.is_empty() {
                    debug!(%user_id, text, "intent: memory_add directive");
                    let new_memory = backbone_memory::NewMemory {
                        user_id: user_id.clone(),
                        category: MemoryCategory::Personal,
                        text,
                        keywords: Vec::new(),
                        priority: 0.5,
                    };
                    if let Err(e) = self.memory.add(new_memory) {
                        warn!(%user_id, "intent: memory_add failed: {e}");
                    }
                }
                String::new()
            })
            .into_owned();

        out = memory_delete_pattern()
            .replace_all(&out, |caps: &regex::Captures| {
                let id = caps[1].trim();
                if !id.is_empty() {
                    debug!(%user_id, id, "intent: memory_delete directive");
                    if let Err(e) = self.memory.delete(&Id::from(id)) {
                        warn!(%user_id, "intent: memory_delete failed: {e}");
                    }
                }
                String::new()
            })
            .into_owned();

        out = memory_search_pattern()
            .replace_all(&out, |caps: &regex::Captures| {
                let query = caps[1].trim();
                if !query.is_empty() {
                    debug!(%user_id, query, "intent: memory_search directive");
                    if let Err(e) = self.memory.search(user_id, query, 10) {
                        warn!(%user_id, "intent: memory_search failed: {e}");
                    }
                }
                String::new()
            })
            .into_owned();

        out.trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn store() -> MemoryStore {
        let conn = Connection::open_in_memory().unwrap();
        MemoryStore::new(conn, backbone_core::config::MemoryConfig::default()).unwrap()
    }

    #[test]
    fn mode_directive_sets_mode_without_rewriting_content() {
        let mode = ModeState::default();
        let memory = store();
        let handler = IntentHandler::new(&mode, &memory);
        let user_id = Id::new();

        let out = handler.process(&user_id, "switch to mode('work') please", IntentFlags { mode: true, memory: false });

        assert_eq!(mode.get(), Mode("work".to_string()));
        assert_eq!(out, "switch to mode('work') please");
    }

    #[test]
    fn unknown_directive_is_left_untouched() {
        let mode = ModeState::default();
        let memory = store();
        let handler = IntentHandler::new(&mode, &memory);
        let user_id = Id::new();

        let out = handler.process(&user_id, "foo_bar('baz')", IntentFlags { mode: true, memory: true });
        assert_eq!(out, "foo_bar('baz')");
    }

    #[test]
    fn memory_add_directive_persists_and_strips_itself() {
        let mode = ModeState::default();
        let memory = store();
        let handler = IntentHandler::new(&mode, &memory);
        let user_id = Id::new();

        let out = handler.process(&user_id, "remember this memory_add('likes rust')", IntentFlags { mode: false, memory: true });

        assert_eq!(out, "remember this");
        let stored = memory.list_by_user(&user_id).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].text, "likes rust");
    }

    #[test]
    fn malformed_directive_does_not_panic() {
        let mode = ModeState::default();
        let memory = store();
        let handler = IntentHandler::new(&mode, &memory);
        let user_id = Id::new();

        let out = handler.process(&user_id, "mode(", IntentFlags { mode: true, memory: true });
        assert_eq!(out, "mode(");
    }
}
