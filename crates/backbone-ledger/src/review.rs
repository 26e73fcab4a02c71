use backbone_core::error::Result;
use backbone_core::types::{Id, Message, MemoryCategory};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::ledger::Ledger;

/// Seam to the LLM used for the background `review_log()` pass (spec.md
/// §4.3). Sync like `backbone-memory::DedupLlm` — the caller (scheduler)
/// supplies a proxy-backed implementation.
pub trait ReviewLlm: Send + Sync {
    fn analyze(&self, conversation_log: &str) -> Result<String>;
}

/// One memory payload extracted from a topic shift. Ownership of the
/// `memories` table belongs to `backbone-memory`; this crate only parses
/// and hands the payload to whichever caller owns a `MemoryStore`.
#[derive(Debug, Clone)]
pub struct ExtractedMemory {
    pub text: String,
    pub keywords: Vec<String>,
    pub category: MemoryCategory,
}

/// One identified conversational shift, with its newly-created ledger topic
/// and the memories extracted from it.
#[derive(Debug, Clone)]
pub struct ReviewOutcome {
    pub topic_id: Id,
    pub topic_name: String,
    pub memories: Vec<ExtractedMemory>,
}

#[derive(Debug, Deserialize)]
struct RawAnalysis {
    topics: Vec<RawTopic>,
}

#[derive(Debug, Deserialize)]
struct RawTopic {
    topic: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    memories: Vec<RawMemory>,
}

#[derive(Debug, Deserialize)]
struct RawMemory {
    memory: String,
    #[serde(default)]
    keywords: Vec<String>,
    category: String,
}

/// The prompt grounded on `original_source/services/brain/app/memories/review_log.py`'s
/// inline prompt text: identify conversational shifts and extract memories
/// in one pass, output as the JSON shape `RawAnalysis` parses.
fn build_prompt(conversation_log: &str) -> String {
    format!(
        "Given the following log, identify and list the major conversational shifts.\n\
         - Do not give commentary.\n\
         - Only list significant shifts in conversation.\n\
         - Consolidate all subtopics into a single topic.\n\
         - After each conversational shift, specify a short phrase that defines this topic.\n\
         - Treat all parts of the conversation that center around the same general theme as one \
           topic; only consider it a new topic if the general theme changes.\n\n\
         Once you have identified the conversational shifts, examine each and determine if there \
         is any data that should be saved as a memory.\n\
         - Memories should include anything that might be referenced in later conversations.\n\
         - Do not include things the model likely already knows.\n\
         - Identify up to 4 relevant keywords for each memory.\n\
         - Include a category for the memory, one of: Health, Career, Family, Personal, \
           Technical Projects, Social, Finance, Self-care, Environment, Hobbies, Philosophy.\n\n\
         Output JSON matching: {{\"topics\": [{{\"topic\": ..., \"start\": ..., \"end\": ..., \
         \"memories\": [{{\"memory\": ..., \"keywords\": [...], \"category\": ...}}]}}]}}\n\
         Do not include any formatting outside the JSON object.\n\n{conversation_log}"
    )
}

fn build_conversation_log(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("{}|{}|{}", m.created_at.to_rfc3339(), m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn category_from_original(raw: &str) -> Option<MemoryCategory> {
    let normalized = raw.to_lowercase().replace(' ', "_");
    normalized.parse().ok()
}

impl Ledger {
    /// Runs the background topic/memory extraction pass for one user
    /// (spec.md §4.3 `review_log()`): aggregates untagged messages with the
    /// tail of the most recent topic, asks the LLM to segment the log into
    /// topic shifts, creates a ledger topic and assigns its message range
    /// for each, and returns the extracted memory payloads for the caller
    /// to hand to a `MemoryStore`.
    ///
    /// Per spec.md §4.4's failure semantics ("all LLM interactions that
    /// expect JSON MUST tolerate malformed responses"), a malformed
    /// response yields an empty result rather than an error — the pass is
    /// simply retried on the next scheduled run.
    pub fn run_review_log(&self, user_id: &Id, llm: &dyn ReviewLlm) -> Result<Vec<ReviewOutcome>> {
        let untagged = self.untagged_messages(user_id)?;
        if untagged.is_empty() {
            return Ok(Vec::new());
        }

        let mut all_messages = Vec::new();
        if let Some(recent) = self.topics_recent(user_id, 1)?.into_iter().next() {
            all_messages.extend(self.topic_messages(&recent.id)?);
        }
        all_messages.extend(untagged.iter().cloned());

        let log = build_conversation_log(&all_messages);
        let raw = llm.analyze(&build_prompt(&log))?;

        let parsed: RawAnalysis = match serde_json::from_str(raw.trim()) {
            Ok(p) => p,
            Err(e) => {
                warn!(user_id = %user_id, "review_log response was not valid JSON: {e}");
                return Ok(Vec::new());
            }
        };

        let mut outcomes = Vec::with_capacity(parsed.topics.len());
        for raw_topic in parsed.topics {
            let topic_id = self.create_topic(user_id, &raw_topic.topic)?;
            self.assign_range(&topic_id, raw_topic.start, raw_topic.end)?;

            let memories = raw_topic
                .memories
                .into_iter()
                .filter_map(|m| {
                    let category = category_from_original(&m.category)?;
                    Some(ExtractedMemory {
                        text: m.memory,
                        keywords: m.keywords,
                        category,
                    })
                })
                .collect();

            outcomes.push(ReviewOutcome {
                topic_id,
                topic_name: raw_topic.topic,
                memories,
            });
        }

        let untagged_ids: Vec<Id> = untagged.into_iter().map(|m| m.id).collect();
        self.mark_reviewed(&untagged_ids)?;

        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backbone_core::types::Platform;
    use rusqlite::Connection;

    struct FixedLlm(String);
    impl ReviewLlm for FixedLlm {
        fn analyze(&self, _conversation_log: &str) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    fn ledger() -> Ledger {
        Ledger::new(Connection::open_in_memory().unwrap(), 20).unwrap()
    }

    #[test]
    fn no_untagged_messages_yields_no_outcomes() {
        let ledger = ledger();
        let user_id = Id::new();
        let llm = FixedLlm("{}".to_string());
        let outcomes = ledger.run_review_log(&user_id, &llm).unwrap();
        assert!(outcomes.is_empty());
    }

    #[test]
    fn well_formed_response_creates_topic_and_memories() {
        let ledger = ledger();
        let user_id = Id::new();
        let entry = crate::types::SyncEntry {
            user_id: user_id.clone(),
            platform: Platform::Api,
            platform_msg_id: None,
            role: backbone_core::types::Role::User,
            content: "I started learning the guitar this week".to_string(),
            tool_calls: None,
            tool_call_id: None,
        };
        ledger.sync(&user_id, &Platform::Api, &[entry]).unwrap();

        let start = Utc::now() - chrono::Duration::minutes(5);
        let end = Utc::now() + chrono::Duration::minutes(5);
        let raw = format!(
            r#"{{"topics": [{{"topic": "guitar", "start": "{}", "end": "{}",
               "memories": [{{"memory": "learning guitar", "keywords": ["guitar", "music"], "category": "Hobbies"}}]}}]}}"#,
            start.to_rfc3339(),
            end.to_rfc3339(),
        );
        let llm = FixedLlm(raw);

        let outcomes = ledger.run_review_log(&user_id, &llm).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].topic_name, "guitar");
        assert_eq!(outcomes[0].memories.len(), 1);
        assert_eq!(outcomes[0].memories[0].category, MemoryCategory::Hobbies);

        // The message is now reviewed, so a second pass finds nothing new.
        let second = ledger.run_review_log(&user_id, &FixedLlm("{}".to_string())).unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn malformed_json_yields_empty_result_not_an_error() {
        let ledger = ledger();
        let user_id = Id::new();
        let entry = crate::types::SyncEntry {
            user_id: user_id.clone(),
            platform: Platform::Api,
            platform_msg_id: None,
            role: backbone_core::types::Role::User,
            content: "hello".to_string(),
            tool_calls: None,
            tool_call_id: None,
        };
        ledger.sync(&user_id, &Platform::Api, &[entry]).unwrap();

        let outcomes = ledger.run_review_log(&user_id, &FixedLlm("not json".to_string())).unwrap();
        assert!(outcomes.is_empty());
    }
}
