use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use backbone_core::config::MemoryConfig;
use backbone_core::error::{BackboneError, Result};
use backbone_core::types::{Id, MemoryCategory};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, warn};

use crate::keyword::group_by_shared_keywords;
use crate::llm::{parse_merge_decision, DedupLlm};
use crate::types::{row_to_memory, DedupGroup, DedupOutcome, Memory, NewMemory};

fn db_err(e: rusqlite::Error) -> BackboneError {
    BackboneError::Database(e.to_string())
}

/// Owns memories, their keyword sets, and memory↔topic associations
/// (spec.md §4.4 C4). Thread-safe via an internal mutex, matching
/// `skynet-memory::MemoryManager`'s shape.
pub struct MemoryStore {
    db: Mutex<Connection>,
    config: MemoryConfig,
}

impl MemoryStore {
    pub fn new(conn: Connection, config: MemoryConfig) -> Result<Self> {
        crate::db::init_db(&conn).map_err(db_err)?;
        Ok(Self { db: Mutex::new(conn), config })
    }

    pub fn add(&self, new: NewMemory) -> Result<Memory> {
        let db = self.db.lock().unwrap();
        let id = Id::new();
        let now = Utc::now();

        db.execute(
            "INSERT INTO memories (id, user_id, category, text, priority, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![id.as_str(), new.user_id.as_str(), new.category.to_string(), new.text, new.priority, now],
        )
        .map_err(db_err)?;

        db.execute(
            "INSERT INTO memories_fts (memory_id, text) VALUES (?1, ?2)",
            params![id.as_str(), new.text],
        )
        .map_err(db_err)?;

        for keyword in &new.keywords {
            db.execute(
                "INSERT OR IGNORE INTO memory_keywords (memory_id, keyword) VALUES (?1, ?2)",
                params![id.as_str(), keyword.to_lowercase()],
            )
            .map_err(db_err)?;
        }

        Ok(Memory {
            id,
            user_id: new.user_id,
            category: new.category,
            text: new.text,
            keywords: new.keywords.into_iter().map(|k| k.to_lowercase()).collect(),
            priority: new.priority,
            topic_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get(&self, id: &Id) -> Result<Option<Memory>> {
        let db = self.db.lock().unwrap();
        let memory = db
            .query_row(
                "SELECT id, user_id, category, text, priority, created_at, updated_at
                 FROM memories WHERE id = ?1",
                params![id.as_str()],
                row_to_memory,
            )
            .optional()
            .map_err(db_err)?;

        let Some(mut memory) = memory else { return Ok(None) };
        memory.keywords = self.keywords_for(&db, id)?;
        memory.topic_ids = self.topics_for(&db, id)?;
        Ok(Some(memory))
    }

    fn keywords_for(&self, db: &Connection, id: &Id) -> Result<Vec<String>> {
        let mut stmt = db
            .prepare("SELECT keyword FROM memory_keywords WHERE memory_id = ?1")
            .map_err(db_err)?;
        let rows = stmt.query_map(params![id.as_str()], |r| r.get(0)).map_err(db_err)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    fn topics_for(&self, db: &Connection, id: &Id) -> Result<Vec<Id>> {
        let mut stmt = db
            .prepare("SELECT topic_id FROM memory_topics WHERE memory_id = ?1")
            .map_err(db_err)?;
        let rows = stmt.query_map(params![id.as_str()], |r| r.get::<_, String>(0)).map_err(db_err)?;
        Ok(rows.filter_map(|r| r.ok()).map(Id::from).collect())
    }

    pub fn update_text(&self, id: &Id, new_text: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let updated = db
            .execute(
                "UPDATE memories SET text = ?1, updated_at = ?2 WHERE id = ?3",
                params![new_text, Utc::now(), id.as_str()],
            )
            .map_err(db_err)?;
        if updated == 0 {
            return Err(BackboneError::Input(format!("unknown memory {id}")));
        }
        db.execute("UPDATE memories_fts SET text = ?1 WHERE memory_id = ?2", params![new_text, id.as_str()])
            .map_err(db_err)?;
        Ok(())
    }

    pub fn delete(&self, id: &Id) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute("DELETE FROM memories WHERE id = ?1", params![id.as_str()]).map_err(db_err)?;
        db.execute("DELETE FROM memories_fts WHERE memory_id = ?1", params![id.as_str()])
            .map_err(db_err)?;
        Ok(())
    }

    pub fn attach_topic(&self, memory_id: &Id, topic_id: &Id) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT OR IGNORE INTO memory_topics (memory_id, topic_id) VALUES (?1, ?2)",
            params![memory_id.as_str(), topic_id.as_str()],
        )
        .map_err(db_err)?;
        Ok(())
    }

    pub fn search(&self, user_id: &Id, query: &str, limit: usize) -> Result<Vec<Memory>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db
            .prepare(
                "SELECT m.id, m.user_id, m.category, m.text, m.priority, m.created_at, m.updated_at
                 FROM memories m
                 JOIN memories_fts f ON m.id = f.memory_id
                 WHERE m.user_id = ?1 AND memories_fts MATCH ?2
                 ORDER BY rank LIMIT ?3",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![user_id.as_str(), query, limit as i64], row_to_memory)
            .map_err(db_err)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn list_by_user(&self, user_id: &Id) -> Result<Vec<Memory>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db
            .prepare(
                "SELECT id, user_id, category, text, priority, created_at, updated_at
                 FROM memories WHERE user_id = ?1",
            )
            .map_err(db_err)?;
        let rows = stmt.query_map(params![user_id.as_str()], row_to_memory).map_err(db_err)?;
        let mut memories: Vec<Memory> = rows.filter_map(|r| r.ok()).collect();
        for memory in memories.iter_mut() {
            memory.keywords = self.keywords_for(&db, &memory.id)?;
            memory.topic_ids = self.topics_for(&db, &memory.id)?;
        }
        Ok(memories)
    }

    fn all_keyword_sets(&self, user_id: &Id) -> Result<HashMap<Id, HashSet<String>>> {
        let memories = self.list_by_user(user_id)?;
        Ok(memories.into_iter().map(|m| (m.id, m.keywords.into_iter().collect())).collect())
    }

    /// Preview variant of keyword dedup: returns ranked groups without
    /// mutating state (spec.md §4.4 "All operations offer a `preview`
    /// variant").
    pub fn preview_keyword_dedup(&self, user_id: &Id) -> Result<Vec<DedupGroup>> {
        let sets = self.all_keyword_sets(user_id)?;
        let mut groups = group_by_shared_keywords(&sets, self.config.min_shared_keywords);
        groups.truncate(self.config.max_groups_to_process);
        Ok(groups)
    }

    /// Runs keyword dedup end to end: for each ranked group (capped at
    /// `max_groups_to_process`, each capped at `max_memories_per_group`),
    /// asks `llm` for `{update, delete}` and applies it all-or-nothing
    /// (spec.md §4.4: "applying an update that fails aborts deletion for
    /// that group").
    pub fn run_keyword_dedup(&self, user_id: &Id, llm: &dyn DedupLlm) -> Result<Vec<DedupOutcome>> {
        let groups = self.preview_keyword_dedup(user_id)?;
        let mut outcomes = Vec::new();
        for group in groups {
            let mut ids = group.memory_ids;
            ids.truncate(self.config.max_memories_per_group);
            outcomes.push(self.process_group(&ids, llm)?);
        }
        Ok(outcomes)
    }

    fn process_group(&self, memory_ids: &[Id], llm: &dyn DedupLlm) -> Result<DedupOutcome> {
        let group_strs: Vec<String> = memory_ids.iter().map(|i| i.as_str().to_string()).collect();

        let mut lines = Vec::new();
        for id in memory_ids {
            if let Some(memory) = self.get(id)? {
                lines.push(format!("{}|{}", memory.id, memory.text));
            }
        }
        let prompt = format!(
            "Given the following memories, alter them as necessary to deduplicate them. \
             Provide the updated text for each memory, and the ids of the memories that should be deleted.\n\n\
             Format the output as a JSON object: {{\"update\": {{\"memory_id\": \"new_text\"}}, \"delete\": [\"memory_id\"]}}\n\n{}",
            lines.join("\n")
        );

        let response = match llm.complete(&prompt) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "dedup LLM call failed, skipping group");
                return Ok(DedupOutcome { group: group_strs, updated: vec![], deleted: vec![], aborted: true });
            }
        };

        let Some(decision) = parse_merge_decision(&response) else {
            warn!("dedup LLM response was not valid JSON, skipping group");
            return Ok(DedupOutcome { group: group_strs, updated: vec![], deleted: vec![], aborted: true });
        };

        let mut updated = Vec::new();
        let mut update_failed = false;
        for (mem_id, new_text) in &decision.update {
            match self.update_text(&Id::from(mem_id.clone()), new_text) {
                Ok(()) => updated.push(mem_id.clone()),
                Err(e) => {
                    warn!(memory_id = %mem_id, error = %e, "failed to apply memory update");
                    update_failed = true;
                }
            }
        }

        if update_failed {
            debug!("aborting deletions for group: at least one update failed");
            return Ok(DedupOutcome { group: group_strs, updated, deleted: vec![], aborted: true });
        }

        let mut deleted = Vec::new();
        for mem_id in &decision.delete {
            if self.delete(&Id::from(mem_id.clone())).is_ok() {
                deleted.push(mem_id.clone());
            }
        }

        Ok(DedupOutcome { group: group_strs, updated, deleted, aborted: false })
    }

    /// Memories for the embedder to cluster (spec.md §4.4 semantic dedup:
    /// "embed each memory (or a candidate subset)"). Callers that have an
    /// `Embedder` should call `crate::cluster::dbscan` on the returned
    /// embeddings and feed clusters back through `run_keyword_dedup`-style
    /// group processing via `process_group_public`.
    pub fn memories_for_embedding(&self, user_id: &Id) -> Result<Vec<Memory>> {
        self.list_by_user(user_id)
    }

    /// Exposes group processing for the semantic dedup path, which derives
    /// its groups from DBSCAN clusters rather than keyword overlap.
    pub fn process_cluster(&self, memory_ids: &[Id], llm: &dyn DedupLlm) -> Result<DedupOutcome> {
        let mut ids = memory_ids.to_vec();
        ids.truncate(self.config.max_memories_per_group);
        self.process_group(&ids, llm)
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Topics with at least `min_count` associated memories (spec.md §4.4
    /// semantic topic dedup: "retrieve topics with ≥min_memory_count
    /// associated memories"). Names are resolved by the ledger, not here —
    /// this crate only tracks the association.
    pub fn topics_with_min_memories(&self, min_count: usize) -> Result<Vec<(Id, usize)>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db
            .prepare("SELECT topic_id, COUNT(*) as cnt FROM memory_topics GROUP BY topic_id HAVING cnt >= ?1")
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![min_count as i64], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? as usize)))
            .map_err(db_err)?;
        Ok(rows.filter_map(|r| r.ok()).map(|(id, count)| (Id::from(id), count)).collect())
    }

    pub fn count_for_topic(&self, topic_id: &Id) -> Result<usize> {
        let db = self.db.lock().unwrap();
        let count: i64 = db
            .query_row(
                "SELECT COUNT(*) FROM memory_topics WHERE topic_id = ?1",
                params![topic_id.as_str()],
                |r| r.get(0),
            )
            .map_err(db_err)?;
        Ok(count as usize)
    }

    /// Moves every association from `secondary` to `primary`, skipping ones
    /// that already exist for `primary` (spec.md §4.4: "move each
    /// memory_topic association from a secondary topic to the primary,
    /// skipping associations that already exist").
    pub fn reassign_topic(&self, secondary: &Id, primary: &Id) -> Result<usize> {
        let db = self.db.lock().unwrap();
        let moved = db
            .execute(
                "UPDATE OR IGNORE memory_topics SET topic_id = ?1 WHERE topic_id = ?2",
                params![primary.as_str(), secondary.as_str()],
            )
            .map_err(db_err)?;
        // UPDATE OR IGNORE leaves rows that would collide with an existing
        // (memory_id, primary) pair untouched; drop those stale secondary rows.
        db.execute("DELETE FROM memory_topics WHERE topic_id = ?1", params![secondary.as_str()])
            .map_err(db_err)?;
        Ok(moved)
    }

    pub fn category_memories(&self, user_id: &Id, category: MemoryCategory) -> Result<Vec<Memory>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db
            .prepare(
                "SELECT id, user_id, category, text, priority, created_at, updated_at
                 FROM memories WHERE user_id = ?1 AND category = ?2",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![user_id.as_str(), category.to_string()], row_to_memory)
            .map_err(db_err)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedLlm(String);
    impl DedupLlm for FixedLlm {
        fn complete(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    struct FailingLlm;
    impl DedupLlm for FailingLlm {
        fn complete(&self, _prompt: &str) -> Result<String> {
            Err(BackboneError::Internal("boom".to_string()))
        }
    }

    fn store() -> MemoryStore {
        let conn = Connection::open_in_memory().unwrap();
        MemoryStore::new(conn, MemoryConfig::default()).unwrap()
    }

    fn new_memory(user_id: &Id, text: &str, keywords: &[&str]) -> NewMemory {
        NewMemory {
            user_id: user_id.clone(),
            category: MemoryCategory::Personal,
            text: text.to_string(),
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            priority: 0.5,
        }
    }

    #[test]
    fn add_and_get_round_trips_keywords() {
        let store = store();
        let user_id = Id::new();
        let created = store.add(new_memory(&user_id, "likes rust", &["Rust", "Programming"])).unwrap();
        let fetched = store.get(&created.id).unwrap().unwrap();
        assert_eq!(fetched.keywords.len(), 2);
        assert!(fetched.keywords.contains(&"rust".to_string()));
    }

    #[test]
    fn keyword_dedup_applies_updates_then_deletes() {
        let store = store();
        let user_id = Id::new();
        let m1 = store.add(new_memory(&user_id, "a", &["x", "y", "z"])).unwrap();
        let m2 = store.add(new_memory(&user_id, "b", &["x", "y", "q"])).unwrap();

        let llm = FixedLlm(format!(
            r#"{{"update": {{"{}": "merged text"}}, "delete": ["{}"]}}"#,
            m1.id, m2.id
        ));

        let outcomes = store.run_keyword_dedup(&user_id, &llm).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].aborted);
        assert_eq!(store.get(&m1.id).unwrap().unwrap().text, "merged text");
        assert!(store.get(&m2.id).unwrap().is_none());
    }

    #[test]
    fn failing_llm_call_skips_the_group_without_mutating_state() {
        let store = store();
        let user_id = Id::new();
        let m1 = store.add(new_memory(&user_id, "a", &["x", "y", "z"])).unwrap();
        let m2 = store.add(new_memory(&user_id, "b", &["x", "y", "q"])).unwrap();

        let outcomes = store.run_keyword_dedup(&user_id, &FailingLlm).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].aborted);
        assert_eq!(store.get(&m1.id).unwrap().unwrap().text, "a");
        assert_eq!(store.get(&m2.id).unwrap().unwrap().text, "b");
    }

    #[test]
    fn malformed_llm_response_aborts_without_mutating() {
        let store = store();
        let user_id = Id::new();
        store.add(new_memory(&user_id, "a", &["x", "y", "z"])).unwrap();
        store.add(new_memory(&user_id, "b", &["x", "y", "q"])).unwrap();

        let llm = FixedLlm("not json at all".to_string());
        let outcomes = store.run_keyword_dedup(&user_id, &llm).unwrap();
        assert!(outcomes[0].aborted);
    }

    #[test]
    fn reassign_topic_skips_existing_associations() {
        let store = store();
        let user_id = Id::new();
        let m1 = store.add(new_memory(&user_id, "a", &["x"])).unwrap();
        let primary = Id::new();
        let secondary = Id::new();

        store.attach_topic(&m1.id, &secondary).unwrap();
        store.reassign_topic(&secondary, &primary).unwrap();

        assert_eq!(store.count_for_topic(&secondary).unwrap(), 0);
        assert_eq!(store.count_for_topic(&primary).unwrap(), 1);
    }
}
