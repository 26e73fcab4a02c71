use std::sync::Mutex;

use backbone_core::error::{BackboneError, Result};
use backbone_core::types::{Id, Message, Platform, SummaryType};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::types::{row_to_message, row_to_summary, row_to_topic, MessageFilter, Summary, SyncEntry, Topic};

fn db_err(e: rusqlite::Error) -> BackboneError {
    BackboneError::Database(e.to_string())
}

/// Owns the canonical conversation log (spec.md §4.3 C3). Thread-safe via an
/// internal mutex, matching `skynet-memory::MemoryManager`'s shape.
pub struct Ledger {
    db: Mutex<Connection>,
    buffer_window: usize,
}

impl Ledger {
    pub fn new(conn: Connection, buffer_window: usize) -> Result<Self> {
        crate::db::init_db(&conn).map_err(db_err)?;
        Ok(Self {
            db: Mutex::new(conn),
            buffer_window,
        })
    }

    /// Idempotently merges `entries` into the log and returns the post-sync
    /// rolling buffer (spec.md §4.3, §8 property 1). Entries whose
    /// `(user_id, platform, platform_msg_id)` already exist are skipped;
    /// entries with no `platform_msg_id` are always appended, relying on
    /// SQLite's NULL-is-distinct UNIQUE semantics.
    pub fn sync(&self, user_id: &Id, platform: &Platform, entries: &[SyncEntry]) -> Result<Vec<Message>> {
        let db = self.db.lock().unwrap();
        let now = Utc::now();

        for (i, entry) in entries.iter().enumerate() {
            let id = Id::new();
            let tool_calls_json = entry
                .tool_calls
                .as_ref()
                .map(|tc| serde_json::to_string(tc))
                .transpose()?;
            // Distinct per-entry timestamp so a multi-message snapshot's
            // created_at order matches send order, not just uuid-v7 id order.
            let created_at = now + chrono::Duration::nanoseconds(i as i64);

            let inserted = db
                .execute(
                    "INSERT OR IGNORE INTO messages
                     (id, user_id, platform, platform_msg_id, role, content,
                      tool_calls, tool_call_id, created_at, topic_id, reviewed)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL, 0)",
                    params![
                        id.as_str(),
                        entry.user_id.as_str(),
                        entry.platform.to_string(),
                        entry.platform_msg_id,
                        entry.role.to_string(),
                        entry.content,
                        tool_calls_json,
                        entry.tool_call_id,
                        created_at,
                    ],
                )
                .map_err(db_err)?;

            if inserted == 0 && entry.platform_msg_id.is_some() {
                debug!(
                    user_id = %entry.user_id,
                    platform_msg_id = ?entry.platform_msg_id,
                    "sync skipped already-present message"
                );
            }
        }

        self.tail_buffer_locked(&db, user_id, platform)
    }

    fn tail_buffer_locked(&self, db: &Connection, user_id: &Id, platform: &Platform) -> Result<Vec<Message>> {
        let mut stmt = db
            .prepare(
                "SELECT id, user_id, platform, platform_msg_id, role, content,
                        tool_calls, tool_call_id, created_at, topic_id
                 FROM messages
                 WHERE user_id = ?1 AND platform = ?2
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?3",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![user_id.as_str(), platform.to_string(), self.buffer_window as i64], row_to_message)
            .map_err(db_err)?;
        let mut messages: Vec<Message> = rows.filter_map(|r| r.ok()).collect();
        messages.reverse();
        Ok(messages)
    }

    pub fn messages(&self, user_id: &Id, filter: &MessageFilter) -> Result<Vec<Message>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db
            .prepare(
                "SELECT id, user_id, platform, platform_msg_id, role, content,
                        tool_calls, tool_call_id, created_at, topic_id
                 FROM messages
                 WHERE user_id = ?1
                   AND (?2 IS NULL OR created_at >= ?2)
                   AND (?3 IS NULL OR created_at <= ?3)
                   AND (?4 IS NULL OR topic_id = ?4)
                 ORDER BY created_at ASC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(
                params![
                    user_id.as_str(),
                    filter.since,
                    filter.until,
                    filter.topic_id.as_ref().map(|t| t.as_str().to_string()),
                ],
                row_to_message,
            )
            .map_err(db_err)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Messages not yet folded into a topic by `review_log()` (spec.md §4.3).
    pub fn untagged_messages(&self, user_id: &Id) -> Result<Vec<Message>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db
            .prepare(
                "SELECT id, user_id, platform, platform_msg_id, role, content,
                        tool_calls, tool_call_id, created_at, topic_id
                 FROM messages
                 WHERE user_id = ?1 AND reviewed = 0
                 ORDER BY created_at ASC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![user_id.as_str()], row_to_message)
            .map_err(db_err)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn mark_reviewed(&self, message_ids: &[Id]) -> Result<()> {
        let db = self.db.lock().unwrap();
        for id in message_ids {
            db.execute("UPDATE messages SET reviewed = 1 WHERE id = ?1", params![id.as_str()])
                .map_err(db_err)?;
        }
        Ok(())
    }

    pub fn topics_recent(&self, user_id: &Id, n: usize) -> Result<Vec<Topic>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db
            .prepare(
                "SELECT id, user_id, name, created_at FROM topics
                 WHERE user_id = ?1 ORDER BY created_at DESC LIMIT ?2",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![user_id.as_str(), n as i64], row_to_topic)
            .map_err(db_err)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn topic_messages(&self, topic_id: &Id) -> Result<Vec<Message>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db
            .prepare(
                "SELECT id, user_id, platform, platform_msg_id, role, content,
                        tool_calls, tool_call_id, created_at, topic_id
                 FROM messages WHERE topic_id = ?1 ORDER BY created_at ASC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![topic_id.as_str()], row_to_message)
            .map_err(db_err)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn create_topic(&self, user_id: &Id, name: &str) -> Result<Id> {
        let db = self.db.lock().unwrap();
        let id = Id::new();
        db.execute(
            "INSERT INTO topics (id, user_id, name, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id.as_str(), user_id.as_str(), name, Utc::now()],
        )
        .map_err(db_err)?;
        Ok(id)
    }

    /// Assigns every message in `[start, end]` for `topic.user_id` to `topic_id`
    /// (spec.md §4.3 `assign_range`, driven by `review_log()`).
    pub fn assign_range(&self, topic_id: &Id, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<usize> {
        let db = self.db.lock().unwrap();
        let topic_user: Option<String> = db
            .query_row("SELECT user_id FROM topics WHERE id = ?1", params![topic_id.as_str()], |r| r.get(0))
            .optional()
            .map_err(db_err)?;
        let Some(user_id) = topic_user else {
            return Err(BackboneError::Input(format!("unknown topic {topic_id}")));
        };

        let updated = db
            .execute(
                "UPDATE messages SET topic_id = ?1, reviewed = 1
                 WHERE user_id = ?2 AND created_at >= ?3 AND created_at <= ?4",
                params![topic_id.as_str(), user_id, start, end],
            )
            .map_err(db_err)?;
        Ok(updated)
    }

    pub fn topic_by_id(&self, topic_id: &Id) -> Result<Option<Topic>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT id, user_id, name, created_at FROM topics WHERE id = ?1",
            params![topic_id.as_str()],
            row_to_topic,
        )
        .optional()
        .map_err(db_err)
    }

    /// Renames a topic (spec.md §4.4 semantic topic dedup: "rename
    /// primary" with the LLM-chosen final name).
    pub fn rename_topic(&self, topic_id: &Id, new_name: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute("UPDATE topics SET name = ?1 WHERE id = ?2", params![new_name, topic_id.as_str()])
            .map_err(db_err)?;
        Ok(())
    }

    /// Deletes a secondary topic once its memory associations have been
    /// moved (spec.md §4.4: "delete secondary topics"). Messages still
    /// pointing at it fall back to `topic_id = NULL` via the foreign key.
    pub fn delete_topic(&self, topic_id: &Id) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute("DELETE FROM topics WHERE id = ?1", params![topic_id.as_str()]).map_err(db_err)?;
        Ok(())
    }

    pub fn summaries(
        &self,
        user_id: &Id,
        summary_type: Option<SummaryType>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Summary>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db
            .prepare(
                "SELECT id, user_id, summary_type, window_start, window_end, content, created_at
                 FROM summaries
                 WHERE user_id = ?1
                   AND (?2 IS NULL OR summary_type = ?2)
                   AND (?3 IS NULL OR window_start >= ?3)
                   AND (?4 IS NULL OR window_end <= ?4)
                 ORDER BY window_start DESC LIMIT ?5",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(
                params![
                    user_id.as_str(),
                    summary_type.map(|t| t.to_string()),
                    from,
                    to,
                    limit as i64,
                ],
                row_to_summary,
            )
            .map_err(db_err)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Idempotent by `(user_id, summary_type, window)` (spec.md §4.3: "all
    /// rollup operations are idempotent ... re-running with the same inputs
    /// must not produce duplicates"). A second call with the same window
    /// returns the existing row untouched rather than overwriting it.
    pub fn write_summary(
        &self,
        user_id: &Id,
        summary_type: SummaryType,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        content: &str,
    ) -> Result<Summary> {
        let db = self.db.lock().unwrap();
        let existing: Option<String> = db
            .query_row(
                "SELECT id FROM summaries
                 WHERE user_id = ?1 AND summary_type = ?2 AND window_start = ?3 AND window_end = ?4",
                params![user_id.as_str(), summary_type.to_string(), window_start, window_end],
                |r| r.get(0),
            )
            .optional()
            .map_err(db_err)?;

        let id = if let Some(existing_id) = existing {
            debug!(user_id = %user_id, %summary_type, "rollup already exists, skipping duplicate write");
            existing_id
        } else {
            let id = Id::new();
            db.execute(
                "INSERT INTO summaries (id, user_id, summary_type, window_start, window_end, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![id.as_str(), user_id.as_str(), summary_type.to_string(), window_start, window_end, content, Utc::now()],
            )
            .map_err(db_err)?;
            id.as_str().to_string()
        };

        let db_row = db
            .query_row(
                "SELECT id, user_id, summary_type, window_start, window_end, content, created_at
                 FROM summaries WHERE id = ?1",
                params![id],
                row_to_summary,
            )
            .map_err(db_err)?;
        Ok(db_row)
    }

    /// Deletes consumed period summaries once folded into a daily rollup
    /// (spec.md §4.3: "writes the daily summary, and deletes the consumed
    /// period summaries"). Weekly/monthly rollups must NOT call this.
    pub fn delete_summaries(&self, user_id: &Id, summary_type: SummaryType, window_start: DateTime<Utc>, window_end: DateTime<Utc>) -> Result<usize> {
        let db = self.db.lock().unwrap();
        db.execute(
            "DELETE FROM summaries
             WHERE user_id = ?1 AND summary_type = ?2 AND window_start >= ?3 AND window_end <= ?4",
            params![user_id.as_str(), summary_type.to_string(), window_start, window_end],
        )
        .map_err(db_err)
    }

    pub fn sweep_orphans(&self) -> Result<usize> {
        let db = self.db.lock().unwrap();
        crate::db::sweep_orphans(&db).map_err(db_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backbone_core::types::Role;

    fn ledger() -> Ledger {
        let conn = Connection::open_in_memory().unwrap();
        Ledger::new(conn, 3).unwrap()
    }

    fn entry(user_id: &Id, platform_msg_id: Option<&str>, content: &str) -> SyncEntry {
        SyncEntry {
            user_id: user_id.clone(),
            platform: Platform::Api,
            platform_msg_id: platform_msg_id.map(String::from),
            role: Role::User,
            content: content.to_string(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    #[test]
    fn sync_is_idempotent_on_platform_msg_id() {
        let ledger = ledger();
        let user_id = Id::new();

        ledger.sync(&user_id, &Platform::Api, &[entry(&user_id, Some("m1"), "hi")]).unwrap();
        ledger.sync(&user_id, &Platform::Api, &[entry(&user_id, Some("m1"), "hi")]).unwrap();

        let all = ledger.messages(&user_id, &MessageFilter::default()).unwrap();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn sync_always_appends_when_platform_msg_id_absent() {
        let ledger = ledger();
        let user_id = Id::new();

        ledger.sync(&user_id, &Platform::Api, &[entry(&user_id, None, "a")]).unwrap();
        ledger.sync(&user_id, &Platform::Api, &[entry(&user_id, None, "a")]).unwrap();

        let all = ledger.messages(&user_id, &MessageFilter::default()).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn tail_buffer_respects_window_size() {
        let ledger = ledger();
        let user_id = Id::new();
        for i in 0..5 {
            let buffer = ledger
                .sync(&user_id, &Platform::Api, &[entry(&user_id, None, &format!("msg{i}"))])
                .unwrap();
            if i >= 2 {
                assert_eq!(buffer.len(), 3);
            }
        }
    }

    #[test]
    fn write_summary_is_idempotent_per_window() {
        let ledger = ledger();
        let user_id = Id::new();
        let start = Utc::now();
        let end = start + chrono::Duration::hours(6);

        let first = ledger.write_summary(&user_id, SummaryType::Morning, start, end, "a").unwrap();
        let second = ledger.write_summary(&user_id, SummaryType::Morning, start, end, "b").unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.content, "a");

        let all = ledger.summaries(&user_id, Some(SummaryType::Morning), None, None, 10).unwrap();
        assert_eq!(all.len(), 1);
    }
}
