use rusqlite::{Connection, Result};

/// Initialise memory tables. Safe to call on every startup (idempotent),
/// grounded on `skynet-memory/src/db.rs::init_db`'s external-content FTS5
/// pattern, adapted for the keyword/topic-association shape spec.md §3/§4.4
/// needs instead of the teacher's flat key/value memory row.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")?;
    create_memories_table(conn)?;
    create_keywords_table(conn)?;
    create_memory_topics_table(conn)?;
    create_fts_index(conn)?;
    Ok(())
}

fn create_memories_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS memories (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL,
            category    TEXT NOT NULL,
            text        TEXT NOT NULL,
            priority    REAL NOT NULL DEFAULT 0.5,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_memories_user
            ON memories(user_id);",
    )
}

/// One row per (memory, lowercased keyword); mirrors the original
/// implementation's `memory_tags` table (spec.md §4.4 keyword dedup grouping
/// over the lowercased keyword set).
fn create_keywords_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS memory_keywords (
            memory_id   TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
            keyword     TEXT NOT NULL,
            PRIMARY KEY (memory_id, keyword)
        );
        CREATE INDEX IF NOT EXISTS idx_keywords_keyword
            ON memory_keywords(keyword);",
    )
}

fn create_memory_topics_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS memory_topics (
            memory_id   TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
            topic_id    TEXT NOT NULL,
            PRIMARY KEY (memory_id, topic_id)
        );
        CREATE INDEX IF NOT EXISTS idx_memory_topics_topic
            ON memory_topics(topic_id);",
    )
}

/// Standalone (not external-content) FTS5 index: `memories.id` is a TEXT
/// primary key, so it is simpler to store `memory_id` as an unindexed
/// column and keep the index manually in sync on write/delete than to lean
/// on FTS5's `content_rowid` aliasing.
fn create_fts_index(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts
            USING fts5(memory_id UNINDEXED, text);",
    )
}
