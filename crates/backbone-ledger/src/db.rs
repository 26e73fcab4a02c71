use rusqlite::{Connection, Result};

/// Initialise ledger tables. Safe to call on every startup (idempotent),
/// grounded on `skynet-memory/src/db.rs::init_db`'s `CREATE TABLE IF NOT
/// EXISTS` pattern.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")?;
    create_topics_table(conn)?;
    create_messages_table(conn)?;
    create_summaries_table(conn)?;
    Ok(())
}

fn create_topics_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS topics (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL,
            name        TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_topics_user
            ON topics(user_id, created_at DESC);",
    )
}

fn create_messages_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS messages (
            id               TEXT PRIMARY KEY,
            user_id          TEXT NOT NULL,
            platform         TEXT NOT NULL,
            platform_msg_id  TEXT,
            role             TEXT NOT NULL,
            content          TEXT NOT NULL,
            tool_calls       TEXT,
            tool_call_id     TEXT,
            created_at       TEXT NOT NULL,
            topic_id         TEXT REFERENCES topics(id) ON DELETE SET NULL,
            reviewed         INTEGER NOT NULL DEFAULT 0,
            UNIQUE(user_id, platform, platform_msg_id)
        );
        CREATE INDEX IF NOT EXISTS idx_messages_user_created
            ON messages(user_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_messages_topic
            ON messages(topic_id);
        CREATE INDEX IF NOT EXISTS idx_messages_untagged
            ON messages(user_id, reviewed);",
    )
}

fn create_summaries_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS summaries (
            id            TEXT PRIMARY KEY,
            user_id       TEXT NOT NULL,
            summary_type  TEXT NOT NULL,
            window_start  TEXT NOT NULL,
            window_end    TEXT NOT NULL,
            content       TEXT NOT NULL,
            created_at    TEXT NOT NULL,
            UNIQUE(user_id, summary_type, window_start, window_end)
        );
        CREATE INDEX IF NOT EXISTS idx_summaries_user_type
            ON summaries(user_id, summary_type, window_start);",
    )
}

/// Sweep messages/summaries referencing topics that no longer exist
/// (spec.md §4.3 "orphan topic/category/tag rows are not permitted and are
/// swept by a cleanup routine").
pub fn sweep_orphans(conn: &Connection) -> Result<usize> {
    conn.execute(
        "UPDATE messages SET topic_id = NULL
         WHERE topic_id IS NOT NULL
           AND topic_id NOT IN (SELECT id FROM topics)",
        [],
    )
}
