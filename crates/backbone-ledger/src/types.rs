use backbone_core::types::{Id, Message, Platform, Role, ToolCall};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry in a `sync()` snapshot (spec.md §4.3): the caller's view of a
/// message that should exist at the tail of the conversation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncEntry {
    pub user_id: Id,
    pub platform: Platform,
    pub platform_msg_id: Option<String>,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default)]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Topic {
    pub id: Id,
    pub user_id: Id,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Summary {
    pub id: Id,
    pub user_id: Id,
    pub summary_type: backbone_core::types::SummaryType,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Optional filters for `messages()` (spec.md §4.3).
#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub topic_id: Option<Id>,
}

pub(crate) fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let platform_str: String = row.get(2)?;
    let role_str: String = row.get(4)?;
    let tool_calls_json: Option<String> = row.get(6)?;
    let topic_id_str: Option<String> = row.get(9)?;

    Ok(Message {
        id: row.get::<_, String>(0)?.into(),
        user_id: row.get::<_, String>(1)?.into(),
        platform: platform_str.parse().unwrap(),
        platform_msg_id: row.get(3)?,
        role: role_str.parse().unwrap_or(Role::User),
        content: row.get(5)?,
        tool_calls: tool_calls_json.and_then(|s| serde_json::from_str(&s).ok()),
        tool_call_id: row.get(7)?,
        created_at: row.get(8)?,
        topic_id: topic_id_str.map(Id::from),
    })
}

pub(crate) fn row_to_topic(row: &rusqlite::Row<'_>) -> rusqlite::Result<Topic> {
    Ok(Topic {
        id: row.get::<_, String>(0)?.into(),
        user_id: row.get::<_, String>(1)?.into(),
        name: row.get(2)?,
        created_at: row.get(3)?,
    })
}

pub(crate) fn row_to_summary(row: &rusqlite::Row<'_>) -> rusqlite::Result<Summary> {
    let summary_type_str: String = row.get(2)?;
    Ok(Summary {
        id: row.get::<_, String>(0)?.into(),
        user_id: row.get::<_, String>(1)?.into(),
        summary_type: summary_type_str.parse().unwrap(),
        window_start: row.get(3)?,
        window_end: row.get(4)?,
        content: row.get(5)?,
        created_at: row.get(6)?,
    })
}
