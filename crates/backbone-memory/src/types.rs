use backbone_core::types::{Id, MemoryCategory};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// spec.md §3 Memory entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: Id,
    pub user_id: Id,
    pub category: MemoryCategory,
    pub text: String,
    pub keywords: Vec<String>,
    pub priority: f64,
    pub topic_ids: Vec<Id>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMemory {
    pub user_id: Id,
    pub category: MemoryCategory,
    pub text: String,
    pub keywords: Vec<String>,
    pub priority: f64,
}

/// One group of candidate-duplicate memories, ranked for processing (spec.md
/// §4.4 keyword/semantic dedup).
#[derive(Debug, Clone)]
pub struct DedupGroup {
    pub memory_ids: Vec<Id>,
    /// Keyword dedup: max shared-keyword count in the group. Semantic dedup:
    /// average pairwise cosine similarity. Used only for ranking.
    pub rank_score: f64,
}

/// The LLM's proposed edit for one group (spec.md §4.4: `{update:
/// {mem_id: new_text}, delete: [mem_id]}`).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MergeDecision {
    #[serde(default)]
    pub update: std::collections::HashMap<String, String>,
    #[serde(default)]
    pub delete: Vec<String>,
}

/// Result of applying (or previewing) one group's merge.
#[derive(Debug, Clone, Serialize)]
pub struct DedupOutcome {
    pub group: Vec<String>,
    pub updated: Vec<String>,
    pub deleted: Vec<String>,
    pub aborted: bool,
}

#[derive(Debug, Clone)]
pub struct TopicWithCount {
    pub id: Id,
    pub name: String,
    pub memory_count: usize,
}

/// The LLM's proposed topic merge (spec.md §4.4 semantic topic dedup).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TopicMergeDecision {
    pub primary_topic_id: String,
    pub final_name: String,
    pub secondary_topic_ids: Vec<String>,
}

pub(crate) fn row_to_memory(row: &rusqlite::Row<'_>) -> rusqlite::Result<Memory> {
    let category_str: String = row.get(2)?;
    Ok(Memory {
        id: row.get::<_, String>(0)?.into(),
        user_id: row.get::<_, String>(1)?.into(),
        category: category_str.parse().unwrap_or(MemoryCategory::Personal),
        text: row.get(3)?,
        priority: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
        keywords: Vec::new(),
        topic_ids: Vec::new(),
    })
}
