use std::sync::Arc;
use std::time::Duration;

use backbone_core::error::{BackboneError, Result};
use backbone_core::types::{Id, MemoryCategory, SummaryType};
use backbone_ledger::{Ledger, ReviewLlm, SummarizerLlm};
use backbone_memory::{DedupLlm, Embedder, MemoryStore, NewMemory};
use backbone_provider::{ChatMessage, ChatRequest, ProviderTag};
use backbone_proxy::ProxyPool;
use chrono::{DateTime, Datelike, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

/// The concrete work a fired [`crate::types::Job`] names, decoded from its
/// opaque `action` JSON column. Every variant corresponds to one background
/// pass spec.md §4.3/§4.4 describes: rollup summarization, topic/memory
/// extraction, and dedup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobAction {
    PeriodicSummary { user_id: Id, period: SummaryType },
    DailySummary { user_id: Id },
    WeeklySummary { user_id: Id },
    MonthlySummary { user_id: Id },
    ReviewLog { user_id: Id },
    KeywordDedup { user_id: Id },
    SemanticDedup { user_id: Id },
    TopicDedup,
}

/// Bridges the sync `SummarizerLlm`/`ReviewLlm`/`DedupLlm` seams each
/// ledger/memory crate exposes to the async `ProxyPool` (spec.md §4.2 C2),
/// via a model tag and fixed priority for background work (spec.md §4.2:
/// background jobs dispatch at a lower priority than interactive turns).
pub struct ProxyLlm {
    pool: Arc<ProxyPool>,
    model: String,
    priority: i32,
}

/// Background jobs run at the lowest priority band so they never starve
/// interactive turns (spec.md §4.2).
pub const BACKGROUND_PRIORITY: i32 = 100;

impl ProxyLlm {
    pub fn new(pool: Arc<ProxyPool>, model: String) -> Self {
        Self { pool, model, priority: BACKGROUND_PRIORITY }
    }

    fn complete_blocking(&self, prompt: &str, max_tokens: Option<u32>) -> Result<String> {
        let request = ChatRequest {
            provider: Some(ProviderTag::resolve(&self.model)),
            model: self.model.clone(),
            messages: vec![ChatMessage::user(prompt)],
            options: max_tokens
                .map(|t| serde_json::json!({ "max_tokens": t }))
                .unwrap_or(serde_json::Value::Null),
            tools: None,
            tool_choice: None,
        };
        let task_id = Uuid::new_v4().to_string();
        let pool = self.pool.clone();
        let priority = self.priority;
        let timeout = Duration::from_secs(backbone_core::config::DEDUP_TIMEOUT_SECS);

        let response = tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(pool.dispatch(task_id, request, priority, Some(timeout)))
        })?;
        Ok(response.text)
    }
}

impl DedupLlm for ProxyLlm {
    fn complete(&self, prompt: &str) -> Result<String> {
        self.complete_blocking(prompt, None)
    }
}

impl SummarizerLlm for ProxyLlm {
    fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        self.complete_blocking(prompt, Some(max_tokens))
    }
}

impl ReviewLlm for ProxyLlm {
    fn analyze(&self, conversation_log: &str) -> Result<String> {
        self.complete_blocking(conversation_log, None)
    }
}

/// Wires the ledger, memory store, embedder, and LLM seam together to
/// execute whichever [`JobAction`] a fired job names (grounded on
/// `original_source/services/brain/app/scheduler/job_summarize.py`'s
/// dispatch-by-job-kind router).
pub struct JobRunner {
    ledger: Arc<Ledger>,
    memory: Arc<MemoryStore>,
    embedder: Arc<dyn Embedder>,
    llm: Arc<ProxyLlm>,
    summary_config: backbone_core::config::SummaryConfig,
}

impl JobRunner {
    pub fn new(
        ledger: Arc<Ledger>,
        memory: Arc<MemoryStore>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<ProxyLlm>,
        summary_config: backbone_core::config::SummaryConfig,
    ) -> Self {
        Self { ledger, memory, embedder, llm, summary_config }
    }

    pub fn run(&self, action_json: &str) -> Result<()> {
        let action: JobAction = serde_json::from_str(action_json)
            .map_err(|e| BackboneError::Input(format!("malformed job action: {e}")))?;

        match action {
            JobAction::PeriodicSummary { user_id, period } => self.run_periodic(&user_id, period),
            JobAction::DailySummary { user_id } => self.run_daily(&user_id),
            JobAction::WeeklySummary { user_id } => self.run_weekly(&user_id),
            JobAction::MonthlySummary { user_id } => self.run_monthly(&user_id),
            JobAction::ReviewLog { user_id } => self.run_review_log(&user_id),
            JobAction::KeywordDedup { user_id } => self.run_keyword_dedup(&user_id),
            JobAction::SemanticDedup { user_id } => self.run_semantic_dedup(&user_id),
            JobAction::TopicDedup => self.run_topic_dedup(),
        }
    }

    fn summarizer(&self) -> Result<backbone_ledger::Summarizer<'_>> {
        backbone_ledger::Summarizer::new(&self.ledger, self.llm.as_ref())
    }

    fn run_periodic(&self, user_id: &Id, period: SummaryType) -> Result<()> {
        let (start, end) = period_window(period, Utc::now());
        let summarizer = self.summarizer()?;
        let max_tokens = self.summary_config.periodic_max_tokens as u32;
        match summarizer.run_period(user_id, period, start, end, max_tokens)? {
            Some(_) => info!(user_id = %user_id, %period, "periodic summary written"),
            None => info!(user_id = %user_id, %period, "no messages in window, nothing to summarize"),
        }
        Ok(())
    }

    fn run_daily(&self, user_id: &Id) -> Result<()> {
        let summarizer = self.summarizer()?;
        let max_tokens = self.summary_config.daily_max_tokens as u32;
        match summarizer.run_daily(user_id, Utc::now(), max_tokens)? {
            Some(_) => info!(user_id = %user_id, "daily rollup written"),
            None => info!(user_id = %user_id, "no period summaries today, nothing to roll up"),
        }
        Ok(())
    }

    fn run_weekly(&self, user_id: &Id) -> Result<()> {
        let now = Utc::now();
        if now.weekday().num_days_from_monday() != 0 {
            warn!(user_id = %user_id, "weekly rollup job fired on a non-Monday, skipping");
            return Ok(());
        }
        let summarizer = self.summarizer()?;
        let max_tokens = self.summary_config.weekly_max_tokens as u32;
        match summarizer.run_weekly(user_id, now, max_tokens)? {
            Some(_) => info!(user_id = %user_id, "weekly rollup written"),
            None => info!(user_id = %user_id, "no daily summaries last week, nothing to roll up"),
        }
        Ok(())
    }

    fn run_monthly(&self, user_id: &Id) -> Result<()> {
        let summarizer = self.summarizer()?;
        let max_tokens = self.summary_config.monthly_max_tokens as u32;
        match summarizer.run_monthly(user_id, Utc::now(), max_tokens)? {
            Some(_) => info!(user_id = %user_id, "monthly rollup written"),
            None => info!(user_id = %user_id, "no daily summaries this month, nothing to roll up"),
        }
        Ok(())
    }

    fn run_review_log(&self, user_id: &Id) -> Result<()> {
        let outcomes = self.ledger.run_review_log(user_id, self.llm.as_ref())?;
        for outcome in &outcomes {
            for extracted in &outcome.memories {
                let memory = self.memory.add(NewMemory {
                    user_id: user_id.clone(),
                    category: extracted.category,
                    text: extracted.text.clone(),
                    keywords: extracted.keywords.clone(),
                    priority: default_priority(extracted.category),
                })?;
                self.memory.attach_topic(&memory.id, &outcome.topic_id)?;
            }
        }
        info!(user_id = %user_id, topics = outcomes.len(), "review_log pass complete");
        Ok(())
    }

    fn run_keyword_dedup(&self, user_id: &Id) -> Result<()> {
        let outcomes = self.memory.run_keyword_dedup(user_id, self.llm.as_ref())?;
        info!(user_id = %user_id, groups = outcomes.len(), "keyword dedup pass complete");
        Ok(())
    }

    /// Semantic dedup over memory text (spec.md §4.4): embed each user's
    /// memories, cluster by DBSCAN on cosine distance, rank clusters by
    /// density, and feed the top clusters through the same group-merge path
    /// keyword dedup uses.
    fn run_semantic_dedup(&self, user_id: &Id) -> Result<()> {
        let config = self.memory.config();
        let memories = self.memory.memories_for_embedding(user_id)?;
        if memories.len() < 2 {
            return Ok(());
        }

        let texts: Vec<String> = memories.iter().map(|m| m.text.clone()).collect();
        let embeddings = self.embedder.embed(&texts)?;
        let eps = 1.0 - config.similarity_threshold;
        let labels = backbone_memory::cluster::dbscan(&embeddings, eps, 2);
        let ranked = backbone_memory::cluster::rank_clusters_by_density(&embeddings, &labels);

        for cluster_id in ranked.into_iter().take(config.max_clusters_to_process) {
            let ids: Vec<Id> = labels
                .iter()
                .enumerate()
                .filter(|(_, l)| **l == Some(cluster_id))
                .map(|(i, _)| memories[i].id.clone())
                .collect();
            self.memory.process_cluster(&ids, self.llm.as_ref())?;
        }
        info!(user_id = %user_id, "semantic dedup pass complete");
        Ok(())
    }

    /// Semantic topic dedup (spec.md §4.4): for topics with at least
    /// `min_memory_count` memories, ask the LLM to propose a merge and, if
    /// it does, reassign associations then rename the primary and delete
    /// each secondary — reassign first, verify the secondary is empty, only
    /// then mutate the primary/delete the secondary (DESIGN.md's documented
    /// ordering for cross-store atomicity).
    fn run_topic_dedup(&self) -> Result<()> {
        let config = self.memory.config();
        let candidates = self.memory.topics_with_min_memories(config.min_memory_count)?;
        if candidates.len() < 2 {
            return Ok(());
        }

        let mut lines = Vec::new();
        for (topic_id, count) in &candidates {
            if let Some(topic) = self.ledger.topic_by_id(topic_id)? {
                lines.push(format!("{}|{}|{}", topic.id, topic.name, count));
            }
        }
        let prompt = format!(
            "Given the following topics (id|name|memory_count), decide if any should be merged. \
             Respond with JSON: {{\"primary_topic_id\": ..., \"final_name\": ..., \"secondary_topic_ids\": [...]}} \
             or {{}} if no merge applies.\n\n{}",
            lines.join("\n")
        );

        let response = self.llm.complete(&prompt)?;
        let Some(decision) = backbone_memory::llm::parse_topic_merge_decision(&response) else {
            return Ok(());
        };

        let primary = Id::from(decision.primary_topic_id);
        for secondary_str in decision.secondary_topic_ids {
            let secondary = Id::from(secondary_str);
            self.memory.reassign_topic(&secondary, &primary)?;
            if self.memory.count_for_topic(&secondary)? == 0 {
                self.ledger.delete_topic(&secondary)?;
            }
        }
        self.ledger.rename_topic(&primary, &decision.final_name)?;
        info!("topic dedup pass complete");
        Ok(())
    }
}

fn default_priority(category: MemoryCategory) -> f64 {
    match category {
        MemoryCategory::Health | MemoryCategory::Career | MemoryCategory::Family => 0.8,
        _ => 0.5,
    }
}

/// Bucket boundaries for the four intra-day periods (spec.md §3 Summary
/// entity), grounded on the teacher's hour ranges for morning/afternoon/
/// evening/night windows.
fn period_window(period: SummaryType, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let day_start = now.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc();
    let (start_hour, end_hour) = match period {
        SummaryType::Morning => (5, 12),
        SummaryType::Afternoon => (12, 17),
        SummaryType::Evening => (17, 21),
        SummaryType::Night => (21, 29), // 29 = 5am the following day
        _ => unreachable!("period_window only called for the four intra-day buckets"),
    };
    (day_start + ChronoDuration::hours(start_hour), day_start + ChronoDuration::hours(end_hour))
}
