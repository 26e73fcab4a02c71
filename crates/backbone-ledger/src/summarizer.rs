use backbone_core::error::{BackboneError, Result};
use backbone_core::types::{Id, Message, SummaryType};
use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use tiktoken_rs::CoreBPE;
use tracing::debug;

use crate::ledger::Ledger;

/// Seam to the LLM used for every rollup pass (spec.md §4.3). Sync like
/// `backbone-memory::DedupLlm` and `crate::review::ReviewLlm` — the caller
/// (scheduler) supplies a proxy-backed implementation.
pub trait SummarizerLlm: Send + Sync {
    fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String>;
}

/// Approximate per-chunk token budget for period summarization (spec.md
/// §4.3: "chunking their messages for the named window into blocks below a
/// token budget ≈4096 tokens per chunk").
const CHUNK_TOKEN_BUDGET: usize = 4096;

pub struct Summarizer<'a> {
    ledger: &'a Ledger,
    llm: &'a dyn SummarizerLlm,
    bpe: CoreBPE,
}

impl<'a> Summarizer<'a> {
    pub fn new(ledger: &'a Ledger, llm: &'a dyn SummarizerLlm) -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base().map_err(|e| BackboneError::Internal(e.to_string()))?;
        Ok(Self { ledger, llm, bpe })
    }

    fn token_count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    /// Splits a conversation log into chunks, each at or below
    /// `CHUNK_TOKEN_BUDGET` tokens, breaking only on message boundaries.
    fn chunk_messages(&self, messages: &[Message]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut current_tokens = 0usize;

        for m in messages {
            let line = format!("{}: {}\n", m.role, m.content);
            let line_tokens = self.token_count(&line);

            if current_tokens + line_tokens > CHUNK_TOKEN_BUDGET && !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_tokens = 0;
            }
            current.push_str(&line);
            current_tokens += line_tokens;
        }
        if !current.is_empty() {
            chunks.push(current);
        }
        chunks
    }

    /// Summarizes one or more chunks, collapsing multi-chunk windows with a
    /// second pass over the chunk summaries (grounded on
    /// `original_source/services/brain/app/summary/create_user_periodic_summary.py`'s
    /// single-prompt-per-window shape, generalized to handle windows whose
    /// message count exceeds one chunk).
    fn summarize_chunked(&self, messages: &[Message], max_tokens: u32) -> Result<Option<String>> {
        if messages.is_empty() {
            return Ok(None);
        }

        let chunks = self.chunk_messages(messages);
        let mut partials = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            partials.push(self.llm.complete(&period_prompt(chunk, max_tokens), max_tokens)?);
        }

        if partials.len() == 1 {
            return Ok(Some(partials.into_iter().next().unwrap()));
        }

        let combined_log = partials.join("\n");
        Ok(Some(self.llm.complete(&combined_prompt(&combined_log, max_tokens), max_tokens)?))
    }

    /// Summarizes one of the four intra-day periods for `user_id` covering
    /// `[window_start, window_end)`. Returns `Ok(None)` when there are no
    /// messages in the window (spec.md §4.3: rollups only run over active
    /// users/windows).
    pub fn run_period(
        &self,
        user_id: &Id,
        period: SummaryType,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        max_tokens: u32,
    ) -> Result<Option<crate::types::Summary>> {
        debug_assert!(period.is_period());
        let filter = crate::types::MessageFilter {
            since: Some(window_start),
            until: Some(window_end),
            topic_id: None,
        };
        let messages = self.ledger.messages(user_id, &filter)?;

        let Some(content) = self.summarize_chunked(&messages, max_tokens)? else {
            return Ok(None);
        };
        Ok(Some(self.ledger.write_summary(user_id, period, window_start, window_end, &content)?))
    }

    /// Aggregates a calendar day's four period summaries into one daily
    /// summary, then deletes the consumed period summaries (grounded on
    /// `original_source/services/brain/app/summary/daily.py`'s final
    /// delete loop — daily is the only rollup level that prunes its inputs).
    pub fn run_daily(&self, user_id: &Id, day: DateTime<Utc>, max_tokens: u32) -> Result<Option<crate::types::Summary>> {
        let window_start = day.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc();
        let window_end = window_start + Duration::days(1) - Duration::seconds(1);

        let periods = self.ledger.summaries(user_id, None, Some(window_start), Some(window_end), 10)?;
        let period_summaries: Vec<_> = periods.into_iter().filter(|s| s.summary_type.is_period()).collect();
        if period_summaries.is_empty() {
            return Ok(None);
        }

        let combined_log = period_summaries
            .iter()
            .map(|s| format!("{}: {}", s.summary_type, s.content))
            .collect::<Vec<_>>()
            .join("\n");
        let content = self.llm.complete(&combined_prompt(&combined_log, max_tokens), max_tokens)?;

        let summary = self.ledger.write_summary(user_id, SummaryType::Daily, window_start, window_end, &content)?;
        let deleted = self.ledger.delete_summaries(user_id, period_summaries[0].summary_type, window_start, window_end)?;
        for period in SummaryType::periods() {
            if period != period_summaries[0].summary_type {
                self.ledger.delete_summaries(user_id, period, window_start, window_end)?;
            }
        }
        debug!(user_id = %user_id, deleted, "daily rollup consumed period summaries");

        Ok(Some(summary))
    }

    /// Aggregates the prior Mon-Sun week's 7 daily summaries. Only valid to
    /// run when `as_of` is a Monday (grounded on
    /// `original_source/services/brain/app/summary/weekly.py`'s
    /// `request_date.weekday() != 0` guard). Daily summaries are NOT deleted
    /// — weekly rollups are additive.
    pub fn run_weekly(&self, user_id: &Id, as_of: DateTime<Utc>, max_tokens: u32) -> Result<Option<crate::types::Summary>> {
        if as_of.weekday().num_days_from_monday() != 0 {
            return Err(BackboneError::Input("weekly rollup must run on a Monday".to_string()));
        }
        let monday = (as_of - Duration::days(7)).date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc();
        let window_end = monday + Duration::days(6) + Duration::hours(23) + Duration::minutes(59) + Duration::seconds(59);

        self.run_aggregate_rollup(user_id, SummaryType::Daily, SummaryType::Weekly, monday, window_end, max_tokens)
    }

    /// Aggregates the full calendar month's daily summaries ending on
    /// `as_of`'s month. Daily summaries are NOT deleted (additive, same as
    /// weekly).
    pub fn run_monthly(&self, user_id: &Id, as_of: DateTime<Utc>, max_tokens: u32) -> Result<Option<crate::types::Summary>> {
        let year = as_of.year();
        let month = as_of.month();
        let window_start = Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).unwrap();
        let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
        let window_end = Utc.with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0).unwrap() - Duration::seconds(1);

        self.run_aggregate_rollup(user_id, SummaryType::Daily, SummaryType::Monthly, window_start, window_end, max_tokens)
    }

    fn run_aggregate_rollup(
        &self,
        user_id: &Id,
        source_type: SummaryType,
        target_type: SummaryType,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        max_tokens: u32,
    ) -> Result<Option<crate::types::Summary>> {
        let sources = self.ledger.summaries(user_id, Some(source_type), Some(window_start), Some(window_end), 31)?;
        if sources.is_empty() {
            return Ok(None);
        }
        let combined_log = sources
            .iter()
            .map(|s| format!("{}: {}", s.window_start.date_naive(), s.content))
            .collect::<Vec<_>>()
            .join("\n");
        let content = self.llm.complete(&combined_prompt(&combined_log, max_tokens), max_tokens)?;
        Ok(Some(self.ledger.write_summary(user_id, target_type, window_start, window_end, &content)?))
    }
}

fn period_prompt(conversation: &str, max_tokens: u32) -> String {
    format!(
        "[INST]<<SYS>>You are a helpful assistant. Summarize the following conversation in a \
         single paragraph not exceeding {max_tokens} tokens.<</SYS>>\n{conversation}[/INST]"
    )
}

fn combined_prompt(summaries: &str, max_tokens: u32) -> String {
    format!(
        "[INST]<<SYS>>Organize the following summaries chronologically into a single coherent \
         summary. Emphasize key actions, decisions, and emotional shifts. Respond with a single \
         paragraph not exceeding {max_tokens} tokens.<</SYS>>\n{summaries}[/INST]"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use backbone_core::types::{Platform, Role};
    use rusqlite::Connection;

    struct FixedLlm(String);
    impl SummarizerLlm for FixedLlm {
        fn complete(&self, _prompt: &str, _max_tokens: u32) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    fn ledger() -> Ledger {
        Ledger::new(Connection::open_in_memory().unwrap(), 20).unwrap()
    }

    fn entry(user_id: &Id, content: &str) -> crate::types::SyncEntry {
        crate::types::SyncEntry {
            user_id: user_id.clone(),
            platform: Platform::Api,
            platform_msg_id: None,
            role: Role::User,
            content: content.to_string(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    #[test]
    fn empty_window_yields_no_summary() {
        let ledger = ledger();
        let llm = FixedLlm("summary".to_string());
        let summarizer = Summarizer::new(&ledger, &llm).unwrap();
        let user_id = Id::new();
        let now = Utc::now();
        let result = summarizer
            .run_period(&user_id, SummaryType::Morning, now - Duration::hours(1), now, 64)
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn period_with_messages_writes_summary() {
        let ledger = ledger();
        let user_id = Id::new();
        ledger.sync(&user_id, &Platform::Api, &[entry(&user_id, "good morning")]).unwrap();

        let llm = FixedLlm("the user said good morning".to_string());
        let summarizer = Summarizer::new(&ledger, &llm).unwrap();
        let now = Utc::now();
        let summary = summarizer
            .run_period(&user_id, SummaryType::Morning, now - Duration::hours(1), now + Duration::hours(1), 64)
            .unwrap()
            .unwrap();
        assert_eq!(summary.content, "the user said good morning");
    }

    #[test]
    fn daily_rollup_deletes_period_summaries() {
        let ledger = ledger();
        let user_id = Id::new();
        let day = Utc::now();
        let day_start = day.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc();

        ledger
            .write_summary(&user_id, SummaryType::Morning, day_start, day_start + Duration::hours(6), "woke up")
            .unwrap();

        let llm = FixedLlm("daily recap".to_string());
        let summarizer = Summarizer::new(&ledger, &llm).unwrap();
        let daily = summarizer.run_daily(&user_id, day, 64).unwrap().unwrap();
        assert_eq!(daily.content, "daily recap");

        let remaining = ledger.summaries(&user_id, Some(SummaryType::Morning), None, None, 10).unwrap();
        assert!(remaining.is_empty());
    }

    #[test]
    fn weekly_rollup_rejects_non_monday() {
        let ledger = ledger();
        let llm = FixedLlm("x".to_string());
        let summarizer = Summarizer::new(&ledger, &llm).unwrap();
        let user_id = Id::new();

        let mut d = Utc::now();
        while d.weekday().num_days_from_monday() == 0 {
            d += Duration::days(1);
        }
        assert!(summarizer.run_weekly(&user_id, d, 64).is_err());
    }

    #[test]
    fn weekly_rollup_does_not_delete_daily_summaries() {
        let ledger = ledger();
        let user_id = Id::new();

        let mut monday = Utc::now();
        while monday.weekday().num_days_from_monday() != 0 {
            monday += Duration::days(1);
        }
        let prior_monday = monday - Duration::days(7);
        ledger
            .write_summary(&user_id, SummaryType::Daily, prior_monday, prior_monday + Duration::hours(23), "day one")
            .unwrap();

        let llm = FixedLlm("week recap".to_string());
        let summarizer = Summarizer::new(&ledger, &llm).unwrap();
        let weekly = summarizer.run_weekly(&user_id, monday, 64).unwrap().unwrap();
        assert_eq!(weekly.content, "week recap");

        let remaining = ledger.summaries(&user_id, Some(SummaryType::Daily), None, None, 10).unwrap();
        assert_eq!(remaining.len(), 1);
    }
}
