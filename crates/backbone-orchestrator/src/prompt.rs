use backbone_core::types::{Mode, Platform, SummaryType};
use backbone_ledger::Summary;
use chrono::{DateTime, Utc};

/// Everything needed to build a turn's system prompt (spec.md §4.5 step 8:
/// "build a system prompt from {mode, memories, summaries, contact display
/// name, platform, timestamp}"). Kept as a typed struct rather than ad-hoc
/// string interpolation, per spec.md §9's "typed prompt structs" redesign
/// flag.
pub struct SystemPromptContext {
    pub mode: Mode,
    pub memories: Vec<String>,
    pub summaries: Vec<Summary>,
    pub display_name: String,
    pub platform: Platform,
    pub timestamp: DateTime<Utc>,
}

impl SystemPromptContext {
    /// Labels a summary with its type in upper-case, plus the formatted
    /// begin-date for every type except `daily` (spec.md §4.5 step 7). Daily
    /// summaries are unambiguous as "the one per calendar day" and so carry
    /// no date suffix; every other type (period, weekly, monthly) does.
    fn label(summary: &Summary) -> String {
        let type_str = summary.summary_type.to_string().to_uppercase();
        if matches!(summary.summary_type, SummaryType::Daily) {
            type_str
        } else {
            format!("{} ({})", type_str, summary.window_start.format("%Y-%m-%d"))
        }
    }

    pub fn build(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "You are operating in mode \"{}\" on platform \"{}\" for {} at {}.\n",
            self.mode,
            self.platform,
            self.display_name,
            self.timestamp.to_rfc3339()
        ));

        if !self.memories.is_empty() {
            out.push_str("\nRelevant memories:\n");
            for memory in &self.memories {
                out.push_str("- ");
                out.push_str(memory);
                out.push('\n');
            }
        }

        if !self.summaries.is_empty() {
            out.push_str("\nRecent summaries:\n");
            for summary in &self.summaries {
                out.push_str(&format!("[{}] {}\n", Self::label(summary), summary.content));
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backbone_core::types::Id;

    fn summary(summary_type: SummaryType) -> Summary {
        Summary {
            id: Id::new(),
            user_id: Id::new(),
            summary_type,
            window_start: Utc::now(),
            window_end: Utc::now(),
            content: "stuff happened".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn daily_label_carries_no_date_suffix() {
        assert_eq!(SystemPromptContext::label(&summary(SummaryType::Daily)), "DAILY");
    }

    #[test]
    fn period_label_carries_a_date_suffix() {
        let label = SystemPromptContext::label(&summary(SummaryType::Morning));
        assert!(label.starts_with("MORNING ("));
    }

    #[test]
    fn build_includes_mode_memories_and_summaries() {
        let ctx = SystemPromptContext {
            mode: Mode("work".to_string()),
            memories: vec!["likes rust".to_string()],
            summaries: vec![summary(SummaryType::Daily)],
            display_name: "Alice".to_string(),
            platform: Platform::Api,
            timestamp: Utc::now(),
        };
        let text = ctx.build();
        assert!(text.contains("mode \"work\""));
        assert!(text.contains("likes rust"));
        assert!(text.contains("[DAILY]"));
    }
}
