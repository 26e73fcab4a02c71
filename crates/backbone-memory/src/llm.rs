use backbone_core::error::Result;

use crate::types::{MergeDecision, TopicMergeDecision};

/// Seam to the LLM used for merge proposals (spec.md §4.4). A trait keeps
/// this crate independent of `backbone-provider`/`backbone-proxy` — the
/// caller (scheduler/orchestrator) wires in a proxy-backed implementation.
pub trait DedupLlm: Send + Sync {
    fn complete(&self, prompt: &str) -> Result<String>;
}

/// Parses `{"update": {mem_id: new_text}, "delete": [mem_id]}` (spec.md
/// §4.4). Per the failure semantics in spec.md §4.4 ("All LLM interactions
/// that expect JSON MUST tolerate malformed responses"), returns `None`
/// rather than erroring — callers skip the group and move on, and never
/// retry automatically.
pub fn parse_merge_decision(raw: &str) -> Option<MergeDecision> {
    serde_json::from_str(raw.trim()).ok()
}

/// Parses `{"primary_topic_id": ..., "final_name": ..., "secondary_topic_ids": [...]}`.
pub fn parse_topic_merge_decision(raw: &str) -> Option<TopicMergeDecision> {
    serde_json::from_str(raw.trim()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_json_yields_none_rather_than_erroring() {
        assert!(parse_merge_decision("not json").is_none());
        assert!(parse_merge_decision("{\"update\": \"oops\"}").is_none());
    }

    #[test]
    fn well_formed_merge_decision_parses() {
        let raw = r#"{"update": {"m1": "new text"}, "delete": ["m2"]}"#;
        let decision = parse_merge_decision(raw).unwrap();
        assert_eq!(decision.update.get("m1").unwrap(), "new text");
        assert_eq!(decision.delete, vec!["m2".to_string()]);
    }
}
