//! `POST /v1/completions` (spec.md §6: "single-turn; `n` may be >1,
//! producing sequential completions"). Grounded on the original
//! `services/api/app/completions/singleturn.py`'s sequential-call loop.

use std::sync::Arc;

use axum::{extract::State, Json};
use backbone_core::types::Platform;
use backbone_orchestrator::InboundTurn;
use chrono::Utc;
use tracing::debug;

use super::openai::{CompletionChoice, CompletionRequest, CompletionResponse, Usage};
use crate::app::AppState;
use crate::error::ApiError;
use crate::tokens::count_tokens;

/// Same fixed identity as `/v1/chat/completions` (spec.md §8 S1).
const API_EXTERNAL_ID: &str = "api-default";

pub async fn completions(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CompletionRequest>,
) -> Result<Json<CompletionResponse>, ApiError> {
    let n = req.n.filter(|&n| n > 0).unwrap_or(1);
    debug!(n, "running sequential single-turn completions");

    let mut choices = Vec::with_capacity(n as usize);
    let mut completion_tokens = 0u32;

    for i in 0..n {
        let outcome = state
            .orchestrator
            .run_turn(InboundTurn {
                platform: Platform::Api,
                external_id: API_EXTERNAL_ID.to_string(),
                platform_msg_id: None,
                content: req.prompt.clone(),
                model: req.model.clone(),
                options: serde_json::json!({}),
            })
            .await
            .map_err(ApiError::from)?;

        completion_tokens += outcome.completion_tokens;
        choices.push(CompletionChoice {
            text: outcome.reply,
            index: i,
            finish_reason: "stop".to_string(),
        });
    }

    let prompt_tokens = count_tokens(&req.prompt);
    Ok(Json(CompletionResponse {
        id: format!("cmpl-{}", uuid::Uuid::now_v7()),
        object: "text_completion",
        created: Utc::now().timestamp(),
        model: req.model,
        choices,
        usage: Usage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_state;

    #[tokio::test]
    async fn single_call_defaults_n_to_one() {
        let state = test_state(None);
        let req = CompletionRequest {
            model: "llama3".to_string(),
            prompt: "hello".to_string(),
            temperature: None,
            max_tokens: None,
            n: None,
        };

        let resp = completions(State(state), Json(req)).await.unwrap().0;

        assert_eq!(resp.choices.len(), 1);
        assert_eq!(resp.choices[0].index, 0);
        assert_eq!(resp.choices[0].finish_reason, "stop");
    }

    #[tokio::test]
    async fn n_greater_than_one_produces_sequential_indexed_choices() {
        let state = test_state(None);
        let req = CompletionRequest {
            model: "llama3".to_string(),
            prompt: "hello".to_string(),
            temperature: None,
            max_tokens: None,
            n: Some(3),
        };

        let resp = completions(State(state), Json(req)).await.unwrap().0;

        assert_eq!(resp.choices.len(), 3);
        assert_eq!(resp.choices.iter().map(|c| c.index).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(resp.usage.completion_tokens, 6);
    }
}
