//! `POST /v1/chat/completions` (spec.md §6, §8 S1/S2). Grounded on
//! `skynet-gateway::http::openai_compat::chat_completions` and the original
//! `services/api/app/completions/multiturn.py`'s task-prefix routing.

use std::sync::Arc;

use axum::{extract::State, Json};
use backbone_core::types::Platform;
use backbone_orchestrator::{InboundTurn, TurnOutcome};
use chrono::Utc;
use tracing::debug;

use super::openai::{ChatCompletionChoice, ChatCompletionRequest, ChatCompletionResponse, ChatMessageWire, Usage};
use crate::app::AppState;
use crate::error::ApiError;
use crate::tokens::count_tokens;

/// The fixed `(platform, external_id)` pair used for every OpenAI-compatible
/// HTTP caller (spec.md §8 S1 "the ledger contains ... for the resolved
/// admin id"). A deployment that wants this surface to act as the admin
/// links this external id to its admin contact via `backbone-contacts`; any
/// other caller is treated as an anonymous placeholder (`Resolution::
/// Placeholder`).
const API_EXTERNAL_ID: &str = "api-default";

pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatCompletionRequest>,
) -> Result<Json<ChatCompletionResponse>, ApiError> {
    // S2: a first user message beginning "### Task" triggers single-turn
    // routing instead of multi-turn.
    if let Some(first) = req.messages.first() {
        if first.role == "user" {
            if let Some(task_prompt) = first.content.strip_prefix("### Task") {
                let task_prompt = task_prompt.trim_start().to_string();
                debug!("### Task prefix detected, routing to single-turn completion");
                let outcome = run_turn(&state, task_prompt.clone(), req.model.clone()).await?;
                return Ok(Json(build_response(req.model, task_prompt, outcome)));
            }
        }
    }

    // Multi-turn: the ledger (not this request body) is the turn history,
    // so only the last user turn is appended (spec.md §4.3).
    let content = req
        .messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.clone())
        .unwrap_or_default();

    let prompt_text: String = req
        .messages
        .iter()
        .filter(|m| m.role == "user" || m.role == "assistant")
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    let outcome = run_turn(&state, content, req.model.clone()).await?;
    Ok(Json(build_response(req.model, prompt_text, outcome)))
}

async fn run_turn(state: &AppState, content: String, model: String) -> Result<TurnOutcome, ApiError> {
    state
        .orchestrator
        .run_turn(InboundTurn {
            platform: Platform::Api,
            external_id: API_EXTERNAL_ID.to_string(),
            platform_msg_id: None,
            content,
            model,
            options: serde_json::json!({}),
        })
        .await
        .map_err(ApiError::from)
}

fn build_response(model: String, prompt_text: String, outcome: TurnOutcome) -> ChatCompletionResponse {
    let prompt_tokens = count_tokens(&prompt_text).max(outcome.prompt_tokens);
    ChatCompletionResponse {
        id: format!("chatcmpl-{}", uuid::Uuid::now_v7()),
        object: "chat.completion",
        created: Utc::now().timestamp(),
        model,
        choices: vec![ChatCompletionChoice {
            index: 0,
            message: ChatMessageWire { role: "assistant".to_string(), content: outcome.reply },
            finish_reason: "stop".to_string(),
        }],
        usage: Usage {
            prompt_tokens,
            completion_tokens: outcome.completion_tokens,
            total_tokens: prompt_tokens + outcome.completion_tokens,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_state;

    fn msg(role: &str, content: &str) -> ChatMessageWire {
        ChatMessageWire { role: role.to_string(), content: content.to_string() }
    }

    #[tokio::test]
    async fn multiturn_happy_path_is_openai_shaped() {
        let state = test_state(None);
        let req = ChatCompletionRequest {
            model: "llama3".to_string(),
            messages: vec![msg("user", "hello there")],
            temperature: None,
            max_tokens: None,
        };

        let resp = chat_completions(State(state), Json(req)).await.unwrap().0;

        assert_eq!(resp.choices.len(), 1);
        assert_eq!(resp.choices[0].message.role, "assistant");
        assert_eq!(resp.choices[0].finish_reason, "stop");
        assert!(resp.choices[0].message.content.contains("echo:"));
        assert!(resp.usage.prompt_tokens > 0);
    }

    #[tokio::test]
    async fn task_prefix_routes_as_single_turn_with_stripped_prompt() {
        let state = test_state(None);
        let req = ChatCompletionRequest {
            model: "llama3".to_string(),
            messages: vec![msg("user", "### Task summarize this thread")],
            temperature: None,
            max_tokens: None,
        };

        let resp = chat_completions(State(state), Json(req)).await.unwrap().0;

        assert_eq!(resp.choices[0].finish_reason, "stop");
        assert!(resp.choices[0].message.content.contains("echo: summarize this thread"));
    }
}
