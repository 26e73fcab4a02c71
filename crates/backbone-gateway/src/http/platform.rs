//! Platform webhooks (spec.md §6: "each accepts one inbound message; the
//! orchestrator returns a `ProxyResponse{response, generated_tokens,
//! timestamp}`"). Grounded on the original `services/brain/app/discord/
//! dm.py` and `services/brain/app/imessage.py` handlers.

use std::sync::Arc;

use axum::{extract::State, Json};
use backbone_core::types::Platform;
use backbone_orchestrator::InboundTurn;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct DiscordDirectMessage {
    pub message_id: String,
    pub content: String,
    pub author_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IMessage {
    pub id: String,
    pub author_id: String,
    pub content: String,
}

/// Uniform response shape for both platform webhooks (spec.md §6).
#[derive(Debug, Serialize)]
pub struct ProxyResponse {
    pub response: String,
    pub generated_tokens: u32,
    pub timestamp: DateTime<Utc>,
}

pub async fn discord_incoming(
    State(state): State<Arc<AppState>>,
    Json(message): Json<DiscordDirectMessage>,
) -> Result<Json<ProxyResponse>, ApiError> {
    let outcome = state
        .orchestrator
        .run_turn(InboundTurn {
            platform: Platform::Discord,
            external_id: message.author_id,
            platform_msg_id: Some(message.message_id),
            content: message.content,
            model: "default".to_string(),
            options: serde_json::json!({}),
        })
        .await
        .map_err(ApiError::from)?;

    Ok(Json(ProxyResponse {
        response: outcome.reply,
        generated_tokens: outcome.completion_tokens,
        timestamp: Utc::now(),
    }))
}

pub async fn imessage_incoming(
    State(state): State<Arc<AppState>>,
    Json(message): Json<IMessage>,
) -> Result<Json<ProxyResponse>, ApiError> {
    let outcome = state
        .orchestrator
        .run_turn(InboundTurn {
            platform: Platform::Imessage,
            external_id: message.author_id,
            platform_msg_id: Some(message.id),
            content: message.content,
            model: "default".to_string(),
            options: serde_json::json!({}),
        })
        .await
        .map_err(ApiError::from)?;

    Ok(Json(ProxyResponse {
        response: outcome.reply,
        generated_tokens: outcome.completion_tokens,
        timestamp: Utc::now(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_state;

    #[tokio::test]
    async fn unregistered_discord_sender_gets_stranger_reply_not_an_error() {
        let state = test_state(None);
        let message = DiscordDirectMessage {
            message_id: "42".to_string(),
            content: "hi".to_string(),
            author_id: "999999".to_string(),
            display_name: Some("rando".to_string()),
        };

        let resp = discord_incoming(State(state), Json(message)).await.unwrap().0;

        assert!(resp.response.contains("don't recognize you"));
        assert_eq!(resp.generated_tokens, 0);
    }

    #[tokio::test]
    async fn unregistered_imessage_sender_gets_stranger_reply_not_an_error() {
        let state = test_state(None);
        let message = IMessage { id: "1".to_string(), author_id: "unknown-1".to_string(), content: "hi".to_string() };

        let resp = imessage_incoming(State(state), Json(message)).await.unwrap().0;

        assert!(resp.response.contains("don't recognize you"));
    }
}
