use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::app::AppState;

/// `GET /health` — liveness probe.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "gateway_port": state.config.gateway.port,
        "ollama_configured": state.ollama.is_some(),
        "git_sha": env!("BACKBONE_GIT_SHA"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_state;

    #[tokio::test]
    async fn reports_ok_status_and_no_ollama_by_default() {
        let state = test_state(None);
        let body = health_handler(State(state)).await.0;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["ollama_configured"], false);
    }
}
