use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use backbone_core::config::Config;
use backbone_orchestrator::Orchestrator;
use backbone_provider::OllamaProvider;

/// Central shared state — passed as `Arc<AppState>` to every Axum handler.
/// Grounded on `skynet-gateway::app::AppState`, trimmed to the two things
/// this crate's routes actually need: the per-turn pipeline and a handle to
/// the backend that can enumerate its own models.
pub struct AppState {
    pub config: Config,
    pub orchestrator: Arc<Orchestrator>,
    /// Used only by `GET /v1/models`; `None` when no ollama backend is
    /// configured (spec.md §6 "translated from the backend's native model
    /// enumeration").
    pub ollama: Option<Arc<OllamaProvider>>,
}

impl AppState {
    pub fn new(config: Config, orchestrator: Arc<Orchestrator>, ollama: Option<Arc<OllamaProvider>>) -> Self {
        Self { config, orchestrator, ollama }
    }
}

/// Assemble the full Axum router (spec.md §6 External Interfaces).
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/v1/chat/completions", post(crate::http::chat::chat_completions))
        .route("/v1/completions", post(crate::http::completions::completions))
        .route("/v1/models", get(crate::http::models::list_models))
        .route("/v1/models/{id}", get(crate::http::models::get_model))
        .route("/discord/message/incoming", post(crate::http::platform::discord_incoming))
        .route("/imessage/incoming", post(crate::http::platform::imessage_incoming))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
