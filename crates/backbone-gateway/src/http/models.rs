//! `GET /v1/models`, `GET /v1/models/{id}` (spec.md §6: "list/fetch models
//! in OpenAI shape, translated from the backend's native model
//! enumeration"). Grounded on the original `services/api/app/models/
//! {listmodels,getmodel}.py`'s Ollama-tags-to-OpenAI-model conversion.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;

use super::openai::{ModelInfo, ModelList};
use crate::app::AppState;
use crate::error::ApiError;

const OWNER: &str = "backbone";

fn to_model_info(name: String) -> ModelInfo {
    ModelInfo { id: name, object: "model", created: Utc::now().timestamp(), owned_by: OWNER }
}

pub async fn list_models(State(state): State<Arc<AppState>>) -> Result<Json<ModelList>, ApiError> {
    let data = match &state.ollama {
        Some(ollama) => ollama
            .list_models()
            .await
            .map_err(backbone_core::error::BackboneError::from)?
            .into_iter()
            .map(|m| to_model_info(m.name))
            .collect(),
        None => Vec::new(),
    };
    Ok(Json(ModelList { object: "list", data }))
}

pub async fn get_model(
    State(state): State<Arc<AppState>>,
    Path(model_id): Path<String>,
) -> Result<Json<ModelInfo>, ApiError> {
    let ollama = state
        .ollama
        .as_ref()
        .ok_or_else(|| backbone_core::error::BackboneError::UnknownProvider("ollama".to_string()))?;

    let found = ollama
        .list_models()
        .await
        .map_err(backbone_core::error::BackboneError::from)?
        .into_iter()
        .find(|m| m.name == model_id)
        .ok_or_else(|| backbone_core::error::BackboneError::UnknownProvider(model_id.clone()))?;

    Ok(Json(to_model_info(found.name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_state;

    #[tokio::test]
    async fn list_models_is_empty_without_a_configured_backend() {
        let state = test_state(None);
        let resp = list_models(State(state)).await.unwrap().0;
        assert!(resp.data.is_empty());
    }

    #[tokio::test]
    async fn get_model_without_a_configured_backend_is_unknown_provider() {
        let state = test_state(None);
        let err = get_model(State(state), Path("llama3".to_string())).await.unwrap_err();
        assert_eq!(err.0.http_status(), 400);
    }
}
