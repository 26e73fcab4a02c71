use axum::{http::StatusCode, response::IntoResponse, Json};
use backbone_core::error::BackboneError;
use serde_json::json;

/// Wraps `BackboneError` so handlers can use `?` and still produce an
/// OpenAI-shaped error body (spec.md §7: input -> 4xx, upstream -> 502,
/// timeout -> 504).
pub struct ApiError(pub BackboneError);

impl From<BackboneError> for ApiError {
    fn from(e: BackboneError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(json!({
            "error": {
                "message": self.0.to_string(),
                "type": self.0.code(),
            }
        }));
        (status, body).into_response()
    }
}
