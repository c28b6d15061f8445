use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json},
};
use serde_json::json;

/// Liveness probe. Never cached, never authenticated.
pub async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CACHE_CONTROL, HeaderValue::from_static("no-store"))],
        Json(json!({ "status": "ok" })),
    )
}
