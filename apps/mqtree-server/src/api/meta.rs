use axum::{response::IntoResponse, Json};
use serde_json::json;

/// Liveness probe.
pub async fn healthz() -> impl IntoResponse {
    Json(json!({"ok": true}))
}
