use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

pub fn problem(status: StatusCode, title: &str, detail: impl Into<String>) -> axum::response::Response {
    (
        status,
        Json(json!({
            "type": "about:blank",
            "title": title,
            "status": status.as_u16(),
            "detail": detail.into(),
        })),
    )
        .into_response()
}

pub fn bad_request(detail: impl Into<String>) -> axum::response::Response {
    problem(StatusCode::BAD_REQUEST, "Bad Request", detail)
}

pub fn not_found(detail: impl Into<String>) -> axum::response::Response {
    problem(StatusCode::NOT_FOUND, "Not Found", detail)
}

pub fn upstream_failed(detail: impl Into<String>) -> axum::response::Response {
    problem(StatusCode::BAD_GATEWAY, "Upstream Failed", detail)
}
