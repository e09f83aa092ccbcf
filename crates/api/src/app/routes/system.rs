use axum::{http::StatusCode, response::Response};

use crate::app::dto;

pub async fn health() -> Response {
    dto::json_ok(StatusCode::OK, Some(serde_json::json!({ "status": "ok" })), "healthy")
}
