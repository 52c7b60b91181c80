//! JSON response helpers shared by the handlers.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Generic acknowledgment for every accepted delivery.
pub fn ack() -> Response {
    (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response()
}

/// Handshake reply echoing Slack's challenge.
pub fn challenge(value: String) -> Response {
    (StatusCode::OK, Json(json!({ "challenge": value }))).into_response()
}

/// Rejected signature; carries no detail about what failed.
pub fn unauthorized() -> Response {
    let body = Json(json!({ "error": "unauthorized" }));
    (StatusCode::UNAUTHORIZED, body).into_response()
}
