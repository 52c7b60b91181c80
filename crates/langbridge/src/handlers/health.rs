use axum::extract::State;
use axum::http::StatusCode;

use crate::server::AppState;

pub async fn livez() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Not ready while every background relay slot is taken.
pub async fn readyz(State(state): State<AppState>) -> (StatusCode, &'static str) {
    if state.relay_permits.available_permits() == 0 {
        return (StatusCode::SERVICE_UNAVAILABLE, "busy");
    }
    (StatusCode::OK, "ok")
}
