//! Slack Events API delivery handler.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use bytes::Bytes;
use tracing::field::Empty;
use tracing::{debug, instrument, warn};

use crate::dispatch::Action;
use crate::response;
use crate::server::AppState;

/// POST /slack/events
///
/// Takes the raw body so the signature is checked over exactly the bytes
/// Slack signed.
#[instrument(skip_all, fields(event_id = Empty, team_id = Empty))]
pub async fn slack_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let action = match state.gateway.admit(&headers, &body) {
        Ok(action) => action,
        Err(e) => {
            warn!(error = %e, "Rejected Slack delivery");
            return response::unauthorized();
        }
    };

    match action {
        Action::RespondChallenge(challenge) => {
            debug!("Answering url_verification handshake");
            response::challenge(challenge)
        }
        Action::Ignore(reason) => {
            debug!(%reason, "Ignoring Slack delivery");
            response::ack()
        }
        Action::Process(process) => {
            debug!(
                user = %process.user,
                channel = %process.target.channel,
                thread_ts = %process.target.thread_ts,
                "Relaying mention"
            );
            state.schedule_relay(process).await;
            response::ack()
        }
    }
}
