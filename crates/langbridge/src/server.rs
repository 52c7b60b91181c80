use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::dispatch::Process;
use crate::gateway::Gateway;
use crate::handlers;

/// When the relay runs relative to acknowledging Slack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMode {
    /// Acknowledge immediately; relay on a spawned task.
    Background,
    /// Relay before acknowledging.
    Inline,
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub relay_mode: RelayMode,
    /// Caps concurrently running background relays.
    pub relay_permits: Arc<Semaphore>,
    /// Background relays not yet finished; drained on shutdown.
    pub relays: TaskTracker,
}

impl AppState {
    pub fn new(gateway: Gateway, relay_mode: RelayMode, max_in_flight_relays: usize) -> Self {
        Self {
            gateway: Arc::new(gateway),
            relay_mode,
            relay_permits: Arc::new(Semaphore::new(max_in_flight_relays)),
            relays: TaskTracker::new(),
        }
    }

    pub fn from_config(gateway: Gateway, config: &Config) -> Self {
        let mode = if config.server.ack_before_relay {
            RelayMode::Background
        } else {
            RelayMode::Inline
        };
        Self::new(gateway, mode, config.server.max_in_flight_relays)
    }

    /// Run the relay for an actionable mention according to `relay_mode`.
    pub async fn schedule_relay(&self, process: Process) {
        match self.relay_mode {
            RelayMode::Inline => {
                self.gateway.relay(&process).await;
            }
            RelayMode::Background => {
                let gateway = Arc::clone(&self.gateway);
                let permits = Arc::clone(&self.relay_permits);
                self.relays.spawn(async move {
                    let Ok(_permit) = permits.acquire_owned().await else {
                        warn!("Relay semaphore closed, dropping mention");
                        return;
                    };
                    let outcome = gateway.relay(&process).await;
                    debug!(
                        fallback = outcome.fallback,
                        posted = outcome.posted,
                        "Background relay finished"
                    );
                });
            }
        }
    }

    /// Wait up to `grace` for pending background relays. Returns `false`
    /// if some were still running when the grace period ran out.
    pub async fn drain(&self, grace: Duration) -> bool {
        self.relays.close();
        let pending = self.relays.len();
        if pending > 0 {
            info!(pending, "Waiting for background relays to finish");
        }
        if tokio::time::timeout(grace, self.relays.wait()).await.is_err() {
            warn!(
                pending = self.relays.len(),
                "Background relays still running at shutdown"
            );
            return false;
        }
        true
    }
}

pub fn build_app(state: AppState, events_path: &str, request_timeout_secs: u64) -> Router {
    let mut events = Router::new().route("/", post(handlers::slack_events));
    if events_path != "/" {
        events = events.route(events_path, post(handlers::slack_events));
    }

    events
        .route("/livez", get(handlers::livez))
        .route("/readyz", get(handlers::readyz))
        .route("/version", get(handlers::version))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(request_timeout_secs),
        ))
}
