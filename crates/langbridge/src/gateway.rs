//! The event gateway: authenticate, classify, relay.

use std::sync::Arc;

use axum::http::HeaderMap;
use tracing::{Span, debug, warn};

use crate::auth::{AuthError, SIGNATURE_HEADER, TIMESTAMP_HEADER, Verifier};
use crate::backend::LangflowClient;
use crate::config::{Config, ConfigError};
use crate::dispatch::{Action, Dispatcher, IgnoreReason, Process};
use crate::relay::{Relay, RelayObserver, RelayOutcome, TracingObserver};
use crate::slack::{EnvelopeType, InboundEvent, RetryInfo, SlackClient};

/// Composes the authenticator, dispatcher and relay.
#[derive(Clone)]
pub struct Gateway {
    verifier: Verifier,
    verify_handshake: bool,
    dispatcher: Dispatcher,
    relay: Relay,
}

impl Gateway {
    pub fn new(
        verifier: Verifier,
        verify_handshake: bool,
        dispatcher: Dispatcher,
        relay: Relay,
    ) -> Self {
        Self {
            verifier,
            verify_handshake,
            dispatcher,
            relay,
        }
    }

    /// Wire the production collaborators from configuration.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Self::with_observer(config, Arc::new(TracingObserver))
    }

    pub fn with_observer(
        config: &Config,
        observer: Arc<dyn RelayObserver>,
    ) -> Result<Self, ConfigError> {
        let backend = LangflowClient::from_config(&config.backend)?;
        let slack = SlackClient::new(
            config.slack.api_base.clone(),
            config.slack.bot_token.clone(),
            config.slack.post_timeout(),
        );
        let relay = Relay::new(
            Arc::new(backend),
            Arc::new(slack),
            observer,
            config.backend.fallback_answer.clone(),
        );

        Ok(Self::new(
            Verifier::new(
                config.slack.signing_secret.as_bytes(),
                config.slack.timestamp_tolerance_seconds,
            ),
            config.slack.verify_url_verification,
            Dispatcher::new(config.dispatch.default_text.clone()),
            relay,
        ))
    }

    /// Authenticate and classify a request against the system clock.
    pub fn admit(&self, headers: &HeaderMap, body: &[u8]) -> Result<Action, AuthError> {
        self.admit_at(headers, body, chrono::Utc::now().timestamp())
    }

    /// Authenticate and classify a request.
    ///
    /// Only an authentication failure is an error; every other outcome is
    /// an [`Action`]. Unless handshakes are exempt, the body is not parsed
    /// before the signature has been checked.
    pub fn admit_at(
        &self,
        headers: &HeaderMap,
        body: &[u8],
        now: i64,
    ) -> Result<Action, AuthError> {
        let verify = || {
            self.verifier.verify_at(
                body,
                header(headers, TIMESTAMP_HEADER),
                header(headers, SIGNATURE_HEADER),
                now,
            )
        };

        let parsed = if self.verify_handshake {
            verify()?;
            serde_json::from_slice::<InboundEvent>(body)
        } else {
            let parsed = serde_json::from_slice::<InboundEvent>(body);
            let is_handshake =
                matches!(&parsed, Ok(event) if event.kind == EnvelopeType::UrlVerification);
            if is_handshake {
                debug!("Accepting unsigned url_verification handshake");
            } else {
                verify()?;
            }
            parsed
        };

        let event = match parsed {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Verified request body is not an Events API envelope");
                return Ok(Action::Ignore(IgnoreReason::MalformedBody));
            }
        };

        let span = Span::current();
        if let Some(id) = &event.event_id {
            span.record("event_id", id.as_str());
        }
        if let Some(team) = &event.team_id {
            span.record("team_id", team.as_str());
        }

        let retry = RetryInfo::from_headers(headers);
        Ok(self.dispatcher.classify(&event, retry.as_ref()))
    }

    pub async fn relay(&self, process: &Process) -> RelayOutcome {
        self.relay.execute(process).await
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
