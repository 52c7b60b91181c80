//! Slack Events API payloads.
//!
//! Only the fields the gateway acts on are modelled. The nested `event`
//! object is kept as raw JSON so a malformed inner event can be skipped
//! without rejecting the whole delivery.

use axum::http::HeaderMap;
use serde::Deserialize;

/// Header Slack sets on redeliveries; its value is the attempt number.
pub const RETRY_NUM_HEADER: &str = "x-slack-retry-num";

/// Header explaining why Slack redelivered (e.g. `http_timeout`).
pub const RETRY_REASON_HEADER: &str = "x-slack-retry-reason";

/// Outer envelope type of an Events API request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeType {
    /// Handshake sent when the request URL is configured.
    UrlVerification,
    /// Wrapper around an actual workspace event.
    EventCallback,
    /// Anything else (`app_rate_limited`, future types).
    #[default]
    #[serde(other)]
    Other,
}

/// A deserialized Events API request body.
///
/// # Examples
///
/// ```
/// use langbridge::slack::{EnvelopeType, InboundEvent};
///
/// let body = r#"{"type":"url_verification","challenge":"3eZbrw1a"}"#;
/// let event: InboundEvent = serde_json::from_str(body).unwrap();
/// assert_eq!(event.kind, EnvelopeType::UrlVerification);
/// assert_eq!(event.challenge.as_deref(), Some("3eZbrw1a"));
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct InboundEvent {
    #[serde(rename = "type", default)]
    pub kind: EnvelopeType,

    /// Present only on `url_verification`.
    #[serde(default)]
    pub challenge: Option<String>,

    /// The inner event, parsed on demand by [`MessageEvent::from_value`].
    #[serde(default)]
    pub event: Option<serde_json::Value>,

    /// Legacy list of user ids the app is installed for; the first entry is
    /// the bot user on single-workspace installs.
    #[serde(default)]
    pub authed_users: Vec<String>,

    #[serde(default)]
    pub authorizations: Vec<Authorization>,

    #[serde(default)]
    pub event_id: Option<String>,

    #[serde(default)]
    pub team_id: Option<String>,
}

/// One installation the event is visible to.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Authorization {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub is_bot: bool,
}

impl Authorization {
    fn user(&self) -> Option<&str> {
        self.user_id.as_deref().filter(|id| !id.is_empty())
    }
}

impl InboundEvent {
    /// The bot's own user id, as stated by this request.
    ///
    /// Prefers the bot entry in `authorizations`, then any authorization,
    /// then `authed_users`.
    pub fn bot_user_id(&self) -> Option<&str> {
        self.authorizations
            .iter()
            .filter(|auth| auth.is_bot)
            .find_map(Authorization::user)
            .or_else(|| self.authorizations.iter().find_map(Authorization::user))
            .or_else(|| {
                self.authed_users
                    .iter()
                    .map(String::as_str)
                    .find(|id| !id.is_empty())
            })
    }
}

/// The inner `event` object of an `event_callback`.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageEvent {
    /// Event type, e.g. `app_mention` or `message`.
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub text: Option<String>,

    /// Author user id (absent for bot messages).
    #[serde(default)]
    pub user: Option<String>,

    /// Set when the message was posted by a bot.
    #[serde(default)]
    pub bot_id: Option<String>,

    /// Message subtype (`bot_message`, `message_changed`, ...).
    #[serde(default)]
    pub subtype: Option<String>,

    #[serde(default)]
    pub channel: Option<String>,

    /// Timestamp of this message.
    #[serde(default)]
    pub ts: Option<String>,

    /// Thread parent timestamp (present only for thread replies).
    #[serde(default)]
    pub thread_ts: Option<String>,
}

impl MessageEvent {
    /// Parse the inner event, returning `None` if it does not have the
    /// expected shape.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        Self::deserialize(value).ok()
    }
}

/// Redelivery marker parsed from the retry headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryInfo {
    /// Attempt number (`1` is the first retry). `0` if unparseable.
    pub attempt: u32,
    pub reason: Option<String>,
}

impl RetryInfo {
    /// `Some` if the request carries `X-Slack-Retry-Num`.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let attempt = headers.get(RETRY_NUM_HEADER)?;
        let attempt = attempt
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0);
        let reason = headers
            .get(RETRY_REASON_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Some(Self { attempt, reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn parse(body: &str) -> InboundEvent {
        serde_json::from_str(body).expect("deserialize")
    }

    #[test]
    fn test_should_deserialize_event_callback() {
        let json = serde_json::json!({
            "type": "event_callback",
            "team_id": "T1",
            "event_id": "Ev1",
            "event": {
                "type": "app_mention",
                "channel": "C123",
                "user": "U456",
                "text": "<@UBOT> hello",
                "ts": "1700000000.000100"
            },
            "authorizations": [
                {"user_id": "UBOT", "is_bot": true, "team_id": "T1"}
            ]
        });
        let payload: InboundEvent = serde_json::from_value(json).expect("deserialize");
        assert_eq!(payload.kind, EnvelopeType::EventCallback);
        assert_eq!(payload.event_id.as_deref(), Some("Ev1"));
        assert_eq!(payload.team_id.as_deref(), Some("T1"));
        assert_eq!(payload.bot_user_id(), Some("UBOT"));

        let msg = MessageEvent::from_value(payload.event.as_ref().unwrap())
            .expect("message");
        assert_eq!(msg.kind, "app_mention");
        assert_eq!(msg.channel.as_deref(), Some("C123"));
        assert_eq!(msg.user.as_deref(), Some("U456"));
        assert_eq!(msg.ts.as_deref(), Some("1700000000.000100"));
        assert!(msg.thread_ts.is_none());
        assert!(msg.bot_id.is_none());
    }

    #[test]
    fn test_should_treat_unknown_envelope_as_other() {
        let payload = parse(r#"{"type":"app_rate_limited","minute_rate_limited":1}"#);
        assert_eq!(payload.kind, EnvelopeType::Other);

        let payload = parse("{}");
        assert_eq!(payload.kind, EnvelopeType::Other);
        assert!(payload.event.is_none());
    }

    #[test]
    fn test_bot_user_id_prefers_bot_authorization() {
        let payload: InboundEvent = serde_json::from_value(serde_json::json!({
            "type": "event_callback",
            "authed_users": ["ULEGACY"],
            "authorizations": [
                {"user_id": "UHUMAN", "is_bot": false},
                {"user_id": "UBOT", "is_bot": true}
            ]
        }))
        .expect("deserialize");
        assert_eq!(payload.bot_user_id(), Some("UBOT"));
    }

    #[test]
    fn test_bot_user_id_falls_back_to_authed_users() {
        let payload: InboundEvent = serde_json::from_value(serde_json::json!({
            "type": "event_callback",
            "authed_users": ["", "ULEGACY"]
        }))
        .expect("deserialize");
        assert_eq!(payload.bot_user_id(), Some("ULEGACY"));

        let payload = parse(r#"{"type":"event_callback"}"#);
        assert_eq!(payload.bot_user_id(), None);
    }

    #[test]
    fn test_malformed_inner_event_yields_none() {
        let message = |value: serde_json::Value| MessageEvent::from_value(&value);
        assert!(message(serde_json::json!("not an object")).is_none());
        assert!(message(serde_json::json!({"text": "no type"})).is_none());
        assert!(message(serde_json::json!({"type": "app_mention", "ts": 12})).is_none());
    }

    #[test]
    fn test_null_fields_are_accepted() {
        let msg = MessageEvent::from_value(&serde_json::json!({
            "type": "app_mention",
            "text": null,
            "thread_ts": null
        }))
        .expect("message");
        assert!(msg.text.is_none());
        assert!(msg.thread_ts.is_none());
    }

    #[test]
    fn test_retry_info_from_headers() {
        let mut headers = HeaderMap::new();
        assert!(RetryInfo::from_headers(&headers).is_none());

        headers.insert(RETRY_NUM_HEADER, HeaderValue::from_static("2"));
        headers.insert(
            RETRY_REASON_HEADER,
            HeaderValue::from_static("http_timeout"),
        );
        assert_eq!(
            RetryInfo::from_headers(&headers),
            Some(RetryInfo {
                attempt: 2,
                reason: Some("http_timeout".to_string())
            })
        );

        headers.insert(RETRY_NUM_HEADER, HeaderValue::from_static("soon"));
        assert_eq!(
            RetryInfo::from_headers(&headers).map(|r| r.attempt),
            Some(0)
        );
    }
}
