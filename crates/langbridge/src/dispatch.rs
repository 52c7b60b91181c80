//! Event classification.
//!
//! Decides, per verified request, whether to echo a handshake, skip the
//! event, or hand a cleaned-up mention to the relay. Classification never
//! fails: anything unrecognised or malformed becomes [`Action::Ignore`].

use std::fmt;

use crate::slack::{EnvelopeType, InboundEvent, MessageEvent, RetryInfo};

/// Inner event type Slack sends when the bot is @-mentioned.
pub const APP_MENTION: &str = "app_mention";

/// Where an answer is posted: always inside a thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyTarget {
    pub channel: String,
    pub thread_ts: String,
}

/// An actionable mention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Process {
    /// Mention text with the bot's own token removed.
    pub text: String,
    /// Sender user id; doubles as the backend session id.
    pub user: String,
    pub target: ReplyTarget,
}

/// What the gateway should do with a verified request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    RespondChallenge(String),
    Ignore(IgnoreReason),
    Process(Process),
}

/// Why a request was acknowledged without further work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Slack redelivery; the original delivery is already being handled.
    Retry { attempt: u32 },
    /// Body was not a JSON Events API envelope.
    MalformedBody,
    /// Envelope type other than `url_verification` / `event_callback`.
    UnsupportedEnvelope,
    /// Handshake without a `challenge` value.
    MissingChallenge,
    MissingEvent,
    MalformedEvent,
    /// Inner event is not an `app_mention`.
    NotMention { kind: String },
    /// Posted by a bot (`bot_id` or `subtype` present).
    BotAuthored,
    /// Posted by this app's own bot user.
    OwnMessage,
    MissingField(&'static str),
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IgnoreReason::Retry { attempt } => write!(f, "retry delivery #{attempt}"),
            IgnoreReason::MalformedBody => f.write_str("malformed request body"),
            IgnoreReason::UnsupportedEnvelope => f.write_str("unsupported envelope type"),
            IgnoreReason::MissingChallenge => f.write_str("handshake without challenge"),
            IgnoreReason::MissingEvent => f.write_str("missing inner event"),
            IgnoreReason::MalformedEvent => f.write_str("malformed inner event"),
            IgnoreReason::NotMention { kind } => write!(f, "event type {kind} is not a mention"),
            IgnoreReason::BotAuthored => f.write_str("bot-authored message"),
            IgnoreReason::OwnMessage => f.write_str("message from this bot"),
            IgnoreReason::MissingField(field) => write!(f, "event has no {field}"),
        }
    }
}

/// Classifies verified Events API requests.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    default_text: String,
}

impl Dispatcher {
    /// `default_text` replaces mentions that carry no text of their own.
    pub fn new(default_text: impl Into<String>) -> Self {
        Self {
            default_text: default_text.into(),
        }
    }

    pub fn classify(&self, event: &InboundEvent, retry: Option<&RetryInfo>) -> Action {
        if let Some(retry) = retry {
            return Action::Ignore(IgnoreReason::Retry {
                attempt: retry.attempt,
            });
        }

        match event.kind {
            EnvelopeType::UrlVerification => {
                return match &event.challenge {
                    Some(challenge) => Action::RespondChallenge(challenge.clone()),
                    None => Action::Ignore(IgnoreReason::MissingChallenge),
                };
            }
            EnvelopeType::EventCallback => {}
            EnvelopeType::Other => return Action::Ignore(IgnoreReason::UnsupportedEnvelope),
        }

        let Some(raw) = &event.event else {
            return Action::Ignore(IgnoreReason::MissingEvent);
        };
        let Some(message) = MessageEvent::from_value(raw) else {
            return Action::Ignore(IgnoreReason::MalformedEvent);
        };

        match self.classify_message(message, event.bot_user_id()) {
            Ok(process) => Action::Process(process),
            Err(reason) => Action::Ignore(reason),
        }
    }

    fn classify_message(
        &self,
        message: MessageEvent,
        bot_user_id: Option<&str>,
    ) -> Result<Process, IgnoreReason> {
        if message.kind != APP_MENTION {
            return Err(IgnoreReason::NotMention { kind: message.kind });
        }
        if message.bot_id.is_some() || message.subtype.is_some() {
            return Err(IgnoreReason::BotAuthored);
        }

        let user = non_empty(message.user)
            .ok_or(IgnoreReason::MissingField("user"))?;
        if bot_user_id == Some(user.as_str()) {
            return Err(IgnoreReason::OwnMessage);
        }
        let channel = non_empty(message.channel)
            .ok_or(IgnoreReason::MissingField("channel"))?;
        let ts = non_empty(message.ts)
            .ok_or(IgnoreReason::MissingField("ts"))?;
        let thread_ts = non_empty(message.thread_ts).unwrap_or(ts);

        let text = strip_mention(message.text.as_deref().unwrap_or_default(), bot_user_id);
        let text = if text.is_empty() {
            self.default_text.clone()
        } else {
            text
        };

        Ok(Process {
            text,
            user,
            target: ReplyTarget { channel, thread_ts },
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Remove every mention of `bot_user_id` from `text` and trim the result.
///
/// Both `<@U123>` and the labelled `<@U123|name>` forms are removed; other
/// users' mentions are left untouched.
///
/// ```
/// use langbridge::dispatch::strip_mention;
///
/// assert_eq!(strip_mention("<@U123> hello", Some("U123")), "hello");
/// assert_eq!(strip_mention("<@U123>", Some("U123")), "");
/// assert_eq!(strip_mention("hi <@U999>", Some("U123")), "hi <@U999>");
/// ```
pub fn strip_mention(text: &str, bot_user_id: Option<&str>) -> String {
    let Some(bot) = bot_user_id.filter(|id| !id.is_empty()) else {
        return text.trim().to_string();
    };

    let token = format!("<@{bot}");
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(&token) {
        let after = &rest[start + token.len()..];
        let end = match after.chars().next() {
            Some('>') => Some(1),
            Some('|') => after.find('>').map(|i| i + 1),
            _ => None,
        };
        match end {
            Some(end) => {
                out.push_str(&rest[..start]);
                rest = &after[end..];
            }
            None => {
                // `<@U1234>` when looking for `<@U12`; keep it.
                out.push_str(&rest[..start + token.len()]);
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new("geral")
    }

    fn envelope(value: serde_json::Value) -> InboundEvent {
        serde_json::from_value(value).unwrap()
    }

    fn callback(event: serde_json::Value) -> InboundEvent {
        serde_json::from_value(json!({
            "type": "event_callback",
            "event": event,
            "authorizations": [{"user_id": "UBOT", "is_bot": true}]
        }))
        .unwrap()
    }

    fn mention(text: &str) -> serde_json::Value {
        json!({
            "type": "app_mention",
            "channel": "C1",
            "user": "UHUMAN",
            "text": text,
            "ts": "T2"
        })
    }

    fn classify(event: serde_json::Value) -> Action {
        dispatcher().classify(&callback(event), None)
    }

    fn processed(action: Action) -> Process {
        match action {
            Action::Process(process) => process,
            other => panic!("expected Process, got {other:?}"),
        }
    }

    #[test]
    fn test_handshake_echoes_challenge() {
        let event = envelope(json!({"type": "url_verification", "challenge": "abc123"}));
        assert_eq!(
            dispatcher().classify(&event, None),
            Action::RespondChallenge("abc123".to_string())
        );
    }

    #[test]
    fn test_handshake_without_challenge_is_ignored() {
        let event = envelope(json!({"type": "url_verification"}));
        assert_eq!(
            dispatcher().classify(&event, None),
            Action::Ignore(IgnoreReason::MissingChallenge)
        );
    }

    #[test]
    fn test_retry_is_always_ignored() {
        let retry = RetryInfo {
            attempt: 1,
            reason: Some("http_timeout".to_string()),
        };
        let event = callback(mention("<@UBOT> hello"));
        assert_eq!(
            dispatcher().classify(&event, Some(&retry)),
            Action::Ignore(IgnoreReason::Retry { attempt: 1 })
        );

        let handshake = envelope(json!({"type": "url_verification", "challenge": "x"}));
        assert!(matches!(
            dispatcher().classify(&handshake, Some(&retry)),
            Action::Ignore(IgnoreReason::Retry { .. })
        ));
    }

    #[test]
    fn test_mention_is_processed() {
        let process = processed(classify(mention("<@UBOT> status?")));
        assert_eq!(process.text, "status?");
        assert_eq!(process.user, "UHUMAN");
        assert_eq!(
            process.target,
            ReplyTarget {
                channel: "C1".to_string(),
                thread_ts: "T2".to_string()
            }
        );
    }

    #[test]
    fn test_bare_mention_uses_default_text() {
        let process = processed(classify(mention("<@UBOT>")));
        assert_eq!(process.text, "geral");

        let process = processed(classify(mention("  <@UBOT>  ")));
        assert_eq!(process.text, "geral");
    }

    #[test]
    fn test_missing_text_uses_default_text() {
        let mut event = mention("");
        event.as_object_mut().unwrap().remove("text");
        let process = processed(classify(event));
        assert_eq!(process.text, "geral");
    }

    #[test]
    fn test_thread_anchor_prefers_thread_ts() {
        let mut event = mention("<@UBOT> hi");
        event["thread_ts"] = json!("T1");
        let process = processed(classify(event));
        assert_eq!(process.target.thread_ts, "T1");

        let process = processed(classify(mention("<@UBOT> hi")));
        assert_eq!(process.target.thread_ts, "T2");
    }

    #[test]
    fn test_bot_markers_are_ignored() {
        let mut with_bot_id = mention("<@UBOT> hi");
        with_bot_id["bot_id"] = json!("B1");
        assert_eq!(
            classify(with_bot_id),
            Action::Ignore(IgnoreReason::BotAuthored)
        );

        let mut with_subtype = mention("<@UBOT> hi");
        with_subtype["subtype"] = json!("bot_message");
        assert_eq!(
            classify(with_subtype),
            Action::Ignore(IgnoreReason::BotAuthored)
        );
    }

    #[test]
    fn test_own_message_is_ignored() {
        let mut own = mention("<@UBOT> echo");
        own["user"] = json!("UBOT");
        assert_eq!(classify(own), Action::Ignore(IgnoreReason::OwnMessage));
    }

    #[test]
    fn test_bot_id_is_read_per_request() {
        let event: InboundEvent = serde_json::from_value(json!({
            "type": "event_callback",
            "authed_users": ["UOTHERBOT"],
            "event": mention("<@UBOT> <@UOTHERBOT> hi")
        }))
        .unwrap();
        let process = processed(dispatcher().classify(&event, None));
        assert_eq!(process.text, "<@UBOT>  hi");
    }

    #[test]
    fn test_non_mention_events_are_ignored() {
        let mut message = mention("hello");
        message["type"] = json!("message");
        assert_eq!(
            classify(message),
            Action::Ignore(IgnoreReason::NotMention {
                kind: "message".to_string()
            })
        );
    }

    #[test]
    fn test_malformed_events_degrade_to_ignore() {
        let no_event = envelope(json!({"type": "event_callback"}));
        assert_eq!(
            dispatcher().classify(&no_event, None),
            Action::Ignore(IgnoreReason::MissingEvent)
        );

        assert_eq!(
            classify(json!(["not", "an", "object"])),
            Action::Ignore(IgnoreReason::MalformedEvent)
        );

        let mut no_channel = mention("<@UBOT> hi");
        no_channel.as_object_mut().unwrap().remove("channel");
        assert_eq!(
            classify(no_channel),
            Action::Ignore(IgnoreReason::MissingField("channel"))
        );

        let mut no_user = mention("<@UBOT> hi");
        no_user["user"] = json!("");
        assert_eq!(
            classify(no_user),
            Action::Ignore(IgnoreReason::MissingField("user"))
        );

        let mut no_ts = mention("<@UBOT> hi");
        no_ts.as_object_mut().unwrap().remove("ts");
        assert_eq!(
            classify(no_ts),
            Action::Ignore(IgnoreReason::MissingField("ts"))
        );
    }

    #[test]
    fn test_unsupported_envelope_is_ignored() {
        let event = envelope(json!({"type": "app_rate_limited"}));
        assert_eq!(
            dispatcher().classify(&event, None),
            Action::Ignore(IgnoreReason::UnsupportedEnvelope)
        );
    }

    #[test]
    fn test_strip_mention() {
        assert_eq!(strip_mention("<@U123> hello", Some("U123")), "hello");
        assert_eq!(strip_mention("<@U123>", Some("U123")), "");
        assert_eq!(
            strip_mention("hey <@U123|bridge> what's up", Some("U123")),
            "hey  what's up"
        );
        assert_eq!(strip_mention("<@U123> a <@U123> b", Some("U123")), "a  b");
        assert_eq!(strip_mention("<@U1234> hi", Some("U123")), "<@U1234> hi");
        assert_eq!(strip_mention("<@U123", Some("U123")), "<@U123");
        assert_eq!(strip_mention("  <@U123> hi  ", None), "<@U123> hi");
    }

    #[test]
    fn test_ignore_reason_display() {
        assert_eq!(
            IgnoreReason::Retry { attempt: 2 }.to_string(),
            "retry delivery #2"
        );
        assert_eq!(
            IgnoreReason::MissingField("ts").to_string(),
            "event has no ts"
        );
    }
}
