use std::fmt;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use tokio::fs;

use serde::Deserialize;
use thiserror::Error;

use crate::backend::AnswerPath;

// ============================================================================
// Config (root)
// ============================================================================

/// Process-wide configuration, built once at startup and never mutated.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

impl Config {
    /// Read the YAML file at `path`. A missing file yields the defaults.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        Ok(serde_saphyr::from_str(&contents)?)
    }

    /// Load the file, apply environment overrides and validate the result.
    pub async fn resolve(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Self::load(path).await?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override secrets and endpoints from the environment.
    ///
    /// `lookup` is the environment accessor; tests pass a closure over a map.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| lookup(*k).filter(|v| !v.trim().is_empty()))
        };

        if let Some(host) = first(&["LANGBRIDGE_HOST"]) {
            self.server.host = host;
        }
        if let Some(port) = first(&["PORT"]) {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid {
                    key: "server.port",
                    reason: format!("PORT is not a valid port number: {port}"),
                })?;
        }
        if let Some(token) = first(&["SLACK_BOT_TOKEN"]) {
            self.slack.bot_token = token;
        }
        if let Some(secret) = first(&["SLACK_SIGNING_SECRET"]) {
            self.slack.signing_secret = secret;
        }
        if let Some(base) = first(&["SLACK_API_BASE"]) {
            self.slack.api_base = base;
        }
        if let Some(url) = first(&["LANGFLOW_URL", "ASTRA_URL"]) {
            self.backend.url = url;
        }
        if let Some(token) = first(&["LANGFLOW_API_TOKEN", "ASTRA_TOKEN"]) {
            self.backend.token = token;
        }
        if let Some(field) = first(&["LANGFLOW_ANSWER_FIELD"]) {
            self.backend.answer_field = field;
        }
        Ok(())
    }

    /// Reject configurations that would only fail once requests arrive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require(&self.slack.bot_token, "slack.bot_token", "SLACK_BOT_TOKEN")?;
        require(
            &self.slack.signing_secret,
            "slack.signing_secret",
            "SLACK_SIGNING_SECRET",
        )?;
        require(&self.backend.token, "backend.token", "LANGFLOW_API_TOKEN")?;
        require(&self.backend.url, "backend.url", "LANGFLOW_URL")?;
        require(
            &self.backend.answer_field,
            "backend.answer_field",
            "LANGFLOW_ANSWER_FIELD",
        )?;
        self.backend.answer_path()?;

        if !self.server.events_path.starts_with('/') {
            return Err(ConfigError::Invalid {
                key: "server.events_path",
                reason: "must start with '/'".to_string(),
            });
        }

        for (key, value) in [
            (
                "server.request_timeout_seconds",
                self.server.request_timeout_seconds,
            ),
            (
                "server.max_in_flight_relays",
                self.server.max_in_flight_relays as u64,
            ),
            ("slack.post_timeout_seconds", self.slack.post_timeout_seconds),
            (
                "slack.timestamp_tolerance_seconds",
                self.slack.timestamp_tolerance_seconds,
            ),
            ("backend.timeout_seconds", self.backend.timeout_seconds),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    key,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        if self.backend.timeout_seconds < self.slack.post_timeout_seconds {
            return Err(ConfigError::Invalid {
                key: "backend.timeout_seconds",
                reason: format!(
                    "backend timeout ({}s) must not be shorter than the Slack post timeout ({}s)",
                    self.backend.timeout_seconds, self.slack.post_timeout_seconds
                ),
            });
        }

        // Inline relays run inside the request and must finish before the
        // request timeout fires.
        let relay_budget = self.backend.timeout_seconds + self.slack.post_timeout_seconds;
        if !self.server.ack_before_relay && self.server.request_timeout_seconds <= relay_budget {
            return Err(ConfigError::Invalid {
                key: "server.request_timeout_seconds",
                reason: format!(
                    "with ack_before_relay disabled the request timeout ({}s) must exceed the \
                     backend and Slack post timeouts combined ({relay_budget}s)",
                    self.server.request_timeout_seconds
                ),
            });
        }

        Ok(())
    }
}

fn require(value: &str, key: &'static str, env: &'static str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Missing { key, env });
    }
    Ok(())
}

/// Render a secret for logs and summaries.
pub fn redact(secret: &str) -> String {
    if secret.is_empty() {
        return "<unset>".to_string();
    }
    let visible: String = secret.chars().take(4).collect();
    format!("{visible}…")
}

// ============================================================================
// ServerConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Path Slack delivers events to. `/` is always routed as well.
    #[serde(default = "default_events_path")]
    pub events_path: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Acknowledge Slack first and relay on a background task.
    #[serde(default = "default_ack_before_relay")]
    pub ack_before_relay: bool,
    #[serde(default = "default_max_in_flight_relays")]
    pub max_in_flight_relays: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            events_path: default_events_path(),
            request_timeout_seconds: default_request_timeout(),
            ack_before_relay: default_ack_before_relay(),
            max_in_flight_relays: default_max_in_flight_relays(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_events_path() -> String {
    "/slack/events".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_ack_before_relay() -> bool {
    true
}

fn default_max_in_flight_relays() -> usize {
    64
}

// ============================================================================
// SlackConfig
// ============================================================================

#[derive(Deserialize)]
pub struct SlackConfig {
    /// Bot User OAuth Token (`xoxb-...`) used for `chat.postMessage`.
    #[serde(default)]
    pub bot_token: String,
    /// Signing secret used to verify inbound requests.
    #[serde(default)]
    pub signing_secret: String,
    #[serde(default = "default_slack_api_base")]
    pub api_base: String,
    /// Maximum clock skew accepted on `X-Slack-Request-Timestamp`.
    #[serde(default = "default_timestamp_tolerance")]
    pub timestamp_tolerance_seconds: u64,
    /// Verify signatures on `url_verification` handshakes too.
    #[serde(default = "default_verify_url_verification")]
    pub verify_url_verification: bool,
    #[serde(default = "default_post_timeout")]
    pub post_timeout_seconds: u64,
}

impl SlackConfig {
    pub fn post_timeout(&self) -> Duration {
        Duration::from_secs(self.post_timeout_seconds)
    }
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            signing_secret: String::new(),
            api_base: default_slack_api_base(),
            timestamp_tolerance_seconds: default_timestamp_tolerance(),
            verify_url_verification: default_verify_url_verification(),
            post_timeout_seconds: default_post_timeout(),
        }
    }
}

impl fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlackConfig")
            .field("bot_token", &redact(&self.bot_token))
            .field("signing_secret", &redact(&self.signing_secret))
            .field("api_base", &self.api_base)
            .field(
                "timestamp_tolerance_seconds",
                &self.timestamp_tolerance_seconds,
            )
            .field("verify_url_verification", &self.verify_url_verification)
            .field("post_timeout_seconds", &self.post_timeout_seconds)
            .finish()
    }
}

fn default_slack_api_base() -> String {
    "https://slack.com/api".to_string()
}

fn default_timestamp_tolerance() -> u64 {
    300
}

fn default_verify_url_verification() -> bool {
    true
}

fn default_post_timeout() -> u64 {
    10
}

// ============================================================================
// BackendConfig
// ============================================================================

#[derive(Deserialize)]
pub struct BackendConfig {
    /// Langflow run endpoint.
    #[serde(default = "default_backend_url")]
    pub url: String,
    #[serde(default)]
    pub token: String,
    /// Path of the answer in the response body, e.g. `output` or
    /// `outputs.0.outputs.0.results.message.text`.
    #[serde(default = "default_answer_field")]
    pub answer_field: String,
    #[serde(default = "default_io_type")]
    pub input_type: String,
    #[serde(default = "default_io_type")]
    pub output_type: String,
    #[serde(default = "default_backend_timeout")]
    pub timeout_seconds: u64,
    /// Posted to the thread whenever the backend cannot produce an answer.
    #[serde(default = "default_fallback_answer")]
    pub fallback_answer: String,
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn answer_path(&self) -> Result<AnswerPath, ConfigError> {
        self.answer_field
            .parse()
            .map_err(|reason| ConfigError::Invalid {
                key: "backend.answer_field",
                reason,
            })
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            token: String::new(),
            answer_field: default_answer_field(),
            input_type: default_io_type(),
            output_type: default_io_type(),
            timeout_seconds: default_backend_timeout(),
            fallback_answer: default_fallback_answer(),
        }
    }
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("url", &self.url)
            .field("token", &redact(&self.token))
            .field("answer_field", &self.answer_field)
            .field("input_type", &self.input_type)
            .field("output_type", &self.output_type)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("fallback_answer", &self.fallback_answer)
            .finish()
    }
}

const DEFAULT_BACKEND_URL: &str = "https://api.langflow.astra.datastax.com/lf/252a6775-893d-49c1-bcb7-e25cb3be441a/api/v1/run/f933dc8c-e6fb-4db5-b496-2d23b8770cd9";

fn default_backend_url() -> String {
    DEFAULT_BACKEND_URL.to_string()
}

fn default_answer_field() -> String {
    "output".to_string()
}

fn default_io_type() -> String {
    "chat".to_string()
}

fn default_backend_timeout() -> u64 {
    60
}

fn default_fallback_answer() -> String {
    "⚠️ erro ao consultar Langflow".to_string()
}

// ============================================================================
// DispatchConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct DispatchConfig {
    /// Sent to the backend when a mention carries no text of its own.
    #[serde(default = "default_text")]
    pub default_text: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_text: default_text(),
        }
    }
}

fn default_text() -> String {
    "geral".to_string()
}

// ============================================================================
// ConfigError
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),

    #[error("missing required setting {key} (set it in the config file or via {env})")]
    Missing {
        key: &'static str,
        env: &'static str,
    },

    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

// ============================================================================
// Tests
// ============================================================================
