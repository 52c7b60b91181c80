//! Langflow flow-run backend.
//!
//! Works with hosted (DataStax Astra) and self-hosted Langflow run
//! endpoints: `POST /api/v1/run/{flow}` with a bearer token.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use super::answer::AnswerPath;
use super::error::BackendError;
use super::provider::{AnswerBackend, Query};
use crate::config::{BackendConfig, ConfigError};

/// Longest slice of an error body kept in [`BackendError::Api`].
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Langflow run-endpoint client.
pub struct LangflowClient {
    client: Client,
    url: String,
    token: String,
    answer_path: AnswerPath,
    input_type: String,
    output_type: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct RunRequest<'a> {
    input_value: &'a str,
    input_type: &'a str,
    output_type: &'a str,
    session_id: &'a str,
}

impl LangflowClient {
    pub fn new(
        url: String,
        token: String,
        answer_path: AnswerPath,
        input_type: String,
        output_type: String,
        timeout: Duration,
    ) -> Self {
        Self {
            client: Client::new(),
            url,
            token,
            answer_path,
            input_type,
            output_type,
            timeout,
        }
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            config.url.clone(),
            config.token.clone(),
            config.answer_path()?,
            config.input_type.clone(),
            config.output_type.clone(),
            config.timeout(),
        ))
    }
}

#[async_trait]
impl AnswerBackend for LangflowClient {
    async fn query(&self, query: &Query) -> Result<String, BackendError> {
        let request = RunRequest {
            input_value: &query.text,
            input_type: &self.input_type,
            output_type: &self.output_type,
            session_id: &query.session_id,
        };

        debug!(session_id = %query.session_id, "Querying Langflow");
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.token))
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(MAX_ERROR_BODY_CHARS)
                .collect();
            return Err(BackendError::Api { status, message });
        }

        let body = response.text().await?;
        let value: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| BackendError::InvalidBody(e.to_string()))?;

        self.answer_path
            .extract(&value)
            .map(str::trim)
            .filter(|answer| !answer.is_empty())
            .map(str::to_string)
            .ok_or_else(|| BackendError::MissingAnswer {
                field: self.answer_path.to_string(),
            })
    }
}
