//! Backend trait.

use async_trait::async_trait;

use super::error::BackendError;

/// A single question put to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub text: String,
    /// One logical conversation per Slack user.
    pub session_id: String,
}

/// Trait for backends that turn a question into an answer.
#[async_trait]
pub trait AnswerBackend: Send + Sync {
    async fn query(&self, query: &Query) -> Result<String, BackendError>;
}
