//! Backend error types.

use thiserror::Error;

/// Errors that can occur when querying the backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// No response within the query timeout.
    #[error("backend query timed out")]
    Timeout,

    /// HTTP request failed
    #[error("http request failed: {0}")]
    Request(#[source] reqwest::Error),

    /// API returned an error response
    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Response body was not JSON.
    #[error("response is not valid JSON: {0}")]
    InvalidBody(String),

    /// The configured answer field was absent, not a string, or empty.
    #[error("response has no answer at '{field}'")]
    MissingAnswer { field: String },
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackendError::Timeout
        } else {
            BackendError::Request(err)
        }
    }
}
