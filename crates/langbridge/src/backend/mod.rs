//! Conversational-AI backend client.

mod answer;
mod error;
mod langflow;
mod provider;

pub use answer::AnswerPath;
pub use error::BackendError;
pub use langflow::LangflowClient;
pub use provider::{AnswerBackend, Query};
