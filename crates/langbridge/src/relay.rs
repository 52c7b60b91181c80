//! Query the backend, then post the answer into the Slack thread.
//!
//! The two phases fail independently. A failed query is replaced by the
//! fallback answer so the user still hears back; a failed post is reported
//! to the observer and dropped. Neither is ever surfaced to Slack's event
//! delivery, which was already acknowledged.

use std::sync::Arc;

use tracing::{info, warn};

use crate::backend::{AnswerBackend, BackendError, Query};
use crate::dispatch::Process;
use crate::slack::{PostError, ReplyPoster};

/// Receives the outcome of each relay phase.
pub trait RelayObserver: Send + Sync {
    fn on_answer(&self, process: &Process, answer: &str);
    fn on_query_failed(&self, process: &Process, error: &BackendError);
    fn on_posted(&self, process: &Process, ts: Option<&str>);
    fn on_post_failed(&self, process: &Process, error: &PostError);
}

/// Default observer: structured log lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl RelayObserver for TracingObserver {
    fn on_answer(&self, process: &Process, answer: &str) {
        info!(
            user = %process.user,
            channel = %process.target.channel,
            answer_len = answer.len(),
            "Backend answered"
        );
    }

    fn on_query_failed(&self, process: &Process, error: &BackendError) {
        warn!(
            user = %process.user,
            channel = %process.target.channel,
            error = %error,
            "Backend query failed, using fallback answer"
        );
    }

    fn on_posted(&self, process: &Process, ts: Option<&str>) {
        info!(
            channel = %process.target.channel,
            thread_ts = %process.target.thread_ts,
            ts = ts.unwrap_or_default(),
            "Posted reply"
        );
    }

    fn on_post_failed(&self, process: &Process, error: &PostError) {
        warn!(
            channel = %process.target.channel,
            thread_ts = %process.target.thread_ts,
            error = %error,
            "Failed to post reply"
        );
    }
}

/// What happened to a single relayed mention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    /// Text that was (or would have been) posted.
    pub answer: String,
    /// `true` if `answer` is the fallback rather than a backend answer.
    pub fallback: bool,
    pub posted: bool,
}

#[derive(Clone)]
pub struct Relay {
    backend: Arc<dyn AnswerBackend>,
    poster: Arc<dyn ReplyPoster>,
    observer: Arc<dyn RelayObserver>,
    fallback_answer: String,
}

impl Relay {
    pub fn new(
        backend: Arc<dyn AnswerBackend>,
        poster: Arc<dyn ReplyPoster>,
        observer: Arc<dyn RelayObserver>,
        fallback_answer: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            poster,
            observer,
            fallback_answer: fallback_answer.into(),
        }
    }

    pub async fn execute(&self, process: &Process) -> RelayOutcome {
        let query = Query {
            text: process.text.clone(),
            session_id: process.user.clone(),
        };

        let (answer, fallback) = match self.backend.query(&query).await {
            Ok(answer) => {
                self.observer.on_answer(process, &answer);
                (answer, false)
            }
            Err(e) => {
                self.observer.on_query_failed(process, &e);
                (self.fallback_answer.clone(), true)
            }
        };

        let posted = match self.poster.post_reply(&process.target, &answer).await {
            Ok(ts) => {
                self.observer.on_posted(process, ts.as_deref());
                true
            }
            Err(e) => {
                self.observer.on_post_failed(process, &e);
                false
            }
        };

        RelayOutcome {
            answer,
            fallback,
            posted,
        }
    }
}
