//! Slack side of the bridge: inbound Events API payloads and the Web API
//! client used to post answers.

mod client;
mod events;

pub use client::{PostError, ReplyPoster, SlackClient};
pub use events::{
    Authorization, EnvelopeType, InboundEvent, MessageEvent, RETRY_NUM_HEADER,
    RETRY_REASON_HEADER, RetryInfo,
};
