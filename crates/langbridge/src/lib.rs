//! Slack Events API to Langflow bridge.
//!
//! Inbound deliveries are authenticated ([`auth`]), classified
//! ([`dispatch`]) and, for actionable mentions, relayed to the backend with
//! the answer posted back into the originating thread ([`relay`]).

pub mod auth;
pub mod backend;
pub mod config;
pub mod dispatch;
pub mod gateway;
pub mod handlers;
pub mod relay;
pub mod response;
pub mod server;
pub mod slack;
