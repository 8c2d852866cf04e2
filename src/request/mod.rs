//! Per-request orchestration.
//!
//! Each inbound request gets its own child [`Injector`](crate::Injector) in
//! which a [`RequestResolver`] is built and driven from route resolution to a
//! written response.

mod resolver;
mod signal;

pub use resolver::{ParsedUrl, RequestResolver, RequestScope};
pub use signal::{RequestEvent, RequestSignal};

use axum::body::Bytes;
use serde_json::Value;
use strum_macros::{AsRefStr, Display};

/// Tokens bound in every request scope.
pub mod tokens {
    pub const REQUEST: &str = "request";
    pub const RESPONSE: &str = "response";
    pub const STATUS_CODE: &str = "status_code";
    pub const DATA: &str = "data";
    pub const URL: &str = "url";
    pub const IS_CUSTOM_ERROR: &str = "is_custom_error";
    pub const IS_FORWARDED: &str = "is_forwarded";
    pub const IS_FORWARDER: &str = "is_forwarder";
}

/// Where a [`RequestResolver`] is in its pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum RequestState {
    Created,
    RouteResolving,
    BodyCollecting,
    Rendering,
    Completed,
    ErrorRendering,
    ErrorRenderingFallback,
    /// Even the fallback error could not be written.
    Swallowed,
}

/// Value handed to [`RequestResolver::render`].
///
/// Only text and binary payloads can be written; anything else is rejected
/// with a 500.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Text(String),
    Binary(Bytes),
    Other(Value),
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Payload::Binary(bytes)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Binary(Bytes::from(bytes))
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Other(value)
    }
}
