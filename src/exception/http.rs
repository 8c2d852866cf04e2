use crate::exception::sanitize;
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Log-context form of an [`HttpError`].
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody<'a> {
    pub status_code: u16,
    pub message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<&'a str>,
    pub timestamp: DateTime<Utc>,
}

/// Structured request failure carrying the HTTP status to render.
///
/// Anything going wrong inside the request pipeline ends up as an `HttpError`
/// before it reaches the response: arbitrary errors are normalized with
/// [`HttpError::from_anyhow`], keeping their message and their debug chain
/// (including the backtrace when one was captured).
pub struct HttpError {
    status: StatusCode,
    message: String,
    data: Option<Value>,
    stack: Option<String>,
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            data: None,
            stack: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Attach a value for diagnostics (e.g. the payload that was rejected).
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Downcast to an `HttpError` when the failure already is one, otherwise
    /// wrap it as a 500 preserving message and chain.
    pub fn from_anyhow(error: anyhow::Error) -> Self {
        match error.downcast::<HttpError>() {
            Ok(http) => http,
            Err(other) => Self::internal(other.to_string()).with_stack(format!("{other:?}")),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub fn stack(&self) -> Option<&str> {
        self.stack.as_deref()
    }

    /// Text safe to put in a response body or a log line.
    pub fn sanitized(&self) -> String {
        sanitize(&self.to_string())
    }

    pub fn body(&self) -> ErrorBody<'_> {
        ErrorBody {
            status_code: self.status.as_u16(),
            message: &self.message,
            data: self.data.as_ref(),
            stack: self.stack.as_deref(),
            timestamp: Utc::now(),
        }
    }

    /// Structured form used as log context.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self.body()).unwrap_or(Value::Null)
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HttpError: {} {}", self.status, self.message)
    }
}

impl fmt::Debug for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpError")
            .field("status", &self.status)
            .field("message", &self.message)
            .field("data", &self.data)
            .finish()
    }
}

impl std::error::Error for HttpError {}
