//! Structured logger bound in the root injector.
//!
//! A thin facade over `tracing`: every call carries a message plus a JSON
//! context, and the installed subscriber decides where it goes.

use serde_json::Value;

#[derive(Clone, Debug)]
pub struct Logger {
    name: String,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new("strata")
    }
}

impl Logger {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn trace(&self, message: &str, context: Value) {
        tracing::trace!(logger = %self.name, context = %context, "{}", message);
    }

    pub fn debug(&self, message: &str, context: Value) {
        tracing::debug!(logger = %self.name, context = %context, "{}", message);
    }

    pub fn info(&self, message: &str, context: Value) {
        tracing::info!(logger = %self.name, context = %context, "{}", message);
    }

    pub fn warn(&self, message: &str, context: Value) {
        tracing::warn!(logger = %self.name, context = %context, "{}", message);
    }

    pub fn error(&self, message: &str, context: Value) {
        tracing::error!(logger = %self.name, context = %context, "{}", message);
    }
}
