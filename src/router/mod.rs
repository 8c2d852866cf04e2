//! Route resolution seam.
//!
//! Matching a path to a handler lives outside this crate; the request pipeline
//! only needs something that turns `(path, method, headers)` into a
//! [`RouteDescriptor`].

use async_trait::async_trait;
use axum::http::{HeaderMap, Method};
use std::collections::HashMap;

/// Result of matching an inbound request to an application route.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteDescriptor {
    pub route: String,
    pub method: Method,
    pub params: HashMap<String, String>,
}

impl RouteDescriptor {
    pub fn new(route: impl Into<String>, method: Method) -> Self {
        Self {
            route: route.into(),
            method,
            params: HashMap::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Create/update/replace methods whose body the pipeline collects.
    pub fn has_body(&self) -> bool {
        matches!(self.method, Method::POST | Method::PUT | Method::PATCH)
    }
}

/// Resolves inbound requests to routes.
///
/// Failures may be any error; the pipeline normalizes them into an
/// [`HttpError`](crate::exception::HttpError), so return one directly to pick
/// the status (e.g. 404).
#[async_trait]
pub trait Router: Send + Sync + 'static {
    async fn parse_request(
        &self,
        path: &str,
        method: &Method,
        headers: &HeaderMap,
    ) -> anyhow::Result<RouteDescriptor>;
}
