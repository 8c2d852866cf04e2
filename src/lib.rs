//! # Strata
//!
//! Hierarchical dependency injection and a per-request pipeline on top of it.
//!
//! Strata keeps one root [`Injector`] with the process-wide services and
//! creates a child injector for every inbound request. Inside that child a
//! [`RequestResolver`] resolves the route, collects the body, renders the
//! response and recovers from errors; when the response finishes (or the
//! connection closes) the child scope is destroyed.
//!
//! ## Features
//!
//! - **Hierarchical DI**: parent/child injectors with local-first lookup
//! - **Declarative providers**: `#[derive(Injectable)]` with constructor and
//!   property injection, plus a post-construct hook
//! - **Request scopes**: per-request bindings, single teardown, forwarding
//! - **Error recovery**: every pipeline failure becomes an HTTP response
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use strata::prelude::*;
//!
//! #[derive(Injectable)]
//! pub struct UserService {
//!     #[inject]
//!     database: Arc<Database>,
//!     #[inject(token = "tenant", property)]
//!     tenant: Property<String>,
//! }
//!
//! let app = Application::builder()
//!     .router(Arc::new(AppRouter))
//!     .config(ConfigService::from_env("STRATA"))
//!     .build()?;
//!
//! app.handle(request, response).await?;
//! ```

// Lets the derive's `::strata::` paths resolve inside this crate.
extern crate self as strata;

pub mod config;
pub mod di;
pub mod error;
pub mod exception;
pub mod http;
pub mod lifecycle;
pub mod logging;
pub mod request;
pub mod router;

// Re-export core types
pub use config::ConfigService;
pub use di::{
    AfterConstruct, Arguments, Class, Injectable, Injector, Instance, Key, MutableProperty,
    Property, PropertyKey, Provider, TypeKey,
};
pub use error::{Result, StrataError};
pub use exception::HttpError;
pub use lifecycle::{Application, ApplicationBuilder};
pub use logging::Logger;
pub use request::{Payload, RequestResolver, RequestScope, RequestSignal, RequestState};
pub use router::{RouteDescriptor, Router};

// Re-export macros
pub use strata_macro::Injectable;

// Re-export commonly used types from dependencies
pub use async_trait::async_trait;
pub use axum;

/// Prelude module for convenient imports
///
/// ```
/// use strata::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::ConfigService;
    pub use crate::di::{
        AfterConstruct, Arguments, Injectable, Injector, Key, MutableProperty, Property, Provider,
    };
    pub use crate::error::{Result, StrataError};
    pub use crate::exception::HttpError;
    pub use crate::http::{IncomingRequest, ServerResponse};
    pub use crate::lifecycle::{Application, ApplicationBuilder};
    pub use crate::logging::Logger;
    pub use crate::request::{Payload, RequestResolver, RequestSignal};
    pub use crate::router::{RouteDescriptor, Router};
    pub use strata_macro::Injectable;
    pub use async_trait::async_trait;
    pub use axum::http::{Method, StatusCode};
    pub use std::sync::Arc;
}
