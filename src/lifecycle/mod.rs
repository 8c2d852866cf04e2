//! Application bootstrap.
//!
//! ```text
//! 1. Configuration loading
//!    ↓
//! 2. Root injector creation (router, logger, config)
//!    ↓
//! [Running...]  one child injector per request
//!    ↓
//! 3. Shutdown: root destroyed, live request scopes with it
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use strata::lifecycle::Application;
//!
//! let app = Application::builder()
//!     .router(Arc::new(AppRouter))
//!     .config(ConfigService::from_env("STRATA"))
//!     .build()?;
//!
//! app.handle(request, response).await?;
//! app.shutdown();
//! ```

mod application;

pub use application::{Application, ApplicationBuilder};
