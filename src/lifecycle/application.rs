use crate::config::ConfigService;
use crate::di::{Injector, Key, Provider};
use crate::error::{Result, StrataError};
use crate::http::{IncomingRequest, ServerResponse};
use crate::logging::Logger;
use crate::request::{RequestResolver, RequestScope};
use crate::router::Router;
use serde_json::json;
use std::sync::Arc;

/// Owner of the root injector.
///
/// The root holds the process-wide bindings every request scope falls back
/// to: the [`Router`], the [`Logger`] and the [`ConfigService`].
pub struct Application {
    root: Arc<Injector>,
    logger: Logger,
}

impl Application {
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    pub fn root(&self) -> &Arc<Injector> {
        &self.root
    }

    /// Build the request scope and drive it to completion.
    ///
    /// # Errors
    ///
    /// Only configuration errors raised while building the scope; everything
    /// that happens inside the pipeline is rendered as a response.
    pub async fn handle(
        &self,
        request: Arc<IncomingRequest>,
        response: Arc<ServerResponse>,
    ) -> Result<()> {
        let resolver = self.resolver(request, response)?;
        resolver.process().await;
        Ok(())
    }

    /// Build the request scope without running it.
    pub fn resolver(
        &self,
        request: Arc<IncomingRequest>,
        response: Arc<ServerResponse>,
    ) -> Result<Arc<RequestResolver>> {
        let scope = Injector::create_and_resolve_child(
            &self.root,
            Provider::class::<RequestResolver>(),
            RequestScope::new(request, response).providers(),
        )?;
        match scope.resolve::<RequestResolver>() {
            Ok(resolver) => Ok(resolver),
            Err(e) => {
                scope.destroy();
                Err(e)
            }
        }
    }

    /// Destroy the root injector and every live request scope with it.
    pub fn shutdown(&self) {
        self.logger.info(
            "Shutting down application...",
            json!({ "injector": self.root.id(), "requests": self.root.children() }),
        );
        self.root.destroy();
    }
}

/// Builder for [`Application`].
#[derive(Default)]
pub struct ApplicationBuilder {
    router: Option<Arc<dyn Router>>,
    config: Option<ConfigService>,
    logger: Option<Logger>,
    providers: Vec<Provider>,
}

impl ApplicationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn router(mut self, router: Arc<dyn Router>) -> Self {
        self.router = Some(router);
        self
    }

    /// Defaults to [`ConfigService::new`].
    pub fn config(mut self, config: ConfigService) -> Self {
        self.config = Some(config);
        self
    }

    /// Defaults to [`Logger::default`].
    pub fn logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Extra process-wide binding, visible from every request scope.
    pub fn provider(mut self, provider: Provider) -> Self {
        self.providers.push(provider);
        self
    }

    /// Create and populate the root injector.
    ///
    /// # Errors
    ///
    /// [`StrataError::NoProvider`] when no router was given, or the first
    /// error raised while resolving the extra providers.
    pub fn build(self) -> Result<Application> {
        let router = self.router.ok_or_else(|| StrataError::NoProvider {
            key: Key::of::<dyn Router>().to_string(),
            requested_by: Some("Application".to_string()),
            injector: "root".to_string(),
        })?;
        let config = self.config.unwrap_or_default();
        let logger = self.logger.unwrap_or_default();

        logger.info("Starting application initialization...", json!({}));

        let mut providers = vec![
            Provider::shared(router),
            Provider::value(Key::of::<Logger>(), logger.clone()),
        ];
        providers.extend(self.providers);
        let root = Injector::create_and_resolve(
            Provider::value(Key::of::<ConfigService>(), config),
            providers,
        )?;

        logger.info(
            "Application initialization complete",
            json!({ "injector": root.id() }),
        );
        Ok(Application { root, logger })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::RouteDescriptor;
    use async_trait::async_trait;
    use axum::http::{HeaderMap, Method};

    struct EchoRouter;

    #[async_trait]
    impl Router for EchoRouter {
        async fn parse_request(
            &self,
            path: &str,
            method: &Method,
            _headers: &HeaderMap,
        ) -> anyhow::Result<RouteDescriptor> {
            Ok(RouteDescriptor::new(path.trim_start_matches('/'), method.clone()))
        }
    }

    #[test]
    fn build_requires_a_router() {
        let err = Application::builder().build().err().unwrap();
        assert!(matches!(err, StrataError::NoProvider { .. }));
    }

    #[test]
    fn root_holds_process_wide_bindings() {
        let app = Application::builder()
            .router(Arc::new(EchoRouter))
            .config(ConfigService::new().with("request.body_limit", "16"))
            .build()
            .unwrap();

        let root = app.root();
        assert!(root.has(&Key::of::<dyn Router>()));
        assert!(root.has(&Key::of::<Logger>()));
        assert_eq!(root.resolve::<ConfigService>().unwrap().body_limit(), Some(16));
        app.shutdown();
        assert!(root.is_destroyed());
    }

    #[tokio::test]
    async fn shutdown_destroys_live_request_scopes() {
        let app = Application::builder()
            .router(Arc::new(EchoRouter))
            .build()
            .unwrap();
        let resolver = app
            .resolver(
                Arc::new(IncomingRequest::without_body(Method::GET, "/users")),
                Arc::new(ServerResponse::new()),
            )
            .unwrap();
        let scope = resolver.injector();
        assert_eq!(app.root().children(), 1);

        app.shutdown();
        assert!(scope.is_destroyed());
    }

    #[tokio::test]
    async fn handle_after_shutdown_is_a_configuration_error() {
        let app = Application::builder()
            .router(Arc::new(EchoRouter))
            .build()
            .unwrap();
        app.shutdown();

        let err = app
            .handle(
                Arc::new(IncomingRequest::without_body(Method::GET, "/")),
                Arc::new(ServerResponse::new()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StrataError::Destroyed { .. }));
    }
}
