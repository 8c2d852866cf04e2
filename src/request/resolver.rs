use crate::config::ConfigService;
use crate::di::{
    Arguments, Injectable, Injector, Instance, Key, MutableProperty, Property, PropertyKey,
    Provider,
};
use crate::error::{Result, StrataError};
use crate::exception::HttpError;
use crate::http::{BodyBuffer, IncomingRequest, ResponseError, ServerResponse};
use crate::logging::Logger;
use crate::request::{Payload, RequestSignal, RequestState, tokens};
use crate::router::Router;
use axum::body::Bytes;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, StatusCode, Uri};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

const CONTENT_TYPE_HTML: &str = "text/html";

/// Path and query of the request URL.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ParsedUrl {
    pub path: String,
    pub query: Option<String>,
}

impl ParsedUrl {
    pub fn parse(raw: &str) -> Self {
        // Bare words like `users` would parse as an authority.
        let uri = raw
            .parse::<Uri>()
            .ok()
            .filter(|uri| raw.starts_with('/') || uri.scheme().is_some());
        match uri {
            Some(uri) => Self {
                path: uri.path().to_string(),
                query: uri.query().map(str::to_string),
            },
            None => match raw.split_once('?') {
                Some((path, query)) => Self {
                    path: path.to_string(),
                    query: Some(query.to_string()),
                },
                None => Self {
                    path: raw.to_string(),
                    query: None,
                },
            },
        }
    }

    /// `key=value` pairs of the query string, without percent-decoding.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.query
            .as_deref()
            .unwrap_or_default()
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((key, value)) => (key.to_string(), value.to_string()),
                None => (pair.to_string(), String::new()),
            })
            .collect()
    }
}

/// Everything the bootstrap layer binds in a request scope before the
/// [`RequestResolver`] is constructed.
#[derive(Clone, Debug)]
pub struct RequestScope {
    pub request: Arc<IncomingRequest>,
    pub response: Arc<ServerResponse>,
    pub url: String,
    pub status_code: StatusCode,
    pub data: Arc<BodyBuffer>,
    pub is_custom_error: bool,
    pub is_forwarded: bool,
    pub is_forwarder: bool,
}

impl RequestScope {
    pub fn new(request: Arc<IncomingRequest>, response: Arc<ServerResponse>) -> Self {
        Self {
            url: request.uri().to_string(),
            request,
            response,
            status_code: StatusCode::OK,
            data: Arc::new(BodyBuffer::new()),
            is_custom_error: false,
            is_forwarded: false,
            is_forwarder: false,
        }
    }

    pub fn providers(self) -> Vec<Provider> {
        vec![
            Provider::instance(Key::token(tokens::REQUEST), self.request),
            Provider::instance(Key::token(tokens::RESPONSE), self.response),
            Provider::value(Key::token(tokens::URL), self.url),
            Provider::value(Key::token(tokens::STATUS_CODE), self.status_code),
            Provider::instance(Key::token(tokens::DATA), self.data),
            Provider::value(Key::token(tokens::IS_CUSTOM_ERROR), self.is_custom_error),
            Provider::value(Key::token(tokens::IS_FORWARDED), self.is_forwarded),
            Provider::value(Key::token(tokens::IS_FORWARDER), self.is_forwarder),
            Provider::class::<RequestSignal>(),
        ]
    }
}

/// Drives one request from route resolution to a written response.
///
/// Built by a request-scoped [`Injector`]; the router, logger and config come
/// from the root scope, everything else from the bindings listed in
/// [`RequestScope`].
///
/// # Example
/// ```ignore
/// let scope = Injector::create_and_resolve_child(
///     &root,
///     Provider::class::<RequestResolver>(),
///     RequestScope::new(request, response).providers(),
/// )?;
/// scope.resolve::<RequestResolver>()?.process().await;
/// ```
pub struct RequestResolver {
    id: String,
    logger: Arc<Logger>,
    router: Arc<dyn Router>,
    request: Arc<IncomingRequest>,
    response: Arc<ServerResponse>,
    raw_url: Property<String>,
    url: ParsedUrl,
    status_code: MutableProperty<StatusCode>,
    data: Property<BodyBuffer>,
    is_custom_error: Property<bool>,
    is_forwarded: Property<bool>,
    is_forwarder: MutableProperty<bool>,
    signal: Property<RequestSignal>,
    injector: Property<Injector>,
    config: Property<ConfigService>,
    state: Mutex<RequestState>,
    destroyed: AtomicBool,
}

impl Injectable for RequestResolver {
    fn inject_keys() -> Vec<Key> {
        vec![
            Key::of::<Logger>(),
            Key::of::<dyn Router>(),
            Key::token(tokens::REQUEST),
            Key::token(tokens::RESPONSE),
        ]
    }

    fn property_keys() -> Vec<PropertyKey> {
        vec![
            PropertyKey::new("url", Key::token(tokens::URL), false),
            PropertyKey::new("status_code", Key::token(tokens::STATUS_CODE), true),
            PropertyKey::new("data", Key::token(tokens::DATA), false),
            PropertyKey::new("is_custom_error", Key::token(tokens::IS_CUSTOM_ERROR), false),
            PropertyKey::new("is_forwarded", Key::token(tokens::IS_FORWARDED), false),
            PropertyKey::new("is_forwarder", Key::token(tokens::IS_FORWARDER), true),
            PropertyKey::new("signal", Key::of::<RequestSignal>(), false),
            PropertyKey::new("injector", Key::of::<Injector>(), false),
            PropertyKey::new("config", Key::of::<ConfigService>(), false),
        ]
    }

    fn construct(mut args: Arguments) -> Result<Self> {
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            logger: args.next::<Logger>()?,
            router: args.next_trait::<dyn Router>()?,
            request: args.next::<IncomingRequest>()?,
            response: args.next::<ServerResponse>()?,
            raw_url: Property::default(),
            url: ParsedUrl::default(),
            status_code: MutableProperty::default(),
            data: Property::default(),
            is_custom_error: Property::default(),
            is_forwarded: Property::default(),
            is_forwarder: MutableProperty::default(),
            signal: Property::default(),
            injector: Property::default(),
            config: Property::default(),
            state: Mutex::new(RequestState::Created),
            destroyed: AtomicBool::new(false),
        })
    }

    fn inject_property(&mut self, property: &PropertyKey, value: Instance) -> Result<()> {
        let key = property.key();
        match property.name() {
            "url" => self.raw_url.inject(key, value),
            "status_code" => self.status_code.inject(key, value),
            "data" => self.data.inject(key, value),
            "is_custom_error" => self.is_custom_error.inject(key, value),
            "is_forwarded" => self.is_forwarded.inject(key, value),
            "is_forwarder" => self.is_forwarder.inject(key, value),
            "signal" => self.signal.inject(key, value),
            "injector" => self.injector.inject(key, value),
            "config" => self.config.inject(key, value),
            other => Err(StrataError::UnknownProperty {
                class: "RequestResolver".to_string(),
                property: other.to_string(),
            }),
        }
    }

    fn after_construct(&mut self) {
        self.url = ParsedUrl::parse(self.raw_url.as_str());
        self.logger.trace(
            "RequestResolver.after_construct",
            json!({
                "id": self.id,
                "method": self.request.method().as_str(),
                "url": self.url,
            }),
        );
    }
}

impl RequestResolver {
    /// Drive the request to its terminal state, then destroy it.
    ///
    /// Never fails: every error is rendered as a response, and a failure while
    /// rendering an error is retried once before being logged and dropped.
    pub async fn process(self: Arc<Self>) {
        if !self.is_forwarded() {
            self.attach_lifecycle();
        }

        let signal = self.signal.to_arc();
        tokio::select! {
            biased;
            _ = self.pipeline() => {}
            _ = signal.destroyed() => {
                self.logger.trace("RequestResolver.process: destroyed before completion", self.context());
            }
        }

        // Completed and Swallowed are both terminal; a swallowed request never
        // sees a finish event.
        self.destroy();
    }

    /// Tear the resolver down on the first of finish/close.
    fn attach_lifecycle(self: &Arc<Self>) {
        let mut events = self.response.subscribe();
        if self.response.is_finished() || self.response.is_closed() {
            return;
        }
        let resolver = Arc::downgrade(self);
        let signal = self.signal.to_arc();
        tokio::spawn(async move {
            let event = tokio::select! {
                event = events.recv() => event,
                _ = signal.destroyed() => return,
            };
            if let Some(resolver) = resolver.upgrade() {
                let event = match event {
                    Ok(event) => event.to_string(),
                    Err(_) => "dropped".to_string(),
                };
                resolver.logger.trace(
                    "RequestResolver.lifecycle",
                    json!({ "id": resolver.id, "event": event }),
                );
                resolver.destroy();
            }
        });
    }

    async fn pipeline(&self) -> Option<Payload> {
        match self.resolve().await {
            Ok(payload) => Some(payload),
            Err(error) => self.recover(error),
        }
    }

    /// Route resolution, body collection and rendering, without recovery.
    async fn resolve(&self) -> anyhow::Result<Payload> {
        self.set_state(RequestState::RouteResolving);
        let route = self
            .router
            .parse_request(&self.url.path, self.request.method(), self.request.headers())
            .await?;

        if route.has_body() && !self.is_forwarded() {
            self.set_state(RequestState::BodyCollecting);
            self.collect_body().await?;
        }

        self.set_state(RequestState::Rendering);
        let payload = self.render(Payload::Text(format!("{} {}", route.method, route.route)))?;
        self.set_state(RequestState::Completed);
        Ok(payload)
    }

    async fn collect_body(&self) -> anyhow::Result<()> {
        let limit = self.config.body_limit();
        while let Some(chunk) = self.request.next_chunk().await {
            let size = self.data.push(chunk?);
            if let Some(limit) = limit.filter(|limit| size > *limit) {
                return Err(HttpError::new(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    format!("Request body exceeds {limit} bytes"),
                )
                .into());
            }
        }
        Ok(())
    }

    fn recover(&self, error: anyhow::Error) -> Option<Payload> {
        let error = HttpError::from_anyhow(error);
        self.set_state(RequestState::ErrorRendering);
        self.logger.error(
            "RequestResolver.process",
            json!({
                "id": self.id,
                "method": self.request.method().as_str(),
                "url": self.request.uri(),
                "error": error.to_json(),
            }),
        );
        self.set_status_code(error.status());

        let fallback = match self.render(Payload::Text(error.sanitized())) {
            Ok(payload) => return self.completed(payload),
            Err(fallback) => fallback,
        };

        self.set_state(RequestState::ErrorRenderingFallback);
        self.set_status_code(fallback.status());
        match self.render(Payload::Text(fallback.sanitized())) {
            Ok(payload) => self.completed(payload),
            Err(last) => {
                self.set_state(RequestState::Swallowed);
                self.logger.error(
                    "RequestResolver.process: error could not be rendered",
                    json!({ "id": self.id, "error": last.to_json() }),
                );
                None
            }
        }
    }

    fn completed(&self, payload: Payload) -> Option<Payload> {
        self.set_state(RequestState::Completed);
        Some(payload)
    }

    /// Write `payload` with the current status and end the response.
    ///
    /// Forwarded resolvers only validate and return the payload; the
    /// forwarding resolver owns the response.
    ///
    /// # Errors
    /// A 500 `HttpError` carrying the value when the payload is neither text
    /// nor binary, or when the response can no longer be written.
    pub fn render(&self, payload: Payload) -> std::result::Result<Payload, HttpError> {
        let body = match &payload {
            Payload::Text(text) => Bytes::from(text.clone()),
            Payload::Binary(bytes) => bytes.clone(),
            Payload::Other(value) => {
                let error = HttpError::internal("Invalid response type").with_data(value.clone());
                self.logger.error(
                    "RequestResolver.render",
                    json!({ "id": self.id, "error": error.to_json() }),
                );
                return Err(error);
            }
        };

        if self.is_forwarded() {
            return Ok(payload);
        }

        self.response
            .write_head(
                self.status_code(),
                &[(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_HTML))],
            )
            .and_then(|()| self.response.write(body))
            .and_then(|()| self.response.end())
            .map_err(Self::write_failed)?;
        Ok(payload)
    }

    fn write_failed(error: ResponseError) -> HttpError {
        HttpError::internal(error.to_string())
    }

    /// Re-dispatch this request internally to `url`.
    ///
    /// The forwarded resolver lives in a child of this resolver's scope,
    /// shares the request, response and body buffer, skips body collection
    /// and returns its payload instead of writing it.
    ///
    /// # Errors
    /// The outer `Result` carries configuration errors from building the
    /// forwarded scope; the inner one the forwarded request's outcome.
    pub async fn forward(
        self: &Arc<Self>,
        url: impl Into<String>,
    ) -> Result<std::result::Result<Payload, HttpError>> {
        self.is_forwarder.set(true);

        let scope = RequestScope {
            request: Arc::clone(&self.request),
            response: Arc::clone(&self.response),
            url: url.into(),
            status_code: self.status_code(),
            data: self.data.to_arc(),
            is_custom_error: self.is_custom_error(),
            is_forwarded: true,
            is_forwarder: false,
        };
        let injector = Injector::create_and_resolve_child(
            &self.injector.to_arc(),
            Provider::class::<RequestResolver>(),
            scope.providers(),
        )?;
        let forwarded = injector.resolve::<RequestResolver>()?;
        self.logger.trace(
            "RequestResolver.forward",
            json!({ "id": self.id, "forwarded": forwarded.id, "url": forwarded.url.path }),
        );

        let outcome = forwarded.resolve().await.map_err(HttpError::from_anyhow);
        forwarded.destroy();
        Ok(outcome)
    }

    /// Signal end-of-life and drop the request scope. Runs once.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.signal.fire();
        self.logger.trace("RequestResolver.destroy", self.context());
        self.injector.destroy();
    }

    fn context(&self) -> Value {
        json!({
            "id": self.id,
            "method": self.request.method().as_str(),
            "url": self.request.uri(),
            "state": self.state().to_string(),
            "is_forwarded": self.is_forwarded(),
            "is_forwarder": self.is_forwarder(),
            "is_custom_error": self.is_custom_error(),
        })
    }

    fn set_state(&self, state: RequestState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    pub fn state(&self) -> RequestState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn url(&self) -> &ParsedUrl {
        &self.url
    }

    pub fn status_code(&self) -> StatusCode {
        self.status_code.value_or(StatusCode::OK)
    }

    pub fn set_status_code(&self, status: StatusCode) {
        self.status_code.set(status);
    }

    pub fn data(&self) -> Arc<BodyBuffer> {
        self.data.to_arc()
    }

    pub fn signal(&self) -> Arc<RequestSignal> {
        self.signal.to_arc()
    }

    pub fn injector(&self) -> Arc<Injector> {
        self.injector.to_arc()
    }

    pub fn is_forwarded(&self) -> bool {
        *self.is_forwarded
    }

    pub fn is_forwarder(&self) -> bool {
        self.is_forwarder.value_or(false)
    }

    pub fn is_custom_error(&self) -> bool {
        *self.is_custom_error
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    #[test]
    fn scope_binds_every_request_token() {
        let request = Arc::new(IncomingRequest::without_body(Method::GET, "/a?b=c"));
        let scope = RequestScope::new(request, Arc::new(ServerResponse::new()));
        assert_eq!(scope.url, "/a?b=c");
        assert_eq!(scope.status_code, StatusCode::OK);

        let keys: Vec<Key> = scope.providers().into_iter().map(|p| p.provide).collect();
        for token in [
            tokens::REQUEST,
            tokens::RESPONSE,
            tokens::URL,
            tokens::STATUS_CODE,
            tokens::DATA,
            tokens::IS_CUSTOM_ERROR,
            tokens::IS_FORWARDED,
            tokens::IS_FORWARDER,
        ] {
            assert!(keys.contains(&Key::token(token)), "missing {token}");
        }
        assert!(keys.contains(&Key::of::<RequestSignal>()));
    }

    #[test]
    fn malformed_url_falls_back_to_split() {
        let url = ParsedUrl::parse("not a uri?x=1");
        assert_eq!(url.path, "not a uri");
        assert_eq!(url.query.as_deref(), Some("x=1"));
    }
}
