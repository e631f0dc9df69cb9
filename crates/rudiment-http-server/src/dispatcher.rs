//! Request dispatch to endpoint handlers

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use http::header::ALLOW;
use http::{HeaderValue, Method, StatusCode};
use rudiment_registry::Component;
use rudiment_session_storage::SessionStoreError;
use tracing::debug;

use crate::HttpExchange;

/// Errors returned by endpoints; answered with 500
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Handler error: {0}")]
    Handler(String),

    #[error("Session error: {0}")]
    Session(#[from] SessionStoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DispatchError {
    pub fn handler(msg: impl Into<String>) -> Self {
        Self::Handler(msg.into())
    }
}

/// Receives every request that passed the filter chain
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, exchange: &mut HttpExchange) -> Result<(), DispatchError>;
}

/// Handler for one route
#[async_trait]
pub trait Endpoint: Send + Sync {
    async fn handle(&self, exchange: &mut HttpExchange) -> Result<(), DispatchError>;
}

/// Endpoint backed by a synchronous function
pub struct FnEndpoint<F> {
    handler: F,
}

impl<F> FnEndpoint<F>
where
    F: Fn(&mut HttpExchange) -> Result<(), DispatchError> + Send + Sync + 'static,
{
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl<F> Endpoint for FnEndpoint<F>
where
    F: Fn(&mut HttpExchange) -> Result<(), DispatchError> + Send + Sync + 'static,
{
    async fn handle(&self, exchange: &mut HttpExchange) -> Result<(), DispatchError> {
        (self.handler)(exchange)
    }
}

/// Exact path and method router
///
/// Unknown paths are answered with 404, known paths with an unregistered
/// method with 405 and an `Allow` header.
///
/// ```rust
/// use http::Method;
/// use rudiment_http_server::Router;
///
/// let router = Router::new()
///     .route_fn(Method::GET, "/health", |exchange| {
///         exchange.set_body("ok");
///         Ok(())
///     });
///
/// assert_eq!(router.len(), 1);
/// ```
#[derive(Default)]
pub struct Router {
    routes: HashMap<String, HashMap<Method, Arc<dyn Endpoint>>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `endpoint` for `method` on `path`, replacing any previous one
    pub fn route<E>(mut self, method: Method, path: impl Into<String>, endpoint: E) -> Self
    where
        E: Endpoint + 'static,
    {
        self.routes
            .entry(path.into())
            .or_default()
            .insert(method, Arc::new(endpoint));
        self
    }

    /// Register a synchronous handler
    pub fn route_fn<F>(self, method: Method, path: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut HttpExchange) -> Result<(), DispatchError> + Send + Sync + 'static,
    {
        self.route(method, path, FnEndpoint::new(handler))
    }

    /// Number of registered method/path pairs
    pub fn len(&self) -> usize {
        self.routes.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl Component for Router {}

#[async_trait]
impl Dispatcher for Router {
    async fn dispatch(&self, exchange: &mut HttpExchange) -> Result<(), DispatchError> {
        let Some(methods) = self.routes.get(exchange.path()) else {
            debug!("No route for {}", exchange.path());
            exchange.respond(StatusCode::NOT_FOUND, "Not Found");
            return Ok(());
        };

        let Some(endpoint) = methods.get(exchange.method()).cloned() else {
            let mut allowed: Vec<&str> = methods.keys().map(Method::as_str).collect();
            allowed.sort_unstable();
            if let Ok(allow) = HeaderValue::from_str(&allowed.join(", ")) {
                exchange.response_headers_mut().insert(ALLOW, allow);
            }
            exchange.respond(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
            return Ok(());
        };

        endpoint.handle(exchange).await
    }
}
