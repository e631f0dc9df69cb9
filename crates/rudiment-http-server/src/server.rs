//! HTTP server booting the component registry and the filter chain
//!
//! The builder registers the runtime's own components (configuration,
//! clock, session store, session manager, CSRF token store, built-in filters
//! and the dispatcher) next to any user components, resolves them all at
//! once and assembles the filter chain from the result.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use rudiment_registry::{
    Component, ComponentDescriptor, ComponentError, ComponentRegistry, Components,
};
use rudiment_session_storage::{
    BoxedSessionStore, Clock, InMemoryConfig, InMemorySessionStore, MonotonicClock,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{Instrument, debug, debug_span, error, info};
use uuid::Uuid;

use crate::config::{Config, ServerConfig};
use crate::csrf::{CsrfTokenStore, CsrfTokenValidationFilter};
use crate::dispatcher::{Dispatcher, Router};
use crate::filter::{FilterChain, FilterChainBuilder, FilterDescriptor};
use crate::session::{InactiveSessionFilter, SessionFilter, SessionManager};
use crate::{HttpExchange, Result};

/// Builder for [`HttpServer`]
///
/// ```rust,no_run
/// use http::Method;
/// use rudiment_http_server::{HttpServer, Router};
///
/// # async fn example() -> rudiment_http_server::Result<()> {
/// let server = HttpServer::builder()
///     .property("security.csrf.enabled", true)
///     .dispatcher(Router::new().route_fn(Method::GET, "/", |exchange| {
///         exchange.set_body("hello");
///         Ok(())
///     }))
///     .build()?;
///
/// server.run().await
/// # }
/// ```
pub struct HttpServerBuilder {
    config: Config,
    bind_address: Option<SocketAddr>,
    max_body_size: Option<usize>,
    clock: Option<ComponentDescriptor>,
    dispatcher: Option<ComponentDescriptor>,
    components: Vec<ComponentDescriptor>,
    filters: Vec<FilterDescriptor>,
}

impl HttpServerBuilder {
    /// Builder with default configuration and an empty router
    pub fn new() -> Self {
        Self {
            config: Config::new(),
            bind_address: None,
            max_body_size: None,
            clock: None,
            dispatcher: None,
            components: Vec::new(),
            filters: Vec::new(),
        }
    }

    /// Replace the configuration
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Set a single configuration property
    pub fn property(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.config.set_property(name, value);
        self
    }

    /// Set the bind address, overriding `server.host` and `server.port`
    pub fn bind_address(mut self, addr: SocketAddr) -> Self {
        self.bind_address = Some(addr);
        self
    }

    /// Set maximum request body size, overriding `server.maxBodySize`
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = Some(size);
        self
    }

    /// Use `clock` for session access times and token timestamps
    pub fn clock<C>(mut self, clock: Arc<C>) -> Self
    where
        C: Clock + Component,
    {
        self.clock = Some(
            ComponentDescriptor::instance::<dyn Clock, C>(clock, |c| c as Arc<dyn Clock>)
                .description("Session clock"),
        );
        self
    }

    /// Register an application component
    ///
    /// Components may depend on the runtime's own identities such as
    /// [`SessionManager`] or `dyn Clock`. A candidate for
    /// [`BoxedSessionStore`] marked primary replaces the in-memory store.
    pub fn component(mut self, descriptor: ComponentDescriptor) -> Self {
        self.components.push(descriptor);
        self
    }

    /// Add a filter after the built-in ones
    pub fn filter(mut self, descriptor: FilterDescriptor) -> Self {
        self.filters.push(descriptor);
        self
    }

    /// Dispatcher receiving requests that passed the chain
    pub fn dispatcher<D>(mut self, dispatcher: D) -> Self
    where
        D: Dispatcher + Component,
    {
        self.dispatcher = Some(ComponentDescriptor::provides::<dyn Dispatcher, D, _>(
            move |_| Ok(dispatcher),
            |d| d as Arc<dyn Dispatcher>,
        ));
        self
    }

    /// Dispatcher built from resolved components
    ///
    /// The factory runs after the session manager and the CSRF token store
    /// are resolved, so endpoints may hold on to either.
    pub fn dispatcher_with<D, F>(mut self, factory: F) -> Self
    where
        D: Dispatcher + Component,
        F: FnOnce(&Components) -> std::result::Result<D, ComponentError> + Send + 'static,
    {
        self.dispatcher = Some(
            ComponentDescriptor::provides::<dyn Dispatcher, D, _>(factory, |d| {
                d as Arc<dyn Dispatcher>
            })
            .depends_on::<SessionManager>()
            .depends_on::<CsrfTokenStore>(),
        );
        self
    }

    /// Resolve every component and assemble the filter chain
    ///
    /// Fails on invalid configuration and on any registry error; nothing is
    /// served in that case.
    pub fn build(self) -> Result<HttpServer> {
        let session_settings = self.config.session_settings()?;
        let csrf_settings = self.config.csrf_settings()?;
        let mut server_config = self.config.server_config()?;
        if let Some(addr) = self.bind_address {
            server_config.bind_address = addr;
        }
        if let Some(size) = self.max_body_size {
            server_config.max_body_size = size;
        }

        let mut registry = ComponentRegistry::new();

        let config = self.config.clone();
        registry.register(
            ComponentDescriptor::new(move |_| Ok(config)).description("Configuration properties"),
        );

        registry.register(self.clock.unwrap_or_else(|| {
            ComponentDescriptor::provides::<dyn Clock, MonotonicClock, _>(
                |_| Ok(MonotonicClock::new()),
                |c| c as Arc<dyn Clock>,
            )
            .description("Monotonic session clock")
        }));

        let store_config = InMemoryConfig {
            max_sessions: session_settings.max_sessions,
            inactivity_period: session_settings.inactivity_period,
        };
        registry.register(
            ComponentDescriptor::provides::<BoxedSessionStore, InMemorySessionStore, _>(
                move |components| {
                    Ok(InMemorySessionStore::with_config(
                        store_config,
                        components.of::<dyn Clock>()?,
                    ))
                },
                |store| store as Arc<BoxedSessionStore>,
            )
            .depends_on::<dyn Clock>()
            .description("In-memory session store"),
        );

        registry.register(
            ComponentDescriptor::new(move |components| {
                Ok(SessionManager::new(
                    components.of::<BoxedSessionStore>()?,
                    components.of::<dyn Clock>()?,
                    session_settings,
                ))
            })
            .depends_on::<BoxedSessionStore>()
            .depends_on::<dyn Clock>()
            .description("Binds requests to sessions"),
        );

        registry.register(
            ComponentDescriptor::new(|components| {
                Ok(CsrfTokenStore::new(components.of::<dyn Clock>()?))
            })
            .depends_on::<dyn Clock>()
            .description("Issues and validates CSRF tokens"),
        );

        registry.register(
            ComponentDescriptor::new(|components| {
                Ok(SessionFilter::new(components.of::<SessionManager>()?))
            })
            .depends_on::<SessionManager>()
            .description("Filter which acquires the session of a request"),
        );

        registry.register(
            ComponentDescriptor::new(|components| {
                Ok(InactiveSessionFilter::new(components.of::<SessionManager>()?))
            })
            .depends_on::<SessionManager>()
            .description("Filter which invalidates sessions after a period of inactivity"),
        );

        registry.register(
            ComponentDescriptor::new(move |components| {
                Ok(CsrfTokenValidationFilter::new(
                    components.of::<CsrfTokenStore>()?,
                    components.of::<SessionManager>()?,
                    csrf_settings,
                ))
            })
            .depends_on::<CsrfTokenStore>()
            .depends_on::<SessionManager>()
            .description("Filter which validates CSRF tokens"),
        );

        registry.register(self.dispatcher.unwrap_or_else(|| {
            ComponentDescriptor::provides::<dyn Dispatcher, Router, _>(
                |_| Ok(Router::new()),
                |router| router as Arc<dyn Dispatcher>,
            )
        }));

        for descriptor in self.components {
            registry.register(descriptor);
        }

        let components = registry.resolve()?;
        info!("Resolved {} components", components.len());

        let mut chain = FilterChainBuilder::new()
            .filter(
                FilterDescriptor::component::<SessionFilter>(
                    SessionFilter::NAME,
                    SessionFilter::POSITION,
                )
                .activation(SessionFilter::is_active),
            )
            .filter(
                FilterDescriptor::component::<InactiveSessionFilter>(
                    InactiveSessionFilter::NAME,
                    InactiveSessionFilter::POSITION,
                )
                .activation(InactiveSessionFilter::is_active),
            )
            .filter(
                FilterDescriptor::component::<CsrfTokenValidationFilter>(
                    CsrfTokenValidationFilter::NAME,
                    CsrfTokenValidationFilter::POSITION,
                )
                .activation(CsrfTokenValidationFilter::is_active),
            );
        for descriptor in self.filters {
            chain.push(descriptor);
        }
        let chain = chain.build(&components, &self.config)?;

        let dispatcher = components.of::<dyn Dispatcher>()?;
        let sessions = components.of::<SessionManager>()?;

        Ok(HttpServer {
            config: server_config,
            components: Arc::new(components),
            chain: Arc::new(chain),
            dispatcher,
            sessions,
        })
    }
}

impl Default for HttpServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// HTTP server running every request through the filter chain
#[derive(Clone)]
pub struct HttpServer {
    config: ServerConfig,
    components: Arc<Components>,
    chain: Arc<FilterChain>,
    dispatcher: Arc<dyn Dispatcher>,
    sessions: Arc<SessionManager>,
}

impl HttpServer {
    pub fn builder() -> HttpServerBuilder {
        HttpServerBuilder::new()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Resolved components, for lookups after boot
    pub fn components(&self) -> &Components {
        &self.components
    }

    pub fn filter_chain(&self) -> &FilterChain {
        &self.chain
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Run one exchange through the chain and, unless a filter answered it,
    /// the dispatcher
    pub async fn handle(&self, mut exchange: HttpExchange) -> HttpExchange {
        if !self.chain.apply(&mut exchange).await.is_completed() {
            return exchange;
        }

        if let Err(err) = self.dispatcher.dispatch(&mut exchange).await {
            error!(
                "Dispatch failed for {} {}: {}",
                exchange.method(),
                exchange.path(),
                err
            );
            exchange.respond(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
        }
        exchange
    }

    /// Bind the configured address and serve until an accept error
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.bind_address).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        info!("HTTP server listening on {}", listener.local_addr()?);
        info!("Session storage: {}", self.sessions.store().backend_name());
        info!("Active filters: [{}]", self.chain.names().join(", "));

        loop {
            let (stream, peer_addr) = listener.accept().await?;
            debug!("New connection from {}", peer_addr);

            let server = self.clone();
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| handle_request(req, server.clone()));

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    // Filter out common client disconnection errors that aren't actual problems
                    let err_str = err.to_string();
                    if err_str.contains("connection closed before message completed") {
                        debug!("Client disconnected (normal): {}", err);
                    } else {
                        error!("Error serving connection: {}", err);
                    }
                }
            });
        }
    }

    /// Get server statistics
    pub async fn stats(&self) -> ServerStats {
        ServerStats {
            sessions: self.sessions.session_count().await.unwrap_or(0),
            storage_type: self.sessions.store().backend_name().to_string(),
            filters: self
                .chain
                .names()
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }

    /// Run every component's `destroy` hook, dependents first
    pub fn shutdown(&self) {
        info!("Shutting down components");
        self.components.shutdown();
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    server: HttpServer,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let span = debug_span!(
        "request",
        id = %Uuid::now_v7(),
        method = %parts.method,
        path = %parts.uri.path()
    );

    let response = async move {
        let body = match Limited::new(body, server.config.max_body_size).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
                debug!("Request body exceeds {} bytes", server.config.max_body_size);
                return plain_response(StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large");
            }
            Err(err) => {
                debug!("Failed to read request body: {}", err);
                return plain_response(StatusCode::BAD_REQUEST, "Bad Request");
            }
        };

        let exchange = HttpExchange::new(parts.method, parts.uri, parts.headers, body);
        let exchange = server.handle(exchange).await;
        debug!("Responding {}", exchange.status());
        exchange.into_response()
    }
    .instrument(span)
    .await;

    Ok(response)
}

fn plain_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
}

/// Server statistics
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStats {
    pub sessions: usize,
    pub storage_type: String,
    /// Active filters in execution order
    pub filters: Vec<String>,
}
