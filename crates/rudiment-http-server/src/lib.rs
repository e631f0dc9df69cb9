//! # HTTP Server
//!
//! This crate provides the request pipeline of a rudiment server: a hyper
//! based HTTP/1.1 listener, a conditionally assembled filter chain and a
//! dispatcher, all resolved through the component registry at boot.
//!
//! ## Built-in filters
//! - **Session**: binds each request to a session through the `RSID` cookie
//! - **Inactive session**: expires idle sessions with status 440
//! - **CSRF**: double-submit cookie protection, stateful or stateless
//!
//! ## Features
//! - Filters activated once from configuration, never per request
//! - Atomic first-contact session creation keyed by a client correlation header
//! - TOML configuration flattened into dotted property names
//! - Request ids attached to every request span

pub mod config;
pub mod cookie;
pub mod csrf;
pub mod dispatcher;
pub mod exchange;
pub mod filter;
pub mod server;
pub mod session;

// Re-export main types
pub use config::{Config, ConfigError, CsrfSettings, ServerConfig, SessionSettings, keys};
pub use cookie::{SameSite, SetCookie, parse_cookies};
pub use csrf::{CsrfTokenStore, CsrfTokenValidationFilter};
pub use dispatcher::{DispatchError, Dispatcher, Endpoint, FnEndpoint, Router};
pub use exchange::{HttpExchange, SessionAccess};
pub use filter::{
    ChainOutcome, FilterAction, FilterChain, FilterChainBuilder, FilterDescriptor, FilterError,
    HttpFilter, status_codes,
};
pub use server::{HttpServer, HttpServerBuilder, ServerStats};
pub use session::{InactiveSessionFilter, SessionFilter, SessionManager};

// Re-export foundational types
pub use http::{Method, StatusCode};
pub use rudiment_registry::{Component, ComponentDescriptor, Components, RegistryError};

/// Result type for HTTP server operations
pub type Result<T> = std::result::Result<T, HttpServerError>;

/// HTTP server errors
#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Component registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
