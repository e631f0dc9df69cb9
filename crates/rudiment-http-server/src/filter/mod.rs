//! Request filter chain
//!
//! Filters intercept every request before it reaches the dispatcher. Each
//! filter either forwards the exchange to the next one or terminates the
//! chain with a status of its own.
//!
//! # Overview
//!
//! - [`HttpFilter`] - Core trait for implementing filters
//! - [`FilterAction`] - Forward or terminate
//! - [`FilterDescriptor`] - Activation predicate and position of one filter
//! - [`FilterChain`] - Active filters in execution order, assembled once at startup
//!
//! # Examples
//!
//! ```rust,no_run
//! use rudiment_http_server::filter::{FilterAction, FilterError, HttpFilter};
//! use rudiment_http_server::HttpExchange;
//! use async_trait::async_trait;
//! use http::StatusCode;
//!
//! struct MaintenanceFilter;
//!
//! #[async_trait]
//! impl HttpFilter for MaintenanceFilter {
//!     async fn do_filter(&self, exchange: &mut HttpExchange) -> Result<FilterAction, FilterError> {
//!         if exchange.path().starts_with("/admin") {
//!             return Ok(FilterAction::Terminate(StatusCode::SERVICE_UNAVAILABLE));
//!         }
//!         Ok(FilterAction::Forward)
//!     }
//! }
//! ```

pub mod chain;
pub mod error;
pub mod traits;

pub use chain::{ChainOutcome, FilterChain, FilterChainBuilder, FilterDescriptor};
pub use error::{FilterError, status_codes};
pub use traits::{FilterAction, HttpFilter};
