//! Core filter trait definitions

use async_trait::async_trait;
use http::StatusCode;

use super::FilterError;
use crate::HttpExchange;

/// Outcome of one filter invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterAction {
    /// Continue with the next filter, or the dispatcher after the last one
    Forward,
    /// Stop here and answer with this status
    ///
    /// Headers, cookies and body already written to the exchange are kept.
    Terminate(StatusCode),
}

/// Request interceptor
///
/// Filters are shared by all requests and hold no per-request state. Anything
/// that must outlive the request belongs in a component such as the session
/// store.
///
/// # Notes
///
/// - Filters run in chain order, lowest position first
/// - The first `Terminate` or error stops the chain
/// - An error is answered with [`FilterError::status`]
#[async_trait]
pub trait HttpFilter: Send + Sync {
    /// Inspect and possibly mutate the exchange
    async fn do_filter(&self, exchange: &mut HttpExchange) -> Result<FilterAction, FilterError>;
}
