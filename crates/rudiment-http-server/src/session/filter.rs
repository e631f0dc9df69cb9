//! Session acquiring filter

use std::sync::Arc;

use async_trait::async_trait;
use rudiment_registry::Component;

use super::SessionManager;
use crate::config::{Config, keys};
use crate::filter::{FilterAction, FilterError, HttpFilter};
use crate::HttpExchange;

/// Attaches a session to every request, creating one when needed
pub struct SessionFilter {
    sessions: Arc<SessionManager>,
}

impl SessionFilter {
    pub const NAME: &'static str = "session";
    pub const POSITION: i32 = 100;

    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self { sessions }
    }

    /// Active when `session.create` holds
    pub fn is_active(config: &Config) -> bool {
        config.bool_or(keys::SESSION_CREATE, true).unwrap_or(false)
    }
}

impl Component for SessionFilter {}

#[async_trait]
impl HttpFilter for SessionFilter {
    async fn do_filter(&self, exchange: &mut HttpExchange) -> Result<FilterAction, FilterError> {
        let create = self.sessions.settings().create;
        self.sessions.acquire(exchange, create).await?;
        Ok(FilterAction::Forward)
    }
}
