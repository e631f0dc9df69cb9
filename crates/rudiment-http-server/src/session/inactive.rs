//! Inactivity expiry filter

use std::sync::Arc;

use async_trait::async_trait;
use rudiment_registry::Component;
use tracing::warn;

use super::SessionManager;
use crate::config::Config;
use crate::filter::{FilterAction, FilterError, HttpFilter, status_codes};
use crate::HttpExchange;

/// Invalidates sessions that were idle for longer than
/// `session.inactivityPeriodAllowed` seconds and answers with 440
///
/// Idle time is measured from the access before the current request and
/// truncated to whole seconds; a session idle exactly for the allowed period
/// survives. Sessions created by the current request are never checked.
pub struct InactiveSessionFilter {
    sessions: Arc<SessionManager>,
}

impl InactiveSessionFilter {
    pub const NAME: &'static str = "inactive-session";
    pub const POSITION: i32 = 200;

    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self { sessions }
    }

    /// Active when sessions are created at all
    pub fn is_active(config: &Config) -> bool {
        super::SessionFilter::is_active(config)
    }
}

impl Component for InactiveSessionFilter {}

#[async_trait]
impl HttpFilter for InactiveSessionFilter {
    async fn do_filter(&self, exchange: &mut HttpExchange) -> Result<FilterAction, FilterError> {
        let Some(access) = self.sessions.acquire(exchange, false).await? else {
            return Ok(FilterAction::Forward);
        };
        let Some(previous_access) = access.previous_access else {
            return Ok(FilterAction::Forward);
        };

        let threshold = self.sessions.settings().inactivity_period;
        let now = self.sessions.clock().now_millis();
        let idle_secs = now.saturating_sub(previous_access) / 1_000;

        if idle_secs > threshold {
            warn!(
                "Session expired after {}s of inactivity (allowed {}s)",
                idle_secs, threshold
            );
            self.sessions.invalidate(exchange, &access.session).await?;
            return Ok(FilterAction::Terminate(status_codes::session_expired()));
        }

        Ok(FilterAction::Forward)
    }
}
