//! CSRF token validation filter

use std::sync::Arc;

use async_trait::async_trait;
use rudiment_registry::Component;
use rudiment_session_storage::CsrfToken;
use tracing::{debug, warn};

use super::CsrfTokenStore;
use crate::HttpExchange;
use crate::config::{Config, CsrfSettings, keys};
use crate::cookie::{SameSite, SetCookie};
use crate::filter::{FilterAction, FilterError, HttpFilter, status_codes};
use crate::session::SessionManager;

/// Enforces the double-submit cookie protocol
///
/// | Request | Outcome |
/// |---|---|
/// | no token cookie | token issued in a cookie, 204 |
/// | GET, HEAD, OPTIONS, TRACE | forwarded |
/// | stateless, header matches cookie | forwarded |
/// | stateful, cookie matches session token | forwarded |
/// | anything else | 403 |
///
/// In stateful mode a token is bound whenever the request created the
/// session, so the session and token cookies reach the client together.
pub struct CsrfTokenValidationFilter {
    tokens: Arc<CsrfTokenStore>,
    sessions: Arc<SessionManager>,
    settings: CsrfSettings,
}

impl CsrfTokenValidationFilter {
    pub const NAME: &'static str = "csrf";
    pub const POSITION: i32 = 300;

    pub fn new(
        tokens: Arc<CsrfTokenStore>,
        sessions: Arc<SessionManager>,
        settings: CsrfSettings,
    ) -> Self {
        Self {
            tokens,
            sessions,
            settings,
        }
    }

    /// Active when `security.csrf.enabled` holds
    pub fn is_active(config: &Config) -> bool {
        config.bool_or(keys::CSRF_ENABLED, false).unwrap_or(false)
    }

    fn token_cookie(&self, token: &CsrfToken) -> SetCookie {
        // Readable by scripts so they can echo it in the header
        SetCookie::new(&self.settings.cookie_name, token.value())
            .http_only(false)
            .same_site(SameSite::Strict)
    }

    fn reject(&self, exchange: &HttpExchange, reason: &str) -> FilterAction {
        warn!(
            "CSRF validation failed for {} {}: {}",
            exchange.method(),
            exchange.path(),
            reason
        );
        FilterAction::Terminate(status_codes::CSRF_REJECTED)
    }
}

impl Component for CsrfTokenValidationFilter {}

#[async_trait]
impl HttpFilter for CsrfTokenValidationFilter {
    async fn do_filter(&self, exchange: &mut HttpExchange) -> Result<FilterAction, FilterError> {
        let stateless = self.settings.stateless;
        let session = if stateless {
            None
        } else {
            self.sessions.acquire(exchange, false).await?
        };

        let Some(cookie) = exchange
            .cookie(&self.settings.cookie_name)
            .map(str::to_string)
        else {
            let token = if stateless {
                self.tokens.create()
            } else {
                let Some(token) = session
                    .as_ref()
                    .and_then(|access| self.tokens.current_or_bind(&access.session))
                else {
                    return Ok(self.reject(exchange, "no session to bind a token to"));
                };
                token
            };

            exchange.add_cookie(self.token_cookie(&token));
            debug!("Issued CSRF token");
            return Ok(FilterAction::Terminate(status_codes::TOKEN_ISSUED));
        };

        // The cookie predates this session; hand out the token of the new one
        if let Some(access) = session.as_ref().filter(|access| access.created)
            && let Some(token) = self.tokens.bind(&access.session)
        {
            exchange.add_cookie(self.token_cookie(&token));
        }

        if exchange.is_safe_method() {
            return Ok(FilterAction::Forward);
        }

        if stateless {
            let header = exchange.header(&self.settings.header_name);
            if self.tokens.validate_stateless(&cookie, header) {
                return Ok(FilterAction::Forward);
            }
            return Ok(self.reject(exchange, "header does not match cookie"));
        }

        match session {
            None => Ok(self.reject(exchange, "no session")),
            Some(access) if access.created => {
                Ok(self.reject(exchange, "token cookie from an earlier session"))
            }
            Some(access) => {
                if self.tokens.validate_session(&access.session, &cookie) {
                    Ok(FilterAction::Forward)
                } else {
                    Ok(self.reject(exchange, "cookie does not match session token"))
                }
            }
        }
    }
}
