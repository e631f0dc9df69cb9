//! CSRF token minting and validation

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rudiment_registry::Component;
use rudiment_session_storage::{Clock, CsrfToken, SessionHandle, constant_time_eq};
use tracing::debug;

/// Issues CSRF tokens and checks submitted ones
///
/// Holds no tokens itself; stateful tokens live on their session.
pub struct CsrfTokenStore {
    clock: Arc<dyn Clock>,
    issued: AtomicU64,
}

impl CsrfTokenStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            issued: AtomicU64::new(0),
        }
    }

    /// Mint a token without binding it anywhere
    pub fn create(&self) -> CsrfToken {
        self.issued.fetch_add(1, Ordering::Relaxed);
        CsrfToken::generate(self.clock.now_millis())
    }

    /// Mint a token and bind it to `session`, replacing any previous one
    ///
    /// `None` if the session has been invalidated.
    pub fn bind(&self, session: &SessionHandle) -> Option<CsrfToken> {
        if !session.is_valid() {
            return None;
        }
        let token = self.create();
        session.set_csrf_token(token.clone());
        debug!("Bound new CSRF token to session");
        Some(token)
    }

    /// The token bound to `session`, minting and binding one if there is none
    pub fn current_or_bind(&self, session: &SessionHandle) -> Option<CsrfToken> {
        session.csrf_token_or_insert_with(|| self.create())
    }

    /// Cookie and header must carry the same non-empty value
    pub fn validate_stateless(&self, cookie: &str, header: Option<&str>) -> bool {
        match header {
            Some(header) => !cookie.is_empty() && constant_time_eq(cookie, header),
            None => false,
        }
    }

    /// Cookie must carry the token bound to `session`
    pub fn validate_session(&self, session: &SessionHandle, cookie: &str) -> bool {
        session
            .csrf_token()
            .is_some_and(|token| token.matches(cookie))
    }

    /// Number of tokens minted since startup
    pub fn issued_count(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }
}

impl Component for CsrfTokenStore {}

#[cfg(test)]
mod tests {
    use super::*;
    use rudiment_session_storage::{ManualClock, Session};

    fn store() -> CsrfTokenStore {
        CsrfTokenStore::new(Arc::new(ManualClock::new(42)))
    }

    #[test]
    fn test_create_is_unbound() {
        let tokens = store();
        let first = tokens.create();
        let second = tokens.create();

        assert_ne!(first.value(), second.value());
        assert_eq!(first.created_time(), 42);
        assert_eq!(tokens.issued_count(), 2);
    }

    #[test]
    fn test_bind_replaces_previous_token() {
        let tokens = store();
        let session = SessionHandle::new(Session::new("rsid", 0));

        let old = tokens.bind(&session).unwrap();
        let new = tokens.bind(&session).unwrap();

        assert!(!tokens.validate_session(&session, old.value()));
        assert!(tokens.validate_session(&session, new.value()));
    }

    #[test]
    fn test_current_or_bind_reuses_token() {
        let tokens = store();
        let session = SessionHandle::new(Session::new("rsid", 0));

        let first = tokens.current_or_bind(&session).unwrap();
        let second = tokens.current_or_bind(&session).unwrap();

        assert_eq!(first, second);
        assert_eq!(tokens.issued_count(), 1);
    }

    #[test]
    fn test_invalidated_session_gets_no_token() {
        let tokens = store();
        let session = SessionHandle::new(Session::new("rsid", 0));
        session.clear();

        assert!(tokens.bind(&session).is_none());
        assert!(tokens.current_or_bind(&session).is_none());
        assert!(!tokens.validate_session(&session, ""));
    }

    #[test]
    fn test_validate_stateless() {
        let tokens = store();
        assert!(tokens.validate_stateless("abc", Some("abc")));
        assert!(!tokens.validate_stateless("abc", Some("abd")));
        assert!(!tokens.validate_stateless("abc", None));
        assert!(!tokens.validate_stateless("", Some("")));
    }
}
