//! Session acquisition for transport requests

use std::sync::Arc;

use rudiment_registry::Component;
use rudiment_session_storage::{BoxedSessionStore, Clock, SessionHandle, SessionStoreError};
use tracing::{debug, info};

use crate::config::SessionSettings;
use crate::cookie::{SameSite, SetCookie};
use crate::exchange::{HttpExchange, SessionAccess};

/// Binds requests to sessions through the session cookie
///
/// Acquisition is idempotent within one request cycle: the first call
/// resolves the session and records it on the exchange, later calls return
/// the recorded access.
pub struct SessionManager {
    store: Arc<BoxedSessionStore>,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
}

impl SessionManager {
    pub fn new(
        store: Arc<BoxedSessionStore>,
        clock: Arc<dyn Clock>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            store,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<BoxedSessionStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Resolve the session of the exchange
    ///
    /// A known session cookie touches the session and records the previous
    /// access time. Unknown or malformed cookies count as absent. Without a
    /// session, one is created if `create_if_absent` holds; requests carrying
    /// the configured correlation header share a session with every other
    /// request bearing the same key, however many race to create it.
    pub async fn acquire(
        &self,
        exchange: &mut HttpExchange,
        create_if_absent: bool,
    ) -> Result<Option<SessionAccess>, SessionStoreError> {
        if let Some(access) = exchange.session_access() {
            return Ok(Some(access.clone()));
        }

        let cookie = exchange
            .cookie(&self.settings.cookie_name)
            .map(str::to_string);
        if let Some(rsid) = cookie {
            match self.store.get_session(&rsid).await? {
                Some(session) => {
                    let previous = session.touch(self.clock.now_millis());
                    let access = SessionAccess {
                        session,
                        created: false,
                        previous_access: Some(previous),
                    };
                    exchange.set_session_access(access.clone());
                    return Ok(Some(access));
                }
                None => debug!("Unknown session cookie, treating as absent"),
            }
        }

        if !create_if_absent {
            return Ok(None);
        }

        let correlation_key = self
            .settings
            .correlation_header
            .as_deref()
            .and_then(|header| exchange.header(header))
            .filter(|key| !key.is_empty())
            .map(str::to_string);

        let (session, created) = match correlation_key {
            Some(key) => {
                let outcome = self.store.get_or_create(&key).await?;
                (outcome.session, outcome.created)
            }
            None => (self.store.create_session().await?, true),
        };

        let Some(rsid) = session.rsid() else {
            // Invalidated between creation and this point
            return Ok(None);
        };

        if created {
            info!("Created session for {} {}", exchange.method(), exchange.path());
        } else {
            debug!("Joined session created by a concurrent request");
        }

        exchange.add_cookie(self.session_cookie(rsid));
        let access = SessionAccess {
            session,
            created,
            previous_access: None,
        };
        exchange.set_session_access(access.clone());
        Ok(Some(access))
    }

    /// Remove the session from the store and expire the client's cookie
    ///
    /// Returns `false` if the session had already been invalidated.
    pub async fn invalidate(
        &self,
        exchange: &mut HttpExchange,
        session: &SessionHandle,
    ) -> Result<bool, SessionStoreError> {
        let invalidated = self.store.invalidate(session).await?;
        exchange.add_cookie(
            SetCookie::expired(&self.settings.cookie_name)
                .http_only(true)
                .same_site(SameSite::Lax),
        );
        exchange.clear_session_access();
        Ok(invalidated)
    }

    /// Reissue the exchange's session under a fresh identifier
    ///
    /// The new session takes over attributes, identity and bound CSRF token;
    /// the previous identifier stops resolving. Call before attaching an
    /// identity so a session id planted before login is worthless after it.
    /// Returns `None` when the exchange carries no session.
    pub async fn rotate(
        &self,
        exchange: &mut HttpExchange,
    ) -> Result<Option<SessionHandle>, SessionStoreError> {
        let Some(previous) = exchange.session().cloned() else {
            return Ok(None);
        };

        let session = self.store.create_session().await?;
        session.take_over(&previous);
        self.store.invalidate(&previous).await?;

        let Some(rsid) = session.rsid() else {
            return Ok(None);
        };
        info!("Rotated session identifier");

        exchange.replace_cookie(self.session_cookie(rsid));
        exchange.set_session_access(SessionAccess {
            session: session.clone(),
            created: true,
            previous_access: None,
        });
        Ok(Some(session))
    }

    pub async fn session_count(&self) -> Result<usize, SessionStoreError> {
        self.store.session_count().await
    }

    fn session_cookie(&self, rsid: String) -> SetCookie {
        SetCookie::new(&self.settings.cookie_name, rsid)
            .http_only(true)
            .same_site(SameSite::Lax)
    }
}

impl Component for SessionManager {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use crate::config::keys;
    use http::Method;
    use rudiment_session_storage::{InMemoryConfig, InMemorySessionStore, ManualClock};
    use std::time::Duration;

    fn manager_with(config: Config) -> (SessionManager, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000));
        let settings = config.session_settings().unwrap();
        let store: Arc<BoxedSessionStore> = Arc::new(InMemorySessionStore::with_config(
            InMemoryConfig {
                max_sessions: settings.max_sessions,
                inactivity_period: settings.inactivity_period,
            },
            clock.clone(),
        ));
        (SessionManager::new(store, clock.clone(), settings), clock)
    }

    fn rsid_cookie(exchange: &HttpExchange) -> String {
        exchange.response_cookie("RSID").unwrap().value().to_string()
    }

    #[tokio::test]
    async fn test_creates_session_and_sets_cookie() {
        let (manager, _) = manager_with(Config::new());
        let mut exchange = HttpExchange::request(Method::GET, "/");

        let access = manager.acquire(&mut exchange, true).await.unwrap().unwrap();

        assert!(access.created);
        assert_eq!(access.previous_access, None);
        let cookie = exchange.response_cookie("RSID").unwrap();
        assert!(cookie.is_http_only());
        assert_eq!(Some(cookie.value().to_string()), access.session.rsid());
        assert_eq!(manager.session_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_acquire_is_idempotent_per_request() {
        let (manager, _) = manager_with(Config::new());
        let mut exchange = HttpExchange::request(Method::GET, "/");

        let first = manager.acquire(&mut exchange, true).await.unwrap().unwrap();
        let second = manager.acquire(&mut exchange, true).await.unwrap().unwrap();

        assert!(first.session.ptr_eq(&second.session));
        assert_eq!(exchange.response_cookies().len(), 1);
        assert_eq!(manager.session_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_known_cookie_touches_session() {
        let (manager, clock) = manager_with(Config::new());
        let mut first = HttpExchange::request(Method::GET, "/");
        manager.acquire(&mut first, true).await.unwrap();
        let rsid = rsid_cookie(&first);

        clock.advance(Duration::from_secs(5));
        let mut second = HttpExchange::request(Method::GET, "/").with_cookie("RSID", &rsid);
        let access = manager.acquire(&mut second, true).await.unwrap().unwrap();

        assert!(!access.created);
        assert_eq!(access.previous_access, Some(1_000));
        assert_eq!(access.session.last_accessed_time(), 6_000);
        assert!(second.response_cookies().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_cookie_is_absent() {
        let (manager, _) = manager_with(Config::new());

        let mut exchange = HttpExchange::request(Method::GET, "/").with_cookie("RSID", "forged");
        assert!(manager.acquire(&mut exchange, false).await.unwrap().is_none());

        let access = manager.acquire(&mut exchange, true).await.unwrap().unwrap();
        assert!(access.created);
        assert_ne!(rsid_cookie(&exchange), "forged");
    }

    #[tokio::test]
    async fn test_correlation_header_joins_session() {
        let (manager, _) =
            manager_with(Config::new().with_property(keys::SESSION_CORRELATION_HEADER, "X-Client-Id"));

        let mut first = HttpExchange::request(Method::GET, "/").with_header("X-Client-Id", "c-1");
        let mut second = HttpExchange::request(Method::GET, "/").with_header("X-Client-Id", "c-1");

        let a = manager.acquire(&mut first, true).await.unwrap().unwrap();
        let b = manager.acquire(&mut second, true).await.unwrap().unwrap();

        assert!(a.created);
        assert!(!b.created);
        assert!(a.session.ptr_eq(&b.session));
        assert_eq!(rsid_cookie(&first), rsid_cookie(&second));
        assert_eq!(manager.session_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_expires_cookie() {
        let (manager, _) = manager_with(Config::new());
        let mut exchange = HttpExchange::request(Method::GET, "/");
        let access = manager.acquire(&mut exchange, true).await.unwrap().unwrap();

        assert!(manager.invalidate(&mut exchange, &access.session).await.unwrap());
        assert!(!manager.invalidate(&mut exchange, &access.session).await.unwrap());

        assert!(exchange.response_cookie("RSID").unwrap().is_removal());
        assert!(exchange.session().is_none());
        assert_eq!(manager.session_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_capacity_exhausted() {
        let (manager, _) = manager_with(Config::new().with_property(keys::SESSION_MAX_SESSIONS, 1));

        let mut first = HttpExchange::request(Method::GET, "/");
        manager.acquire(&mut first, true).await.unwrap();

        let mut second = HttpExchange::request(Method::GET, "/");
        let result = manager.acquire(&mut second, true).await;
        assert!(matches!(result, Err(SessionStoreError::MaxSessionsReached(1))));
    }

    #[tokio::test]
    async fn test_rotate_reissues_session_identifier() {
        let (manager, _) = manager_with(Config::new());
        let mut first = HttpExchange::request(Method::GET, "/");
        let planted = manager.acquire(&mut first, true).await.unwrap().unwrap();
        planted.session.set_attribute("cart", serde_json::json!(["tea"]));
        let old_rsid = rsid_cookie(&first);

        let mut login = HttpExchange::request(Method::POST, "/login").with_cookie("RSID", &old_rsid);
        manager.acquire(&mut login, true).await.unwrap();
        let rotated = manager.rotate(&mut login).await.unwrap().unwrap();

        let new_rsid = rsid_cookie(&login);
        assert_ne!(new_rsid, old_rsid);
        assert_eq!(rotated.rsid().as_deref(), Some(new_rsid.as_str()));
        assert!(login.session().unwrap().ptr_eq(&rotated));
        assert_eq!(rotated.attribute("cart"), Some(serde_json::json!(["tea"])));
        assert!(!planted.session.is_valid());
        assert!(manager.store().get_session(&old_rsid).await.unwrap().is_none());
        assert_eq!(manager.session_count().await.unwrap(), 1);

        // The old identifier no longer resolves
        let mut replay = HttpExchange::request(Method::GET, "/").with_cookie("RSID", &old_rsid);
        assert!(manager.acquire(&mut replay, false).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rotate_in_creating_request_sets_one_cookie() {
        let (manager, _) = manager_with(Config::new());
        let mut exchange = HttpExchange::request(Method::POST, "/login");
        manager.acquire(&mut exchange, true).await.unwrap();

        manager.rotate(&mut exchange).await.unwrap().unwrap();

        assert_eq!(exchange.response_cookies().len(), 1);
        assert_eq!(Some(rsid_cookie(&exchange)), exchange.session().unwrap().rsid());
    }

    #[tokio::test]
    async fn test_rotate_without_session() {
        let (manager, _) = manager_with(Config::new());
        let mut exchange = HttpExchange::request(Method::POST, "/login");

        assert!(manager.rotate(&mut exchange).await.unwrap().is_none());
        assert!(exchange.response_cookies().is_empty());
    }
}
