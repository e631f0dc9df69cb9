//! In-Memory Session Storage Implementation
//!
//! This implementation stores all sessions in memory behind a single async
//! `RwLock`. Every mutation of the session map, including get-or-create, runs
//! under the write lock, so per-key creation is atomic. Suitable for:
//! - Single-process deployments
//! - Development and testing

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rudiment_registry::Component;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{
    Clock, GetOrCreate, MonotonicClock, Session, SessionHandle, SessionStore, SessionStoreError,
    generate_token,
};

#[derive(Debug, Default)]
struct StoreState {
    /// All sessions by rsid
    sessions: HashMap<String, SessionHandle>,
    /// Client correlation key -> rsid, for sessions created via get-or-create
    correlations: HashMap<String, String>,
}

/// In-memory storage for sessions
#[derive(Clone)]
pub struct InMemorySessionStore {
    state: Arc<RwLock<StoreState>>,
    clock: Arc<dyn Clock>,
    /// Configuration
    config: InMemoryConfig,
}

/// Configuration for in-memory session storage
#[derive(Debug, Clone)]
pub struct InMemoryConfig {
    /// Maximum sessions to keep (for memory management)
    pub max_sessions: usize,
    /// Idle seconds after which a session may be evicted to make room
    pub inactivity_period: u64,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            max_sessions: 100_000, // 100k concurrent sessions
            inactivity_period: 1800,
        }
    }
}

impl InMemorySessionStore {
    /// Create new in-memory session storage with default configuration
    pub fn new() -> Self {
        Self::with_config(InMemoryConfig::default(), Arc::new(MonotonicClock::new()))
    }

    /// Create new in-memory session storage reading access times from `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::with_config(InMemoryConfig::default(), clock)
    }

    /// Create new in-memory session storage with custom configuration
    pub fn with_config(config: InMemoryConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
            clock,
            config,
        }
    }

    /// Get current statistics
    pub async fn stats(&self) -> InMemoryStats {
        let state = self.state.read().await;

        InMemoryStats {
            session_count: state.sessions.len(),
            correlated_count: state.correlations.len(),
            max_sessions: self.config.max_sessions,
        }
    }

    /// Build and insert a session; caller holds the write lock
    ///
    /// At capacity, sessions idle past the inactivity period are evicted
    /// first. Only if none can be evicted is the store reported full.
    fn insert_new(&self, state: &mut StoreState) -> Result<SessionHandle, SessionStoreError> {
        if state.sessions.len() >= self.config.max_sessions {
            let evicted = self.evict_expired(state);
            if state.sessions.len() >= self.config.max_sessions {
                warn!(
                    "Session capacity of {} reached, nothing to evict",
                    self.config.max_sessions
                );
                return Err(SessionStoreError::MaxSessionsReached(self.config.max_sessions));
            }
            info!("Evicted {} expired sessions to make room", evicted);
        }

        let mut rsid = generate_token();
        while state.sessions.contains_key(&rsid) {
            rsid = generate_token();
        }

        let session = SessionHandle::new(Session::new(rsid.clone(), self.clock.now_millis()));
        state.sessions.insert(rsid, session.clone());
        Ok(session)
    }

    /// Remove and clear every session idle past the inactivity period
    fn evict_expired(&self, state: &mut StoreState) -> usize {
        let now = self.clock.now_millis();
        let threshold = self.config.inactivity_period;
        let expired: Vec<String> = state
            .sessions
            .iter()
            .filter(|(_, session)| session.is_expired(now, threshold))
            .map(|(rsid, _)| rsid.clone())
            .collect();

        for rsid in &expired {
            if let Some(session) = Self::remove_entry(state, rsid) {
                session.clear();
            }
        }
        expired.len()
    }

    /// Remove `rsid` and its correlation entries; caller holds the write lock
    fn remove_entry(state: &mut StoreState, rsid: &str) -> Option<SessionHandle> {
        let removed = state.sessions.remove(rsid);
        if removed.is_some() {
            state.correlations.retain(|_, bound| bound != rsid);
        }
        removed
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemorySessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemorySessionStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Component for InMemorySessionStore {
    fn destroy(&self) {
        let Ok(mut state) = self.state.try_write() else {
            debug!("Session map busy during shutdown, leaving sessions to drop");
            return;
        };

        let count = state.sessions.len();
        for (_, session) in state.sessions.drain() {
            session.clear();
        }
        state.correlations.clear();
        info!("Cleared {} sessions on shutdown", count);
    }
}

/// Statistics for in-memory storage
#[derive(Debug, Clone)]
pub struct InMemoryStats {
    pub session_count: usize,
    pub correlated_count: usize,
    pub max_sessions: usize,
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    type Error = SessionStoreError;

    fn backend_name(&self) -> &'static str {
        "InMemory"
    }

    // ============================================================================
    // Session Management
    // ============================================================================

    async fn create_session(&self) -> Result<SessionHandle, Self::Error> {
        let mut state = self.state.write().await;
        let session = self.insert_new(&mut state)?;

        debug!("Created session, {} active", state.sessions.len());
        Ok(session)
    }

    async fn get_or_create(&self, correlation_key: &str) -> Result<GetOrCreate, Self::Error> {
        let mut state = self.state.write().await;

        if let Some(session) = state
            .correlations
            .get(correlation_key)
            .and_then(|rsid| state.sessions.get(rsid))
        {
            debug!("Joined existing session for correlation key");
            return Ok(GetOrCreate {
                session: session.clone(),
                created: false,
            });
        }

        let session = self.insert_new(&mut state)?;
        if let Some(rsid) = session.rsid() {
            state.correlations.insert(correlation_key.to_string(), rsid);
        }

        debug!("Created correlated session, {} active", state.sessions.len());
        Ok(GetOrCreate {
            session,
            created: true,
        })
    }

    async fn get_session(&self, rsid: &str) -> Result<Option<SessionHandle>, Self::Error> {
        let state = self.state.read().await;
        Ok(state.sessions.get(rsid).cloned())
    }

    async fn invalidate(&self, session: &SessionHandle) -> Result<bool, Self::Error> {
        let Some(rsid) = session.rsid() else {
            return Ok(false);
        };

        let mut state = self.state.write().await;
        Self::remove_entry(&mut state, &rsid);
        drop(state);

        let cleared = session.clear();
        if cleared {
            debug!("Invalidated session");
        }
        Ok(cleared)
    }

    async fn delete_session(&self, rsid: &str) -> Result<bool, Self::Error> {
        let mut state = self.state.write().await;
        let removed = Self::remove_entry(&mut state, rsid);
        let remaining = state.sessions.len();
        drop(state);

        match removed {
            Some(session) => {
                session.clear();
                info!("Deleted session, {} remaining", remaining);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_sessions(&self) -> Result<Vec<String>, Self::Error> {
        let state = self.state.read().await;
        Ok(state.sessions.keys().cloned().collect())
    }

    // ============================================================================
    // Monitoring
    // ============================================================================

    async fn session_count(&self) -> Result<usize, Self::Error> {
        let state = self.state.read().await;
        Ok(state.sessions.len())
    }
}
